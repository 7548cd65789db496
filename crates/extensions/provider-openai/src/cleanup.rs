//! Lead-in stripping for model output.
//!
//! Models often prefix the rewrite with an explanatory line ("Here's a
//! polished version:") despite being told not to. Each pattern is anchored at
//! the start of the text and consumes that first line only, so a lead-in with
//! nothing after it is left alone.

use std::sync::LazyLock;

use regex::Regex;

const LEAD_IN_PATTERNS: &[&str] = &[
    r"(?i)^(here['’]s a polished version( of your comment)?:|i['’]ve polished your comment:|polished comment:)[^\n]*\n",
    r"(?i)^(here['’]s|here is) (a|the|your) (more )?(polished|rewritten|revised|improved|refined) (version|comment)[^\n]*:[ \t]*\n",
    r"(?i)^(sure|certainly|of course)[!,.]?[^\n]*:[ \t]*\n",
    r"(?i)^(i['’]ve made the following changes:|changes made:|this version:)[^\n]*\n",
];

static LEAD_INS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    LEAD_IN_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("lead-in pattern is valid"))
        .collect()
});

/// Remove known explanatory lead-ins, then surrounding whitespace.
///
/// Patterns are applied once each, in order.
pub fn strip_boilerplate(content: &str) -> String {
    let mut text = content.trim_start().to_string();
    for pattern in LEAD_INS.iter() {
        if let Some(found) = pattern.find(&text) {
            text = text[found.end()..].trim_start().to_string();
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_polished_version_lead_in() {
        assert_eq!(
            strip_boilerplate("Here's a polished version:\nGreat point!"),
            "Great point!"
        );
    }

    #[test]
    fn test_strips_lead_in_with_trailing_text_on_line() {
        assert_eq!(
            strip_boilerplate("Here's a polished version of your comment: (friendlier)\n\nThanks! 🙌"),
            "Thanks! 🙌"
        );
    }

    #[test]
    fn test_strips_case_insensitively() {
        assert_eq!(strip_boilerplate("POLISHED COMMENT:\nLooks good"), "Looks good");
    }

    #[test]
    fn test_strips_curly_apostrophe() {
        assert_eq!(
            strip_boilerplate("I’ve polished your comment:\nNice work 🎉"),
            "Nice work 🎉"
        );
    }

    #[test]
    fn test_strips_generic_here_is_lead_in() {
        assert_eq!(
            strip_boilerplate("Here is the rewritten comment:\nCould we rename this? 💡"),
            "Could we rename this? 💡"
        );
    }

    #[test]
    fn test_strips_chained_lead_ins() {
        assert_eq!(
            strip_boilerplate("Sure! Here you go:\nChanges made: softened tone\nWhat do you think?"),
            "What do you think?"
        );
    }

    #[test]
    fn test_keeps_sentence_that_starts_like_a_lead_in() {
        let text = "Sure, I'll fix it.\nThanks for the catch!";
        assert_eq!(strip_boilerplate(text), text);
    }

    #[test]
    fn test_keeps_lead_in_without_newline() {
        assert_eq!(
            strip_boilerplate("Polished comment: all good"),
            "Polished comment: all good"
        );
    }

    #[test]
    fn test_only_matches_at_start() {
        let text = "Good catch!\nHere's a polished version:\nnot a lead-in";
        assert_eq!(strip_boilerplate(text), text);
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(strip_boilerplate("\n  Looks great 👍  \n"), "Looks great 👍");
    }
}
