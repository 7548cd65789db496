//! A small CSS selector subset.
//!
//! Supported: type selectors, `*`, `.class`, `#id`, `[attr]`, `[attr=value]`
//! (value optionally quoted), the descendant combinator and comma-separated
//! lists. Anything else is rejected at parse time.

use std::fmt;
use std::str::FromStr;

use polisher_protocols::{DiscoveryError, DocumentError, HostDocument, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeTest {
    Present(String),
    Equals(String, String),
}

/// One compound selector such as `textarea.js-comment-field[name=body]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

impl Compound {
    fn matches(&self, doc: &dyn HostDocument, node: NodeId) -> Result<bool, DocumentError> {
        if let Some(tag) = &self.tag {
            if doc.tag_name(node)? != *tag {
                return Ok(false);
            }
        }
        for id in &self.ids {
            if doc.attribute(node, "id")?.as_deref() != Some(id.as_str()) {
                return Ok(false);
            }
        }
        for class in &self.classes {
            if !doc.has_class(node, class)? {
                return Ok(false);
            }
        }
        for test in &self.attributes {
            let ok = match test {
                AttributeTest::Present(name) => doc.attribute(node, name)?.is_some(),
                AttributeTest::Equals(name, value) => {
                    doc.attribute(node, name)?.as_deref() == Some(value.as_str())
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Compounds joined by descendant combinators, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Chain(Vec<Compound>);

impl Chain {
    fn matches(&self, doc: &dyn HostDocument, node: NodeId) -> Result<bool, DocumentError> {
        let Some((subject, outer)) = self.0.split_last() else {
            return Ok(false);
        };
        if !subject.matches(doc, node)? {
            return Ok(false);
        }
        // Descendant-only chains can be matched greedily, nearest ancestor
        // first.
        let mut ancestors = doc.ancestors(node).into_iter();
        for compound in outer.iter().rev() {
            let mut found = false;
            for ancestor in ancestors.by_ref() {
                if compound.matches(doc, ancestor)? {
                    found = true;
                    break;
                }
            }
            if !found {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    chains: Vec<Chain>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, DiscoveryError> {
        let invalid = |message: &str| DiscoveryError::InvalidSelector {
            selector: source.to_string(),
            message: message.to_string(),
        };

        let mut chains = Vec::new();
        for tokens in split_list(source).map_err(|m| invalid(&m))? {
            if tokens.is_empty() {
                return Err(invalid("empty selector in list"));
            }
            let compounds = tokens
                .iter()
                .map(|token| parse_compound(token))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|m| invalid(&m))?;
            chains.push(Chain(compounds));
        }

        Ok(Self {
            source: source.to_string(),
            chains,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` matches any selector in the list.
    pub fn matches(&self, doc: &dyn HostDocument, node: NodeId) -> Result<bool, DocumentError> {
        for chain in &self.chains {
            if chain.matches(doc, node)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Matching descendants of `root` in document order.
    pub fn select_all(
        &self,
        doc: &dyn HostDocument,
        root: NodeId,
    ) -> Result<Vec<NodeId>, DocumentError> {
        let mut out = Vec::new();
        for node in doc.descendants(root)? {
            if self.matches(doc, node)? {
                out.push(node);
            }
        }
        Ok(out)
    }
}

impl FromStr for Selector {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split a selector list into chains of compound tokens.
///
/// Commas and whitespace only separate outside `[...]`, and quotes inside
/// brackets may hold either.
fn split_list(source: &str) -> Result<Vec<Vec<String>>, String> {
    let mut chains = Vec::new();
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut in_brackets = false;
    let mut quote: Option<char> = None;

    for c in source.chars() {
        if let Some(q) = quote {
            token.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if in_brackets {
            token.push(c);
            match c {
                '"' | '\'' => quote = Some(c),
                ']' => in_brackets = false,
                _ => {}
            }
            continue;
        }
        match c {
            '[' => {
                in_brackets = true;
                token.push(c);
            }
            ',' => {
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
                chains.push(std::mem::take(&mut tokens));
            }
            c if c.is_whitespace() => {
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
            }
            c => token.push(c),
        }
    }

    if quote.is_some() {
        return Err("unterminated quoted value".to_string());
    }
    if in_brackets {
        return Err("expected ']'".to_string());
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    chains.push(tokens);
    Ok(chains)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> Result<String, String> {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    if *pos == start {
        return Err(format!("expected a name at offset {}", start));
    }
    Ok(chars[start..*pos].iter().collect())
}

fn parse_compound(token: &str) -> Result<Compound, String> {
    let chars: Vec<char> = token.chars().collect();
    let mut compound = Compound::default();
    let mut pos = 0;

    if let Some(&first) = chars.first() {
        if first == '*' {
            pos = 1;
        } else if is_ident_char(first) {
            compound.tag = Some(take_ident(&chars, &mut pos)?.to_ascii_lowercase());
        }
    }

    while pos < chars.len() {
        match chars[pos] {
            '.' => {
                pos += 1;
                compound.classes.push(take_ident(&chars, &mut pos)?);
            }
            '#' => {
                pos += 1;
                compound.ids.push(take_ident(&chars, &mut pos)?);
            }
            '[' => {
                pos += 1;
                compound.attributes.push(parse_attribute(&chars, &mut pos)?);
            }
            '>' | '+' | '~' => {
                return Err(format!("unsupported combinator '{}'", chars[pos]));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(compound)
}

fn parse_attribute(chars: &[char], pos: &mut usize) -> Result<AttributeTest, String> {
    let name = take_ident(chars, pos)?;
    match chars.get(*pos) {
        Some(']') => {
            *pos += 1;
            Ok(AttributeTest::Present(name))
        }
        Some('=') => {
            *pos += 1;
            let value = match chars.get(*pos) {
                Some(&quote @ ('"' | '\'')) => {
                    *pos += 1;
                    let start = *pos;
                    while *pos < chars.len() && chars[*pos] != quote {
                        *pos += 1;
                    }
                    if *pos == chars.len() {
                        return Err("unterminated quoted value".to_string());
                    }
                    let value: String = chars[start..*pos].iter().collect();
                    *pos += 1;
                    value
                }
                _ => take_ident(chars, pos)?,
            };
            if chars.get(*pos) != Some(&']') {
                return Err("expected ']'".to_string());
            }
            *pos += 1;
            Ok(AttributeTest::Equals(name, value))
        }
        _ => Err("expected ']' or '='".to_string()),
    }
}
