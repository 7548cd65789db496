//! Composition helpers around the rewrite affordance.

use serde::{Deserialize, Serialize};

/// One quick-insert phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickTemplate {
    /// Button text.
    pub label: String,
    /// Text inserted into the surface.
    pub phrase: String,
}

impl QuickTemplate {
    pub fn new(label: impl Into<String>, phrase: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            phrase: phrase.into(),
        }
    }
}

/// Quick-insert buttons shown under every instrumented surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub enabled: bool,
    pub items: Vec<QuickTemplate>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            items: vec![
                QuickTemplate::new("💡 What do you think about...", "💡 What do you think about "),
                QuickTemplate::new("🔍 Have you considered...", "🔍 Have you considered "),
                QuickTemplate::new(
                    "⭐ Optional suggestion",
                    "⭐ Optional: I think this may be a good idea, but it's not strictly required. ",
                ),
                QuickTemplate::new("👍 Good idea", "👍 Good idea. I will make that change."),
                QuickTemplate::new("🙌 Good catch", "🙌 Good catch, I missed that. Fixing it now."),
            ],
        }
    }
}

/// Confirmation step in front of the host's own submit buttons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    pub enabled: bool,
    /// Lower-case fragments of submit button text that get a confirmation.
    /// Buttons carrying `data-disable-with` are always included.
    pub button_phrases: Vec<String>,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            button_phrases: vec![
                "start a review".to_string(),
                "add review comment".to_string(),
                "add single comment".to_string(),
            ],
        }
    }
}
