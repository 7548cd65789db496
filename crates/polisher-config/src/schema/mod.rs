//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

mod assist;
mod prompts;
mod settings;

pub use assist::*;
pub use prompts::*;
pub use settings::*;

/// Root runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolisherConfig {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub ui: UiConfig,

    #[serde(default)]
    pub prompts: PromptSet,

    #[serde(default)]
    pub templates: TemplateConfig,

    #[serde(default)]
    pub intercept: InterceptConfig,
}

/// Scan and invocation timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Quiet window that coalesces bursts of host mutations.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Upper bound on how long a continuous mutation burst can defer a scan.
    /// Four debounce windows when unset.
    #[serde(default)]
    pub max_debounce_ms: Option<u64>,

    /// Fixed-interval fallback rescan.
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,

    /// Bounded wait on one rewrite call.
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_debounce(&self) -> Duration {
        Duration::from_millis(self.max_debounce_ms.unwrap_or(self.debounce_ms * 4))
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_debounce_ms: None,
            rescan_interval_ms: default_rescan_interval_ms(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_rescan_interval_ms() -> u64 {
    4000
}

fn default_invocation_timeout_secs() -> u64 {
    30
}

/// User-visible strings for the affordance and progress widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub affordance_label: String,
    pub validation_message: String,
    pub busy_message: String,
    pub success_message: String,
    pub reverted_message: String,
    pub error_fallback_message: String,
    pub configure_hint: String,
    pub revert_label: String,
    pub retry_label: String,
    pub error_retry_label: String,
    pub dismiss_label: String,
    /// Affordance text while no credential is configured.
    pub setup_label: String,
    pub setup_message: String,
    pub confirm_title: String,
    pub confirm_message: String,
    pub confirm_accept_label: String,
    pub confirm_decline_label: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            affordance_label: "✨ Polish message".to_string(),
            validation_message: "Please enter a comment before polishing.".to_string(),
            busy_message: "Polishing comment...".to_string(),
            success_message: "Comment polished successfully!".to_string(),
            reverted_message: "Original comment restored.".to_string(),
            error_fallback_message: "Error polishing comment. Please try again.".to_string(),
            configure_hint: "Set a provider credential in the extension settings.".to_string(),
            revert_label: "Revert to Original".to_string(),
            retry_label: "Polish Again".to_string(),
            error_retry_label: "Retry".to_string(),
            dismiss_label: "Dismiss".to_string(),
            setup_label: "⚠️ Configure Polish".to_string(),
            setup_message: "An API key is required to polish comments.".to_string(),
            confirm_title: "Polish your comment?".to_string(),
            confirm_message:
                "Would you like to polish your comment according to PR feedback guidelines?"
                    .to_string(),
            confirm_accept_label: "Yes, polish my comment".to_string(),
            confirm_decline_label: "No, submit as is".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
