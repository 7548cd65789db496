//! Rewrite client errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// Missing or invalid credential. Remedied in settings, not by retrying.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Network failure, timeout, non-2xx status or malformed body.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl RewriteError {
    pub fn timeout() -> Self {
        RewriteError::Transport("timeout".to_string())
    }

    /// Detail without the category prefix, suitable for display next to the
    /// surface.
    pub fn detail(&self) -> &str {
        match self {
            RewriteError::Configuration(m)
            | RewriteError::UnsupportedProvider(m)
            | RewriteError::Transport(m) => m,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RewriteError::Transport(_))
    }

    /// Whether the user should be pointed at the settings rather than a retry.
    pub fn needs_configuration(&self) -> bool {
        matches!(
            self,
            RewriteError::Configuration(_) | RewriteError::UnsupportedProvider(_)
        )
    }
}
