//! Discovery errors. Logged and skipped, never surfaced to the user.

use thiserror::Error;

use super::DocumentError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Heuristic '{rule}' failed: {source}")]
    Heuristic {
        rule: String,
        #[source]
        source: DocumentError,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    #[test]
    fn test_invalid_selector_display() {
        let err = DiscoveryError::InvalidSelector {
            selector: "div >".to_string(),
            message: "dangling combinator".to_string(),
        };
        assert!(err.to_string().contains("div >"));
    }

    #[test]
    fn test_heuristic_display() {
        let err = DiscoveryError::Heuristic {
            rule: "edit-container".to_string(),
            source: DocumentError::NodeNotFound(NodeId::new(9)),
        };
        assert!(err.to_string().contains("edit-container"));
        assert!(err.to_string().contains("node#9"));
    }
}
