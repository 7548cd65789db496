//! Host document errors.

use thiserror::Error;

use crate::types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node is detached from the document: {0}")]
    Detached(NodeId),

    #[error("Node is not editable: {0}")]
    NotEditable(NodeId),
}
