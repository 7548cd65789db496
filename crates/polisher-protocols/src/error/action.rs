//! Action errors raised at the invocation boundary.

use thiserror::Error;

use super::{DocumentError, RewriteError};
use crate::types::SurfaceId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Rejected locally before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Surface is not instrumented: {0}")]
    NotInstrumented(SurfaceId),

    /// The surface cannot be read or written any more.
    #[error("Surface unavailable: {0}")]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}
