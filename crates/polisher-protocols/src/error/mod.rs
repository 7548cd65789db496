//! Error types for the Comment Polisher protocol layer.

mod action;
mod discovery;
mod document;
mod rewrite;

pub use action::*;
pub use discovery::*;
pub use document::*;
pub use rewrite::*;
