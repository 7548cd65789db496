//! Common types shared across the Comment Polisher crates.

mod context;
mod ids;

pub use context::*;
pub use ids::*;
