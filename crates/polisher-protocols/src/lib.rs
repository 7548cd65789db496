//! # Comment Polisher Protocols
//!
//! Shared protocol definitions for the Comment Polisher workspace.
//! Contains only interface definitions and plain data types - no implementations.
//!
//! ## Core Traits
//!
//! - [`HostDocument`] - The uncontrolled page the core discovers surfaces in
//! - [`RewriteClient`] - The remote completion endpoint that rewrites text

pub mod document;
pub mod error;
pub mod rewrite;
pub mod types;

pub use document::{ElementSpec, HostDocument, MutationRecord, OWNED_MARKER};
pub use error::{ActionError, DiscoveryError, DocumentError, RewriteError};
pub use rewrite::{KnownProvider, ProviderSettings, RewriteClient, RewriteRequest};
pub use types::*;
