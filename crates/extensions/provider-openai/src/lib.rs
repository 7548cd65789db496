//! Rewrite client for OpenAI-compatible chat-completions endpoints.
//!
//! Serves every [`polisher_protocols::KnownProvider`]: they share the wire
//! format and differ only in default endpoint and model.

mod api;
mod cleanup;
mod provider;

pub use cleanup::strip_boilerplate;
pub use provider::{ChatCompletionClient, TEMPERATURE, USER_PREFIX};
