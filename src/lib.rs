//! # Comment Polisher
//!
//! Discovers comment composition widgets on a page it does not control,
//! attaches a "polish" affordance to each exactly once, and rewrites the
//! draft through a chat-completions endpoint with revert and retry.
//!
//! This crate re-exports the workspace members and owns tracing setup.
//!
//! - [`pipeline`]: discovery, attachment, observation and the action machine
//! - [`config`]: settings stores, runtime tuning and prompts
//! - [`protocols`]: shared traits, identifiers and errors
//! - [`provider`]: the OpenAI-compatible [`ChatCompletionClient`]

pub mod telemetry;

pub use polisher_config as config;
pub use polisher_core as pipeline;
pub use polisher_protocols as protocols;
pub use polisher_provider_openai as provider;

pub use polisher_config::{
    ConfigLoader, FileSettingsStore, MemorySettingsStore, PolisherConfig, Settings, SettingsStore,
};
pub use polisher_core::{ActionOutcome, Document, PolisherSession};
pub use polisher_protocols::{HostDocument, RewriteClient, UsageContext};
pub use polisher_provider_openai::ChatCompletionClient;
pub use telemetry::init_tracing;
