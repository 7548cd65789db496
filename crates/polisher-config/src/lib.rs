//! # Comment Polisher Config
//!
//! Settings collaborator and runtime configuration.

mod error;
mod loader;
mod schema;
mod store;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use store::{FileSettingsStore, MemorySettingsStore, SettingsStore};
pub use validator::{
    ConfigValidator, DEBOUNCE_RANGE_MS, RESCAN_INTERVAL_RANGE_MS, ValidationError,
    ValidationResult, ValidationWarning,
};
