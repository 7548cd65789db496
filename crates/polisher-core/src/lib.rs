//! # Comment Polisher Core
//!
//! Finds comment composition surfaces on a page the host controls, attaches a
//! rewrite affordance to each, and drives rewrites through a [`RewriteClient`].
//!
//! ## Architecture
//!
//! ```text
//!  HostDocument ──mutations──► MutationBridge ─┐
//!                                               ├─► RescanScheduler ─► scan
//!  PeriodicRescan ───────────── ticks ─────────┘                       │
//!                                                                       ▼
//!  DiscoveryEngine ─► AttachmentController ─► SurfaceRegistry
//!                            │ clicks          ├─► TemplateBar
//!                            ▼                 └─► SubmitInterceptor
//!                      ActionMachine ─► RewriteClient
//!                            │
//!                            ▼
//!                     DomProgressRenderer
//! ```
//!
//! ## Key Components
//!
//! - [`PolisherSession`]: Wires everything together for one document
//! - [`DiscoveryEngine`]: Rule-driven surface discovery
//! - [`SurfaceRegistry`]: Which nodes are instrumented, and their snapshots
//! - [`AttachmentController`]: Affordance insertion and click routing
//! - [`ActionMachine`]: Per-surface Idle/Busy/Success/Error lifecycle
//! - [`TemplateBar`]: Quick-insert phrases under each surface
//! - [`SubmitInterceptor`]: Offers a polish before the host submits
//! - [`Document`]: In-memory [`HostDocument`] for embedders and tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use polisher_config::{MemorySettingsStore, PolisherConfig, Settings};
//! use polisher_core::{Document, PolisherSession};
//! use polisher_protocols::{ElementSpec, HostDocument};
//! # use polisher_protocols::{ProviderSettings, RewriteClient, RewriteError, RewriteRequest};
//! # struct Echo;
//! # #[async_trait::async_trait]
//! # impl RewriteClient for Echo {
//! #     fn id(&self) -> &str { "echo" }
//! #     async fn rewrite(&self, r: &RewriteRequest, _: &ProviderSettings) -> Result<String, RewriteError> {
//! #         Ok(r.text.clone())
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let doc = Arc::new(Document::new());
//!     doc.append_child(
//!         doc.root(),
//!         &ElementSpec::new("form")
//!             .class("js-new-comment-form")
//!             .child(ElementSpec::new("textarea")),
//!     )
//!     .unwrap();
//!
//!     let session = PolisherSession::new(
//!         doc,
//!         Arc::new(Echo),
//!         Arc::new(MemorySettingsStore::new(Settings::default())),
//!         PolisherConfig::default(),
//!     )
//!     .unwrap();
//!     session.start();
//!     session.shutdown().await;
//! }
//! ```
//!
//! [`RewriteClient`]: polisher_protocols::RewriteClient
//! [`HostDocument`]: polisher_protocols::HostDocument

pub mod action;
pub mod attach;
pub mod discovery;
pub mod dom;
pub mod intercept;
pub mod observer;
pub mod registry;
pub mod selector;
pub mod session;
pub mod templates;

pub use action::{
    ActionMachine, ActionOutcome, NullRenderer, Progress, ProgressRenderer, RewriteInvocation,
    SurfaceState,
};
pub use attach::{AttachmentController, Control, DomProgressRenderer};
pub use discovery::{DiscoveredSurface, Denylist, DiscoveryEngine, Heuristic, Rule, default_rules};
pub use dom::Document;
pub use intercept::{Choice, SubmitInterceptor};
pub use observer::{MutationBridge, PeriodicRescan, RescanReason, RescanScheduler};
pub use registry::{SurfaceRecord, SurfaceRegistry};
pub use selector::Selector;
pub use session::PolisherSession;
pub use templates::TemplateBar;
