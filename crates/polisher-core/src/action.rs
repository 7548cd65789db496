//! Per-surface rewrite lifecycle.
//!
//! ```text
//! Idle --trigger--> Busy --ok--> Success --revert--> Idle
//!                     \--err--> Error --retry--> Busy
//! ```
//!
//! The Busy check and transition happen under one lock before any await
//! point, so a surface never has two invocations in flight. Surfaces are
//! independent of each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use polisher_config::{ConfigValidator, PromptSet, SettingsStore};
use polisher_protocols::{
    ActionError, HostDocument, InvocationId, NodeId, ProviderSettings, RewriteClient, RewriteError,
    RewriteRequest, SurfaceId,
};

use crate::registry::{SurfaceRecord, SurfaceRegistry};

/// Process-wide invocation counter.
static NEXT_INVOCATION: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceState {
    #[default]
    Idle,
    Busy,
    Success,
    Error,
}

/// What the progress widget should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Input rejected locally.
    Invalid,
    Busy,
    Succeeded,
    Failed {
        message: String,
        needs_configuration: bool,
    },
    Reverted,
    /// No credential is configured yet.
    SetupRequired,
    /// Remove the widget.
    Cleared,
}

/// Visible progress for a surface.
pub trait ProgressRenderer: Send + Sync {
    fn render(&self, surface: &SurfaceRecord, progress: &Progress);
}

/// Renderer that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl ProgressRenderer for NullRenderer {
    fn render(&self, _surface: &SurfaceRecord, _progress: &Progress) {}
}

/// One rewrite attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteInvocation {
    pub id: InvocationId,
    pub surface: SurfaceId,
    /// Text as captured when the invocation started.
    pub text: String,
}

/// Result of a user action that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The surface now holds the rewritten text.
    Rewritten { invocation: InvocationId, text: String },
    /// The surface was detached before the response arrived.
    Discarded { invocation: InvocationId },
    Reverted,
    Dismissed,
    /// A quick template was inserted; `text` is the surface's new value.
    Inserted { text: String },
    /// The affordance was clicked while no credential is configured.
    SetupRequired,
    /// A host submission is waiting on the confirmation prompt.
    Held { surface: SurfaceId },
    /// The host should now perform the submission `button` stands for.
    Submit { button: NodeId },
    /// Not applicable in the current state (for example, a second trigger
    /// while Busy).
    Ignored,
}

#[derive(Debug, Default)]
struct Slot {
    state: SurfaceState,
    /// Text of the most recent invocation, reused by retry after an error.
    last_text: Option<String>,
}

/// Drives rewrite invocations for every instrumented surface.
pub struct ActionMachine {
    doc: Arc<dyn HostDocument>,
    registry: Arc<SurfaceRegistry>,
    client: Arc<dyn RewriteClient>,
    settings: Arc<dyn SettingsStore>,
    prompts: PromptSet,
    timeout: Duration,
    renderer: Arc<dyn ProgressRenderer>,
    slots: Mutex<HashMap<SurfaceId, Slot>>,
}

impl ActionMachine {
    pub fn new(
        doc: Arc<dyn HostDocument>,
        registry: Arc<SurfaceRegistry>,
        client: Arc<dyn RewriteClient>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            doc,
            registry,
            client,
            settings,
            prompts: PromptSet::default(),
            timeout: Duration::from_secs(30),
            renderer: Arc::new(NullRenderer),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ProgressRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn state(&self, surface: SurfaceId) -> SurfaceState {
        self.slots
            .lock()
            .get(&surface)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// Drop per-surface state for surfaces evicted from the registry.
    pub fn forget(&self, surfaces: &[SurfaceId]) {
        let mut slots = self.slots.lock();
        for surface in surfaces {
            slots.remove(surface);
        }
    }

    /// Start a rewrite of the surface's live text.
    pub async fn trigger(&self, surface: SurfaceId) -> Result<ActionOutcome, ActionError> {
        let record = self.record(surface)?;
        if self.state(surface) == SurfaceState::Busy {
            debug!(%surface, "Ignoring trigger while busy");
            return Ok(ActionOutcome::Ignored);
        }
        let text = self.live_text(&record)?;
        self.run(&record, text).await
    }

    /// Retry. After an error this resends the failed invocation's text;
    /// otherwise it rewrites the live text again.
    pub async fn retry(&self, surface: SurfaceId) -> Result<ActionOutcome, ActionError> {
        let record = self.record(surface)?;
        let reuse = {
            let slots = self.slots.lock();
            match slots.get(&surface) {
                Some(slot) if slot.state == SurfaceState::Busy => return Ok(ActionOutcome::Ignored),
                Some(slot) if slot.state == SurfaceState::Error => slot.last_text.clone(),
                _ => None,
            }
        };
        let text = match reuse {
            Some(text) => text,
            None => self.live_text(&record)?,
        };
        self.run(&record, text).await
    }

    /// Restore the pre-rewrite snapshot.
    ///
    /// Allowed after a success, and again from Idle while a snapshot exists,
    /// so repeated reverts leave the same text.
    pub fn revert(&self, surface: SurfaceId) -> Result<ActionOutcome, ActionError> {
        let record = self.record(surface)?;
        let Some(snapshot) = self.registry.snapshot(surface) else {
            return Ok(ActionOutcome::Ignored);
        };

        {
            let mut slots = self.slots.lock();
            let slot = slots.entry(surface).or_default();
            if !matches!(slot.state, SurfaceState::Success | SurfaceState::Idle) {
                return Ok(ActionOutcome::Ignored);
            }
            slot.state = SurfaceState::Idle;
        }

        if let Err(e) = self.doc.set_value(record.node, &snapshot) {
            warn!("Cannot revert {}: {}", surface, e);
            return Ok(ActionOutcome::Ignored);
        }
        debug!(%surface, "Reverted to snapshot");
        self.renderer.render(&record, &Progress::Reverted);
        Ok(ActionOutcome::Reverted)
    }

    /// Close the progress widget after a success or failure.
    pub fn dismiss(&self, surface: SurfaceId) -> Result<ActionOutcome, ActionError> {
        let record = self.record(surface)?;
        {
            let mut slots = self.slots.lock();
            let slot = slots.entry(surface).or_default();
            if slot.state == SurfaceState::Busy {
                return Ok(ActionOutcome::Ignored);
            }
            slot.state = SurfaceState::Idle;
        }
        self.renderer.render(&record, &Progress::Cleared);
        Ok(ActionOutcome::Dismissed)
    }

    /// Append a quick-template phrase to the surface's live text.
    ///
    /// Ignored while a rewrite is in flight. The snapshot is left alone.
    pub fn insert(&self, surface: SurfaceId, phrase: &str) -> Result<ActionOutcome, ActionError> {
        let record = self.record(surface)?;
        if self.state(surface) == SurfaceState::Busy {
            return Ok(ActionOutcome::Ignored);
        }
        let mut text = self.doc.value(record.node)?;
        text.push_str(phrase);
        self.doc.set_value(record.node, &text)?;
        debug!(%surface, chars = phrase.chars().count(), "Inserted template");
        Ok(ActionOutcome::Inserted { text })
    }

    /// Show the setup prompt instead of starting a rewrite.
    pub fn request_setup(&self, surface: SurfaceId) -> Result<ActionOutcome, ActionError> {
        let record = self.record(surface)?;
        if self.state(surface) == SurfaceState::Busy {
            return Ok(ActionOutcome::Ignored);
        }
        self.renderer.render(&record, &Progress::SetupRequired);
        Ok(ActionOutcome::SetupRequired)
    }

    fn record(&self, surface: SurfaceId) -> Result<SurfaceRecord, ActionError> {
        self.registry
            .get(surface)
            .ok_or(ActionError::NotInstrumented(surface))
    }

    /// Live text, rejecting whitespace-only input before any network call.
    fn live_text(&self, record: &SurfaceRecord) -> Result<String, ActionError> {
        let text = self.doc.value(record.node)?;
        if text.trim().is_empty() {
            // An in-flight invocation keeps its busy widget.
            if self.state(record.id) != SurfaceState::Busy {
                self.renderer.render(record, &Progress::Invalid);
            }
            return Err(ActionError::Validation("empty input".to_string()));
        }
        Ok(text)
    }

    /// Claim the Busy slot. `None` when an invocation is already in flight.
    fn begin(&self, surface: SurfaceId, text: &str) -> Option<RewriteInvocation> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(surface).or_default();
        if slot.state == SurfaceState::Busy {
            return None;
        }
        slot.state = SurfaceState::Busy;
        slot.last_text = Some(text.to_string());
        Some(RewriteInvocation {
            id: InvocationId::new(NEXT_INVOCATION.fetch_add(1, Ordering::Relaxed)),
            surface,
            text: text.to_string(),
        })
    }

    fn settle(&self, surface: SurfaceId, state: SurfaceState) {
        self.slots.lock().entry(surface).or_default().state = state;
    }

    async fn run(
        &self,
        record: &SurfaceRecord,
        text: String,
    ) -> Result<ActionOutcome, ActionError> {
        let Some(invocation) = self.begin(record.id, &text) else {
            debug!(surface = %record.id, "Ignoring trigger while busy");
            return Ok(ActionOutcome::Ignored);
        };

        info!(
            surface = %record.id,
            invocation = %invocation.id,
            context = %record.context,
            chars = invocation.text.chars().count(),
            "Starting rewrite"
        );
        if let Err(e) = self.doc.set_disabled(record.node, true) {
            debug!("Cannot disable {}: {}", record.node, e);
        }
        self.renderer.render(record, &Progress::Busy);

        let result = self.call_client(record, &invocation).await;

        if !self.doc.is_connected(record.node) {
            info!(invocation = %invocation.id, "Surface detached, discarding response");
            self.settle(record.id, SurfaceState::Idle);
            return Ok(ActionOutcome::Discarded {
                invocation: invocation.id,
            });
        }
        if let Err(e) = self.doc.set_disabled(record.node, false) {
            debug!("Cannot re-enable {}: {}", record.node, e);
        }

        match result {
            Ok(rewritten) => {
                if let Err(e) = self.doc.set_value(record.node, &rewritten) {
                    warn!("Cannot write rewrite into {}: {}", record.node, e);
                    self.settle(record.id, SurfaceState::Idle);
                    return Ok(ActionOutcome::Discarded {
                        invocation: invocation.id,
                    });
                }
                self.registry.record_snapshot(record.id, invocation.text.clone());
                self.settle(record.id, SurfaceState::Success);
                info!(
                    surface = %record.id,
                    invocation = %invocation.id,
                    chars = rewritten.chars().count(),
                    "Rewrite applied"
                );
                self.renderer.render(record, &Progress::Succeeded);
                Ok(ActionOutcome::Rewritten {
                    invocation: invocation.id,
                    text: rewritten,
                })
            }
            Err(error) => {
                self.settle(record.id, SurfaceState::Error);
                info!(
                    surface = %record.id,
                    invocation = %invocation.id,
                    "Rewrite failed: {}",
                    error
                );
                self.renderer.render(
                    record,
                    &Progress::Failed {
                        message: error.detail().to_string(),
                        needs_configuration: error.needs_configuration(),
                    },
                );
                Err(error.into())
            }
        }
    }

    async fn call_client(
        &self,
        record: &SurfaceRecord,
        invocation: &RewriteInvocation,
    ) -> Result<String, RewriteError> {
        // Settings are read per invocation so edits apply without a reload.
        let settings = self
            .settings
            .load()
            .await
            .map_err(|e| RewriteError::Configuration(e.to_string()))?;
        let validation = ConfigValidator::validate_settings(&settings);
        for warning in &validation.warnings {
            debug!(invocation = %invocation.id, "Settings warning at {}: {}", warning.path, warning.message);
        }
        if let Some(error) = validation.errors.first() {
            return Err(RewriteError::Configuration(format!(
                "Invalid {}: {}",
                error.path, error.message
            )));
        }
        let provider: ProviderSettings = settings.provider_settings();
        let instruction = self
            .prompts
            .instruction_for(record.context, settings.custom_instructions());
        let request = RewriteRequest::new(invocation.text.clone(), record.context, instruction);

        match tokio::time::timeout(self.timeout, self.client.rewrite(&request, &provider)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(invocation = %invocation.id, "Rewrite timed out after {:?}", self.timeout);
                Err(RewriteError::timeout())
            }
        }
    }
}

impl std::fmt::Debug for ActionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMachine")
            .field("client", &self.client.id())
            .field("timeout", &self.timeout)
            .field("surfaces", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
