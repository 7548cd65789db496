//! Affordance attachment and the DOM progress widget.
//!
//! Every node inserted here carries
//! [`OWNED_MARKER`](polisher_protocols::OWNED_MARKER) so the observer bridge
//! can tell our own insertions from the host's.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use polisher_config::UiConfig;
use polisher_protocols::{ActionError, ElementSpec, HostDocument, NodeId, SurfaceId};

use crate::action::{ActionMachine, ActionOutcome, Progress, ProgressRenderer};
use crate::discovery::DiscoveredSurface;
use crate::intercept::{Choice, SubmitInterceptor};
use crate::registry::{SurfaceRecord, SurfaceRegistry};
use crate::templates::TemplateBar;

pub const AFFORDANCE_CLASS: &str = "polisher-affordance";
pub const PROGRESS_CLASS: &str = "polisher-progress";
/// Names the control a widget button stands for.
pub const CONTROL_ATTRIBUTE: &str = "data-polisher-action";
/// Current widget state, for styling.
pub const STATE_ATTRIBUTE: &str = "data-polisher-state";

/// A button inside the progress widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Revert,
    Retry,
    Dismiss,
}

impl Control {
    pub fn as_str(&self) -> &'static str {
        match self {
            Control::Revert => "revert",
            Control::Retry => "retry",
            Control::Dismiss => "dismiss",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "revert" => Some(Control::Revert),
            "retry" => Some(Control::Retry),
            "dismiss" => Some(Control::Dismiss),
            _ => None,
        }
    }
}

/// Renders [`Progress`] as a `div.polisher-progress` placed right after the
/// surface's affordance.
///
/// The widget is rebuilt on every render; at most one exists per surface.
pub struct DomProgressRenderer {
    doc: Arc<dyn HostDocument>,
    ui: UiConfig,
    widgets: DashMap<SurfaceId, NodeId>,
    controls: DashMap<NodeId, (SurfaceId, Control)>,
}

impl DomProgressRenderer {
    pub fn new(doc: Arc<dyn HostDocument>, ui: UiConfig) -> Self {
        Self {
            doc,
            ui,
            widgets: DashMap::new(),
            controls: DashMap::new(),
        }
    }

    /// The widget currently shown for `surface`.
    pub fn widget(&self, surface: SurfaceId) -> Option<NodeId> {
        self.widgets.get(&surface).map(|w| *w)
    }

    /// The surface and control a widget button stands for.
    pub fn control_for(&self, node: NodeId) -> Option<(SurfaceId, Control)> {
        self.controls.get(&node).map(|c| *c)
    }

    /// Drop widgets of surfaces evicted from the registry.
    pub fn forget(&self, surfaces: &[SurfaceId]) {
        for surface in surfaces {
            self.clear(*surface);
        }
    }

    fn clear(&self, surface: SurfaceId) {
        let Some((_, widget)) = self.widgets.remove(&surface) else {
            return;
        };
        self.controls.retain(|_, (owner, _)| *owner != surface);
        // Already gone if the host re-rendered around it.
        if let Err(e) = self.doc.remove(widget) {
            debug!("Progress widget {} already removed: {}", widget, e);
        }
    }

    fn control(&self, control: Control, label: &str) -> ElementSpec {
        ElementSpec::new("button")
            .attr("type", "button")
            .class("polisher-control")
            .attr(CONTROL_ATTRIBUTE, control.as_str())
            .text(label)
    }

    fn build(&self, progress: &Progress) -> Option<ElementSpec> {
        let (state, message, hint, controls) = match progress {
            Progress::Cleared => return None,
            Progress::Invalid => (
                "invalid",
                self.ui.validation_message.clone(),
                None,
                vec![(Control::Dismiss, &self.ui.dismiss_label)],
            ),
            Progress::Busy => ("busy", self.ui.busy_message.clone(), None, Vec::new()),
            Progress::Succeeded => (
                "success",
                self.ui.success_message.clone(),
                None,
                vec![
                    (Control::Revert, &self.ui.revert_label),
                    (Control::Retry, &self.ui.retry_label),
                    (Control::Dismiss, &self.ui.dismiss_label),
                ],
            ),
            Progress::Reverted => (
                "reverted",
                self.ui.reverted_message.clone(),
                None,
                vec![
                    (Control::Revert, &self.ui.revert_label),
                    (Control::Retry, &self.ui.retry_label),
                    (Control::Dismiss, &self.ui.dismiss_label),
                ],
            ),
            Progress::SetupRequired => (
                "setup",
                self.ui.setup_message.clone(),
                Some(self.ui.configure_hint.clone()),
                vec![(Control::Dismiss, &self.ui.dismiss_label)],
            ),
            Progress::Failed {
                message,
                needs_configuration,
            } => (
                "error",
                if message.trim().is_empty() {
                    self.ui.error_fallback_message.clone()
                } else {
                    message.clone()
                },
                needs_configuration.then(|| self.ui.configure_hint.clone()),
                vec![
                    (Control::Retry, &self.ui.error_retry_label),
                    (Control::Dismiss, &self.ui.dismiss_label),
                ],
            ),
        };

        let mut status = ElementSpec::new("div")
            .class("polisher-progress-status")
            .child(ElementSpec::new("span").class("polisher-progress-text").text(message));
        if let Some(hint) = hint {
            status = status.child(ElementSpec::new("span").class("polisher-progress-hint").text(hint));
        }

        let mut actions = ElementSpec::new("div").class("polisher-progress-actions");
        for (control, label) in controls {
            actions = actions.child(self.control(control, label));
        }

        Some(
            ElementSpec::new("div")
                .class(PROGRESS_CLASS)
                .attr(STATE_ATTRIBUTE, state)
                .owned()
                .child(status)
                .child(actions),
        )
    }

    fn register_controls(&self, surface: SurfaceId, widget: NodeId) {
        let Ok(nodes) = self.doc.descendants(widget) else {
            return;
        };
        for node in nodes {
            if let Ok(Some(value)) = self.doc.attribute(node, CONTROL_ATTRIBUTE) {
                if let Some(control) = Control::parse(&value) {
                    self.controls.insert(node, (surface, control));
                }
            }
        }
    }
}

impl ProgressRenderer for DomProgressRenderer {
    fn render(&self, surface: &SurfaceRecord, progress: &Progress) {
        self.clear(surface.id);
        let Some(spec) = self.build(progress) else {
            return;
        };

        let anchor = surface
            .affordance
            .filter(|a| self.doc.is_connected(*a))
            .unwrap_or(surface.node);
        match self.doc.insert_after(anchor, &spec) {
            Ok(widget) => {
                self.widgets.insert(surface.id, widget);
                self.register_controls(surface.id, widget);
            }
            Err(e) => debug!("Cannot show progress for {}: {}", surface.id, e),
        }
    }
}

impl std::fmt::Debug for DomProgressRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomProgressRenderer")
            .field("widgets", &self.widgets.len())
            .field("controls", &self.controls.len())
            .finish()
    }
}

/// Inserts affordances and routes clicks on them.
pub struct AttachmentController {
    doc: Arc<dyn HostDocument>,
    registry: Arc<SurfaceRegistry>,
    machine: Arc<ActionMachine>,
    renderer: Arc<DomProgressRenderer>,
    templates: Option<Arc<TemplateBar>>,
    interceptor: Option<Arc<SubmitInterceptor>>,
    label: String,
    setup_label: String,
    /// Set while no credential is configured.
    needs_setup: AtomicBool,
}

impl AttachmentController {
    pub fn new(
        doc: Arc<dyn HostDocument>,
        registry: Arc<SurfaceRegistry>,
        machine: Arc<ActionMachine>,
        renderer: Arc<DomProgressRenderer>,
        ui: &UiConfig,
    ) -> Self {
        Self {
            doc,
            registry,
            machine,
            renderer,
            templates: None,
            interceptor: None,
            label: ui.affordance_label.clone(),
            setup_label: ui.setup_label.clone(),
            needs_setup: AtomicBool::new(false),
        }
    }

    pub fn with_templates(mut self, templates: Arc<TemplateBar>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<SubmitInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn renderer(&self) -> &DomProgressRenderer {
        &self.renderer
    }

    pub fn templates(&self) -> Option<&TemplateBar> {
        self.templates.as_deref()
    }

    pub fn interceptor(&self) -> Option<&SubmitInterceptor> {
        self.interceptor.as_deref()
    }

    pub fn needs_setup(&self) -> bool {
        self.needs_setup.load(Ordering::Acquire)
    }

    fn current_label(&self) -> &str {
        if self.needs_setup() {
            &self.setup_label
        } else {
            &self.label
        }
    }

    /// Record whether a credential is configured, relabelling every
    /// affordance when that changes. Returns whether anything changed.
    pub fn set_credential_present(&self, present: bool) -> bool {
        let needs_setup = !present;
        if self.needs_setup.swap(needs_setup, Ordering::AcqRel) == needs_setup {
            return false;
        }
        let label = self.current_label();
        for id in self.registry.ids() {
            let Some(affordance) = self.registry.get(id).and_then(|r| r.affordance) else {
                continue;
            };
            if let Err(e) = self.doc.set_text(affordance, label) {
                debug!("Cannot relabel affordance {}: {}", affordance, e);
            }
        }
        info!(needs_setup, "Affordance labels updated");
        true
    }

    /// Instrument one discovered surface.
    ///
    /// The registry claim comes first, so a surface is attached at most once
    /// even when scans overlap. `None` when it was already claimed.
    pub fn attach(&self, found: &DiscoveredSurface) -> Option<SurfaceId> {
        let record = self.registry.claim(found.node, found.context)?;

        let affordance = ElementSpec::new("button")
            .attr("type", "button")
            .class(AFFORDANCE_CLASS)
            .owned()
            .text(self.current_label());
        match self.doc.insert_after(found.node, &affordance) {
            Ok(button) => {
                self.registry.set_affordance(record.id, button);
                if let Some(templates) = &self.templates {
                    templates.attach(record.id, button);
                }
                info!(
                    surface = %record.id,
                    node = %found.node,
                    context = %found.context,
                    rule = %found.rule,
                    "Attached affordance"
                );
            }
            // The claim stays; the record is pruned once its node is found
            // detached.
            Err(e) => warn!("Cannot attach affordance to {}: {}", found.node, e),
        }
        Some(record.id)
    }

    /// Instrument every surface; returns how many were newly attached.
    pub fn attach_all<I>(&self, surfaces: I) -> usize
    where
        I: IntoIterator<Item = DiscoveredSurface>,
    {
        surfaces
            .into_iter()
            .filter_map(|found| self.attach(&found))
            .count()
    }

    /// Handle the affordance being activated.
    ///
    /// Shows the setup prompt instead while no credential is configured.
    pub async fn trigger(&self, surface: SurfaceId) -> Result<ActionOutcome, ActionError> {
        if self.needs_setup() {
            return self.machine.request_setup(surface);
        }
        // Polishing by hand abandons a submission still waiting on a failed
        // polish.
        if let Some(interceptor) = &self.interceptor {
            if interceptor.prompt(surface).is_none() {
                interceptor.cancel(surface);
            }
        }
        self.machine.trigger(surface).await
    }

    /// Route a click on one of our nodes, or on a guarded host submit button.
    ///
    /// `Ok(None)` when the click is not ours to handle; for a host submit
    /// button that means the host should submit as usual.
    pub async fn dispatch_click(&self, node: NodeId) -> Result<Option<ActionOutcome>, ActionError> {
        if let Some(surface) = self.registry.surface_for_affordance(node) {
            return self.trigger(surface).await.map(Some);
        }
        if let Some((surface, template)) = self.templates().and_then(|t| t.template_for(node)) {
            return self.machine.insert(surface, &template.phrase).map(Some);
        }
        if let Some((surface, choice)) = self.interceptor().and_then(|i| i.choice_for(node)) {
            return self.answer(surface, choice).await.map(Some);
        }
        if let Some((surface, control)) = self.renderer.control_for(node) {
            return self.control(surface, control).await.map(Some);
        }
        if self.doc.is_owned(node) {
            return Ok(None);
        }
        if let Some(interceptor) = &self.interceptor {
            if let Some(surface) = interceptor.hold(node)? {
                return Ok(Some(ActionOutcome::Held { surface }));
            }
        }
        debug!("Ignoring click on host node {}", node);
        Ok(None)
    }

    async fn control(
        &self,
        surface: SurfaceId,
        control: Control,
    ) -> Result<ActionOutcome, ActionError> {
        debug!(%surface, control = control.as_str(), "Widget control clicked");
        match control {
            Control::Revert => self.machine.revert(surface),
            Control::Retry => {
                let outcome = self.machine.retry(surface).await?;
                Ok(self.release_after(surface, outcome))
            }
            Control::Dismiss => {
                if let Some(interceptor) = &self.interceptor {
                    interceptor.cancel(surface);
                }
                self.machine.dismiss(surface)
            }
        }
    }

    /// Answer the confirmation prompt of a held submission.
    async fn answer(&self, surface: SurfaceId, choice: Choice) -> Result<ActionOutcome, ActionError> {
        let Some(interceptor) = &self.interceptor else {
            return Ok(ActionOutcome::Ignored);
        };
        debug!(%surface, choice = choice.as_str(), "Confirmation answered");
        match choice {
            Choice::Decline => Ok(interceptor
                .release(surface)
                .map(|button| ActionOutcome::Submit { button })
                .unwrap_or(ActionOutcome::Ignored)),
            Choice::Accept => {
                interceptor.close_prompt(surface);
                if self.needs_setup() {
                    interceptor.cancel(surface);
                    return self.machine.request_setup(surface);
                }
                // On failure the submission stays held until a retry succeeds.
                let outcome = self.machine.trigger(surface).await?;
                Ok(self.release_after(surface, outcome))
            }
        }
    }

    /// Release a held submission once its polish has been applied.
    fn release_after(&self, surface: SurfaceId, outcome: ActionOutcome) -> ActionOutcome {
        let Some(interceptor) = &self.interceptor else {
            return outcome;
        };
        match outcome {
            ActionOutcome::Rewritten { .. } => interceptor
                .release(surface)
                .map(|button| ActionOutcome::Submit { button })
                .unwrap_or(outcome),
            ActionOutcome::Ignored => outcome,
            other => {
                interceptor.cancel(surface);
                other
            }
        }
    }
}

impl std::fmt::Debug for AttachmentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentController")
            .field("label", &self.label)
            .field("needs_setup", &self.needs_setup())
            .field("surfaces", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
