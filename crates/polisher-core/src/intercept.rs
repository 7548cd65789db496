//! Confirmation step in front of the host's submit buttons.
//!
//! Each scan guards the host buttons that submit a comment. A click on a
//! guarded button whose comment is non-empty is held, and an owned prompt
//! asks whether to polish first. The controller turns either answer into a
//! submission the host performs itself. A released button passes its next
//! click straight through.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use polisher_config::{InterceptConfig, UiConfig};
use polisher_protocols::{DocumentError, ElementSpec, HostDocument, NodeId, SurfaceId};

use crate::registry::SurfaceRegistry;
use crate::selector::Selector;

pub const CONFIRM_CLASS: &str = "polisher-confirm";
/// Names the answer a prompt button stands for.
pub const CHOICE_ATTRIBUTE: &str = "data-polisher-choice";

/// An answer to the confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
    Accept,
    Decline,
}

impl Choice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::Accept => "accept",
            Choice::Decline => "decline",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accept" => Some(Choice::Accept),
            "decline" => Some(Choice::Decline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Hold {
    button: NodeId,
    /// `None` once answered while the polish is still outstanding.
    prompt: Option<NodeId>,
}

/// Containers searched for the comment a submit button belongs to, in
/// priority order.
fn default_containers() -> Vec<Selector> {
    [".js-inline-comment-form", ".review-comment", ".js-comment-container", "form"]
        .into_iter()
        .map(|source| Selector::parse(source).expect("built-in selector is valid"))
        .collect()
}

/// Holds host submissions behind the confirmation prompt.
pub struct SubmitInterceptor {
    doc: Arc<dyn HostDocument>,
    registry: Arc<SurfaceRegistry>,
    enabled: bool,
    phrases: Vec<String>,
    buttons: Selector,
    containers: Vec<Selector>,
    ui: UiConfig,
    guarded: DashMap<NodeId, ()>,
    released: DashMap<NodeId, ()>,
    holds: DashMap<SurfaceId, Hold>,
    choices: DashMap<NodeId, (SurfaceId, Choice)>,
}

impl SubmitInterceptor {
    pub fn new(
        doc: Arc<dyn HostDocument>,
        registry: Arc<SurfaceRegistry>,
        config: &InterceptConfig,
        ui: &UiConfig,
    ) -> Self {
        Self {
            doc,
            registry,
            enabled: config.enabled,
            phrases: config.button_phrases.iter().map(|p| p.to_lowercase()).collect(),
            buttons: Selector::parse("button").expect("built-in selector is valid"),
            containers: default_containers(),
            ui: ui.clone(),
            guarded: DashMap::new(),
            released: DashMap::new(),
            holds: DashMap::new(),
            choices: DashMap::new(),
        }
    }

    pub fn is_guarded(&self, button: NodeId) -> bool {
        self.guarded.contains_key(&button)
    }

    /// Whether a submission for `surface` is waiting on the prompt or on the
    /// accepted polish.
    pub fn is_pending(&self, surface: SurfaceId) -> bool {
        self.holds.contains_key(&surface)
    }

    /// The prompt currently shown for `surface`.
    pub fn prompt(&self, surface: SurfaceId) -> Option<NodeId> {
        self.holds.get(&surface).and_then(|h| h.prompt)
    }

    /// The surface and answer a prompt button stands for.
    pub fn choice_for(&self, node: NodeId) -> Option<(SurfaceId, Choice)> {
        self.choices.get(&node).map(|c| *c)
    }

    /// Guard the submit buttons under `root`; returns how many are new.
    pub fn guard(&self, root: NodeId) -> Result<usize, DocumentError> {
        let doc = self.doc.as_ref();
        self.guarded.retain(|button, _| doc.is_connected(*button));
        self.released.retain(|button, _| doc.is_connected(*button));
        if !self.enabled {
            return Ok(0);
        }

        let mut added = 0;
        for button in self.buttons.select_all(doc, root)? {
            if self.guarded.contains_key(&button) || !self.is_submit_button(button)? {
                continue;
            }
            self.guarded.insert(button, ());
            added += 1;
        }
        if added > 0 {
            debug!(added, guarded = self.guarded.len(), "Guarded submit buttons");
        }
        Ok(added)
    }

    fn is_submit_button(&self, button: NodeId) -> Result<bool, DocumentError> {
        if self.doc.is_owned(button) {
            return Ok(false);
        }
        if self.doc.attribute(button, "data-disable-with")?.is_some() {
            return Ok(true);
        }
        let text = self.doc.text_content(button)?.trim().to_lowercase();
        Ok(self.phrases.iter().any(|p| text.contains(p.as_str())))
    }

    /// The instrumented surface a submit button belongs to.
    pub fn surface_for(&self, button: NodeId) -> Result<Option<SurfaceId>, DocumentError> {
        let ancestors = self.doc.ancestors(button);
        for selector in &self.containers {
            let mut container = None;
            for ancestor in &ancestors {
                if selector.matches(self.doc.as_ref(), *ancestor)? {
                    container = Some(*ancestor);
                    break;
                }
            }
            let Some(container) = container else {
                continue;
            };
            for node in self.doc.descendants(container)? {
                if let Some(surface) = self.registry.surface_for_node(node) {
                    return Ok(Some(surface));
                }
            }
        }
        Ok(None)
    }

    /// Hold a click on a host submit button.
    ///
    /// `Some(surface)` when the submission is now waiting on the prompt.
    /// `None` means the host should submit as usual: the button is not
    /// guarded, was just released, has no instrumented comment, or the
    /// comment is blank.
    pub fn hold(&self, button: NodeId) -> Result<Option<SurfaceId>, DocumentError> {
        if self.released.remove(&button).is_some() {
            debug!("Passing released submission {}", button);
            return Ok(None);
        }
        if !self.is_guarded(button) {
            return Ok(None);
        }
        let Some(surface) = self.surface_for(button)? else {
            return Ok(None);
        };
        if self.prompt(surface).is_some() {
            return Ok(Some(surface));
        }
        let Some(record) = self.registry.get(surface) else {
            return Ok(None);
        };
        if self.doc.value(record.node)?.trim().is_empty() {
            return Ok(None);
        }

        // A failed polish may have left a hold without a prompt.
        self.cancel(surface);
        let prompt = self.doc.insert_after(button, &self.prompt_spec())?;
        for node in self.doc.descendants(prompt)? {
            if let Ok(Some(value)) = self.doc.attribute(node, CHOICE_ATTRIBUTE) {
                if let Some(choice) = Choice::parse(&value) {
                    self.choices.insert(node, (surface, choice));
                }
            }
        }
        self.holds.insert(
            surface,
            Hold {
                button,
                prompt: Some(prompt),
            },
        );
        info!(%surface, %button, "Holding submission for confirmation");
        Ok(Some(surface))
    }

    fn prompt_spec(&self) -> ElementSpec {
        let choice = |choice: Choice, label: &str| {
            ElementSpec::new("button")
                .attr("type", "button")
                .class("polisher-choice")
                .attr(CHOICE_ATTRIBUTE, choice.as_str())
                .text(label)
        };
        ElementSpec::new("div")
            .class(CONFIRM_CLASS)
            .attr("role", "dialog")
            .owned()
            .child(ElementSpec::new("h3").text(self.ui.confirm_title.as_str()))
            .child(ElementSpec::new("p").text(self.ui.confirm_message.as_str()))
            .child(
                ElementSpec::new("div")
                    .class("polisher-confirm-actions")
                    .child(choice(Choice::Decline, self.ui.confirm_decline_label.as_str()))
                    .child(choice(Choice::Accept, self.ui.confirm_accept_label.as_str())),
            )
    }

    /// Remove the prompt but keep the submission held.
    pub fn close_prompt(&self, surface: SurfaceId) {
        let prompt = match self.holds.get_mut(&surface) {
            Some(mut hold) => hold.prompt.take(),
            None => None,
        };
        if let Some(prompt) = prompt {
            self.choices.retain(|_, (owner, _)| *owner != surface);
            if let Err(e) = self.doc.remove(prompt) {
                debug!("Confirmation prompt {} already removed: {}", prompt, e);
            }
        }
    }

    /// Let the held submission through. Returns the button to submit with.
    pub fn release(&self, surface: SurfaceId) -> Option<NodeId> {
        self.close_prompt(surface);
        let (_, hold) = self.holds.remove(&surface)?;
        self.released.insert(hold.button, ());
        info!(%surface, button = %hold.button, "Releasing submission");
        Some(hold.button)
    }

    /// Drop the held submission without submitting.
    pub fn cancel(&self, surface: SurfaceId) {
        self.close_prompt(surface);
        if self.holds.remove(&surface).is_some() {
            debug!(%surface, "Held submission cancelled");
        }
    }

    /// Drop holds of surfaces evicted from the registry.
    pub fn forget(&self, surfaces: &[SurfaceId]) {
        for surface in surfaces {
            self.cancel(*surface);
        }
    }
}

impl std::fmt::Debug for SubmitInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitInterceptor")
            .field("enabled", &self.enabled)
            .field("guarded", &self.guarded.len())
            .field("holds", &self.holds.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "intercept_tests.rs"]
mod tests;
