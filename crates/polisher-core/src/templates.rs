//! Quick-template buttons under each instrumented surface.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use polisher_config::{QuickTemplate, TemplateConfig};
use polisher_protocols::{ElementSpec, HostDocument, NodeId, SurfaceId};

pub const TEMPLATE_BAR_CLASS: &str = "polisher-templates";
/// Index of the template a bar button inserts.
pub const TEMPLATE_ATTRIBUTE: &str = "data-polisher-template";

/// Owns the template bars and maps their buttons back to phrases.
pub struct TemplateBar {
    doc: Arc<dyn HostDocument>,
    templates: Vec<QuickTemplate>,
    bars: DashMap<SurfaceId, NodeId>,
    buttons: DashMap<NodeId, (SurfaceId, usize)>,
}

impl TemplateBar {
    /// A bar that shows `config.items`, or nothing when disabled.
    pub fn new(doc: Arc<dyn HostDocument>, config: &TemplateConfig) -> Self {
        let templates = if config.enabled {
            config.items.clone()
        } else {
            Vec::new()
        };
        Self {
            doc,
            templates,
            bars: DashMap::new(),
            buttons: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.templates.is_empty()
    }

    pub fn bar(&self, surface: SurfaceId) -> Option<NodeId> {
        self.bars.get(&surface).map(|b| *b)
    }

    /// Insert the bar right after `anchor`. At most one bar per surface.
    pub fn attach(&self, surface: SurfaceId, anchor: NodeId) -> Option<NodeId> {
        if !self.is_enabled() || self.bars.contains_key(&surface) {
            return None;
        }

        let mut spec = ElementSpec::new("div").class(TEMPLATE_BAR_CLASS).owned();
        for (index, template) in self.templates.iter().enumerate() {
            spec = spec.child(
                ElementSpec::new("button")
                    .attr("type", "button")
                    .class("polisher-template")
                    .attr("title", template.phrase.as_str())
                    .attr(TEMPLATE_ATTRIBUTE, index.to_string())
                    .text(template.label.as_str()),
            );
        }

        let bar = match self.doc.insert_after(anchor, &spec) {
            Ok(bar) => bar,
            Err(e) => {
                debug!("Cannot insert template bar for {}: {}", surface, e);
                return None;
            }
        };
        for button in self.doc.children(bar).unwrap_or_default() {
            let index = self
                .doc
                .attribute(button, TEMPLATE_ATTRIBUTE)
                .ok()
                .flatten()
                .and_then(|v| v.parse::<usize>().ok());
            if let Some(index) = index {
                self.buttons.insert(button, (surface, index));
            }
        }
        self.bars.insert(surface, bar);
        Some(bar)
    }

    /// The surface and phrase a bar button inserts.
    pub fn template_for(&self, node: NodeId) -> Option<(SurfaceId, &QuickTemplate)> {
        let (surface, index) = *self.buttons.get(&node)?;
        self.templates.get(index).map(|t| (surface, t))
    }

    /// Drop bars of surfaces evicted from the registry.
    pub fn forget(&self, surfaces: &[SurfaceId]) {
        for surface in surfaces {
            let Some((_, bar)) = self.bars.remove(surface) else {
                continue;
            };
            self.buttons.retain(|_, (owner, _)| *owner != *surface);
            if let Err(e) = self.doc.remove(bar) {
                debug!("Template bar {} already removed: {}", bar, e);
            }
        }
    }
}

impl std::fmt::Debug for TemplateBar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateBar")
            .field("templates", &self.templates.len())
            .field("bars", &self.bars.len())
            .finish()
    }
}
