//! Surface discovery.
//!
//! Walks a host subtree, keeps editable elements, drops denylisted ones, and
//! classifies the rest with an ordered rule list. The first rule that matches
//! decides the usage context. Nodes already in the registry are skipped, so
//! every pass rescans from scratch without double-reporting.

use std::sync::Arc;

use tracing::{trace, warn};

use polisher_protocols::{
    DiscoveryError, DocumentError, HostDocument, NodeId, UsageContext,
};

use crate::registry::SurfaceRegistry;
use crate::selector::Selector;

/// How a rule recognises an element.
#[derive(Debug, Clone)]
pub enum Heuristic {
    /// The element matches a selector.
    Selector(Selector),
    /// Some ancestor carries one of these classes.
    AncestorClass(Vec<String>),
    /// A button near the element has text containing this keyword
    /// (case-insensitive). "Near" means inside the closest `form` ancestor,
    /// or the parent when there is none.
    NearbyControlText(String),
}

/// One classification rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub heuristic: Heuristic,
    pub context: UsageContext,
}

impl Rule {
    pub fn selector(
        name: impl Into<String>,
        selector: &str,
        context: UsageContext,
    ) -> Result<Self, DiscoveryError> {
        Ok(Self {
            name: name.into(),
            heuristic: Heuristic::Selector(Selector::parse(selector)?),
            context,
        })
    }

    pub fn ancestor_class<I, S>(name: impl Into<String>, classes: I, context: UsageContext) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            heuristic: Heuristic::AncestorClass(classes.into_iter().map(Into::into).collect()),
            context,
        }
    }

    pub fn nearby_control_text(
        name: impl Into<String>,
        keyword: impl Into<String>,
        context: UsageContext,
    ) -> Self {
        Self {
            name: name.into(),
            heuristic: Heuristic::NearbyControlText(keyword.into().to_lowercase()),
            context,
        }
    }

    pub fn matches(&self, doc: &dyn HostDocument, node: NodeId) -> Result<bool, DocumentError> {
        match &self.heuristic {
            Heuristic::Selector(selector) => selector.matches(doc, node),
            Heuristic::AncestorClass(classes) => {
                for ancestor in doc.ancestors(node) {
                    for class in classes {
                        if doc.has_class(ancestor, class)? {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Heuristic::NearbyControlText(keyword) => nearby_control_text(doc, node, keyword),
        }
    }
}

fn nearby_control_text(
    doc: &dyn HostDocument,
    node: NodeId,
    keyword: &str,
) -> Result<bool, DocumentError> {
    let mut scope = None;
    for ancestor in doc.ancestors(node) {
        if doc.tag_name(ancestor)? == "form" {
            scope = Some(ancestor);
            break;
        }
    }
    let Some(scope) = scope.or_else(|| doc.parent(node)) else {
        return Ok(false);
    };

    for candidate in doc.descendants(scope)? {
        if doc.is_owned(candidate) {
            continue;
        }
        let label = match doc.tag_name(candidate)?.as_str() {
            "button" => doc.text_content(candidate)?,
            "input" if doc.attribute(candidate, "type")?.as_deref() == Some("submit") => {
                doc.attribute(candidate, "value")?.unwrap_or_default()
            }
            _ => continue,
        };
        if label.to_lowercase().contains(keyword) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Elements never instrumented regardless of rules.
#[derive(Debug, Clone)]
pub struct Denylist {
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub roles: Vec<String>,
    pub input_types: Vec<String>,
}

impl Default for Denylist {
    fn default() -> Self {
        Self {
            ids: vec![
                "js-command-bar-field".to_string(),
                "js-searchable-reference-filter-field".to_string(),
            ],
            classes: vec!["js-filterable-field".to_string()],
            roles: vec![
                "search".to_string(),
                "combobox".to_string(),
                "searchbox".to_string(),
            ],
            input_types: vec!["search".to_string()],
        }
    }
}

impl Denylist {
    pub fn contains(&self, doc: &dyn HostDocument, node: NodeId) -> Result<bool, DocumentError> {
        if let Some(id) = doc.attribute(node, "id")? {
            if self.ids.iter().any(|d| *d == id) {
                return Ok(true);
            }
        }
        for class in &self.classes {
            if doc.has_class(node, class)? {
                return Ok(true);
            }
        }
        if let Some(role) = doc.attribute(node, "role")? {
            if self.roles.iter().any(|r| r.eq_ignore_ascii_case(&role)) {
                return Ok(true);
            }
        }
        if let Some(kind) = doc.attribute(node, "type")? {
            if self.input_types.iter().any(|t| t.eq_ignore_ascii_case(&kind)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// The default rule order.
pub fn default_rules() -> Vec<Rule> {
    // Patterns are literals; a parse failure here is a programming error.
    let selector = |name: &str, source: &str, context| {
        Rule::selector(name, source, context).expect("built-in selector is valid")
    };

    vec![
        selector(
            "edit-form",
            ".is-comment-editing textarea, .js-comment.is-comment-editing textarea",
            UsageContext::EditExisting,
        ),
        Rule::ancestor_class(
            "edit-container",
            ["is-comment-editing"],
            UsageContext::EditExisting,
        ),
        Rule::ancestor_class(
            "reply-container",
            [
                "js-inline-comment-form",
                "review-thread-reply",
                "js-resolvable-timeline-thread-container",
            ],
            UsageContext::ThreadedReply,
        ),
        Rule::ancestor_class(
            "new-entry-container",
            ["js-new-comment-form", "timeline-comment", "timeline-comment-wrapper"],
            UsageContext::NewEntry,
        ),
        Rule::nearby_control_text("update-button", "update comment", UsageContext::EditExisting),
        Rule::nearby_control_text("reply-button", "reply", UsageContext::ThreadedReply),
        selector(
            "generic-comment-field",
            ".comment-form-textarea, .js-comment-field",
            UsageContext::NewEntry,
        ),
        Rule::nearby_control_text("comment-button", "comment", UsageContext::NewEntry),
    ]
}

/// A classified, not yet instrumented surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSurface {
    pub node: NodeId,
    pub context: UsageContext,
    /// Name of the rule that matched.
    pub rule: String,
}

/// Ordered rule dispatcher.
#[derive(Debug)]
pub struct DiscoveryEngine {
    rules: Vec<Rule>,
    denylist: Denylist,
    registry: Arc<SurfaceRegistry>,
}

impl DiscoveryEngine {
    /// Engine with the default rules and denylist.
    pub fn new(registry: Arc<SurfaceRegistry>) -> Self {
        Self::with_rules(default_rules(), Denylist::default(), registry)
    }

    pub fn with_rules(rules: Vec<Rule>, denylist: Denylist, registry: Arc<SurfaceRegistry>) -> Self {
        Self {
            rules,
            denylist,
            registry,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Lazily scan `root`'s subtree in document order.
    pub fn discover<'a>(&'a self, doc: &'a dyn HostDocument, root: NodeId) -> Discovery<'a> {
        let stack = match doc.children(root) {
            Ok(children) => children.into_iter().rev().collect(),
            Err(e) => {
                warn!("Cannot scan {}: {}", root, e);
                Vec::new()
            }
        };
        Discovery {
            engine: self,
            doc,
            stack,
        }
    }

    /// Classify one element. `Ok(None)` when it is not a surface.
    pub fn classify(
        &self,
        doc: &dyn HostDocument,
        node: NodeId,
    ) -> Result<Option<DiscoveredSurface>, DiscoveryError> {
        if !is_editable(doc, node)? {
            return Ok(None);
        }
        if self.denylist.contains(doc, node)? {
            trace!("Skipping denylisted {}", node);
            return Ok(None);
        }
        if self.registry.is_instrumented(node) {
            trace!("Skipping already instrumented {}", node);
            return Ok(None);
        }

        for rule in &self.rules {
            let matched = rule
                .matches(doc, node)
                .map_err(|source| DiscoveryError::Heuristic {
                    rule: rule.name.clone(),
                    source,
                })?;
            if matched {
                return Ok(Some(DiscoveredSurface {
                    node,
                    context: rule.context,
                    rule: rule.name.clone(),
                }));
            }
        }

        trace!("No rule matched {}", node);
        Ok(None)
    }
}

fn is_editable(doc: &dyn HostDocument, node: NodeId) -> Result<bool, DocumentError> {
    if doc.tag_name(node)? == "textarea" {
        return Ok(true);
    }
    Ok(matches!(
        doc.attribute(node, "contenteditable")?.as_deref(),
        Some("" | "true")
    ))
}

/// Iterator over surfaces found by one scan.
///
/// Finite and fused. Elements whose classification fails are logged and
/// skipped.
pub struct Discovery<'a> {
    engine: &'a DiscoveryEngine,
    doc: &'a dyn HostDocument,
    stack: Vec<NodeId>,
}

impl Iterator for Discovery<'_> {
    type Item = DiscoveredSurface;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if self.doc.is_owned(node) {
                continue;
            }
            match self.doc.children(node) {
                Ok(children) => self.stack.extend(children.into_iter().rev()),
                Err(e) => {
                    warn!("Skipping subtree of {}: {}", node, e);
                    continue;
                }
            }
            match self.engine.classify(self.doc, node) {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(e) => warn!("Skipping {}: {}", node, e),
            }
        }
        None
    }
}

impl std::iter::FusedIterator for Discovery<'_> {}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
