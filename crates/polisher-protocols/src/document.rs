//! Host document protocol.
//!
//! The core never owns the page it augments. Everything it knows about the
//! page goes through [`HostDocument`]: a tree of elements whose editable
//! values can be read and written, next to which sibling elements can be
//! inserted, and whose structural changes can be observed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::DocumentError;
use crate::types::NodeId;

/// Attribute carried by every node the core inserts into a host document.
///
/// Mutation records whose added nodes all carry it are ignored by the
/// observer bridge.
pub const OWNED_MARKER: &str = "data-polisher-owned";

/// Description of an element subtree to insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Set an attribute, replacing any previous value.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    /// Append a class to the `class` attribute.
    pub fn class(self, class: impl AsRef<str>) -> Self {
        let merged = match self.attribute("class") {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class.as_ref()),
            _ => class.as_ref().to_string(),
        };
        self.attr("class", merged)
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Tag this element as inserted by the core.
    pub fn owned(self) -> Self {
        self.attr(OWNED_MARKER, "true")
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One structural change reported by a host document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent whose child list changed.
    pub target: NodeId,
    /// Roots of the subtrees that were inserted.
    pub added: Vec<NodeId>,
    /// Roots of the subtrees that were detached.
    pub removed: Vec<NodeId>,
}

impl MutationRecord {
    pub fn added(target: NodeId, added: Vec<NodeId>) -> Self {
        Self {
            target,
            added,
            removed: Vec::new(),
        }
    }

    pub fn removed(target: NodeId, removed: Vec<NodeId>) -> Self {
        Self {
            target,
            added: Vec::new(),
            removed,
        }
    }
}

/// A third-party document the core reads from and writes into.
///
/// Implementations must tolerate handles to nodes that have since been
/// detached: reads and writes on them return [`DocumentError`], they never
/// panic.
pub trait HostDocument: Send + Sync {
    /// The document root.
    fn root(&self) -> NodeId;

    /// Whether the node is still attached under the root.
    fn is_connected(&self, node: NodeId) -> bool;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DocumentError>;

    /// Lower-case tag name.
    fn tag_name(&self, node: NodeId) -> Result<String, DocumentError>;

    fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DocumentError>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DocumentError>;

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> Result<String, DocumentError>;

    /// Replace the node's own text.
    fn set_text(&self, node: NodeId, text: &str) -> Result<(), DocumentError>;

    /// Current value of an editable element.
    fn value(&self, node: NodeId) -> Result<String, DocumentError>;

    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DocumentError>;

    fn is_disabled(&self, node: NodeId) -> Result<bool, DocumentError>;

    fn set_disabled(&self, node: NodeId, disabled: bool) -> Result<(), DocumentError>;

    /// Insert a subtree as the next sibling of `anchor`.
    fn insert_after(&self, anchor: NodeId, spec: &ElementSpec) -> Result<NodeId, DocumentError>;

    /// Insert a subtree as the last child of `parent`.
    fn append_child(&self, parent: NodeId, spec: &ElementSpec) -> Result<NodeId, DocumentError>;

    /// Detach a node and its subtree.
    fn remove(&self, node: NodeId) -> Result<(), DocumentError>;

    /// Subscribe to structural changes.
    fn subscribe(&self) -> broadcast::Receiver<MutationRecord>;

    /// Element descendants of `node` in document order, excluding `node`.
    fn descendants(&self, node: NodeId) -> Result<Vec<NodeId>, DocumentError> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node)?.into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            let children = self.children(current)?;
            stack.extend(children.into_iter().rev());
        }
        Ok(out)
    }

    /// Ancestors of `node`, nearest first.
    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent(parent);
        }
        out
    }

    fn has_class(&self, node: NodeId, class: &str) -> Result<bool, DocumentError> {
        Ok(self
            .attribute(node, "class")?
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false))
    }

    /// Whether the node, or any ancestor, carries [`OWNED_MARKER`].
    fn is_owned(&self, node: NodeId) -> bool {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .any(|n| matches!(self.attribute(n, OWNED_MARKER), Ok(Some(_))))
    }
}
