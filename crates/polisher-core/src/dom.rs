//! In-memory host document.
//!
//! An arena of elements implementing [`HostDocument`]. Embedders that mirror
//! a live page (a devtools bridge, a wasm binding) drive it the same way tests
//! do: build subtrees from [`ElementSpec`]s and let the core observe them.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use polisher_protocols::{DocumentError, ElementSpec, HostDocument, MutationRecord, NodeId};

const MUTATION_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    value: String,
    disabled: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn from_spec(spec: &ElementSpec, parent: Option<NodeId>) -> Self {
        let text = spec.text.clone().unwrap_or_default();
        // A textarea's initial text is its default value.
        let value = if spec.tag == "textarea" {
            text.clone()
        } else {
            spec.attribute("value").unwrap_or_default().to_string()
        };
        Self {
            tag: spec.tag.clone(),
            attributes: spec.attributes.clone(),
            text,
            value,
            disabled: spec.attribute("disabled").is_some(),
            parent,
            children: Vec::new(),
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn is_content_editable(&self) -> bool {
        matches!(self.attribute("contenteditable"), Some("" | "true"))
    }
}

#[derive(Debug)]
struct Arena {
    nodes: HashMap<NodeId, NodeData>,
    root: NodeId,
    next_id: u64,
}

impl Arena {
    fn node(&self, id: NodeId) -> Result<&NodeData, DocumentError> {
        self.nodes.get(&id).ok_or(DocumentError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DocumentError> {
        self.nodes.get_mut(&id).ok_or(DocumentError::NodeNotFound(id))
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = match self.nodes.get(&node) {
                Some(data) => data.parent,
                None => return false,
            };
        }
        false
    }

    /// The node, provided it is still attached.
    fn live(&self, id: NodeId) -> Result<&NodeData, DocumentError> {
        let data = self.node(id)?;
        if !self.is_connected(id) {
            return Err(DocumentError::Detached(id));
        }
        Ok(data)
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DocumentError> {
        self.node(id)?;
        if !self.is_connected(id) {
            return Err(DocumentError::Detached(id));
        }
        self.node_mut(id)
    }

    fn allocate(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Build the subtree for `spec` under `parent` without linking it into
    /// the parent's child list.
    fn build(&mut self, spec: &ElementSpec, parent: NodeId) -> NodeId {
        let id = self.allocate();
        self.nodes.insert(id, NodeData::from_spec(spec, Some(parent)));
        for child_spec in &spec.children {
            let child = self.build(child_spec, id);
            if let Some(data) = self.nodes.get_mut(&id) {
                data.children.push(child);
            }
        }
        id
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(data) = self.nodes.get(&id) {
            out.push_str(&data.text);
            for child in &data.children {
                self.collect_text(*child, out);
            }
        }
    }
}

/// Arena-backed [`HostDocument`].
///
/// Detached nodes stay in the arena so stale handles resolve to
/// [`DocumentError::Detached`] instead of [`DocumentError::NodeNotFound`].
pub struct Document {
    arena: RwLock<Arena>,
    mutations: broadcast::Sender<MutationRecord>,
}

impl Document {
    /// Create a document whose root is an empty `<body>`.
    pub fn new() -> Self {
        let root = NodeId::new(1);
        let mut nodes = HashMap::new();
        nodes.insert(root, NodeData::from_spec(&ElementSpec::new("body"), None));
        let (mutations, _) = broadcast::channel(MUTATION_CAPACITY);
        Self {
            arena: RwLock::new(Arena {
                nodes,
                root,
                next_id: 2,
            }),
            mutations,
        }
    }

    /// Number of nodes ever created, attached or not.
    pub fn node_count(&self) -> usize {
        self.arena.read().nodes.len()
    }

    /// First attached descendant of `root` with the given id attribute.
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        let root = self.root();
        self.descendants(root)
            .ok()?
            .into_iter()
            .find(|node| matches!(self.attribute(*node, "id"), Ok(Some(ref v)) if v == id))
    }

    fn publish(&self, record: MutationRecord) {
        // No subscribers is fine.
        let _ = self.mutations.send(record);
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.arena.read();
        f.debug_struct("Document")
            .field("root", &arena.root)
            .field("nodes", &arena.nodes.len())
            .finish()
    }
}

impl HostDocument for Document {
    fn root(&self) -> NodeId {
        self.arena.read().root
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.arena.read().is_connected(node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.read().nodes.get(&node).and_then(|data| data.parent)
    }

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DocumentError> {
        Ok(self.arena.read().live(node)?.children.clone())
    }

    fn tag_name(&self, node: NodeId) -> Result<String, DocumentError> {
        Ok(self.arena.read().live(node)?.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DocumentError> {
        Ok(self
            .arena
            .read()
            .live(node)?
            .attribute(name)
            .map(str::to_string))
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DocumentError> {
        let mut arena = self.arena.write();
        let data = arena.live_mut(node)?;
        match data.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => data.attributes.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn text_content(&self, node: NodeId) -> Result<String, DocumentError> {
        let arena = self.arena.read();
        arena.live(node)?;
        let mut out = String::new();
        arena.collect_text(node, &mut out);
        Ok(out)
    }

    fn set_text(&self, node: NodeId, text: &str) -> Result<(), DocumentError> {
        {
            let mut arena = self.arena.write();
            arena.live_mut(node)?.text = text.to_string();
        }
        // Replacing text swaps the element's text child; report it as an
        // addition on the element itself.
        self.publish(MutationRecord::added(node, vec![node]));
        Ok(())
    }

    fn value(&self, node: NodeId) -> Result<String, DocumentError> {
        let arena = self.arena.read();
        let data = arena.live(node)?;
        match data.tag.as_str() {
            "textarea" | "input" => Ok(data.value.clone()),
            _ if data.is_content_editable() => {
                let mut out = String::new();
                arena.collect_text(node, &mut out);
                Ok(out)
            }
            _ => Err(DocumentError::NotEditable(node)),
        }
    }

    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DocumentError> {
        let replaced = {
            let mut arena = self.arena.write();
            let data = arena.live_mut(node)?;
            if matches!(data.tag.as_str(), "textarea" | "input") {
                data.value = value.to_string();
                return Ok(());
            }
            if !data.is_content_editable() {
                return Err(DocumentError::NotEditable(node));
            }
            // The new value replaces the whole editable subtree.
            data.text = value.to_string();
            let replaced = std::mem::take(&mut data.children);
            for child in &replaced {
                if let Some(child) = arena.nodes.get_mut(child) {
                    child.parent = None;
                }
            }
            replaced
        };
        if !replaced.is_empty() {
            self.publish(MutationRecord::removed(node, replaced));
        }
        Ok(())
    }

    fn is_disabled(&self, node: NodeId) -> Result<bool, DocumentError> {
        Ok(self.arena.read().live(node)?.disabled)
    }

    fn set_disabled(&self, node: NodeId, disabled: bool) -> Result<(), DocumentError> {
        self.arena.write().live_mut(node)?.disabled = disabled;
        Ok(())
    }

    fn insert_after(&self, anchor: NodeId, spec: &ElementSpec) -> Result<NodeId, DocumentError> {
        let (parent, created) = {
            let mut arena = self.arena.write();
            arena.live(anchor)?;
            let parent = arena
                .node(anchor)?
                .parent
                .ok_or(DocumentError::Detached(anchor))?;
            let created = arena.build(spec, parent);
            let siblings = &mut arena.node_mut(parent)?.children;
            let index = siblings
                .iter()
                .position(|n| *n == anchor)
                .map(|i| i + 1)
                .unwrap_or(siblings.len());
            siblings.insert(index, created);
            (parent, created)
        };
        self.publish(MutationRecord::added(parent, vec![created]));
        Ok(created)
    }

    fn append_child(&self, parent: NodeId, spec: &ElementSpec) -> Result<NodeId, DocumentError> {
        let created = {
            let mut arena = self.arena.write();
            arena.live(parent)?;
            let created = arena.build(spec, parent);
            arena.node_mut(parent)?.children.push(created);
            created
        };
        self.publish(MutationRecord::added(parent, vec![created]));
        Ok(created)
    }

    fn remove(&self, node: NodeId) -> Result<(), DocumentError> {
        let parent = {
            let mut arena = self.arena.write();
            arena.live(node)?;
            let parent = arena
                .node(node)?
                .parent
                .ok_or(DocumentError::Detached(node))?;
            arena.node_mut(parent)?.children.retain(|c| *c != node);
            arena.node_mut(node)?.parent = None;
            parent
        };
        self.publish(MutationRecord::removed(parent, vec![node]));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<MutationRecord> {
        self.mutations.subscribe()
    }
}
