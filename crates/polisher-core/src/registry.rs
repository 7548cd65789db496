//! Surface registry.
//!
//! Tracks which host nodes have been instrumented, the identity assigned to
//! each, and the single-slot pre-rewrite snapshot per surface. Replaces marker
//! attributes on host nodes, which the host is free to strip on re-render.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use polisher_protocols::{HostDocument, NodeId, SurfaceId, UsageContext};

/// An instrumented editable surface.
///
/// Text and the enabled flag are not cached here; they are read live from
/// the host document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRecord {
    pub id: SurfaceId,
    pub node: NodeId,
    pub context: UsageContext,
    pub discovered_at: DateTime<Utc>,
    /// The affordance inserted next to the surface, once there is one.
    pub affordance: Option<NodeId>,
}

impl SurfaceRecord {
    fn new(node: NodeId, context: UsageContext) -> Self {
        Self {
            id: SurfaceId::new(),
            node,
            context,
            discovered_at: Utc::now(),
            affordance: None,
        }
    }
}

/// Registry of instrumented surfaces.
///
/// All operations are atomic per key and never fail; absence is `None`.
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    by_node: DashMap<NodeId, SurfaceId>,
    by_affordance: DashMap<NodeId, SurfaceId>,
    surfaces: DashMap<SurfaceId, SurfaceRecord>,
    snapshots: DashMap<SurfaceId, String>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_instrumented(&self, node: NodeId) -> bool {
        self.by_node.contains_key(&node)
    }

    /// Mark `node` as instrumented, returning its identity.
    ///
    /// Idempotent: repeat calls return the identity assigned first, and the
    /// original context is kept.
    pub fn mark_instrumented(&self, node: NodeId, context: UsageContext) -> SurfaceId {
        match self.by_node.entry(node) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let record = SurfaceRecord::new(node, context);
                let id = record.id;
                self.surfaces.insert(id, record);
                entry.insert(id);
                id
            }
        }
    }

    /// Atomically mark `node` as instrumented.
    ///
    /// Returns the new record, or `None` if another caller got there first.
    pub fn claim(&self, node: NodeId, context: UsageContext) -> Option<SurfaceRecord> {
        match self.by_node.entry(node) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let record = SurfaceRecord::new(node, context);
                self.surfaces.insert(record.id, record.clone());
                entry.insert(record.id);
                Some(record)
            }
        }
    }

    pub fn get(&self, id: SurfaceId) -> Option<SurfaceRecord> {
        self.surfaces.get(&id).map(|r| r.clone())
    }

    pub fn surface_for_node(&self, node: NodeId) -> Option<SurfaceId> {
        self.by_node.get(&node).map(|id| *id)
    }

    /// The surface whose affordance is `node`.
    pub fn surface_for_affordance(&self, node: NodeId) -> Option<SurfaceId> {
        self.by_affordance.get(&node).map(|id| *id)
    }

    pub fn set_affordance(&self, id: SurfaceId, affordance: NodeId) {
        if let Some(mut record) = self.surfaces.get_mut(&id) {
            if let Some(previous) = record.affordance.replace(affordance) {
                self.by_affordance.remove(&previous);
            }
            self.by_affordance.insert(affordance, id);
        }
    }

    /// Overwrite the snapshot slot for `id`.
    pub fn record_snapshot(&self, id: SurfaceId, text: impl Into<String>) {
        self.snapshots.insert(id, text.into());
    }

    pub fn snapshot(&self, id: SurfaceId) -> Option<String> {
        self.snapshots.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn ids(&self) -> Vec<SurfaceId> {
        self.surfaces.iter().map(|r| *r.key()).collect()
    }

    /// Evict every surface whose node is no longer attached to `doc`.
    ///
    /// Returns the evicted identities.
    pub fn prune_detached(&self, doc: &dyn HostDocument) -> Vec<SurfaceId> {
        let detached: Vec<SurfaceRecord> = self
            .surfaces
            .iter()
            .filter(|r| !doc.is_connected(r.node))
            .map(|r| r.clone())
            .collect();

        for record in &detached {
            self.surfaces.remove(&record.id);
            self.snapshots.remove(&record.id);
            self.by_node.remove_if(&record.node, |_, id| *id == record.id);
            if let Some(affordance) = record.affordance {
                self.by_affordance.remove(&affordance);
            }
        }

        if !detached.is_empty() {
            debug!(count = detached.len(), remaining = self.len(), "Pruned detached surfaces");
        }
        detached.into_iter().map(|r| r.id).collect()
    }
}
