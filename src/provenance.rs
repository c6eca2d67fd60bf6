//! Bookkeeping that ties host nodes to the manifest resources they came from.
//!
//! The tracker is owned by a single session and mutated from one thread only.
//! A host that mutates its scene concurrently has to wrap the whole session in
//! one lock; the tracker itself does no synchronization.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::manifest::SceneNode;

#[derive(Debug, Clone)]
pub struct ProvenanceRecord<Id> {
    pub resource_id: String,
    /// Set once the host node's transform, parent or content was edited
    /// after import. Cleared only by importing the resource again.
    pub dirty: bool,
    /// The node as it was imported, with every unknown key it carried.
    pub cached: SceneNode,
    /// Host parent the node was attached to at import time.
    pub host_parent: Option<Id>,
}

#[derive(Debug, Clone)]
pub struct ProvenanceTracker<Id> {
    records: HashMap<Id, ProvenanceRecord<Id>>,
    by_resource: HashMap<String, Id>,
}

impl<Id> Default for ProvenanceTracker<Id> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            by_resource: HashMap::new(),
        }
    }
}

impl<Id> ProvenanceTracker<Id>
where
    Id: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `host_id` with the resource `cached` was parsed from. A
    /// previous link of either side is replaced. The new record is clean.
    pub fn link(&mut self, host_id: Id, cached: SceneNode, host_parent: Option<Id>) {
        if let Some(previous) = self.by_resource.get(&cached.id).copied() {
            if previous != host_id {
                log::debug!("{} moves from host node {previous:?} to {host_id:?}", cached.id);
                self.records.remove(&previous);
            }
        }
        if let Some(old) = self.records.get(&host_id) {
            if old.resource_id != cached.id {
                self.by_resource.remove(&old.resource_id);
            }
        }

        let resource_id = cached.id.clone();
        self.by_resource.insert(resource_id.clone(), host_id);
        self.records.insert(
            host_id,
            ProvenanceRecord {
                resource_id,
                dirty: false,
                cached,
                host_parent,
            },
        );
    }

    pub fn lookup(&self, host_id: Id) -> Option<&str> {
        self.records.get(&host_id).map(|record| record.resource_id.as_str())
    }

    pub fn record(&self, host_id: Id) -> Option<&ProvenanceRecord<Id>> {
        self.records.get(&host_id)
    }

    /// Host node currently linked to `resource_id`.
    pub fn host_for(&self, resource_id: &str) -> Option<Id> {
        self.by_resource.get(resource_id).copied()
    }

    /// Returns false when `host_id` is not tracked.
    pub fn mark_dirty(&mut self, host_id: Id) -> bool {
        match self.records.get_mut(&host_id) {
            Some(record) => {
                if !record.dirty {
                    log::debug!("{} marked dirty", record.resource_id);
                }
                record.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn is_dirty(&self, host_id: Id) -> bool {
        self.records.get(&host_id).is_some_and(|record| record.dirty)
    }

    pub fn unlink(&mut self, host_id: Id) -> Option<ProvenanceRecord<Id>> {
        let record = self.records.remove(&host_id)?;
        if self.by_resource.get(&record.resource_id) == Some(&host_id) {
            self.by_resource.remove(&record.resource_id);
        }
        Some(record)
    }

    /// Drops every record whose host node fails `is_live`, returning the
    /// resource ids that were removed.
    pub fn retain_live(&mut self, mut is_live: impl FnMut(Id) -> bool) -> Vec<String> {
        let dead: Vec<Id> = self.records.keys().copied().filter(|&id| !is_live(id)).collect();

        let mut removed: Vec<String> = dead
            .into_iter()
            .filter_map(|id| self.unlink(id))
            .map(|record| record.resource_id)
            .collect();
        removed.sort();
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &ProvenanceRecord<Id>)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ModelContent, NodeContent, NodeExtras};
    use crate::math::Transform3D;

    fn node(id: &str) -> SceneNode {
        SceneNode {
            id: id.to_string(),
            label: None,
            motivation: Vec::new(),
            content: NodeContent::Model(ModelContent {
                id: "model.glb".to_string(),
                format: None,
            }),
            transform: Transform3D::IDENTITY,
            parent: None,
            extras: NodeExtras::default(),
        }
    }

    #[test]
    fn link_lookup_and_dirty() {
        let mut tracker = ProvenanceTracker::new();
        tracker.link(1u32, node("res:a"), None);

        assert_eq!(tracker.lookup(1), Some("res:a"));
        assert_eq!(tracker.host_for("res:a"), Some(1));
        assert!(!tracker.is_dirty(1));

        assert!(tracker.mark_dirty(1));
        assert!(tracker.is_dirty(1));
        assert!(!tracker.mark_dirty(2));
        assert_eq!(tracker.lookup(2), None);
    }

    #[test]
    fn relinking_resource_moves_the_record() {
        let mut tracker = ProvenanceTracker::new();
        tracker.link(1u32, node("res:a"), None);
        tracker.mark_dirty(1);
        tracker.link(2, node("res:a"), None);

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.lookup(1), None);
        assert_eq!(tracker.host_for("res:a"), Some(2));
        assert!(!tracker.is_dirty(2));
    }

    #[test]
    fn retain_live_removes_deleted_nodes() {
        let mut tracker = ProvenanceTracker::new();
        tracker.link(1u32, node("res:a"), None);
        tracker.link(2, node("res:b"), Some(1));
        tracker.link(3, node("res:c"), None);

        let removed = tracker.retain_live(|id| id == 2);

        assert_eq!(removed, vec!["res:a".to_string(), "res:c".to_string()]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.host_for("res:a"), None);
        assert_eq!(tracker.record(2).and_then(|record| record.host_parent), Some(1));
    }
}
