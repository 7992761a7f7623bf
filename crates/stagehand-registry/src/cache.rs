use std::collections::{BTreeMap, HashMap};

use stagehand_types::{Key, TaskId};

use crate::link::Link;

/// One scope's worth of live tasks: the label index plus the links
/// themselves.
///
/// Two invariants hold between the maps:
/// - every `labels` entry points at a live `links` entry;
/// - a link leaves `links` only through [`remove`](Self::remove), which
///   nulls its label in the same step.
///
/// `links` is keyed by `TaskId`, and ids are allocated monotonically, so
/// map order is insertion order. Bulk iteration snapshots that order;
/// mutations during the sweep do not affect the snapshot.
pub struct LocalCache<V> {
    labels: HashMap<Key, TaskId>,
    links: BTreeMap<TaskId, Link<V>>,
}

impl<V> Default for LocalCache<V> {
    fn default() -> Self {
        Self {
            labels: HashMap::new(),
            links: BTreeMap::new(),
        }
    }
}

impl<V> LocalCache<V> {
    /// O(1): is there a live task under this label?
    pub fn live_for_label(&self, label: &Key) -> Option<TaskId> {
        self.labels.get(label).copied()
    }

    /// Install a link, indexing its label if it has one.
    ///
    /// The caller displaces any prior label holder first; installing over
    /// an occupied label is a bookkeeping bug.
    pub fn insert(&mut self, link: Link<V>) {
        if let Some(label) = &link.label {
            debug_assert!(
                !self.labels.contains_key(label),
                "label '{label}' still occupied at insert"
            );
            self.labels.insert(label.clone(), link.id);
        }
        self.links.insert(link.id, link);
    }

    /// Remove a link, nulling its label in the same step.
    pub fn remove(&mut self, id: TaskId) -> Option<Link<V>> {
        let link = self.links.remove(&id)?;
        if let Some(label) = &link.label {
            // Only drop the index entry if it still points at this link;
            // a successor may already own the label.
            if self.labels.get(label) == Some(&id) {
                self.labels.remove(label);
            }
        }
        Some(link)
    }

    pub fn get(&self, id: TaskId) -> Option<&Link<V>> {
        self.links.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Link<V>> {
        self.links.get_mut(&id)
    }

    /// Snapshot of live ids in insertion order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.links.keys().copied().collect()
    }

    /// Live labels, for diagnostics.
    pub fn labels(&self) -> impl Iterator<Item = &Key> {
        self.labels.keys()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
