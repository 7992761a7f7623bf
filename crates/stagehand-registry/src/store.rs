use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use stagehand_types::{Key, TaskId, TaskKind};

use crate::cache::LocalCache;
use crate::link::{ClearHook, CompleteHook, Destructor, Link};

/// Replacement-chain depth at which forwarding stops and bridges reject
/// instead. Bounds hook growth under rapid replacement storms.
pub const FORWARD_CAP: usize = 25;

/// Selects the group scope(s) a clear applies to.
///
/// Patterns match named groups only; unique keys are reachable solely by
/// exact value, which is what makes them safe as generated scopes.
#[derive(Clone, Debug)]
pub enum GroupSelector {
    Named(Key),
    Pattern(Regex),
}

impl From<Key> for GroupSelector {
    fn from(key: Key) -> Self {
        Self::Named(key)
    }
}

impl From<&str> for GroupSelector {
    fn from(name: &str) -> Self {
        Self::Named(Key::from(name))
    }
}

impl From<Regex> for GroupSelector {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

/// Targets a clear call: any combination of id, label, and group scope.
///
/// Empty selector = sweep the root scope. An id given alongside a label
/// must agree with the label's live holder, or the clear is a no-op; this
/// guards against clearing a successor through a stale id.
#[derive(Clone, Debug, Default)]
pub struct Selector {
    pub id: Option<TaskId>,
    pub label: Option<Key>,
    pub group: Option<GroupSelector>,
    pub reason: Option<String>,
}

impl Selector {
    pub fn label(label: impl Into<Key>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn group(group: impl Into<GroupSelector>) -> Self {
        Self {
            group: Some(group.into()),
            ..Self::default()
        }
    }

    pub fn in_group(mut self, group: impl Into<GroupSelector>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl From<TaskId> for Selector {
    fn from(id: TaskId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

struct KindStore<V> {
    root: LocalCache<V>,
    groups: BTreeMap<Key, LocalCache<V>>,
}

impl<V> Default for KindStore<V> {
    fn default() -> Self {
        Self {
            root: LocalCache::default(),
            groups: BTreeMap::new(),
        }
    }
}

/// The canonical store of live task records: `kind → {root, groups}`.
///
/// The registry is pure bookkeeping. It never runs hooks or destructors;
/// every mutating operation returns the removed links and the caller fires
/// their hooks with no registry borrow outstanding.
pub struct Registry<V> {
    kinds: HashMap<TaskKind, KindStore<V>>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, kind: TaskKind, group: Option<&Key>) -> Option<&LocalCache<V>> {
        let store = self.kinds.get(&kind)?;
        match group {
            None => Some(&store.root),
            Some(key) => store.groups.get(key),
        }
    }

    fn scope_mut(&mut self, kind: TaskKind, group: Option<&Key>) -> Option<&mut LocalCache<V>> {
        let store = self.kinds.get_mut(&kind)?;
        match group {
            None => Some(&mut store.root),
            Some(key) => store.groups.get_mut(key),
        }
    }

    fn scope_entry(&mut self, kind: TaskKind, group: Option<&Key>) -> &mut LocalCache<V> {
        let store = self.kinds.entry(kind).or_default();
        match group {
            None => &mut store.root,
            Some(key) => store.groups.entry(key.clone()).or_default(),
        }
    }

    /// O(1): the live holder of `(kind, group, label)`, if any.
    pub fn live_for_label(
        &self,
        kind: TaskKind,
        group: Option<&Key>,
        label: &Key,
    ) -> Option<TaskId> {
        self.scope(kind, group)?.live_for_label(label)
    }

    pub fn is_live(&self, kind: TaskKind, group: Option<&Key>, id: TaskId) -> bool {
        self.scope(kind, group)
            .is_some_and(|cache| cache.get(id).is_some())
    }

    /// Install a link, displacing any prior holder of its label.
    ///
    /// The displaced link is removed from the maps in the same step the
    /// successor takes the label over, so label uniqueness never has a
    /// window. Its cascade clear is the caller's job, *after* install —
    /// re-entrant registration under the same label must see the new
    /// holder.
    pub fn install(&mut self, group: Option<&Key>, link: Link<V>) -> Option<Link<V>> {
        let cache = self.scope_entry(link.kind, group);
        let displaced = link
            .label
            .as_ref()
            .and_then(|label| cache.live_for_label(label))
            .and_then(|prior| cache.remove(prior));
        cache.insert(link);
        displaced
    }

    /// Remove a link for natural completion or a targeted clear.
    ///
    /// The label is nulled in the same step. Single-shot wrappers call this
    /// *before* running the payload, so a same-label re-registration from
    /// inside the callback sees an empty slot.
    pub fn take(&mut self, kind: TaskKind, group: Option<&Key>, id: TaskId) -> Option<Link<V>> {
        let link = self.scope_mut(kind, group)?.remove(id);
        self.prune(kind, group);
        link
    }

    /// Locate and remove a link by id across root and every group.
    ///
    /// Listener links live in per-event groups, so clearing one by bare id
    /// has to search all scopes under the kind.
    pub fn take_anywhere(&mut self, kind: TaskKind, id: TaskId) -> Option<(Option<Key>, Link<V>)> {
        if let Some(link) = self.scope_mut(kind, None).and_then(|cache| cache.remove(id)) {
            return Some((None, link));
        }
        let store = self.kinds.get_mut(&kind)?;
        let owner = store
            .groups
            .iter()
            .find(|(_, cache)| cache.get(id).is_some())
            .map(|(key, _)| key.clone())?;
        let link = store.groups.get_mut(&owner)?.remove(id)?;
        self.prune(kind, Some(&owner));
        Some((Some(owner), link))
    }

    /// Append hooks to a live link: `Share` joins and bridge attaches.
    /// Returns false if the link is already gone.
    pub fn adopt_hooks(
        &mut self,
        kind: TaskKind,
        group: Option<&Key>,
        id: TaskId,
        complete: Vec<CompleteHook<V>>,
        clear: Vec<ClearHook>,
    ) -> bool {
        match self.scope_mut(kind, group).and_then(|cache| cache.get_mut(id)) {
            Some(link) => {
                link.adopt(complete, clear);
                true
            }
            None => false,
        }
    }

    /// Install the destructor after the primitive has been started.
    ///
    /// Hands the destructor back if the link vanished in the meantime (a
    /// clear raced the start); the caller must run it, since the clear
    /// found nothing to destroy.
    pub fn set_destructor(
        &mut self,
        kind: TaskKind,
        group: Option<&Key>,
        id: TaskId,
        destructor: Destructor,
    ) -> Result<(), Destructor> {
        match self.scope_mut(kind, group).and_then(|cache| cache.get_mut(id)) {
            Some(link) => {
                link.set_destructor(destructor);
                Ok(())
            }
            None => Err(destructor),
        }
    }

    /// Forward a replaced link's hooks onto its live successor.
    ///
    /// `depth` is the chain length behind the replaced link, successor
    /// included. Hands the link back if the successor is already gone; the
    /// caller then falls back to firing its hooks as a plain cancellation.
    pub fn absorb(
        &mut self,
        kind: TaskKind,
        group: Option<&Key>,
        successor: TaskId,
        mut from: Link<V>,
        depth: usize,
    ) -> Result<(), Link<V>> {
        match self
            .scope_mut(kind, group)
            .and_then(|cache| cache.get_mut(successor))
        {
            Some(succ) => {
                succ.absorb_hooks(&mut from, depth);
                Ok(())
            }
            None => Err(from),
        }
    }

    /// Resolve and remove everything a selector targets within one kind.
    ///
    /// Scope resolution: no group → root; named group → that cache; pattern
    /// → every named group matching the regex. Within a scope: label-only
    /// resolves through the index (no live holder → no-op); id + label that
    /// disagree → no-op; neither id nor label → sweep the scope's
    /// insertion-order snapshot.
    pub fn resolve_clear(
        &mut self,
        kind: TaskKind,
        selector: &Selector,
    ) -> Vec<(Option<Key>, Link<V>)> {
        let scopes: Vec<Option<Key>> = match &selector.group {
            None => vec![None],
            Some(GroupSelector::Named(key)) => vec![Some(key.clone())],
            Some(GroupSelector::Pattern(pattern)) => self
                .matching_groups(kind, pattern)
                .into_iter()
                .map(Some)
                .collect(),
        };

        let mut removed = Vec::new();
        for scope in scopes {
            let Some(cache) = self.scope_mut(kind, scope.as_ref()) else {
                continue;
            };
            if let Some(label) = &selector.label {
                let Some(live) = cache.live_for_label(label) else {
                    continue;
                };
                if selector.id.is_some_and(|id| id != live) {
                    // Stale id: the label moved on to a successor.
                    continue;
                }
                if let Some(link) = cache.remove(live) {
                    removed.push((scope.clone(), link));
                }
            } else if let Some(id) = selector.id {
                if let Some(link) = cache.remove(id) {
                    removed.push((scope.clone(), link));
                }
            } else {
                for id in cache.ids() {
                    if let Some(link) = cache.remove(id) {
                        removed.push((scope.clone(), link));
                    }
                }
            }
            self.prune(kind, scope.as_ref());
        }
        removed
    }

    /// Remove every link under a kind: root first, then groups in key order.
    pub fn drain_kind(&mut self, kind: TaskKind) -> Vec<(Option<Key>, Link<V>)> {
        let Some(store) = self.kinds.get_mut(&kind) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        for id in store.root.ids() {
            if let Some(link) = store.root.remove(id) {
                removed.push((None, link));
            }
        }
        let group_keys: Vec<Key> = store.groups.keys().cloned().collect();
        for key in group_keys {
            if let Some(cache) = store.groups.get_mut(&key) {
                for id in cache.ids() {
                    if let Some(link) = cache.remove(id) {
                        removed.push((Some(key.clone()), link));
                    }
                }
            }
            store.groups.remove(&key);
        }
        removed
    }

    /// Named groups under a kind whose name matches the pattern.
    pub fn matching_groups(&self, kind: TaskKind, pattern: &Regex) -> Vec<Key> {
        let Some(store) = self.kinds.get(&kind) else {
            return Vec::new();
        };
        store
            .groups
            .keys()
            .filter(|key| key.name().is_some_and(|name| pattern.is_match(name)))
            .cloned()
            .collect()
    }

    /// Total live links under a kind, across root and all groups.
    pub fn live_count(&self, kind: TaskKind) -> usize {
        let Some(store) = self.kinds.get(&kind) else {
            return 0;
        };
        store.root.len() + store.groups.values().map(LocalCache::len).sum::<usize>()
    }

    pub(crate) fn stores(
        &self,
    ) -> impl Iterator<Item = (TaskKind, &LocalCache<V>, &BTreeMap<Key, LocalCache<V>>)> {
        self.kinds
            .iter()
            .map(|(kind, store)| (*kind, &store.root, &store.groups))
    }

    /// Drop an emptied group cache so stale scopes do not accumulate.
    fn prune(&mut self, kind: TaskKind, group: Option<&Key>) {
        if let (Some(key), Some(store)) = (group, self.kinds.get_mut(&kind)) {
            if store.groups.get(key).is_some_and(LocalCache::is_empty) {
                store.groups.remove(key);
            }
        }
    }
}
