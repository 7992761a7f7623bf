use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::LocalCache;
use crate::store::Registry;

/// One scope's summary: live count, label names, task ids in insertion
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub live: usize,
    pub labels: Vec<String>,
    pub tasks: Vec<String>,
}

/// One kind's summary: root scope plus named groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KindSnapshot {
    pub root: CacheSnapshot,
    pub groups: BTreeMap<String, CacheSnapshot>,
}

/// Serializable registry summary for log lines and snapshot tests.
///
/// Built by one pass over the live stores; kinds and groups are keyed by
/// display name, sorted, so output is stable across runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub kinds: BTreeMap<String, KindSnapshot>,
}

fn cache_snapshot<V>(cache: &LocalCache<V>) -> CacheSnapshot {
    let mut labels: Vec<String> = cache.labels().map(ToString::to_string).collect();
    labels.sort();
    CacheSnapshot {
        live: cache.len(),
        labels,
        tasks: cache.ids().iter().map(ToString::to_string).collect(),
    }
}

impl<V> Registry<V> {
    /// Summarize every live scope. Kinds with no live links are omitted.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut kinds = BTreeMap::new();
        for (kind, root, groups) in self.stores() {
            if root.is_empty() && groups.values().all(LocalCache::is_empty) {
                continue;
            }
            let snapshot = KindSnapshot {
                root: cache_snapshot(root),
                groups: groups
                    .iter()
                    .filter(|(_, cache)| !cache.is_empty())
                    .map(|(key, cache)| (key.to_string(), cache_snapshot(cache)))
                    .collect(),
            };
            kinds.insert(kind.name().to_owned(), snapshot);
        }
        RegistrySnapshot { kinds }
    }
}
