use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::broadcast::Broadcast;

/// A stable, process-unique identity token for one live observable entity.
/// Ids come from a monotonically increasing counter and are never reused.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate the next process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// The unit of change notification: a "will change" channel fired immediately
/// before a mutation and a "did change" channel fired immediately after.
/// Cloning shares both underlying channels.
#[derive(Debug, Clone, Default)]
pub struct PublisherPair {
    pub will_change: Broadcast<()>,
    pub did_change: Broadcast<()>,
}

impl PublisherPair {
    pub fn new() -> Self { Self::default() }
}

/// Process-wide cache of publisher pairs keyed by object identity.
///
/// Objects with no reactive fields of their own resolve their will/did-change
/// publishers here, so that a plain object costs nothing until somebody actually
/// observes it. A single mutex guards the map; it serializes `get_or_create`
/// calls for the same identity (no duplicate-allocation race) and is never held
/// while listener callbacks run.
pub struct PublisherRegistry {
    pairs: Mutex<HashMap<ObjectId, PublisherPair>>,
}

static GLOBAL: OnceLock<PublisherRegistry> = OnceLock::new();

impl PublisherRegistry {
    /// The process-wide registry
    pub fn global() -> &'static Self { GLOBAL.get_or_init(|| PublisherRegistry { pairs: Mutex::new(HashMap::new()) }) }

    /// Returns the cached pair for `id`, allocating and caching a fresh one on
    /// first access. Every caller for the same identity gets handles to the same
    /// underlying channels.
    pub fn get_or_create(&self, id: ObjectId) -> PublisherPair {
        let mut pairs = self.pairs.lock().unwrap();
        pairs
            .entry(id)
            .or_insert_with(|| {
                tracing::trace!(%id, "registry pair created");
                PublisherPair::new()
            })
            .clone()
    }

    /// Removes the cached entry for `id`. A no-op when absent, including on
    /// double release. Handles already cloned out of the registry survive; only
    /// the registry's own reference is dropped.
    pub fn release(&self, id: ObjectId) {
        if self.pairs.lock().unwrap().remove(&id).is_some() {
            tracing::trace!(%id, "registry pair released");
        }
    }

    /// True if the registry currently holds a pair for `id`
    pub fn contains(&self, id: ObjectId) -> bool { self.pairs.lock().unwrap().contains_key(&id) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_pair() {
        let registry = PublisherRegistry::global();
        let id = ObjectId::next();

        let first = registry.get_or_create(id);
        let second = registry.get_or_create(id);
        assert!(first.will_change.same_channel(&second.will_change));
        assert!(first.did_change.same_channel(&second.did_change));

        registry.release(id);
    }

    #[test]
    fn distinct_identities_never_share() {
        let registry = PublisherRegistry::global();
        let a = registry.get_or_create(ObjectId::next());
        let b = registry.get_or_create(ObjectId::next());
        assert!(!a.will_change.same_channel(&b.will_change));
    }

    #[test]
    fn release_is_a_safe_noop_when_absent() {
        let registry = PublisherRegistry::global();
        let id = ObjectId::next();
        registry.release(id); // never created
        registry.release(id); // still absent

        let pair = registry.get_or_create(id);
        registry.release(id);
        registry.release(id); // double release
        assert!(!registry.contains(id));

        // the pair itself survives release; only the registry entry is gone
        pair.will_change.send(());
    }

    #[test]
    fn release_drops_the_stale_pair() {
        let registry = PublisherRegistry::global();
        let id = ObjectId::next();
        let stale = registry.get_or_create(id);
        registry.release(id);

        let fresh = registry.get_or_create(id);
        assert!(!stale.will_change.same_channel(&fresh.will_change));
        registry.release(id);
    }

    #[test]
    fn concurrent_get_or_create_allocates_once() {
        let registry = PublisherRegistry::global();
        let id = ObjectId::next();

        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || PublisherRegistry::global().get_or_create(id)))
            .collect();
        let pairs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for pair in &pairs[1..] {
            assert!(pair.will_change.same_channel(&pairs[0].will_change));
        }
        registry.release(id);
    }
}
