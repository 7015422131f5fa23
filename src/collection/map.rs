use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::broadcast::Broadcast;
use crate::links::ChangeLinks;
use crate::object::{Observable, ObjectIdentity};
use crate::registry::{PublisherPair, PublisherRegistry};

struct MapInner<K, V> {
    identity: ObjectIdentity,
    entries: RwLock<HashMap<K, V>>,
    links: ChangeLinks,
}

/// An observable dictionary of observable values, keyed by plain keys.
///
/// Same discipline as [`ObservableVec`](crate::ObservableVec): the container
/// fires its own will/did-change publishers around every membership change,
/// re-emits every value's will/did-change events as its own, and funnels all
/// mutation through one full-resync path. Cloning shares the container.
pub struct ObservableMap<K, V> {
    inner: Arc<MapInner<K, V>>,
}

impl<K, V> Clone for ObservableMap<K, V> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<K, V> Observable for ObservableMap<K, V> {
    fn will_change(&self) -> Broadcast<()> { self.inner.identity.will_change(&[]) }
    fn did_change(&self) -> Broadcast<()> { self.inner.identity.did_change(&[]) }
}

impl<K, V> Default for ObservableMap<K, V>
where
    K: Eq + Hash,
    V: Observable,
{
    fn default() -> Self { Self::new() }
}

impl<K, V> ObservableMap<K, V>
where
    K: Eq + Hash,
    V: Observable,
{
    pub fn new() -> Self {
        Self { inner: Arc::new(MapInner { identity: ObjectIdentity::new(), entries: RwLock::new(HashMap::new()), links: ChangeLinks::new() }) }
    }

    /// Build a container from existing entries. Links them without firing
    /// change notifications: nothing can be subscribed yet.
    pub fn from_entries(entries: HashMap<K, V>) -> Self {
        let map = Self::new();
        let pair = map.pair();
        let mut current = map.inner.entries.write().unwrap();
        *current = entries;
        map.relink(&current, &pair);
        drop(current);
        map
    }

    fn pair(&self) -> PublisherPair { PublisherRegistry::global().get_or_create(self.inner.identity.id()) }

    fn relink(&self, entries: &HashMap<K, V>, pair: &PublisherPair) {
        for value in entries.values() {
            self.inner.links.link(value, &pair.will_change, &pair.did_change);
        }
    }

    /// The single mutation path; see [`ObservableVec`](crate::ObservableVec).
    /// The entries write lock spans cancel, apply and relink; the will/did
    /// fires stay outside the lock.
    fn mutate<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let pair = self.pair();
        pair.will_change.send(());
        let result = {
            let mut entries = self.inner.entries.write().unwrap();
            self.inner.links.cancel_all();
            let result = f(&mut entries);
            self.relink(&entries, &pair);
            result
        };
        pair.did_change.send(());
        result
    }

    /// Replace the whole entry set
    pub fn replace_all(&self, entries: HashMap<K, V>) { self.mutate(|current| *current = entries) }

    /// Insert or update a value, returning the previous value for the key
    pub fn insert(&self, key: K, value: V) -> Option<V> { self.mutate(|entries| entries.insert(key, value)) }

    /// Remove and return the value for `key`, if present
    pub fn remove(&self, key: &K) -> Option<V> { self.mutate(|entries| entries.remove(key)) }

    /// Remove every entry
    pub fn clear(&self) { self.mutate(|entries| entries.clear()) }

    pub fn len(&self) -> usize { self.inner.entries.read().unwrap().len() }

    pub fn is_empty(&self) -> bool { self.inner.entries.read().unwrap().is_empty() }

    pub fn contains_key(&self, key: &K) -> bool { self.inner.entries.read().unwrap().contains_key(key) }

    /// Call `f` with a borrow of the entries
    pub fn with<R>(&self, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        let entries = self.inner.entries.read().unwrap();
        f(&entries)
    }

    /// Call `f` with a borrow of the value for `key`, if present
    pub fn get_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let entries = self.inner.entries.read().unwrap();
        entries.get(key).map(f)
    }

    /// Number of live value subscriptions; always twice the entry count
    pub fn subscription_count(&self) -> usize { self.inner.links.len() }
}

impl<K, V> ObservableMap<K, V>
where K: Eq + Hash + Clone
{
    /// A clone of the current keys
    pub fn keys(&self) -> Vec<K> { self.inner.entries.read().unwrap().keys().cloned().collect() }
}

impl<K, V> std::fmt::Debug for ObservableMap<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.inner.entries.read().unwrap();
        f.debug_map().entries(entries.iter()).finish()
    }
}

impl<K, V> Serialize for ObservableMap<K, V>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.inner.entries.read().unwrap();
        serializer.collect_map(entries.iter())
    }
}

impl<'de, K, V> Deserialize<'de> for ObservableMap<K, V>
where
    K: Deserialize<'de> + Eq + Hash,
    V: Deserialize<'de> + Observable,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = HashMap::<K, V>::deserialize(deserializer)?;
        let map = ObservableMap::new();
        map.replace_all(entries);
        Ok(map)
    }
}
