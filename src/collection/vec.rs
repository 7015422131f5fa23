use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::broadcast::Broadcast;
use crate::links::ChangeLinks;
use crate::object::{Observable, ObjectIdentity};
use crate::registry::{PublisherPair, PublisherRegistry};

struct VecInner<E> {
    identity: ObjectIdentity,
    elements: RwLock<Vec<E>>,
    links: ChangeLinks,
}

/// An observable sequence of observable elements.
///
/// The container fires its own will/did-change publishers around every
/// membership change, and re-emits every contained element's will/did-change
/// events as its own. Cloning shares the container.
///
/// All mutation goes through one full-resync path; there is no in-place
/// mutation that could leave an element linked after removal or unlinked after
/// insertion.
pub struct ObservableVec<E> {
    inner: Arc<VecInner<E>>,
}

impl<E> Clone for ObservableVec<E> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<E> Observable for ObservableVec<E> {
    fn will_change(&self) -> Broadcast<()> { self.inner.identity.will_change(&[]) }
    fn did_change(&self) -> Broadcast<()> { self.inner.identity.did_change(&[]) }
}

impl<E> Default for ObservableVec<E>
where E: Observable
{
    fn default() -> Self { Self::new() }
}

impl<E> ObservableVec<E>
where E: Observable
{
    pub fn new() -> Self {
        Self { inner: Arc::new(VecInner { identity: ObjectIdentity::new(), elements: RwLock::new(Vec::new()), links: ChangeLinks::new() }) }
    }

    /// Build a container from existing elements. Links them without firing
    /// change notifications: nothing can be subscribed yet.
    pub fn from_elements(elements: Vec<E>) -> Self {
        let vec = Self::new();
        let pair = vec.pair();
        let mut current = vec.inner.elements.write().unwrap();
        *current = elements;
        vec.relink(&current, &pair);
        drop(current);
        vec
    }

    fn pair(&self) -> PublisherPair { PublisherRegistry::global().get_or_create(self.inner.identity.id()) }

    fn relink(&self, elements: &[E], pair: &PublisherPair) {
        for element in elements {
            self.inner.links.link(element, &pair.will_change, &pair.did_change);
        }
    }

    /// The single mutation path: will-change, cancel every element
    /// subscription, apply, re-link every element, did-change.
    ///
    /// The elements write lock spans cancel, apply and relink, so concurrent
    /// mutations of a shared container serialize and the guard count stays at
    /// exactly twice the element count. None of the covered steps invoke
    /// listener callbacks; the will/did fires stay outside the lock, keeping
    /// re-entrant mutation deadlock-free.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<E>) -> R) -> R {
        let pair = self.pair();
        pair.will_change.send(());
        let result = {
            let mut elements = self.inner.elements.write().unwrap();
            self.inner.links.cancel_all();
            let result = f(&mut elements);
            self.relink(&elements, &pair);
            result
        };
        pair.did_change.send(());
        result
    }

    /// Replace the whole element list
    pub fn replace_all(&self, elements: Vec<E>) { self.mutate(|current| *current = elements) }

    /// Append an element
    pub fn push(&self, element: E) { self.mutate(|elements| elements.push(element)) }

    /// Insert an element at `index`. Panics if `index` is out of bounds.
    pub fn insert(&self, index: usize, element: E) { self.mutate(|elements| elements.insert(index, element)) }

    /// Remove and return the element at `index`. Panics if `index` is out of bounds.
    pub fn remove(&self, index: usize) -> E { self.mutate(|elements| elements.remove(index)) }

    /// Replace the element at `index`, returning the previous one.
    /// Panics if `index` is out of bounds.
    pub fn replace_at(&self, index: usize, element: E) -> E {
        self.mutate(|elements| std::mem::replace(&mut elements[index], element))
    }

    /// Remove every element
    pub fn clear(&self) { self.mutate(|elements| elements.clear()) }

    pub fn len(&self) -> usize { self.inner.elements.read().unwrap().len() }

    pub fn is_empty(&self) -> bool { self.inner.elements.read().unwrap().is_empty() }

    /// Call `f` with a borrow of the elements
    pub fn with<R>(&self, f: impl FnOnce(&[E]) -> R) -> R {
        let elements = self.inner.elements.read().unwrap();
        f(&elements)
    }

    /// Call `f` with a borrow of the element at `index`, if present
    pub fn get_with<R>(&self, index: usize, f: impl FnOnce(&E) -> R) -> Option<R> {
        let elements = self.inner.elements.read().unwrap();
        elements.get(index).map(f)
    }

    /// Number of live element subscriptions; always twice the element count
    pub fn subscription_count(&self) -> usize { self.inner.links.len() }
}

impl<E> ObservableVec<E>
where E: Observable + Clone
{
    /// A clone of the current elements
    pub fn to_vec(&self) -> Vec<E> { self.inner.elements.read().unwrap().clone() }
}

impl<E> std::fmt::Debug for ObservableVec<E>
where E: std::fmt::Debug
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let elements = self.inner.elements.read().unwrap();
        f.debug_list().entries(elements.iter()).finish()
    }
}

// Serializes as the plain element sequence; subscriptions are not persisted
// state. Decoding reconstructs the plain elements first, then performs a single
// bulk replacement to re-establish the wiring.

impl<E: Serialize> Serialize for ObservableVec<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let elements = self.inner.elements.read().unwrap();
        serializer.collect_seq(elements.iter())
    }
}

impl<'de, E> Deserialize<'de> for ObservableVec<E>
where E: Deserialize<'de> + Observable
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elements = Vec::<E>::deserialize(deserializer)?;
        let vec = ObservableVec::new();
        vec.replace_all(elements);
        Ok(vec)
    }
}
