use std::sync::{Arc, Mutex, RwLock, Weak};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::broadcast::{Broadcast, ListenerGuard, Ref};
use crate::object::{Observable, PublishedParent};

/// Forwarding listeners rebuilt on every wholesale value replacement, plus the
/// closure that knows how to build them (present only when the wrapped value
/// type opted in as observable).
struct Forwarding<T> {
    guards: [Option<ListenerGuard<()>>; 2],
    rewire: Option<Rewire<T>>,
}

type Rewire<T> = Box<dyn Fn(&T, &Weak<Inner<T>>) -> [ListenerGuard<()>; 2] + Send + Sync>;

struct Inner<T> {
    value: RwLock<T>,
    // bound once, from outside, by the owning object's wiring pass
    parent_will: Mutex<Option<Broadcast<()>>>,
    parent_did: Mutex<Option<Broadcast<()>>>,
    // direct value subscribers get the new value, not just a pulse
    value_will: Broadcast<T>,
    value_did: Broadcast<T>,
    forwarding: Mutex<Forwarding<T>>,
}

/// A reactive field: a value that reports every replacement to its owning
/// object's will/did-change publishers and to its own value-payload streams.
///
/// The field never discovers its parent publishers itself; the owning object
/// binds them exactly once through [`PublishedParent`] during publisher
/// resolution (see [`ObjectIdentity`](crate::ObjectIdentity)).
///
/// Cloning shares the field, like the channels it owns.
///
/// For every [`set`](Self::set), in order:
/// 1. the field's own pre-change stream fires with the new value,
/// 2. the parent will-change channel fires (if bound) while the old value is still in place,
/// 3. the new value is stored,
/// 4. the field's own post-change stream fires with the new value,
/// 5. the parent did-change channel fires (if bound),
/// 6. for observable values, the forwarding subscriptions are torn down and
///    rebuilt against the new value, so they track exactly the current value.
pub struct Published<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Published<T> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T> Published<T> {
    /// Wrap a plain value
    pub fn new(value: T) -> Self { Self::from_parts(value, None) }

    fn from_parts(value: T, rewire: Option<Rewire<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                parent_will: Mutex::new(None),
                parent_did: Mutex::new(None),
                value_will: Broadcast::new(),
                value_did: Broadcast::new(),
                forwarding: Mutex::new(Forwarding { guards: [None, None], rewire }),
            }),
        }
    }

    /// Call `f` with a borrow of the current value
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.read().unwrap();
        f(&value)
    }

    /// Listen-only stream firing with the new value immediately before it is stored.
    /// Does not replay the present value on subscribe.
    pub fn value_will_change(&self) -> Ref<'_, T> { self.inner.value_will.reference() }

    /// Listen-only stream firing with the new value immediately after it is stored
    pub fn value_did_change(&self) -> Ref<'_, T> { self.inner.value_did.reference() }

    /// Tear down the forwarding subscriptions and rebuild them against the
    /// current value. A no-op for fields wrapping non-observable values.
    fn rewire(&self) {
        let mut guard = self.inner.forwarding.lock().unwrap();
        let forwarding = &mut *guard;
        let stale = [forwarding.guards[0].take(), forwarding.guards[1].take()];
        if let Some(rewire) = &forwarding.rewire {
            let weak = Arc::downgrade(&self.inner);
            let value = self.inner.value.read().unwrap();
            let [will_guard, did_guard] = rewire(&value, &weak);
            drop(value);
            forwarding.guards = [Some(will_guard), Some(did_guard)];
        }
        drop(guard);
        drop(stale);
    }
}

impl<T: Clone> Published<T> {
    /// A clone of the current value
    pub fn get(&self) -> T { self.inner.value.read().unwrap().clone() }

    /// Replace the value, fanning out notifications synchronously in the
    /// documented order. No lock is held while listeners run.
    pub fn set(&self, value: T) {
        self.inner.value_will.send(value.clone());
        let parent = self.inner.parent_will.lock().unwrap().clone();
        if let Some(parent) = parent {
            parent.send(());
        }

        *self.inner.value.write().unwrap() = value.clone();

        self.inner.value_did.send(value);
        let parent = self.inner.parent_did.lock().unwrap().clone();
        if let Some(parent) = parent {
            parent.send(());
        }

        self.rewire();
    }
}

impl<T> Published<T>
where T: Observable + Send + Sync + 'static
{
    /// Wrap a value that is itself observable.
    ///
    /// The field subscribes to the value's own will/did-change channels and
    /// re-emits each fire on the field's *parent* publishers (the value-payload
    /// streams are reserved for wholesale replacements). The subscriptions are
    /// rebuilt whenever the value is replaced, and hold only a weak handle to
    /// the field's interior, so a dropped field never lingers through its child.
    pub fn observing(value: T) -> Self {
        let published = Self::from_parts(
            value,
            Some(Box::new(|value: &T, interior: &Weak<Inner<T>>| {
                let weak = interior.clone();
                let will_guard = value.will_change().listen(move |_| {
                    if let Some(inner) = weak.upgrade() {
                        let parent = inner.parent_will.lock().unwrap().clone();
                        if let Some(parent) = parent {
                            parent.send(());
                        }
                    }
                });
                let weak = interior.clone();
                let did_guard = value.did_change().listen(move |_| {
                    if let Some(inner) = weak.upgrade() {
                        let parent = inner.parent_did.lock().unwrap().clone();
                        if let Some(parent) = parent {
                            parent.send(());
                        }
                    }
                });
                [will_guard, did_guard]
            })),
        );
        published.rewire();
        published
    }
}

impl<T> PublishedParent for Published<T> {
    fn parent_will_change(&self) -> Option<Broadcast<()>> { self.inner.parent_will.lock().unwrap().clone() }

    fn parent_did_change(&self) -> Option<Broadcast<()>> { self.inner.parent_did.lock().unwrap().clone() }

    fn bind_will_change(&self, channel: &Broadcast<()>) -> Broadcast<()> {
        let mut parent = self.inner.parent_will.lock().unwrap();
        match &*parent {
            Some(existing) => existing.clone(),
            None => {
                *parent = Some(channel.clone());
                channel.clone()
            }
        }
    }

    fn bind_did_change(&self, channel: &Broadcast<()>) -> Broadcast<()> {
        let mut parent = self.inner.parent_did.lock().unwrap();
        match &*parent {
            Some(existing) => existing.clone(),
            None => {
                *parent = Some(channel.clone());
                channel.clone()
            }
        }
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self { Self::new(T::default()) }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Published<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with(|value| f.debug_tuple("Published").field(value).finish())
    }
}

// Serialization forwards to the plain value; channel and subscription state is
// never part of the persisted form.

impl<T: Serialize> Serialize for Published<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { self.with(|value| value.serialize(serializer)) }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Published<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> { T::deserialize(deserializer).map(Self::new) }
}

/// Serde adapter for fields whose value type is itself observable: decoding
/// re-establishes the forwarding subscriptions immediately, as if the field had
/// been built with [`Published::observing`].
///
/// ```ignore
/// #[serde(with = "observable_object::published::observing_serde")]
/// inner: Published<ObservableVec<Item>>,
/// ```
pub mod observing_serde {
    use super::*;

    pub fn serialize<T, S>(field: &Published<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        field.serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Published<T>, D::Error>
    where
        T: Deserialize<'de> + Observable + Send + Sync + 'static,
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Published::observing)
    }
}
