use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A unique identifier for a broadcast channel that cannot be forged or extracted.
/// Derived from the shared allocation, so clones of the same channel report the same id.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BroadcastId(usize);

impl From<BroadcastId> for usize {
    fn from(id: BroadcastId) -> usize { id.0 }
}
impl std::fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// A listener that is called when broadcast notifications are sent.
/// Supports both payload listeners (receive the value) and notify-only listeners.
#[derive(Clone)]
pub enum BroadcastListener<T = ()> {
    /// Receives the broadcast value
    Payload(Arc<dyn Fn(T) + Send + Sync + 'static>),
    /// Only receives the notification pulse, ignores the value
    NotifyOnly(Arc<dyn Fn() + Send + Sync + 'static>),
}

/// Trait for types that can be converted into broadcast listeners.
pub trait IntoBroadcastListener<T> {
    fn into_broadcast_listener(self) -> BroadcastListener<T>;
}

/// A fan-out notification channel. Cloning shares the same channel: every clone
/// sends to, and is identified as, the same underlying allocation. This referential
/// sharing is what lets separately-obtained handles observe the same notifications.
pub struct Broadcast<T = ()>(Arc<Inner<T>>);

struct Entry<T> {
    // flipped before the table entry is removed; checked immediately before invocation
    // so an in-flight send skips listeners whose guard has already been dropped
    cancelled: AtomicBool,
    listener: BroadcastListener<T>,
}

struct Inner<T> {
    entries: Mutex<BTreeMap<usize, Arc<Entry<T>>>>,
    next_id: AtomicUsize,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").field("listeners", &self.0.entries.lock().unwrap().len()).finish()
    }
}

/// A listen-only reference to a broadcast channel
pub struct Ref<'a, T>(&'a Broadcast<T>);

/// A subscription handle. Dropping it unsubscribes: the listener is marked
/// cancelled first and removed from the table second, so a send that already
/// snapshotted the table still skips it.
pub struct ListenerGuard<T = ()> {
    inner: Weak<Inner<T>>,
    entry: Weak<Entry<T>>,
    id: usize,
}

impl<T> Default for Broadcast<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Broadcast<T> {
    /// Creates a new broadcast channel with no listeners
    pub fn new() -> Self { Self(Arc::new(Inner { entries: Mutex::new(BTreeMap::new()), next_id: AtomicUsize::new(0) })) }

    /// Get the unique identifier for this channel
    pub fn id(&self) -> BroadcastId { BroadcastId(Arc::as_ptr(&self.0) as usize) }

    /// True if two handles refer to the same underlying channel
    pub fn same_channel(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }

    /// Number of currently subscribed listeners
    pub fn subscriber_count(&self) -> usize { self.0.entries.lock().unwrap().len() }

    /// Subscribe a listener to this channel
    pub fn listen<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoBroadcastListener<T> {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry { cancelled: AtomicBool::new(false), listener: listener.into_broadcast_listener() });
        let weak_entry = Arc::downgrade(&entry);
        self.0.entries.lock().unwrap().insert(id, entry);
        tracing::trace!(broadcast = %self.id(), id, "listener subscribed");
        ListenerGuard { inner: Arc::downgrade(&self.0), entry: weak_entry, id }
    }

    /// Get a listen-only reference to this channel.
    /// Lets a type hand out subscription access without exposing `send`.
    pub fn reference(&self) -> Ref<'_, T> { Ref(self) }
}

impl<T> Broadcast<T>
where T: Clone
{
    /// Sends a notification to all active listeners, synchronously, on the calling thread.
    ///
    /// The listener table is snapshotted under the lock and the lock released before
    /// any callback runs, so listeners may freely subscribe, unsubscribe or send on
    /// this same channel without deadlocking.
    pub fn send(&self, value: T) {
        let snapshot = {
            let entries = self.0.entries.lock().unwrap();
            entries.values().cloned().collect::<Vec<_>>()
        };

        for entry in snapshot {
            if entry.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            match &entry.listener {
                BroadcastListener::Payload(callback) => callback(value.clone()),
                BroadcastListener::NotifyOnly(callback) => callback(),
            }
        }
    }
}

impl<'a, T> Ref<'a, T> {
    /// Subscribe to notifications from the underlying channel.
    pub fn listen<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoBroadcastListener<T> {
        self.0.listen(listener)
    }

    /// Unique identifier of the underlying channel
    pub fn broadcast_id(&self) -> BroadcastId { self.0.id() }
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.upgrade() {
            entry.cancelled.store(true, Ordering::SeqCst);
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.entries.lock().unwrap().remove(&self.id);
        }
    }
}

// IntoBroadcastListener implementations

impl<F, T> IntoBroadcastListener<T> for F
where F: Fn(T) + Send + Sync + 'static
{
    fn into_broadcast_listener(self) -> BroadcastListener<T> { BroadcastListener::Payload(Arc::new(self)) }
}

impl<T> IntoBroadcastListener<T> for BroadcastListener<T> {
    fn into_broadcast_listener(self) -> BroadcastListener<T> { self }
}

impl<T> IntoBroadcastListener<T> for Arc<dyn Fn(T) + Send + Sync + 'static> {
    fn into_broadcast_listener(self) -> BroadcastListener<T> { BroadcastListener::Payload(self) }
}

// Notify-only listeners work with any payload type
impl<T> IntoBroadcastListener<T> for Arc<dyn Fn() + Send + Sync + 'static> {
    fn into_broadcast_listener(self) -> BroadcastListener<T> { BroadcastListener::NotifyOnly(self) }
}

impl<T> IntoBroadcastListener<T> for std::sync::mpsc::Sender<T>
where T: Send + Sync + 'static
{
    fn into_broadcast_listener(self) -> BroadcastListener<T> {
        BroadcastListener::Payload(Arc::new(move |value| {
            let _ = self.send(value); // receiver may be gone
        }))
    }
}

#[cfg(feature = "tokio")]
impl<T> IntoBroadcastListener<T> for tokio::sync::mpsc::UnboundedSender<T>
where T: Send + Sync + 'static
{
    fn into_broadcast_listener(self) -> BroadcastListener<T> {
        BroadcastListener::Payload(Arc::new(move |value| {
            let _ = self.send(value);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn multiple_subscribers() {
        let channel = Broadcast::<()>::new();
        let counter = Arc::new(Mutex::new(0));

        let _sub1 = {
            let counter = counter.clone();
            channel.listen(move |_| *counter.lock().unwrap() += 1)
        };
        let sub2 = {
            let counter = counter.clone();
            channel.listen(move |_| *counter.lock().unwrap() += 10)
        };

        channel.send(());
        assert_eq!(*counter.lock().unwrap(), 11);

        drop(sub2);

        channel.send(());
        assert_eq!(*counter.lock().unwrap(), 12);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[test]
    fn clones_share_the_channel() {
        let channel = Broadcast::<()>::new();
        let other = channel.clone();
        assert!(channel.same_channel(&other));
        assert_eq!(channel.id(), other.id());

        let fired = Arc::new(Mutex::new(0));
        let _sub = {
            let fired = fired.clone();
            other.reference().listen(move |_| *fired.lock().unwrap() += 1)
        };
        channel.send(());
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn reentrant_subscription_during_send() {
        let channel = Broadcast::<()>::new();
        let counter = Arc::new(Mutex::new(0));

        let channel_clone = channel.clone();
        let counter_clone = counter.clone();
        let _sub = channel.listen(move |_| {
            *counter_clone.lock().unwrap() += 1;
            // subscribing and unsubscribing from inside a callback must not deadlock
            let _temp = channel_clone.listen(|_| {});
        });

        channel.send(());
        assert_eq!(*counter.lock().unwrap(), 1);
        channel.send(());
        assert_eq!(*counter.lock().unwrap(), 2);
    }

    #[test]
    fn cancellation_observed_by_in_flight_send() {
        // The first listener drops the second listener's guard mid-send.
        // The second listener is in the snapshot but must be skipped.
        let channel = Broadcast::<()>::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let second_guard: Arc<Mutex<Option<ListenerGuard<()>>>> = Arc::new(Mutex::new(None));

        let _first = {
            let fired = fired.clone();
            let second_guard = second_guard.clone();
            channel.listen(move |_| {
                fired.lock().unwrap().push("first");
                *second_guard.lock().unwrap() = None;
            })
        };
        let second = {
            let fired = fired.clone();
            channel.listen(move |_| fired.lock().unwrap().push("second"))
        };
        *second_guard.lock().unwrap() = Some(second);

        channel.send(());
        assert_eq!(*fired.lock().unwrap(), ["first"]);
    }

    #[test]
    fn notify_only_listeners_ignore_the_payload() {
        let channel = Broadcast::<u32>::new();
        let fired = Arc::new(Mutex::new(0));

        let listener: Arc<dyn Fn() + Send + Sync> = {
            let fired = fired.clone();
            Arc::new(move || *fired.lock().unwrap() += 1)
        };
        let _sub = channel.listen(listener);

        channel.send(5);
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn channel_sender_subscriber() {
        let channel = Broadcast::new();
        let (tx, rx) = std::sync::mpsc::channel::<u32>();
        let _sub = channel.listen(tx);

        channel.send(7);
        assert_eq!(rx.try_recv(), Ok(7));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    #[cfg(feature = "tokio")]
    fn tokio_sender_subscriber() {
        let channel = Broadcast::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let _sub = channel.listen(tx);

        channel.send(());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
