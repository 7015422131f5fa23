use std::sync::Mutex;

use crate::broadcast::{Broadcast, ListenerGuard};
use crate::object::Observable;

/// A tracked set of subscriptions into child observables, owned by the parent
/// that created them.
///
/// Each [`link`](Self::link) call forwards one child's will/did-change events
/// into the parent's own channels and appends the two resulting guards here.
/// The whole set is cancelled in bulk, either explicitly before a collection is
/// replaced or implicitly when the owner is dropped. No guard ever outlives its
/// child's membership in the owner.
#[derive(Default)]
pub struct ChangeLinks {
    guards: Mutex<Vec<ListenerGuard<()>>>,
}

impl ChangeLinks {
    pub fn new() -> Self { Self::default() }

    /// Subscribe to `child`'s will/did-change channels, re-emitting each fire on
    /// the supplied parent channels. The forwarding listeners capture clones of
    /// the parent channels only, never the parent object itself.
    pub fn link(&self, child: &dyn Observable, will_change: &Broadcast<()>, did_change: &Broadcast<()>) {
        let will = will_change.clone();
        let will_guard = child.will_change().listen(move |_| will.send(()));
        let did = did_change.clone();
        let did_guard = child.did_change().listen(move |_| did.send(()));

        let mut guards = self.guards.lock().unwrap();
        guards.push(will_guard);
        guards.push(did_guard);
    }

    /// Cancel every tracked subscription. Idempotent; safe when already empty.
    pub fn cancel_all(&self) {
        let cancelled = std::mem::take(&mut *self.guards.lock().unwrap());
        // guards unsubscribe on drop, outside our lock
        drop(cancelled);
    }

    /// Number of live subscriptions (two per linked child)
    pub fn len(&self) -> usize { self.guards.lock().unwrap().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Drop for ChangeLinks {
    fn drop(&mut self) { self.cancel_all(); }
}

impl std::fmt::Debug for ChangeLinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLinks").field("subscriptions", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectIdentity;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Plain {
        identity: ObjectIdentity,
    }

    impl Plain {
        fn new() -> Self { Self { identity: ObjectIdentity::new() } }
    }

    impl Observable for Plain {
        fn will_change(&self) -> Broadcast<()> { self.identity.will_change(&[]) }
        fn did_change(&self) -> Broadcast<()> { self.identity.did_change(&[]) }
    }

    #[test]
    fn links_forward_child_events() {
        let parent_will = Broadcast::new();
        let parent_did = Broadcast::new();
        let links = ChangeLinks::new();
        let child = Plain::new();

        links.link(&child, &parent_will, &parent_did);
        assert_eq!(links.len(), 2);

        let fired = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let fired = fired.clone();
            parent_will.listen(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        child.will_change().send(());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_all_is_idempotent() {
        let links = ChangeLinks::new();
        links.cancel_all();

        let parent_will = Broadcast::new();
        let parent_did = Broadcast::new();
        let child = Plain::new();
        links.link(&child, &parent_will, &parent_did);
        assert_eq!(child.will_change().subscriber_count(), 1);

        links.cancel_all();
        links.cancel_all();
        assert!(links.is_empty());
        assert_eq!(child.will_change().subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_links_unsubscribes() {
        let parent_will = Broadcast::new();
        let parent_did = Broadcast::new();
        let child = Plain::new();
        {
            let links = ChangeLinks::new();
            links.link(&child, &parent_will, &parent_did);
            assert_eq!(child.will_change().subscriber_count(), 1);
            assert_eq!(child.did_change().subscriber_count(), 1);
        }
        assert_eq!(child.will_change().subscriber_count(), 0);
        assert_eq!(child.did_change().subscriber_count(), 0);
    }
}
