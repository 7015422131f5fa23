use std::sync::Arc;

use crate::broadcast::Broadcast;
use crate::registry::{ObjectId, PublisherRegistry};

/// The observable capability: a pair of no-payload notification channels fired
/// around every change to the object.
///
/// Both accessors are computed, not stored, and idempotent: repeated calls on
/// the same object return handles sharing the same underlying channel.
pub trait Observable {
    /// Channel fired immediately before the object changes
    fn will_change(&self) -> Broadcast<()>;
    /// Channel fired immediately after the object changed
    fn did_change(&self) -> Broadcast<()>;
}

impl<T: Observable + ?Sized> Observable for Arc<T> {
    fn will_change(&self) -> Broadcast<()> { (**self).will_change() }
    fn did_change(&self) -> Broadcast<()> { (**self).did_change() }
}

/// A reactive field as seen by its owning object's wiring pass.
///
/// The owner resolves one shared publisher pair and binds it into every one of
/// its reactive fields; the field itself never discovers its parent. Binding is
/// first-wins: once a field carries a parent channel it keeps it, and `bind_*`
/// hands back whichever channel ended up bound.
pub trait PublishedParent {
    /// The parent will-change channel currently bound into this field, if any
    fn parent_will_change(&self) -> Option<Broadcast<()>>;
    /// The parent did-change channel currently bound into this field, if any
    fn parent_did_change(&self) -> Option<Broadcast<()>>;
    /// Bind a parent will-change channel if none is bound yet; returns the bound channel
    fn bind_will_change(&self, channel: &Broadcast<()>) -> Broadcast<()>;
    /// Bind a parent did-change channel if none is bound yet; returns the bound channel
    fn bind_did_change(&self, channel: &Broadcast<()>) -> Broadcast<()>;
}

/// The identity of one observable object, allocated at construction and
/// released at destruction.
///
/// Embed one per observable object and delegate the `Observable` accessors to
/// [`will_change`](Self::will_change) / [`did_change`](Self::did_change),
/// passing the object's reactive fields as an explicit slice; fields are never
/// discovered by runtime introspection.
///
/// Dropping the identity releases the object's registry entry, so an object
/// that never had reactive fields does not leave a stale pair behind.
pub struct ObjectIdentity {
    id: ObjectId,
}

impl Default for ObjectIdentity {
    fn default() -> Self { Self::new() }
}

impl ObjectIdentity {
    pub fn new() -> Self { Self { id: ObjectId::next() } }

    /// This object's process-unique identity token
    pub fn id(&self) -> ObjectId { self.id }

    /// Resolve the object-level will-change channel.
    ///
    /// If any listed field already carries a bound parent channel, that channel
    /// is returned (all fields were bound together, so the first hit is the
    /// shared one). Otherwise, with at least one field listed, one fresh channel
    /// is allocated and bound into every field. With no reactive fields at all,
    /// the global [`PublisherRegistry`] supplies a cached pair keyed by this
    /// object's identity.
    pub fn will_change(&self, fields: &[&dyn PublishedParent]) -> Broadcast<()> {
        for field in fields {
            if let Some(channel) = field.parent_will_change() {
                return channel;
            }
        }
        if fields.is_empty() {
            return PublisherRegistry::global().get_or_create(self.id).will_change;
        }
        let mut channel = Broadcast::new();
        for field in fields {
            // adopt whatever a concurrent resolution pass may have bound first
            channel = field.bind_will_change(&channel);
        }
        channel
    }

    /// Resolve the object-level did-change channel. Same algorithm as
    /// [`will_change`](Self::will_change), over the did-change bindings.
    pub fn did_change(&self, fields: &[&dyn PublishedParent]) -> Broadcast<()> {
        for field in fields {
            if let Some(channel) = field.parent_did_change() {
                return channel;
            }
        }
        if fields.is_empty() {
            return PublisherRegistry::global().get_or_create(self.id).did_change;
        }
        let mut channel = Broadcast::new();
        for field in fields {
            channel = field.bind_did_change(&channel);
        }
        channel
    }
}

impl Drop for ObjectIdentity {
    fn drop(&mut self) { PublisherRegistry::global().release(self.id); }
}

impl std::fmt::Debug for ObjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectIdentity").field("id", &self.id).finish()
    }
}
