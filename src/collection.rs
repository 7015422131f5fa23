//! Observable containers: collections of observable elements that re-broadcast
//! membership changes and nested element changes as their own changes.
//!
//! Both wrappers are registry-path observable objects. Every mutation, bulk or
//! incremental, funnels through one resync path: fire will-change, cancel all
//! element subscriptions, apply the change, re-link every element, fire
//! did-change. The live subscription count is therefore always exactly twice
//! the element count.

pub mod map;
pub mod vec;

pub use map::*;
pub use vec::*;
