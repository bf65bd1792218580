//! Collector context and the mark-sweep algorithm.
//!
//! - `gc`: the [`Collector`] type, allocation, locking and collection
//! - `access`: node accessors, trail operations and string interning
//! - `tracing`: spans and events emitted by collections

#[allow(clippy::module_inception)]
mod gc;

mod access;
mod tracing;

pub use self::tracing::GcId;
pub use gc::{Collector, KeepAliveKey, RootKey, WeakMapKey, WeakRefKey};

pub(crate) use gc::WeakEntry;
