//! A tracing garbage collector for constraint-model AST nodes.
//!
//! `zinc-gc` owns every node a compiler worker allocates. Nodes live in a
//! **non-moving, size-classed heap** and are reclaimed by a stop-the-world
//! **mark-sweep** collection. Nodes are named by [`NodeRef`]s, which stay
//! valid until the node is reclaimed and resolve to nothing afterwards.
//!
//! # Features
//!
//! - **Precise roots**: aggregates registered through [`Rooted`] or
//!   [`Collector::add`], [`KeepAlive`] handles and trailed values
//! - **Weak observation**: [`WeakRef`] and the weak-keyed [`WeakNodeMap`]
//! - **Undo trail**: checkpoint, record and roll back vector slot writes
//! - **Lock discipline**: [`GcLock`] suppresses collections while native
//!   frames hold untracked references
//! - **Automatic collections**: by allocation threshold or timeout
//!
//! # Quick Start
//!
//! ```
//! use zinc_gc::{Collector, GcConfig, KeepAlive, NodeKind, Slot, WeakRef};
//!
//! let gc = Collector::with_config(GcConfig::manual());
//! let a = gc.allocate_chunk(NodeKind::CHUNK, b"a");
//! let b = gc.allocate_vector(NodeKind::VECTOR, vec![Slot::Node(a)]);
//! let c = gc.allocate_chunk(NodeKind::CHUNK, b"c");
//!
//! let _root = KeepAlive::new(&gc, b);
//! let weak = WeakRef::new(&gc, c);
//! gc.trigger();
//!
//! assert!(gc.is_live(a) && gc.is_live(b));
//! assert_eq!(weak.get(), None);
//! ```
//!
//! # Rooting aggregates
//!
//! ```
//! use zinc_gc::{Collector, NodeKind, NodeRef, Rooted, Trace};
//!
//! #[derive(Trace, Default)]
//! struct Model {
//!     items: Vec<NodeRef>,
//!     solve: Option<NodeRef>,
//!     #[zinc_gc(skip)]
//!     name: String,
//! }
//!
//! let gc = Collector::new();
//! let model = Rooted::new(&gc, Model::default());
//! let item = gc.allocate_chunk(NodeKind::CHUNK, b"constraint x > 0");
//! model.borrow_mut().items.push(item);
//!
//! gc.trigger();
//! assert!(gc.is_live(item));
//! ```
//!
//! # Thread Safety
//!
//! A [`Collector`] and every handle are `!Send` and `!Sync`. Each worker
//! thread creates its own collector; only the default [`GcConfig`] and the
//! [`GlobalMetrics`] are shared across the process.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod gc;
mod handles;
mod lock;
mod managed;
mod metrics;
mod node;
mod roots;
mod trace;
mod trail;
mod weak_map;

/// Heap internals.
///
/// This module is public for testing and advanced use cases.
/// Most users should go through [`Collector`].
pub mod heap;

// Re-export public API
pub use config::{
    default_config, set_default_config, GcConfig, DEFAULT_GROWTH_FACTOR, DEFAULT_THRESHOLD,
};
pub use error::GcError;
pub use gc::{Collector, GcId, KeepAliveKey, RootKey, WeakMapKey, WeakRefKey};
pub use handles::{KeepAlive, WeakRef};
pub use lock::GcLock;
pub use managed::ManagedStringMap;
pub use metrics::{
    global_metrics, CollectionTrigger, GcHistory, GcMetrics, GlobalMetrics, KindStats, PhaseTimer,
    HISTORY_SIZE,
};
pub use node::{
    round_up_8, Flag, NodeHeader, NodeKind, NodeRef, Object, Slot, NODE_HEADER_BYTES, SLOT_BYTES,
};
pub use roots::{Marker, RootRegistration, Rooted};
pub use trace::{Trace, Tracer};
pub use trail::{FieldAddr, Trail, TrailEntry, TrailMark};
pub use weak_map::WeakNodeMap;

// Re-export derive macro when feature is enabled
#[cfg(feature = "derive")]
pub use zinc_gc_derive::Trace;
