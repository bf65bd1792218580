//! Error type for collector operations.

use thiserror::Error;

use crate::node::NodeRef;

/// Errors reported by the collector and its node accessors.
///
/// Contract violations that cannot be recovered from (forcing a collection
/// while locked) are reported through this type by the `try_` variants and
/// turned into panics by the plain ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GcError {
    /// A collection was requested while the collector lock was held.
    #[error("cannot collect while the collector is locked (lock depth {depth})")]
    Locked {
        /// Current lock count.
        depth: u32,
    },
    /// A rooted aggregate was mutably borrowed, so it could not be traced.
    #[error("cannot collect while a rooted aggregate is mutably borrowed")]
    RootBusy,
    /// The node has been reclaimed, or never belonged to this collector.
    #[error("node {0} is not live")]
    StaleNode(NodeRef),
    /// A vector operation was applied to a chunk.
    #[error("node {0} is not a vector")]
    NotAVector(NodeRef),
    /// A chunk operation was applied to a vector.
    #[error("node {0} is not a chunk")]
    NotAChunk(NodeRef),
    /// A slot index past the end of a vector.
    #[error("slot {index} out of bounds for node {node} of length {len}")]
    SlotOutOfBounds {
        /// The vector.
        node: NodeRef,
        /// Requested index.
        index: usize,
        /// Vector length.
        len: usize,
    },
    /// A trail rollback or commit without an open checkpoint.
    #[error("no open trail checkpoint")]
    NoCheckpoint,
    /// A node kind id outside the representable client range.
    #[error("invalid node kind id {0}")]
    InvalidKind(u8),
}
