//! Heap object layout: node header, node references, chunks and vectors.
//!
//! Every object the collector owns starts with a [`NodeHeader`]. The header is
//! all the collector needs to classify and mark an object; the payload is either
//! an unstructured [`Object::Chunk`] or a structured [`Object::Vector`] whose
//! [`Slot`]s are the edges followed during marking.

use std::fmt;

use crate::error::GcError;

// ============================================================================
// Constants
// ============================================================================

/// Bytes accounted for the header part of every object: the header word
/// plus the payload length.
pub const NODE_HEADER_BYTES: usize = 16;

/// Bytes accounted per vector slot.
pub const SLOT_BYTES: usize = 8;

/// Round `size` up to the next multiple of 8.
#[must_use]
pub const fn round_up_8(size: usize) -> usize {
    (size + 7) & !7
}

// ============================================================================
// NodeKind
// ============================================================================

/// The 7-bit kind id stored in every node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKind(u8);

impl NodeKind {
    /// A slot on a free list. Never observed on a live object.
    pub const FREE: Self = Self(0);
    /// Plain unstructured chunk.
    pub const CHUNK: Self = Self(1);
    /// Plain structured vector.
    pub const VECTOR: Self = Self(2);
    /// Interned string chunk.
    pub const STRING: Self = Self(3);
    /// First id available to client node kinds.
    pub const FIRST_CLIENT: u8 = 4;
    /// Largest id representable in the header.
    pub const MAX: u8 = 0x7f;

    /// Create a kind from a raw id.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::InvalidKind`] if `id` does not fit in 7 bits or
    /// names the reserved free-list kind.
    pub const fn new(id: u8) -> Result<Self, GcError> {
        if id == 0 || id > Self::MAX {
            Err(GcError::InvalidKind(id))
        } else {
            Ok(Self(id))
        }
    }

    /// The raw id.
    #[must_use]
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Whether this kind is one of the collector's built-in kinds.
    #[must_use]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_CLIENT
    }
}

impl TryFrom<u8> for NodeKind {
    type Error = GcError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FREE => f.write_str("free"),
            Self::CHUNK => f.write_str("chunk"),
            Self::VECTOR => f.write_str("vector"),
            Self::STRING => f.write_str("string"),
            Self(id) => write!(f, "kind#{id}"),
        }
    }
}

// ============================================================================
// NodeHeader
// ============================================================================

/// One of the two general purpose header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// First flag bit.
    One,
    /// Second flag bit.
    Two,
}

impl Flag {
    const fn bit(self) -> u32 {
        match self {
            Self::One => NodeHeader::FLAG_1,
            Self::Two => NodeHeader::FLAG_2,
        }
    }
}

/// Bit-packed header present on every heap object.
///
/// Layout, low bit first: mark (1), kind (7), secondary id (7), flag 1 (1),
/// flag 2 (1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHeader(u32);

impl NodeHeader {
    const MARK: u32 = 1;
    const KIND_SHIFT: u32 = 1;
    const SEC_SHIFT: u32 = 8;
    const ID_MASK: u32 = 0x7f;
    const FLAG_1: u32 = 1 << 15;
    const FLAG_2: u32 = 1 << 16;

    /// Header for a fresh, unmarked object of `kind`.
    #[must_use]
    pub const fn new(kind: NodeKind) -> Self {
        Self((kind.0 as u32) << Self::KIND_SHIFT)
    }

    /// Same header with the secondary id replaced.
    ///
    /// Only the low 7 bits of `sec` are kept.
    #[must_use]
    pub const fn with_secondary(self, sec: u8) -> Self {
        let cleared = self.0 & !(Self::ID_MASK << Self::SEC_SHIFT);
        Self(cleared | ((sec as u32 & Self::ID_MASK) << Self::SEC_SHIFT))
    }

    /// The kind id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn kind(self) -> NodeKind {
        NodeKind(((self.0 >> Self::KIND_SHIFT) & Self::ID_MASK) as u8)
    }

    /// The secondary id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn secondary(self) -> u8 {
        ((self.0 >> Self::SEC_SHIFT) & Self::ID_MASK) as u8
    }

    /// Whether the mark bit is set.
    #[must_use]
    pub const fn is_marked(self) -> bool {
        self.0 & Self::MARK != 0
    }

    pub(crate) const fn set_mark(&mut self) {
        self.0 |= Self::MARK;
    }

    pub(crate) const fn clear_mark(&mut self) {
        self.0 &= !Self::MARK;
    }

    /// Read a flag bit.
    #[must_use]
    pub const fn flag(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Write a flag bit.
    pub const fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.0 |= flag.bit();
        } else {
            self.0 &= !flag.bit();
        }
    }
}

impl fmt::Debug for NodeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHeader")
            .field("kind", &self.kind())
            .field("secondary", &self.secondary())
            .field("marked", &self.is_marked())
            .field("flag_1", &self.flag(Flag::One))
            .field("flag_2", &self.flag(Flag::Two))
            .finish()
    }
}

// ============================================================================
// NodeRef
// ============================================================================

/// Stable address of a heap object.
///
/// A `NodeRef` names a heap slot together with the generation of the object
/// that occupied it when the reference was handed out. Once a sweep reclaims
/// the object the slot generation moves on, so a stale `NodeRef` never
/// resolves to an unrelated object that later reuses the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    index: u32,
    generation: u32,
}

impl NodeRef {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Heap slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot this reference was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Whether `self` and `other` occupy the same heap slot, regardless of
    /// generation. Used to observe slot reuse.
    #[must_use]
    pub const fn same_slot(self, other: Self) -> bool {
        self.index == other.index
    }

    /// Packed `u64` form, unique for the lifetime of a collector.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// ============================================================================
// Slot
// ============================================================================

/// One slot of a vector: a reference to another node, an opaque scalar, or
/// nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Empty slot.
    #[default]
    Empty,
    /// Edge to another heap object.
    Node(NodeRef),
    /// Opaque scalar, never traced.
    Scalar(u64),
}

impl Slot {
    /// The referenced node, if this slot is an edge.
    #[must_use]
    pub const fn as_node(self) -> Option<NodeRef> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The scalar payload, if any.
    #[must_use]
    pub const fn as_scalar(self) -> Option<u64> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

impl From<NodeRef> for Slot {
    fn from(node: NodeRef) -> Self {
        Self::Node(node)
    }
}

impl From<Option<NodeRef>> for Slot {
    fn from(node: Option<NodeRef>) -> Self {
        node.map_or(Self::Empty, Self::Node)
    }
}

// ============================================================================
// Object
// ============================================================================

/// Payload of a heap object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    /// Unstructured payload of fixed size.
    Chunk(Box<[u8]>),
    /// Ordered slots, traced during marking.
    Vector(Box<[Slot]>),
}

impl Object {
    /// Actual size of the object in memory, header included, 8-byte aligned.
    #[must_use]
    pub fn memsize(&self) -> usize {
        match self {
            Self::Chunk(bytes) => round_up_8(NODE_HEADER_BYTES + bytes.len()),
            Self::Vector(slots) => round_up_8(NODE_HEADER_BYTES + slots.len() * SLOT_BYTES),
        }
    }

    /// Number of bytes (chunk) or slots (vector).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Chunk(bytes) => bytes.len(),
            Self::Vector(slots) => slots.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outgoing edges of this object.
    pub fn edges(&self) -> impl Iterator<Item = NodeRef> + '_ {
        let slots: &[Slot] = match self {
            Self::Chunk(_) => &[],
            Self::Vector(slots) => slots,
        };
        slots.iter().filter_map(|slot| slot.as_node())
    }
}
