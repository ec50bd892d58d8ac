pub(crate) type NodeId = u32;

/// Id of the shared sentinel. Never indexes the arena.
pub(crate) const NIL: NodeId = u32::MAX;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Black,
}

/// Structural part of a node. The sentinel is a bare `Link`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Link {
    pub(crate) left: NodeId,
    pub(crate) right: NodeId,
    pub(crate) parent: NodeId,
    pub(crate) color: Color,
}

impl Link {
    pub(crate) const SENTINEL: Link = Link {
        left: NIL,
        right: NIL,
        parent: NIL,
        color: Color::Black,
    };

    pub(crate) fn fresh(parent: NodeId) -> Self {
        Self {
            left: NIL,
            right: NIL,
            parent,
            color: Color::Red,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node<K> {
    pub(crate) link: Link,
    pub(crate) key: K,
}

#[derive(Debug, Clone)]
pub(crate) enum Entry<K> {
    Occupied(Node<K>),
    Vacant { next_free: NodeId },
}

/// One arena cell. `generation` is bumped every time the cell is vacated so
/// that handles to the previous occupant stop resolving.
#[derive(Debug, Clone)]
pub(crate) struct Slot<K> {
    pub(crate) generation: u32,
    pub(crate) entry: Entry<K>,
}

/// Opaque reference to a node, valid until that node is erased or the tree
/// is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) index: NodeId,
    pub(crate) generation: u32,
    pub(crate) tree: u64,
}
