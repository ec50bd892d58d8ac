//! Structural checks for [`RBTree`].
//!
//! These walk the whole tree and are meant for tests and for callers that
//! want to assert integrity after a batch of mutations.

use std::fmt;

use crate::node::{Color, NIL, NodeId};
use crate::tree::RBTree;

/// First broken invariant found by [`RBTree::validate`]. Keys are rendered
/// with `Debug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The sentinel was colored red
    RedSentinel,
    /// The root is red
    RedRoot { key: String },
    /// A red node has a red child
    RedRed { key: String },
    /// The two subtrees of a node have different black-heights
    BlackHeight { key: String, left: usize, right: usize },
    /// An in-order neighbour is smaller than its predecessor
    Order { key: String },
    /// A child does not point back at its parent
    ParentLink { key: String },
    /// The number of reachable nodes differs from the recorded length
    LenMismatch { expected: usize, found: usize },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::RedSentinel => write!(f, "sentinel is red"),
            InvariantViolation::RedRoot { key } => write!(f, "root {} is red", key),
            InvariantViolation::RedRed { key } => {
                write!(f, "red node {} has a red child", key)
            }
            InvariantViolation::BlackHeight { key, left, right } => write!(
                f,
                "black-height mismatch under {}: left {}, right {}",
                key, left, right
            ),
            InvariantViolation::Order { key } => write!(f, "key {} is out of order", key),
            InvariantViolation::ParentLink { key } => {
                write!(f, "node {} has a broken parent link", key)
            }
            InvariantViolation::LenMismatch { expected, found } => write!(
                f,
                "tree records {} nodes but {} are reachable",
                expected, found
            ),
        }
    }
}

impl std::error::Error for InvariantViolation {}

impl<K> RBTree<K> {
    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        let mut tallest = 0;
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        if self.root_id() != NIL {
            stack.push((self.root_id(), 1));
        }

        while let Some((id, depth)) = stack.pop() {
            tallest = tallest.max(depth);
            for child in [self.left(id), self.right(id)] {
                if child != NIL {
                    stack.push((child, depth + 1));
                }
            }
        }
        tallest
    }

    /// Black nodes on the leftmost root-to-sentinel path, root included.
    /// On a valid tree every such path gives the same count.
    pub fn black_height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root_id();

        while current != NIL {
            if self.color_of(current) == Color::Black {
                height += 1;
            }
            current = self.left(current);
        }

        height
    }

    /// Checks every red-black and ordering invariant.
    pub fn validate(&self) -> Result<(), InvariantViolation>
    where
        K: Ord + fmt::Debug,
    {
        if self.color_of(NIL) != Color::Black {
            return Err(InvariantViolation::RedSentinel);
        }

        let root = self.root_id();
        if root == NIL {
            return match self.len() {
                0 => Ok(()),
                expected => Err(InvariantViolation::LenMismatch { expected, found: 0 }),
            };
        }

        if self.color_of(root) == Color::Red {
            return Err(InvariantViolation::RedRoot {
                key: self.describe(root),
            });
        }
        if self.parent(root) != NIL {
            return Err(InvariantViolation::ParentLink {
                key: self.describe(root),
            });
        }

        // Pre-order walk; reversed, it visits children before parents.
        let mut order: Vec<NodeId> = Vec::with_capacity(self.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if order.len() > self.len() {
                // More nodes than recorded, possibly a cycle
                return Err(InvariantViolation::LenMismatch {
                    expected: self.len(),
                    found: order.len(),
                });
            }
            order.push(id);

            for child in [self.left(id), self.right(id)] {
                if child == NIL {
                    continue;
                }
                if self.parent(child) != id {
                    return Err(InvariantViolation::ParentLink {
                        key: self.describe(child),
                    });
                }
                if self.color_of(id) == Color::Red && self.color_of(child) == Color::Red {
                    return Err(InvariantViolation::RedRed {
                        key: self.describe(id),
                    });
                }
                stack.push(child);
            }
        }

        if order.len() != self.len() {
            return Err(InvariantViolation::LenMismatch {
                expected: self.len(),
                found: order.len(),
            });
        }

        // Black-heights, excluding the node itself
        let mut heights = vec![0usize; self.slot_count()];
        for &id in order.iter().rev() {
            let below = |child: NodeId| -> usize {
                if child == NIL {
                    0
                } else {
                    heights[child as usize] + usize::from(self.color_of(child) == Color::Black)
                }
            };
            let left = below(self.left(id));
            let right = below(self.right(id));
            if left != right {
                return Err(InvariantViolation::BlackHeight {
                    key: self.describe(id),
                    left,
                    right,
                });
            }
            heights[id as usize] = left;
        }

        let mut previous: Option<&K> = None;
        let mut misplaced: Option<String> = None;
        self.walk_in_order(usize::MAX, |key| {
            if misplaced.is_none() && previous.is_some_and(|p| p > key) {
                misplaced = Some(format!("{:?}", key));
            }
            previous = Some(key);
        });
        if let Some(key) = misplaced {
            return Err(InvariantViolation::Order { key });
        }

        Ok(())
    }

    fn describe(&self, id: NodeId) -> String
    where
        K: fmt::Debug,
    {
        format!("{:?}", self.node(id).key)
    }
}
