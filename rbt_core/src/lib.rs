//! # rbt_core - Red-black tree engine
//!
//! An arena-backed red-black tree with a single shared sentinel node.
//!
//! Modules:
//! - `tree` for insertion, lookup, erasure and the balancing fixups
//! - `validate` for invariant checks and height measurements
//! - `error` for the error type returned by mutating operations

mod error;
mod node;
mod tree;
mod validate;

pub use error::{RBError, RBResult};
pub use node::{Color, Handle};
pub use tree::RBTree;
pub use validate::InvariantViolation;
