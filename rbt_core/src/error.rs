use std::collections::TryReserveError;
use std::fmt;

/// Errors reported by tree operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RBError {
    /// The node arena could not grow
    AllocationFailed(TryReserveError),
    /// Every node id is in use
    TreeFull,
    /// The handle was minted by another tree
    ForeignHandle,
    /// The handle's node has already been erased
    StaleHandle,
}

impl fmt::Display for RBError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RBError::AllocationFailed(e) => write!(f, "Node allocation failed: {}", e),
            RBError::TreeFull => write!(f, "Tree is full"),
            RBError::ForeignHandle => write!(f, "Handle belongs to another tree"),
            RBError::StaleHandle => write!(f, "Handle refers to an erased node"),
        }
    }
}

impl std::error::Error for RBError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RBError::AllocationFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TryReserveError> for RBError {
    fn from(error: TryReserveError) -> Self {
        RBError::AllocationFailed(error)
    }
}

pub type RBResult<T> = Result<T, RBError>;
