use core::fmt;

use crate::Key;

/// Errors reported by [`WavlTree`](crate::WavlTree) operations.
///
/// A failed operation never modifies the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WavlError {
    /// An insert named a key that is already present.
    DuplicateKey { key: Key },

    /// A delete named a key that is not present.
    KeyNotFound { key: Key },

    /// The operation needs at least one element.
    EmptyTree,

    /// A `select` index fell outside `1..=len`.
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for WavlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { key } => write!(f, "key {key} is already present"),
            Self::KeyNotFound { key } => write!(f, "key {key} not found"),
            Self::EmptyTree => write!(f, "tree is empty"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for tree of size {len}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WavlError {}
