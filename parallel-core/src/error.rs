//! Contract violations reported by the collections.
//!
//! Absence (popping an empty stack, a lookup miss) is never an error and is
//! reported with `Option::None`. The variants here are misuse the caller can
//! act on.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// Index is not below the number of live elements.
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The collection was modified while an iterator was walking it.
    #[error("collection was revised during iteration")]
    Revised,

    /// Destination slice cannot hold the copied elements.
    #[error("destination holds {available} elements but {required} are required")]
    InsufficientSpace { required: usize, available: usize },

    /// Requested size is beyond what the collection can ever address.
    #[error("requested capacity {requested} exceeds the maximum of {max}")]
    CapacityExceeded { requested: usize, max: usize },
}

pub type CollectionResult<T> = Result<T, CollectionError>;
