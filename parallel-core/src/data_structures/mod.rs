//! Concurrent collections.
//!
//! # Organization
//!
//! - [`stack`] - Treiber stack
//! - [`queue`] - Michael-Scott queue
//! - [`array_list`] - Growable array with a descriptor protocol for push and pop
//! - [`sorted_dictionary`] - Red-black tree with per-node flags and markers
//! - [`internal`] - Bucket layout, buffer pool, index arena and take-once cells (pub(crate))
//!
//! The first three are lock-free and parameterized by a [`Guard`](crate::guard::Guard).
//! Removal moves values out. Reading without removing clones, so only
//! `peek`, `get`, `copy_to` and the iterators require `T: Clone`.

pub(crate) mod internal;

pub mod array_list;
pub mod queue;
pub mod sorted_dictionary;
pub mod stack;

pub use array_list::ArrayList;
pub use queue::Queue;
pub use sorted_dictionary::{InvariantViolation, SortedDictionary, SortedDictionaryOptions, TreeShape};
pub use stack::Stack;
