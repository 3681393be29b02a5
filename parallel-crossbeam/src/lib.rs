//! Crossbeam-based reclamation for the parallel-core collections.
//!
//! This crate provides `EpochGuard`, an implementation of the `Guard` trait
//! using crossbeam-epoch for memory reclamation.
//!
//! # Usage
//!
//! ```
//! use parallel_core::{ArrayList, Queue};
//! use parallel_crossbeam::EpochGuard;
//!
//! let queue: Queue<String, EpochGuard> = Queue::new();
//! queue.enqueue("job".to_string());
//!
//! let list: ArrayList<u64, EpochGuard> = ArrayList::new();
//! list.push(7);
//! assert_eq!(list.get(0), Ok(7));
//! ```

pub mod epoch_guard;

// Export the Guard implementation
pub use epoch_guard::EpochGuard;
