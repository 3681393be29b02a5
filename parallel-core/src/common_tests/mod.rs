//! Generic test suites shared by the integration tests of both crates.
//!
//! Each function takes the lock or guard type as a type parameter, so the
//! same suite runs against every `RawLock` and against `DeferredGuard` here
//! and `EpochGuard` in parallel-crossbeam.

pub mod collection_core_tests;
