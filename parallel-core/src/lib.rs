pub mod common_tests;
pub mod data_structures;
pub mod error;
pub mod guard;
pub mod lock;

// Re-exports for convenience
pub use data_structures::{ArrayList, Queue, SortedDictionary, SortedDictionaryOptions, Stack};
pub use error::{CollectionError, CollectionResult};
pub use guard::{DeferredGuard, Guard};
pub use lock::{ClhLock, Lock, McsLock, RawLock, RawTryLock, RwLock, SpinLock, TicketLock};

/*

cargo llvm-cov --html

cargo bench -p parallel-crossbeam --bench lock_benchmark

*/
