//! Raw mutual exclusion primitives and the data-protecting locks built on them.
//!
//! Every raw lock implements [`RawLock`], so [`Lock`] and [`RwLock`] work with
//! any of them:
//!
//! | raw lock | token | fairness |
//! |---|---|---|
//! | [`SpinLock`] | `()` | none |
//! | [`TicketLock`] | ticket number | FIFO |
//! | [`ClhLock`] | queue node | FIFO |
//! | [`McsLock`] | queue node | FIFO |

mod clh_lock;
mod guarded_lock;
mod mcs_lock;
mod raw_lock;
mod rw_lock;
mod spin_lock;
mod ticket_lock;

pub use clh_lock::{ClhLock, ClhToken};
pub use guarded_lock::{Lock, LockGuard};
pub use mcs_lock::{McsLock, McsToken};
pub use raw_lock::{RawLock, RawTryLock};
pub use rw_lock::{ReadGuard, RwLock, WriteGuard};
pub use spin_lock::SpinLock;
pub use ticket_lock::TicketLock;
