//! Internal implementation details.
//!
//! These are pub(crate) and not intended for external use.

pub(crate) mod array_pool;
pub(crate) mod bucket_index;
pub(crate) mod segmented_arena;
pub(crate) mod take_cell;

pub(crate) use array_pool::ArrayPool;
pub(crate) use segmented_arena::{NIL, SegmentedArena};
pub(crate) use take_cell::TakeCell;
