//! Guard that holds on to every retired allocation until it is dropped.

#[cfg(debug_assertions)]
use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

use super::Guard;

/// Retires memory into a list that is only freed when the guard drops.
///
/// Since a collection stores its guard, retired nodes stay valid for the whole
/// lifetime of the collection. This makes use-after-free impossible by
/// construction, which is exactly what the stress tests want, at the cost of
/// unbounded growth for long running programs.
///
/// Debug builds additionally reject a pointer that is retired twice, the
/// symptom of two threads both believing they unlinked the same node.
///
pub struct DeferredGuard {
    retired: Mutex<Vec<Retired>>,
    #[cfg(debug_assertions)]
    seen: Mutex<HashSet<usize>>,
}

struct Retired {
    ptr: *mut (),
    dealloc: unsafe fn(*mut ()),
}

// Safety: the pointer is only dereferenced by `dealloc` when the guard drops,
// and access to the list goes through the Mutex.
unsafe impl Send for Retired {}

impl DeferredGuard {
    pub fn new() -> Self {
        DeferredGuard {
            retired: Mutex::new(Vec::new()),
            #[cfg(debug_assertions)]
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Number of allocations waiting for the guard to drop.
    pub fn retired_count(&self) -> usize {
        self.retired.lock().map(|list| list.len()).unwrap_or(0)
    }
}

impl Default for DeferredGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredGuard {
    fn drop(&mut self) {
        let retired = match self.retired.get_mut() {
            Ok(list) => list,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !retired.is_empty() {
            debug!(count = retired.len(), "freeing retired allocations");
        }

        for entry in retired.drain(..) {
            unsafe {
                (entry.dealloc)(entry.ptr);
            }
        }
    }
}

impl Guard for DeferredGuard {
    // Nothing is freed before the guard drops, so readers need no pin.
    type ReadGuard = ();

    fn pin() -> Self::ReadGuard {}

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        #[cfg(debug_assertions)]
        {
            let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
            if !seen.insert(node as usize) {
                panic!("allocation {:#x} retired twice", node as usize);
            }
        }

        let entry = Retired {
            ptr: node as *mut (),
            // Safety: only the pointee type differs; both are thin pointers.
            dealloc: unsafe { std::mem::transmute::<unsafe fn(*mut N), unsafe fn(*mut ())>(dealloc) },
        };

        self.retired
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(entry);
    }
}
