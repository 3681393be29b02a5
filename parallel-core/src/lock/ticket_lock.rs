use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

use super::raw_lock::{RawLock, RawTryLock};

/// FIFO-fair ticket lock.
///
/// ```text
///   next ──► 7   (ticket dispenser, fetch_add on lock)
///   curr ──► 5   (now serving, ticket + 1 on unlock)
///
///   holders of tickets 5, 6 are ahead of the caller holding 7
/// ```
///
/// The token is the caller's ticket.
///
#[derive(Debug, Default)]
pub struct TicketLock {
    curr: CachePadded<AtomicUsize>,
    next: CachePadded<AtomicUsize>,
}

impl TicketLock {
    pub fn new() -> Self {
        TicketLock {
            curr: CachePadded::new(AtomicUsize::new(0)),
            next: CachePadded::new(AtomicUsize::new(0)),
        }
    }
}

impl RawLock for TicketLock {
    type Token = usize;

    fn lock(&self) -> usize {
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        let backoff = Backoff::new();

        while self.curr.load(Ordering::Acquire) != ticket {
            backoff.snooze();
        }

        ticket
    }

    unsafe fn unlock(&self, ticket: usize) {
        self.curr.store(ticket.wrapping_add(1), Ordering::Release);
    }
}

impl RawTryLock for TicketLock {
    fn try_lock(&self) -> Option<usize> {
        // Only take a ticket if it would be served immediately.
        //
        let curr = self.curr.load(Ordering::Acquire);
        self.next
            .compare_exchange(
                curr,
                curr.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()
    }
}
