use crossbeam::queue::SegQueue;
use tracing::trace;

// Buffers kept per size class. Anything beyond is simply dropped.
const RETAINED_PER_CLASS: usize = 4;

/// Pool of fixed size slot buffers.
///
/// Sizes are powers of two and each size has its own lock-free free list.
/// Collections rent a buffer when they grow and hand it back when a racing
/// thread installed its own buffer first, or when they shrink.
///
pub(crate) struct ArrayPool<S> {
    classes: Box<[SegQueue<Box<[S]>>]>,
}

impl<S: Default> ArrayPool<S> {
    pub(crate) fn new() -> Self {
        ArrayPool {
            classes: (0..usize::BITS).map(|_| SegQueue::new()).collect(),
        }
    }

    /// A buffer of exactly `len` default slots.
    ///
    pub(crate) fn rent(&self, len: usize) -> Box<[S]> {
        debug_assert!(len.is_power_of_two());

        match self.classes[Self::class_of(len)].pop() {
            Some(buffer) => {
                trace!(len, "array pool hit");
                buffer
            }
            None => {
                trace!(len, "array pool miss");
                (0..len).map(|_| S::default()).collect()
            }
        }
    }

    /// Gives a buffer back. With `clear` every slot is reset to its default
    /// first; without it the caller guarantees the slots are already default.
    ///
    pub(crate) fn give_back(&self, mut buffer: Box<[S]>, clear: bool) {
        let class = &self.classes[Self::class_of(buffer.len())];

        if class.len() >= RETAINED_PER_CLASS {
            trace!(len = buffer.len(), "array pool full, dropping buffer");
            return;
        }

        if clear {
            buffer.iter_mut().for_each(|slot| *slot = S::default());
        }

        class.push(buffer);
    }

    #[inline]
    fn class_of(len: usize) -> usize {
        len.trailing_zeros() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_reuses_given_back_buffer() {
        let pool: ArrayPool<u64> = ArrayPool::new();

        let mut buffer = pool.rent(16);
        assert_eq!(buffer.len(), 16);
        buffer[3] = 7;
        let addr = buffer.as_ptr();

        pool.give_back(buffer, true);

        let again = pool.rent(16);
        assert_eq!(again.as_ptr(), addr);
        assert!(again.iter().all(|slot| *slot == 0));

        // Different size class, fresh allocation.
        //
        assert_eq!(pool.rent(8).len(), 8);
    }
}
