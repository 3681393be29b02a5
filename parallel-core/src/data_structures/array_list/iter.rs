//! Iterator implementation for ArrayList.

use std::sync::atomic::Ordering;

use super::ArrayList;
use crate::error::{CollectionError, CollectionResult};
use crate::guard::Guard;

/// Fail-fast iterator over an [`ArrayList`], by ascending index.
///
/// The length is fixed when the iterator is created. Any completed push, pop
/// or set after that makes the next call yield `Err(CollectionError::Revised)`
/// and ends the iteration.
///
pub struct Iter<'a, T, G: Guard> {
    list: &'a ArrayList<T, G>,
    _pin: G::ReadGuard,
    index: usize,
    len: usize,
    revision: u64,
    done: bool,
}

impl<'a, T, G: Guard> Iter<'a, T, G> {
    pub(super) fn new(list: &'a ArrayList<T, G>) -> Self {
        let pin = G::pin();
        let revision = list.revision.load(Ordering::Acquire);
        let len = list.settled_descriptor().count;

        Iter {
            list,
            _pin: pin,
            index: 0,
            len,
            revision,
            done: false,
        }
    }
}

impl<T: Clone, G: Guard> Iterator for Iter<'_, T, G> {
    type Item = CollectionResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.list.revision.load(Ordering::Acquire) != self.revision {
            self.done = true;
            return Some(Err(CollectionError::Revised));
        }

        if self.index >= self.len {
            self.done = true;
            return None;
        }

        let cell = self.list.slot(self.index).load(Ordering::Acquire);
        self.index += 1;

        match unsafe { (*cell).read(T::clone) } {
            Some(value) => Some(Ok(value)),
            None => {
                self.done = true;
                Some(Err(CollectionError::Revised))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::data_structures::ArrayList;
    use crate::error::CollectionError;
    use crate::guard::DeferredGuard;

    #[test]
    fn test_iter_in_index_order() {
        let list: ArrayList<i32, DeferredGuard> = ArrayList::new();
        for i in 0..20 {
            list.push(i);
        }

        let values: Vec<i32> = list.iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_iter_fails_after_set() {
        let list: ArrayList<i32, DeferredGuard> = ArrayList::new();
        list.push(1);
        list.push(2);

        let mut iter = list.iter();
        assert_eq!(iter.next(), Some(Ok(1)));

        list.set(0, 10).unwrap();
        assert_eq!(iter.next(), Some(Err(CollectionError::Revised)));
        assert_eq!(iter.next(), None);
    }
}
