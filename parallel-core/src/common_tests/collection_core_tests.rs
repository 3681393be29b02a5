//! Single-threaded behavior of the guard-parameterized collections.

use std::sync::Arc;
use std::thread;

use crate::data_structures::{ArrayList, Queue, Stack};
use crate::error::CollectionError;
use crate::guard::Guard;

// =============================================================================
// Stack
// =============================================================================

/// Push 1..=4, pop four times in reverse, fifth pop is empty.
pub fn test_stack_lifo<G: Guard>() {
    let stack = Stack::<i32, G>::new();
    for i in 1..=4 {
        stack.push(i);
    }

    assert_eq!(stack.len(), 4);
    assert_eq!(stack.peek(), Some(4));

    for expected in (1..=4).rev() {
        assert_eq!(stack.pop(), Some(expected));
    }
    assert_eq!(stack.pop(), None);
    assert!(stack.is_empty());
}

pub fn test_stack_clear_and_reuse<G: Guard>() {
    let stack = Stack::<String, G>::new();
    for i in 0..10 {
        stack.push(i.to_string());
    }

    stack.clear();
    assert!(stack.is_empty());
    assert_eq!(stack.to_vec(), Ok(vec![]));

    stack.push("again".to_string());
    assert_eq!(stack.to_vec(), Ok(vec!["again".to_string()]));
}

pub fn test_stack_iter_fails_after_push<G: Guard>() {
    let stack = Stack::<i32, G>::new();
    stack.push(1);
    stack.push(2);

    let mut iter = stack.iter();
    assert_eq!(iter.next(), Some(Ok(2)));

    stack.push(3);
    assert_eq!(iter.next(), Some(Err(CollectionError::Revised)));
    assert_eq!(iter.next(), None);
}

// =============================================================================
// Queue
// =============================================================================

/// Enqueue 1..=4, dequeue in the same order, fifth dequeue is empty.
pub fn test_queue_fifo<G: Guard>() {
    let queue = Queue::<i32, G>::new();
    for i in 1..=4 {
        queue.enqueue(i);
    }

    assert_eq!(queue.len(), 4);
    assert_eq!(queue.peek(), Some(1));
    assert_eq!(queue.to_vec(), Ok(vec![1, 2, 3, 4]));

    for expected in 1..=4 {
        assert_eq!(queue.dequeue(), Some(expected));
    }
    assert_eq!(queue.dequeue(), None);
    assert!(queue.is_empty());
}

pub fn test_queue_clear_and_reuse<G: Guard>() {
    let queue = Queue::<Vec<u8>, G>::new();
    for i in 0..10u8 {
        queue.enqueue(vec![i; 4]);
    }

    queue.clear();
    assert!(queue.is_empty());
    assert_eq!(queue.dequeue(), None);

    queue.enqueue(vec![9]);
    assert_eq!(queue.dequeue(), Some(vec![9]));
}

/// A dequeue that starts after an enqueue has returned sees that element
/// before anything enqueued later.
pub fn test_queue_order_after_handoff<G: Guard + 'static>() {
    let queue = Arc::new(Queue::<u32, G>::new());

    for round in 0..100 {
        let producer = Arc::clone(&queue);
        thread::spawn(move || {
            producer.enqueue(round * 2);
            producer.enqueue(round * 2 + 1);
        })
        .join()
        .unwrap();

        assert_eq!(queue.dequeue(), Some(round * 2));
        assert_eq!(queue.dequeue(), Some(round * 2 + 1));
    }

    assert!(queue.is_empty());
}

// =============================================================================
// ArrayList
// =============================================================================

pub fn test_array_list_push_get_set<G: Guard>() {
    let list = ArrayList::<i32, G>::new();
    for i in 0..100 {
        list.push(i);
        assert_eq!(list.get(list.len() - 1), Ok(i));
    }

    assert_eq!(list.len(), 100);
    assert!(list.capacity() >= 100);

    list.set(42, -42).unwrap();
    assert_eq!(list.get(42), Ok(-42));
    assert_eq!(
        list.get(100),
        Err(CollectionError::IndexOutOfRange { index: 100, len: 100 })
    );
    assert_eq!(
        list.set(100, 0),
        Err(CollectionError::IndexOutOfRange { index: 100, len: 100 })
    );
}

/// K pushes and J pops leave K - J elements.
pub fn test_array_list_pop_back<G: Guard>() {
    let list = ArrayList::<u64, G>::new();
    for i in 0..50 {
        list.push(i);
    }
    for expected in (30..50).rev() {
        assert_eq!(list.pop_back(), Some(expected));
    }

    assert_eq!(list.len(), 30);
    assert_eq!(list.to_vec(), Ok((0..30).collect()));
}

pub fn test_array_list_search<G: Guard>() {
    let list = ArrayList::<&'static str, G>::new();
    for word in ["a", "b", "c", "b"] {
        list.push(word);
    }

    assert_eq!(list.index_of(&"b"), Some(1));
    assert!(list.contains(&"c"));
    assert!(!list.contains(&"z"));

    let mut dest = [""; 6];
    list.copy_to(&mut dest, 1).unwrap();
    assert_eq!(dest, ["", "a", "b", "c", "b", ""]);

    let mut short = [""; 3];
    assert_eq!(
        list.copy_to(&mut short, 0),
        Err(CollectionError::InsufficientSpace {
            required: 4,
            available: 3
        })
    );
}

pub fn test_array_list_exclusive_edits<G: Guard>() {
    let mut list = ArrayList::<i32, G>::new();
    for i in 0..10 {
        list.push(i);
    }

    list.insert(0, -1).unwrap();
    assert_eq!(list.get(0), Ok(-1));
    assert_eq!(list.get(10), Ok(9));

    assert_eq!(list.remove_at(1), Ok(0));
    assert!(list.remove(&5));
    assert!(!list.remove(&5));
    assert_eq!(list.to_vec(), Ok(vec![-1, 1, 2, 3, 4, 6, 7, 8, 9]));

    list.clear();
    assert!(list.is_empty());
    list.push(1);
    assert_eq!(list.to_vec(), Ok(vec![1]));
}

pub fn test_array_list_reserve_and_reduce<G: Guard>() {
    let mut list = ArrayList::<usize, G>::with_capacity(1000).unwrap();
    assert!(list.capacity() >= 1000);
    assert!(list.is_empty());

    for i in 0..10 {
        list.push(i);
    }
    list.reduce();

    assert!(list.capacity() < 1000);
    assert!(list.capacity() >= 10);
    assert_eq!(list.to_vec(), Ok((0..10).collect()));
}

// Not `Clone`: removal must hand the value over by move, and the collection
// must not keep another reference to it.
//
struct Owned(Arc<u32>);

pub fn test_removal_moves_values_out<G: Guard>() {
    let shared = Arc::new(0u32);

    let stack = Stack::<Owned, G>::new();
    let queue = Queue::<Owned, G>::new();
    let list = ArrayList::<Owned, G>::new();

    for _ in 0..4 {
        stack.push(Owned(Arc::clone(&shared)));
        queue.enqueue(Owned(Arc::clone(&shared)));
        list.push(Owned(Arc::clone(&shared)));
    }
    assert_eq!(Arc::strong_count(&shared), 13);

    for _ in 0..4 {
        let popped = stack.pop().map(|owned| owned.0);
        let dequeued = queue.dequeue().map(|owned| owned.0);
        let last = list.pop_back().map(|owned| owned.0);

        assert!(popped.is_some() && dequeued.is_some() && last.is_some());
    }

    assert!(stack.pop().is_none());
    assert!(queue.dequeue().is_none());
    assert!(list.pop_back().is_none());
    assert_eq!(Arc::strong_count(&shared), 1);
}
