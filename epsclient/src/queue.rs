//! Fixed-capacity FIFO between the application threads (producers) and a
//! channel worker (the only consumer). Overflow is reported to the
//! producer; the worker drains with `pop` until empty.

use crate::support::{EpsError, EpsResult};
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> BoundedQueue<T> {
        BoundedQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, item: T) -> EpsResult<()> {
        let mut items = self.items.lock().expect("queue lock poisoned");
        if items.len() >= self.capacity {
            return Err(EpsError::InvalidOperation("queue is full".to_string()));
        }
        items.push_back(item);
        Ok(())
    }

    pub fn pop(&self) -> Option<T> {
        self.items.lock().expect("queue lock poisoned").pop_front()
    }

    /// Drops everything queued. Pending items of a torn-down connection
    /// must not leak into the next one.
    pub fn clear(&self) {
        self.items.lock().expect("queue lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
