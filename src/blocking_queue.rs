//! A FIFO work queue with blocking dequeue and a one-shot completion signal.
//!
//! [BlockingQueue::enqueue] never blocks.  [BlockingQueue::dequeue] blocks while the queue is empty, until someone calls
//! [BlockingQueue::set_completed], after which pending items are still handed out and then every call returns `None`.
use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct QueueState<T> {
    items: VecDeque<T>,
    completed: bool,
}

pub struct BlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        BlockingQueue::with_capacity(0)
    }
}

impl<T> BlockingQueue<T> {
    pub fn with_capacity(capacity: usize) -> BlockingQueue<T> {
        BlockingQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                completed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn enqueue(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.available.notify_one();
    }

    /// Take the next item, blocking while the queue is empty and not completed.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();
        while !state.completed && state.items.is_empty() {
            self.available.wait(&mut state);
        }
        state.items.pop_front()
    }

    /// Take everything currently pending without blocking.
    pub fn drain_available(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }

    /// Wait until something is pending or the queue is completed, then take everything.
    ///
    /// An empty result means the queue is completed and drained.
    pub fn drain_blocking(&self) -> Vec<T> {
        let mut state = self.state.lock();
        while !state.completed && state.items.is_empty() {
            self.available.wait(&mut state);
        }
        state.items.drain(..).collect()
    }

    /// Mark the queue as completed and wake every waiter.  Idempotent.
    pub fn set_completed(&self) {
        self.state.lock().completed = true;
        self.available.notify_all();
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
