//! FIFO hand-off queue between executors
//!
//! Each queue owns its own lock. Removal never blocks indefinitely: an idle
//! executor either sleeps or waits on the queue's condition variable for at
//! most the configured backoff, then reports "empty" so the caller can
//! re-check the termination condition.

use crate::config::IdlePolicy;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Mutex-protected FIFO with a "recently empty" hint
pub(crate) struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    /// Set whenever a pop finds nothing, cleared whenever a pop succeeds.
    empty_hint: AtomicBool,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            empty_hint: AtomicBool::new(false),
        }
    }

    /// Append at the tail and wake one parked consumer
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Remove from the head without waiting
    pub fn pop(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        self.record(item.is_none());
        item
    }

    /// Remove from the head, idling for at most `backoff` if the queue is empty
    pub fn next(&self, idle: IdlePolicy, backoff: Duration) -> Option<T> {
        match idle {
            IdlePolicy::Poll => {
                let item = self.pop();
                if item.is_none() {
                    thread::sleep(backoff);
                }
                item
            }
            IdlePolicy::Park => {
                let mut items = self.items.lock();
                if items.is_empty() {
                    self.available.wait_for(&mut items, backoff);
                }
                let item = items.pop_front();
                drop(items);
                self.record(item.is_none());
                item
            }
        }
    }

    /// Wake every parked consumer so it re-checks its exit condition
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the last pop found the queue empty
    pub fn recently_empty(&self) -> bool {
        self.empty_hint.load(Ordering::Acquire)
    }

    fn record(&self, empty: bool) {
        self.empty_hint.store(empty, Ordering::Release);
    }
}
