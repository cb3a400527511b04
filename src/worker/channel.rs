//! Ordered message queue from a worker thread to its controller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A closable FIFO queue shared between threads.
///
/// Values are received in the order they were sent. Once closed, sends fail
/// but values already queued can still be drained.
pub struct Channel<T> {
    /// Queued values, oldest first
    queue: Mutex<VecDeque<T>>,
    /// Signalled on every send and on close
    not_empty: Condvar,
    /// Set once by `close`; never cleared
    closed: AtomicBool,
    /// Number of values accepted by `send`
    sent_count: AtomicUsize,
    /// Number of values handed out by the receive methods
    recv_count: AtomicUsize,
}

impl<T> Channel<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // A panicking sender cannot leave the queue half-updated, so a poisoned
    // lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a value. Returns it back if the channel is closed.
    pub fn send(&self, value: T) -> Result<(), T> {
        {
            let mut queue = self.lock();
            if self.closed.load(Ordering::Acquire) {
                return Err(value);
            }
            queue.push_back(value);
            self.sent_count.fetch_add(1, Ordering::Relaxed);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Receive a value, blocking while the queue is empty.
    /// Returns `None` once the channel is closed and drained.
    pub fn recv(&self) -> Option<T> {
        let mut queue = self.lock();
        loop {
            if let Some(value) = queue.pop_front() {
                self.recv_count.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            queue = self.not_empty.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock();
        loop {
            if let Some(value) = queue.pop_front() {
                self.recv_count.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            queue = self
                .not_empty
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        let value = self.lock().pop_front();
        if value.is_some() {
            self.recv_count.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    pub fn close(&self) {
        // Taking the lock orders the flag against a concurrent wait
        let _queue = self.lock();
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (sent, received) counts.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.sent_count.load(Ordering::Relaxed),
            self.recv_count.load(Ordering::Relaxed),
        )
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            closed: AtomicBool::new(false),
            sent_count: AtomicUsize::new(0),
            recv_count: AtomicUsize::new(0),
        }
    }
}
