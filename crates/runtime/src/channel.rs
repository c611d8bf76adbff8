//! Channels: the value-passing primitive between threads.
//!
//! A channel is `(open, mutex, cond, queue)`. Send enqueues and signals;
//! receive waits until the queue is non-empty or the channel is closed.
//! Closing wakes all waiters; receiving on a closed empty channel yields
//! a distinguished Closed answer.
//!
//! Blocking is sliced: the channel only ever blocks for a bounded step,
//! and the VM drives the wait loop so a blocked receiver still reaches
//! its GC-park and cancellation safepoints. Operations on a single
//! channel are totally ordered by the internal mutex.

use crate::value::Value;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct ChanInner {
    open: bool,
    queue: VecDeque<Value>,
}

#[derive(Debug)]
pub struct ChanState {
    inner: Mutex<ChanInner>,
    cond: Condvar,
}

/// One non-blocking receive attempt.
#[derive(Debug)]
pub enum TryRecv {
    Value(Value),
    Empty,
    Closed,
}

impl Default for ChanState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChanState {
    pub fn new() -> Self {
        ChanState {
            inner: Mutex::new(ChanInner { open: true, queue: VecDeque::new() }),
            cond: Condvar::new(),
        }
    }

    /// Enqueue and signal one waiter. Fails if the channel is closed.
    pub fn send(&self, v: Value) -> Result<(), Value> {
        let mut inner = self.inner.lock().expect("channel mutex poisoned");
        if !inner.open {
            return Err(v);
        }
        inner.queue.push_back(v);
        self.cond.notify_one();
        Ok(())
    }

    pub fn try_recv(&self) -> TryRecv {
        let mut inner = self.inner.lock().expect("channel mutex poisoned");
        match inner.queue.pop_front() {
            Some(v) => TryRecv::Value(v),
            None if inner.open => TryRecv::Empty,
            None => TryRecv::Closed,
        }
    }

    /// Block for at most `slice` waiting for activity. The caller loops,
    /// interleaving safepoint checks.
    pub fn wait_slice(&self, slice: Duration) {
        let inner = self.inner.lock().expect("channel mutex poisoned");
        if inner.queue.is_empty() && inner.open {
            let _ = self
                .cond
                .wait_timeout(inner, slice)
                .expect("channel mutex poisoned");
        }
    }

    /// Close and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("channel mutex poisoned");
        inner.open = false;
        self.cond.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().expect("channel mutex poisoned").open
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("channel mutex poisoned").queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of queued values; the collector marks these as roots so
    /// in-flight values survive until received.
    pub fn queued_values(&self) -> Vec<Value> {
        self.inner
            .lock()
            .expect("channel mutex poisoned")
            .queue
            .iter()
            .cloned()
            .collect()
    }
}
