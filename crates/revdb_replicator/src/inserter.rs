//! Batched insertion of inbound revisions.
//!
//! Revisions received from the peer arrive one at a time but are committed
//! in batches: the pending list is flushed when it reaches the batch size,
//! or when no new revision has arrived for the debounce delay.

use crate::error::{ReplError, ReplResult};
use crate::types::RevToInsert;
use parking_lot::Mutex;
use revdb_storage::Sequence;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Callback that schedules a flush of the pending list.
pub type FlushFn = Arc<dyn Fn() + Send + Sync>;

/// A one-shot timer that restarts whenever it is armed again.
///
/// The timer runs as a task on the given runtime and is cancelled when
/// dropped.
#[derive(Debug)]
pub struct DebounceTimer {
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    /// Creates an idle timer on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            task: Mutex::new(None),
        }
    }

    /// Runs `action` after `delay`, replacing any pending action.
    pub fn arm<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    /// Cancels the pending action, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.task.lock().take() {
            previous.abort();
        }
    }

    /// Returns true if an action is waiting to run.
    pub fn is_armed(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A revision waiting for commit, with the channel its result goes to.
#[derive(Debug)]
pub struct PendingInsert {
    /// The revision.
    pub rev: RevToInsert,
    /// Receives the committed sequence or the failure.
    pub reply: oneshot::Sender<ReplResult<Sequence>>,
}

impl PendingInsert {
    /// Answers the waiting caller. A caller that stopped waiting is ignored.
    pub fn complete(self, result: ReplResult<Sequence>) {
        let _ = self.reply.send(result);
    }
}

#[derive(Debug, Default)]
struct Queue {
    revs: Vec<PendingInsert>,
    closed: bool,
}

/// The pending list of inbound revisions.
///
/// This is the only worker state touched outside the worker thread: callers
/// of `insert_revision` push onto it and the debounce timer fires against
/// it. The list lock is never held while storage is accessed.
pub struct RevisionInserter {
    queue: Mutex<Queue>,
    batch_size: usize,
    delay: Duration,
    timer: DebounceTimer,
    flush: FlushFn,
}

impl RevisionInserter {
    /// Creates an inserter that calls `flush` when a batch is due.
    pub fn new(runtime: Handle, batch_size: usize, delay: Duration, flush: FlushFn) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            batch_size: batch_size.max(1),
            delay,
            timer: DebounceTimer::new(runtime),
            flush,
        }
    }

    /// Queues a revision and returns the receiver of its commit result.
    ///
    /// After [`RevisionInserter::close`] the result is
    /// [`ReplError::ConnectionClosed`] immediately.
    pub fn queue(&self, rev: RevToInsert) -> oneshot::Receiver<ReplResult<Sequence>> {
        let (reply, receiver) = oneshot::channel();
        let flush_now = {
            let mut queue = self.queue.lock();
            if queue.closed {
                let _ = reply.send(Err(ReplError::ConnectionClosed));
                return receiver;
            }
            queue.revs.push(PendingInsert { rev, reply });
            queue.revs.len() >= self.batch_size
        };

        if flush_now {
            self.timer.cancel();
            (self.flush)();
        } else {
            let flush = Arc::clone(&self.flush);
            self.timer.arm(self.delay, move || flush());
        }
        receiver
    }

    /// Takes every pending revision, in queue order.
    pub fn take_pending(&self) -> Vec<PendingInsert> {
        std::mem::take(&mut self.queue.lock().revs)
    }

    /// Returns the number of pending revisions.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().revs.len()
    }

    /// Rejects all later insertions and returns the revisions that were
    /// still pending.
    pub fn close(&self) -> Vec<PendingInsert> {
        self.timer.cancel();
        let mut queue = self.queue.lock();
        queue.closed = true;
        std::mem::take(&mut queue.revs)
    }

    /// Returns true once [`RevisionInserter::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }
}
