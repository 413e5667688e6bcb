// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Quiescence tracking.
//!
//! Pending subtree tasks are partitioned into a streaming and a
//! non-streaming set. The initial flush waits for the non-streaming set
//! only; the response closes once both are empty. A task moves
//! `Pending -> Settled` exactly once.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::debug;

static NEXT_TASK: AtomicU64 = AtomicU64::new(1);

/// Handle of one pending subtree task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// A fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_TASK.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Which partition a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// May still be pending when the initial flush happens.
    Streaming,
    /// Blocks the initial flush.
    NonStreaming,
}

/// Snapshot of pending task counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuiescenceState {
    /// Pending non-streaming tasks.
    pub non_streaming: usize,
    /// Pending streaming tasks.
    pub streaming: usize,
}

impl QuiescenceState {
    /// No non-streaming task pending.
    pub fn initial_flush_ready(self) -> bool {
        self.non_streaming == 0
    }

    /// Nothing pending at all.
    pub fn fully_quiescent(self) -> bool {
        self.non_streaming == 0 && self.streaming == 0
    }
}

/// Pending-task bookkeeping for one response.
///
/// Owned and mutated by the writer actor only. Observers get a
/// [`QuiescenceSignal`] through [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct QuiescenceTracker {
    prevent_streaming: bool,
    streaming: HashSet<TaskId>,
    non_streaming: HashSet<TaskId>,
    published: watch::Sender<QuiescenceState>,
}

impl QuiescenceTracker {
    /// Tracker; with `prevent_streaming` every task counts as non-streaming.
    pub fn new(prevent_streaming: bool) -> Self {
        let (published, _) = watch::channel(QuiescenceState::default());
        Self {
            prevent_streaming,
            streaming: HashSet::new(),
            non_streaming: HashSet::new(),
            published,
        }
    }

    /// Register a pending task in `region`.
    pub fn begin(&mut self, task: TaskId, region: Region) {
        let region = if self.prevent_streaming {
            Region::NonStreaming
        } else {
            region
        };
        match region {
            Region::Streaming => self.streaming.insert(task),
            Region::NonStreaming => self.non_streaming.insert(task),
        };
        debug!(%task, ?region, "task pending");
        self.publish();
    }

    /// Register a streaming task.
    pub fn begin_streaming(&mut self, task: TaskId) {
        self.begin(task, Region::Streaming);
    }

    /// Register a non-streaming task.
    pub fn begin_non_streaming(&mut self, task: TaskId) {
        self.begin(task, Region::NonStreaming);
    }

    /// Settle `task`. Returns `false` if it was not pending.
    pub fn settle(&mut self, task: TaskId) -> bool {
        let removed = self.streaming.remove(&task) || self.non_streaming.remove(&task);
        if removed {
            debug!(%task, "task settled");
            self.publish();
        }
        removed
    }

    /// Current counts.
    pub fn state(&self) -> QuiescenceState {
        QuiescenceState {
            non_streaming: self.non_streaming.len(),
            streaming: self.streaming.len(),
        }
    }

    /// No non-streaming task pending.
    pub fn initial_flush_ready(&self) -> bool {
        self.non_streaming.is_empty()
    }

    /// Nothing pending at all.
    pub fn fully_quiescent(&self) -> bool {
        self.non_streaming.is_empty() && self.streaming.is_empty()
    }

    /// Observer for this tracker.
    pub fn subscribe(&self) -> QuiescenceSignal {
        QuiescenceSignal {
            rx: self.published.subscribe(),
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.state());
    }
}

/// Awaitable view of a [`QuiescenceTracker`].
#[derive(Debug, Clone)]
pub struct QuiescenceSignal {
    rx: watch::Receiver<QuiescenceState>,
}

impl QuiescenceSignal {
    /// Latest published counts.
    pub fn current(&self) -> QuiescenceState {
        *self.rx.borrow()
    }

    /// Wait until no non-streaming task is pending.
    ///
    /// Returns `false` if the tracker went away first.
    pub async fn wait_initial_flush(&mut self) -> bool {
        self.rx
            .wait_for(|s| s.initial_flush_ready())
            .await
            .is_ok()
    }

    /// Wait until nothing is pending.
    ///
    /// Returns `false` if the tracker went away first.
    pub async fn wait_full_quiescence(&mut self) -> bool {
        self.rx.wait_for(|s| s.fully_quiescent()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn streaming_tasks_do_not_block_initial_flush() {
        let mut tracker = QuiescenceTracker::new(false);
        let t1 = TaskId::next();
        let t2 = TaskId::next();
        tracker.begin_non_streaming(t1);
        tracker.begin_streaming(t2);
        assert!(!tracker.initial_flush_ready());

        assert!(tracker.settle(t1));
        assert!(tracker.initial_flush_ready());
        assert!(!tracker.fully_quiescent());

        assert!(tracker.settle(t2));
        assert!(tracker.fully_quiescent());
        assert!(!tracker.settle(t2));
    }

    #[test]
    fn prevent_streaming_forces_everything_non_streaming() {
        let mut tracker = QuiescenceTracker::new(true);
        tracker.begin_streaming(TaskId::next());
        assert_eq!(
            tracker.state(),
            QuiescenceState {
                non_streaming: 1,
                streaming: 0
            }
        );
        assert!(!tracker.initial_flush_ready());
    }

    #[tokio::test]
    async fn signal_resolves_on_settle() {
        let mut tracker = QuiescenceTracker::new(false);
        let t1 = TaskId::next();
        let t2 = TaskId::next();
        tracker.begin_non_streaming(t1);
        tracker.begin_streaming(t2);
        let mut signal = tracker.subscribe();

        let waiter = tokio::spawn(async move {
            let flushed = signal.wait_initial_flush().await;
            (flushed, signal.current())
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        tracker.settle(t1);
        let (flushed, state) = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(flushed);
        assert_eq!(state.streaming, 1);
    }

    #[tokio::test]
    async fn signal_reports_dropped_tracker() {
        let mut tracker = QuiescenceTracker::new(false);
        tracker.begin_streaming(TaskId::next());
        let mut signal = tracker.subscribe();
        drop(tracker);
        assert!(!signal.wait_full_quiescence().await);
    }
}
