//! Cooperative deferred-work queue.
//!
//! Effects that the panel promises "after the next scheduling cycle" (focus
//! after activation, disposal after close, streamed inspection requests) are
//! queued here instead of on a rendering clock. The host, or a test, drives
//! the queue one tick at a time with [`Scheduler::run_pending_work`].
//!
//! # Tick semantics
//!
//! A tick runs exactly the items that were queued when the tick started, in
//! FIFO order. Work queued while a tick is running lands on the next tick.
//! This is what makes "focus is observable after two ticks" hold: the
//! activate-request runs on tick one and queues the focus for tick two.
//!
//! Nothing here blocks a thread. Items are async so deferred session
//! requests can await their reply inside the tick that issued them.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// A unit of deferred work: `() -> Future<Output = ()>`.
pub type DeferredFn = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct ScheduledWork {
    seq: u64,
    label: &'static str,
    work: DeferredFn,
}

#[derive(Default)]
struct Inner {
    seq_next: u64,
    ticks: u64,
    queue: VecDeque<ScheduledWork>,
}

/// Cloneable handle to a shared FIFO of deferred work.
///
/// # Example
///
/// ```rust
/// use console_panel::scheduler::Scheduler;
///
/// let scheduler = Scheduler::new();
/// scheduler.defer("noop", Box::new(|| Box::pin(async {})));
/// assert_eq!(scheduler.pending(), 1);
/// ```
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `work` for the next tick. Returns its sequence number.
    pub fn defer(&self, label: &'static str, work: DeferredFn) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.seq_next;
        inner.seq_next = inner.seq_next.wrapping_add(1);
        inner.queue.push_back(ScheduledWork { seq, label, work });
        seq
    }

    /// Queue a synchronous closure for the next tick.
    pub fn defer_sync<F>(&self, label: &'static str, work: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        self.defer(
            label,
            Box::new(move || {
                work();
                Box::pin(async {})
            }),
        )
    }

    /// Run one tick. Returns the number of items run.
    pub async fn run_pending_work(&self) -> usize {
        let batch: Vec<ScheduledWork> = {
            let mut inner = self.inner.lock().unwrap();
            inner.ticks += 1;
            inner.queue.drain(..).collect()
        };

        let count = batch.len();
        for item in batch {
            log::trace!("running deferred work #{} ({})", item.seq, item.label);
            (item.work)().await;
        }
        count
    }

    /// Run ticks until the queue is empty or `max_ticks` ticks have run.
    /// Returns the number of ticks run.
    pub async fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && !self.is_idle() {
            self.run_pending_work().await;
            ticks += 1;
        }
        ticks
    }

    /// Number of queued items.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Labels of queued items, in run order.
    pub fn pending_labels(&self) -> Vec<&'static str> {
        self.inner
            .lock()
            .unwrap()
            .queue
            .iter()
            .map(|item| item.label)
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.inner.lock().unwrap().ticks
    }

    /// Whether two handles share one queue.
    pub fn same_queue(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_label(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> DeferredFn {
        let log = log.clone();
        Box::new(move || {
            Box::pin(async move {
                log.lock().unwrap().push(label);
            })
        })
    }

    #[tokio::test]
    async fn runs_items_in_fifo_order() {
        let scheduler = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.defer("a", push_label(&log, "a"));
        scheduler.defer("b", push_label(&log, "b"));
        assert_eq!(scheduler.pending_labels(), vec!["a", "b"]);

        assert_eq!(scheduler.run_pending_work().await, 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert!(scheduler.is_idle());
    }

    #[tokio::test]
    async fn work_queued_during_a_tick_runs_on_the_next_tick() {
        let scheduler = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let s = scheduler.clone();
        let l = log.clone();
        scheduler.defer_sync("outer", move || {
            l.lock().unwrap().push("outer");
            s.defer("inner", push_label(&l, "inner"));
        });

        scheduler.run_pending_work().await;
        assert_eq!(*log.lock().unwrap(), vec!["outer"]);
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_pending_work().await;
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
        assert_eq!(scheduler.ticks(), 2);
    }

    #[tokio::test]
    async fn run_until_idle_is_bounded() {
        let scheduler = Scheduler::new();

        fn requeue(s: Scheduler) -> DeferredFn {
            Box::new(move || {
                Box::pin(async move {
                    let next = s.clone();
                    s.defer("again", requeue(next));
                })
            })
        }
        scheduler.defer("again", requeue(scheduler.clone()));

        assert_eq!(scheduler.run_until_idle(5).await, 5);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn empty_tick_still_counts() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.run_pending_work().await, 0);
        assert_eq!(scheduler.ticks(), 1);
        assert_eq!(scheduler.run_until_idle(3).await, 0);
    }

    #[test]
    fn clones_share_one_queue() {
        let a = Scheduler::new();
        let b = a.clone();
        assert!(a.same_queue(&b));
        assert!(!a.same_queue(&Scheduler::new()));
        b.defer_sync("x", || {});
        assert_eq!(a.pending(), 1);
    }
}
