//! Fan-out of parsed quotes to in-process consumers.
//!
//! Two channels per quote:
//!
//! 1. **Callbacks**: invoked synchronously on the worker in registration
//!    order. A callback that returns `Err` or panics is counted and logged;
//!    the remaining callbacks still run.
//! 2. **Pull queue**: a bounded crossbeam channel. A full queue drops the
//!    newest quote and counts it; the worker never blocks on it.
//!
//! The subscriber list is copy-on-write: delivery clones an `Arc` of the
//! current list once per quote, and `subscribe`/`unsubscribe` install a new
//! list. Changes therefore apply from the next quote on, and delivery never
//! holds the lock while running callbacks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use qf_core::Quote;
use qf_core::error::SubscriberError;
use tracing::warn;

use crate::stats::FeedCounters;

/// Subscriber callback. Return `Err` to report a failure for this quote.
pub type QuoteCallback = Arc<dyn Fn(&Quote) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by [`Dispatcher::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type SubscriberList = Arc<Vec<(SubscriberId, QuoteCallback)>>;

/// What happened to one quote during fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
    pub queued: bool,
}

pub struct Dispatcher {
    label: String,
    subscribers: Mutex<SubscriberList>,
    next_id: AtomicU64,
    tx: Sender<Arc<Quote>>,
    rx: Receiver<Arc<Quote>>,
    counters: Arc<FeedCounters>,
}

impl Dispatcher {
    pub fn new(label: impl Into<String>, queue_capacity: usize, counters: Arc<FeedCounters>) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(queue_capacity.max(1));
        Self {
            label: label.into(),
            subscribers: Mutex::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
            tx,
            rx,
            counters,
        }
    }

    /// Register a callback. It receives every quote dispatched after this call.
    pub fn subscribe(&self, cb: QuoteCallback) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.lock();
        let mut list: Vec<_> = guard.iter().cloned().collect();
        list.push((id, cb));
        *guard = Arc::new(list);
        id
    }

    /// Remove a callback. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut guard = self.lock();
        if !guard.iter().any(|(sid, _)| *sid == id) {
            return false;
        }
        let list: Vec<_> = guard.iter().filter(|(sid, _)| *sid != id).cloned().collect();
        *guard = Arc::new(list);
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `quote` to every current subscriber, then offer it to the queue.
    pub fn dispatch(&self, quote: &Arc<Quote>) -> DispatchOutcome {
        let subscribers = Arc::clone(&*self.lock());
        let mut outcome = DispatchOutcome::default();

        for (id, cb) in subscribers.iter() {
            match invoke(cb, quote) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    FeedCounters::incr(&self.counters.subscriber_errors);
                    warn!("[{}] subscriber {id:?} on {}: {e}", self.label, quote.code);
                }
            }
        }

        match self.tx.try_send(Arc::clone(quote)) {
            Ok(()) => outcome.queued = true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                FeedCounters::incr(&self.counters.dropped_queue_full);
            }
        }
        outcome
    }

    /// Wait up to `timeout` for the next queued quote.
    pub fn poll(&self, timeout: Duration) -> Option<Arc<Quote>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take the next queued quote without waiting.
    pub fn try_poll(&self) -> Option<Arc<Quote>> {
        self.rx.try_recv().ok()
    }

    pub fn queue_len(&self) -> usize {
        self.rx.len()
    }

    fn lock(&self) -> MutexGuard<'_, SubscriberList> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run one callback, turning both `Err` and panics into [`SubscriberError`].
fn invoke(cb: &QuoteCallback, quote: &Quote) -> Result<(), SubscriberError> {
    match catch_unwind(AssertUnwindSafe(|| cb(quote))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SubscriberError::Failed(e.to_string())),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(SubscriberError::Panicked(msg))
        }
    }
}
