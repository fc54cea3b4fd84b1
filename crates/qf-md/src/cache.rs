//! Bounded latest-value cache keyed by instrument code.
//!
//! One writer (the session worker) and any number of readers. Quotes are
//! stored as `Arc<Quote>` and swapped whole under a short-held mutex, so a
//! reader sees either the previous record or the new one, never a mix.
//!
//! # Eviction
//!
//! When the map grows past its capacity, the entry with the oldest
//! `source_recv_time_us` goes. The single writer stamps quotes as it parses
//! them, so put order is receive-time order and eviction can follow an
//! insertion log instead of scanning. The log keeps superseded positions
//! around (each entry remembers the sequence number it was written at) and is
//! compacted once stale positions outnumber live ones.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;
use qf_core::Quote;

struct Slot {
    quote: Arc<Quote>,
    seq: u64,
}

struct CacheInner {
    map: AHashMap<String, Slot>,
    /// `(seq, code)` in put order. May hold stale positions.
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

/// Latest quote per instrument code.
pub struct QuoteCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl QuoteCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(CacheInner {
                map: AHashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            capacity,
        }
    }

    /// Upsert `quote` under its code, replacing any older record
    /// unconditionally. Returns the quotes evicted to stay within capacity.
    pub fn put(&self, quote: Arc<Quote>) -> Vec<Arc<Quote>> {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let code = quote.code.clone();
        inner.order.push_back((seq, code.clone()));
        inner.map.insert(code, Slot { quote, seq });

        let mut evicted = Vec::new();
        while inner.map.len() > self.capacity {
            let Some((seq, code)) = inner.order.pop_front() else { break };
            if inner.map.get(&code).is_some_and(|s| s.seq == seq)
                && let Some(slot) = inner.map.remove(&code)
            {
                evicted.push(slot.quote);
            }
        }

        if inner.order.len() > 2 * self.capacity + 64 {
            compact(&mut inner);
        }
        evicted
    }

    pub fn get(&self, code: &str) -> Option<Arc<Quote>> {
        self.lock().map.get(code).map(|s| Arc::clone(&s.quote))
    }

    /// Consistent copy of every cached quote.
    pub fn snapshot(&self) -> HashMap<String, Arc<Quote>> {
        self.lock()
            .map
            .iter()
            .map(|(code, slot)| (code.clone(), Arc::clone(&slot.quote)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rebuild the insertion log from live entries only.
fn compact(inner: &mut CacheInner) {
    let mut live: Vec<(u64, String)> =
        inner.map.iter().map(|(code, slot)| (slot.seq, code.clone())).collect();
    live.sort_unstable_by_key(|(seq, _)| *seq);
    inner.order = live.into();
}
