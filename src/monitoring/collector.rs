/*!
 * Collector
 * Per-stage admission counters plus the event stream, behind one handle
 * every stage clones
 */

use crate::core::types::{Decision, DropReason};
use crate::monitoring::events::{Event, EventStream, StreamStats, Subscriber};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic admission counters.
#[derive(Debug, Default)]
struct Counters {
    records_seen: AtomicU64,
    kept: AtomicU64,
    dropped_circuit_open: AtomicU64,
    dropped_duplicate: AtomicU64,
    dropped_not_sampled: AtomicU64,
    dropped_rate_limited: AtomicU64,
    dropped_budget: AtomicU64,
    circuit_transitions: AtomicU64,
    budget_alerts: AtomicU64,
    entries_reaped: AtomicU64,
}

/// Shared observability handle: counters plus event stream.
pub struct Collector {
    counters: Arc<Counters>,
    stream: EventStream,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            stream: EventStream::new(),
        }
    }

    /// Publish an event.
    #[inline]
    pub fn emit(&self, event: Event) {
        self.stream.publish(event);
    }

    /// Count a final admission decision.
    #[inline]
    pub fn record_decision(&self, decision: Decision) {
        self.counters.records_seen.fetch_add(1, Ordering::Relaxed);
        let counter = match decision {
            Decision::Keep => &self.counters.kept,
            Decision::Drop(DropReason::CircuitOpen) => &self.counters.dropped_circuit_open,
            Decision::Drop(DropReason::Duplicate) => &self.counters.dropped_duplicate,
            Decision::Drop(DropReason::NotSampled) => &self.counters.dropped_not_sampled,
            Decision::Drop(DropReason::RateLimited) => &self.counters.dropped_rate_limited,
            Decision::Drop(DropReason::BudgetExceeded) => &self.counters.dropped_budget,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self) {
        self.counters
            .circuit_transitions
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_budget_alert(&self) {
        self.counters.budget_alerts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reaped(&self, count: usize) {
        self.counters
            .entries_reaped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn subscribe(&self) -> Subscriber {
        self.stream.subscribe()
    }

    pub fn stream_stats(&self) -> StreamStats {
        self.stream.stats()
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let c = &self.counters;
        CountersSnapshot {
            records_seen: c.records_seen.load(Ordering::Relaxed),
            kept: c.kept.load(Ordering::Relaxed),
            dropped_circuit_open: c.dropped_circuit_open.load(Ordering::Relaxed),
            dropped_duplicate: c.dropped_duplicate.load(Ordering::Relaxed),
            dropped_not_sampled: c.dropped_not_sampled.load(Ordering::Relaxed),
            dropped_rate_limited: c.dropped_rate_limited.load(Ordering::Relaxed),
            dropped_budget: c.dropped_budget.load(Ordering::Relaxed),
            circuit_transitions: c.circuit_transitions.load(Ordering::Relaxed),
            budget_alerts: c.budget_alerts.load(Ordering::Relaxed),
            entries_reaped: c.entries_reaped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Collector {
    fn clone(&self) -> Self {
        Self {
            counters: Arc::clone(&self.counters),
            stream: self.stream.clone(),
        }
    }
}

/// Point-in-time copy of the admission counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub records_seen: u64,
    pub kept: u64,
    pub dropped_circuit_open: u64,
    pub dropped_duplicate: u64,
    pub dropped_not_sampled: u64,
    pub dropped_rate_limited: u64,
    pub dropped_budget: u64,
    pub circuit_transitions: u64,
    pub budget_alerts: u64,
    pub entries_reaped: u64,
}

impl CountersSnapshot {
    /// Total dropped across all reasons.
    pub fn dropped(&self) -> u64 {
        self.dropped_circuit_open
            + self.dropped_duplicate
            + self.dropped_not_sampled
            + self.dropped_rate_limited
            + self.dropped_budget
    }
}
