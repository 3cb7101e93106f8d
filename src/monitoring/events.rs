/*!
 * Observability Events
 * Strongly-typed events for circuit transitions, budget signals, and
 * background maintenance, distributed over a lock-free bounded ring
 */

use crate::core::limits::EVENT_RING_SIZE;
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Event severity for filtering and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

/// Which stage produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    Breaker,
    Sampler,
    Cost,
    Registry,
    Pipeline,
}

/// Which budget period a cost event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Daily,
    Monthly,
}

/// Event payload, one variant per observable occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Payload {
    CircuitOpened {
        database: String,
        consecutive_failures: u32,
        failure_percentage: Option<f64>,
    },
    CircuitHalfOpen {
        database: String,
    },
    CircuitClosed {
        database: String,
    },
    CircuitReopened {
        database: String,
    },
    BudgetAlert {
        database: String,
        period: BudgetPeriod,
        consumed_usd: f64,
        budget_usd: f64,
        percent: f64,
    },
    BudgetExhausted {
        database: String,
        period: BudgetPeriod,
    },
    EnforcementCleared {
        database: String,
    },
    RatesAdjusted {
        database: String,
        select: f64,
        dml: f64,
        audit: f64,
    },
    EntriesReaped {
        count: usize,
    },
}

/// Unified observability event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic timestamp, nanoseconds since process start.
    pub timestamp_ns: u64,
    pub severity: Severity,
    pub category: Category,
    pub payload: Payload,
}

impl Event {
    #[inline]
    pub fn new(severity: Severity, category: Category, payload: Payload) -> Self {
        Self {
            timestamp_ns: Self::now_ns(),
            severity,
            category,
            payload,
        }
    }

    #[inline]
    fn now_ns() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

/// Stream statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStats {
    pub events_produced: u64,
    pub events_consumed: u64,
    pub events_dropped: u64,
    pub active_subscribers: usize,
}

/// Lock-free MPMC event ring. Publishing never blocks record processing;
/// a full ring drops the event and counts the drop.
pub struct EventStream {
    queue: Arc<ArrayQueue<Event>>,
    produced: Arc<AtomicU64>,
    consumed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    subscribers: Arc<AtomicUsize>,
}

impl EventStream {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(EVENT_RING_SIZE)),
            produced: Arc::new(AtomicU64::new(0)),
            consumed: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event; returns false if the ring was full.
    #[inline]
    pub fn publish(&self, event: Event) -> bool {
        match self.queue.push(event) {
            Ok(()) => {
                self.produced.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    #[inline]
    pub fn try_consume(&self) -> Option<Event> {
        self.queue.pop().map(|event| {
            self.consumed.fetch_add(1, Ordering::Relaxed);
            event
        })
    }

    pub fn subscribe(&self) -> Subscriber {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        Subscriber {
            stream: self.clone(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            events_produced: self.produced.load(Ordering::Relaxed),
            events_consumed: self.consumed.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            active_subscribers: self.subscribers.load(Ordering::Relaxed),
        }
    }
}

impl Clone for EventStream {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            produced: Arc::clone(&self.produced),
            consumed: Arc::clone(&self.consumed),
            dropped: Arc::clone(&self.dropped),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer handle onto the event ring.
pub struct Subscriber {
    stream: EventStream,
}

impl Subscriber {
    #[inline]
    pub fn next(&mut self) -> Option<Event> {
        self.stream.try_consume()
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next() {
            events.push(event);
        }
        events
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.stream.subscribers.fetch_sub(1, Ordering::Relaxed);
    }
}
