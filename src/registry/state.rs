/*!
 * Database Health State
 * Per-database circuit, failure window, sampling rates, and budget accounts
 *
 * All fields are mutated only under the owning key's registry lock. The
 * circuit is a tagged enum so illegal combinations (open with a failure
 * count, closed with an opened_at) are unrepresentable.
 */

use crate::core::types::QueryType;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use time::{Date, Month};

/// Circuit breaker state, with state-specific data inside each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Records pass through; failures accumulate.
    Closed { consecutive_failures: u32 },
    /// All records dropped until the recovery timeout elapses.
    Open { opened_at: Instant },
    /// A bounded number of probes per health-check interval pass through.
    HalfOpen {
        probes_used: u32,
        window_started_at: Instant,
    },
}

impl CircuitState {
    pub fn kind(&self) -> CircuitStateKind {
        match self {
            CircuitState::Closed { .. } => CircuitStateKind::Closed,
            CircuitState::Open { .. } => CircuitStateKind::Open,
            CircuitState::HalfOpen { .. } => CircuitStateKind::HalfOpen,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self {
            CircuitState::Closed {
                consecutive_failures,
            } => *consecutive_failures,
            _ => 0,
        }
    }
}

/// Serializable circuit state discriminant for snapshots and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateKind {
    Closed,
    Open,
    HalfOpen,
}

/// Fixed-size circular buffer of recent collection outcomes.
///
/// Count-based rather than wall-clock so memory is bounded and the
/// statistic cannot drift on idle databases.
#[derive(Debug, Clone)]
pub struct FailureWindow {
    slots: Vec<bool>,
    head: usize,
    filled: usize,
    failures: usize,
}

impl FailureWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![false; capacity],
            head: 0,
            filled: 0,
            failures: 0,
        }
    }

    /// Record one classified outcome. Unknown outcomes are excluded by the
    /// caller and never reach the window.
    pub fn record(&mut self, failure: bool) {
        if self.filled == self.slots.len() {
            if self.slots[self.head] {
                self.failures -= 1;
            }
        } else {
            self.filled += 1;
        }
        self.slots[self.head] = failure;
        if failure {
            self.failures += 1;
        }
        self.head = (self.head + 1) % self.slots.len();
    }

    /// Failure percentage once the window has filled; the percentage
    /// trigger is meaningless over a handful of samples.
    pub fn percentage_if_full(&self) -> Option<f64> {
        if self.filled == self.slots.len() {
            Some(self.failures as f64 / self.filled as f64 * 100.0)
        } else {
            None
        }
    }

    /// Percentage over whatever has been observed, for diagnostics.
    pub fn observed_percentage(&self) -> Option<f64> {
        if self.filled > 0 {
            Some(self.failures as f64 / self.filled as f64 * 100.0)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.slots.fill(false);
        self.head = 0;
        self.filled = 0;
        self.failures = 0;
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}

/// Consumption within one budget period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodUsage {
    pub consumed_bytes: u64,
    pub events: u64,
    /// Alert latch; raised once per period at the alert threshold.
    pub alerted: bool,
}

impl PeriodUsage {
    fn reset(&mut self) {
        *self = PeriodUsage::default();
    }
}

/// Daily and monthly budget accounts for one database.
#[derive(Debug, Clone)]
pub struct BudgetAccount {
    pub daily: PeriodUsage,
    pub monthly: PeriodUsage,
    pub daily_period: Date,
    pub monthly_period: (i32, Month),
    /// Set when a budget is exhausted with enforcement enabled; consulted
    /// by the sampler's feedback loop and cleared at rollover.
    pub enforced: bool,
}

impl BudgetAccount {
    pub fn new(today: Date) -> Self {
        Self {
            daily: PeriodUsage::default(),
            monthly: PeriodUsage::default(),
            daily_period: today,
            monthly_period: (today.year(), today.month()),
            enforced: false,
        }
    }

    /// Roll periods forward if the wall clock crossed a boundary.
    /// Returns true if any period was reset. The caller holds the key lock,
    /// so rollover and accounting cannot race.
    pub fn roll_over(&mut self, today: Date) -> bool {
        let mut rolled = false;
        if today != self.daily_period {
            self.daily.reset();
            self.daily_period = today;
            rolled = true;
        }
        let month_key = (today.year(), today.month());
        if month_key != self.monthly_period {
            self.monthly.reset();
            self.monthly_period = month_key;
            rolled = true;
        }
        if rolled {
            self.enforced = false;
        }
        rolled
    }

    /// Account one record against both periods.
    pub fn charge(&mut self, bytes: u64) {
        self.daily.consumed_bytes += bytes;
        self.daily.events += 1;
        self.monthly.consumed_bytes += bytes;
        self.monthly.events += 1;
    }
}

/// The full per-database entry owned by the registry.
#[derive(Debug, Clone)]
pub struct HealthState {
    pub circuit: CircuitState,
    pub window: FailureWindow,
    /// Current sampling rate per query type, as fractions in [0, 1].
    /// Seeded from configuration, adjusted by the sampler's feedback loop.
    pub rates: [f64; QueryType::COUNT],
    pub budget: BudgetAccount,
    pub last_seen: Instant,
}

impl HealthState {
    pub fn new(
        rates: [f64; QueryType::COUNT],
        window_size: usize,
        now: Instant,
        today: Date,
    ) -> Self {
        Self {
            circuit: CircuitState::Closed {
                consecutive_failures: 0,
            },
            window: FailureWindow::new(window_size),
            rates,
            budget: BudgetAccount::new(today),
            last_seen: now,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            circuit: self.circuit.kind(),
            consecutive_failures: self.circuit.consecutive_failures(),
            failure_percentage: self.window.observed_percentage(),
            rates: self.rates,
            daily_consumed_bytes: self.budget.daily.consumed_bytes,
            monthly_consumed_bytes: self.budget.monthly.consumed_bytes,
            enforced: self.budget.enforced,
        }
    }
}

/// Read-only copy of one entry, for metrics and debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub circuit: CircuitStateKind,
    pub consecutive_failures: u32,
    pub failure_percentage: Option<f64>,
    pub rates: [f64; QueryType::COUNT],
    pub daily_consumed_bytes: u64,
    pub monthly_consumed_bytes: u64,
    pub enforced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_window_rolls_oldest_out() {
        let mut w = FailureWindow::new(4);
        for _ in 0..4 {
            w.record(true);
        }
        assert_eq!(w.percentage_if_full(), Some(100.0));
        // Four successes push all failures out
        for _ in 0..4 {
            w.record(false);
        }
        assert_eq!(w.percentage_if_full(), Some(0.0));
    }

    #[test]
    fn test_window_percentage_requires_full() {
        let mut w = FailureWindow::new(10);
        w.record(true);
        w.record(true);
        assert_eq!(w.percentage_if_full(), None);
        assert_eq!(w.observed_percentage(), Some(100.0));
    }

    #[test]
    fn test_budget_rollover_daily() {
        let mut b = BudgetAccount::new(date!(2026 - 01 - 15));
        b.charge(1000);
        b.enforced = true;
        assert!(b.roll_over(date!(2026 - 01 - 16)));
        assert_eq!(b.daily.consumed_bytes, 0);
        // Monthly period unchanged within the same month
        assert_eq!(b.monthly.consumed_bytes, 1000);
        assert!(!b.enforced);
    }

    #[test]
    fn test_budget_rollover_monthly() {
        let mut b = BudgetAccount::new(date!(2026 - 01 - 31));
        b.charge(500);
        assert!(b.roll_over(date!(2026 - 02 - 01)));
        assert_eq!(b.daily.consumed_bytes, 0);
        assert_eq!(b.monthly.consumed_bytes, 0);
    }

    #[test]
    fn test_budget_no_rollover_same_day() {
        let mut b = BudgetAccount::new(date!(2026 - 01 - 15));
        b.charge(500);
        assert!(!b.roll_over(date!(2026 - 01 - 15)));
        assert_eq!(b.daily.consumed_bytes, 500);
        assert_eq!(b.daily.events, 1);
    }

    #[test]
    fn test_circuit_state_accessors() {
        let closed = CircuitState::Closed {
            consecutive_failures: 3,
        };
        assert_eq!(closed.kind(), CircuitStateKind::Closed);
        assert_eq!(closed.consecutive_failures(), 3);

        let open = CircuitState::Open {
            opened_at: Instant::now(),
        };
        assert_eq!(open.kind(), CircuitStateKind::Open);
        assert_eq!(open.consecutive_failures(), 0);
    }
}
