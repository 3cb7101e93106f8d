/*!
 * Cost Controller
 * Per-database ingest accounting against daily and monthly USD budgets
 *
 * Runs last in the admission chain, so only records the breaker and
 * sampler kept are charged. Rollover, accounting, the alert latch, and
 * the enforcement flag all mutate under the key lock in one step, so a
 * burst of concurrent records at a period boundary cannot double-charge
 * or double-alert.
 */

use crate::core::config::CostControlConfig;
use crate::core::limits::BYTES_PER_GB;
use crate::core::types::{Decision, DropReason, QueryType, TelemetryRecord};
use crate::monitoring::{BudgetPeriod, Category, Collector, Event, Payload, Severity};
use crate::registry::{HealthRegistry, PeriodUsage};
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

pub struct CostController {
    config: CostControlConfig,
    registry: Arc<HealthRegistry>,
    collector: Collector,
}

impl CostController {
    pub fn new(
        config: CostControlConfig,
        registry: Arc<HealthRegistry>,
        collector: Collector,
    ) -> Self {
        Self {
            config,
            registry,
            collector,
        }
    }

    /// Decide admission and charge the record using today's UTC date.
    pub fn process(&self, record: &TelemetryRecord) -> Decision {
        self.process_at(record, OffsetDateTime::now_utc().date())
    }

    /// Decide admission and charge as of an explicit date.
    pub fn process_at(&self, record: &TelemetryRecord, today: Date) -> Decision {
        let (decision, events) = self.registry.with_lock(&record.database_id, |state| {
            let mut events = Vec::new();
            let database = record.database_id.to_string();

            let was_enforced = state.budget.enforced;
            if state.budget.roll_over(today) && was_enforced {
                events.push(Event::new(
                    Severity::Info,
                    Category::Cost,
                    Payload::EnforcementCleared {
                        database: database.clone(),
                    },
                ));
            }

            // Only low-priority reads are shed outright while the flag is
            // up; dml/audit are throttled through the sampler's decayed
            // rates, and schema changes always pass.
            if state.budget.enforced && record.query_type == QueryType::Select {
                return (Decision::Drop(DropReason::BudgetExceeded), events);
            }

            let daily_before = self.usage_cost(&state.budget.daily);
            let monthly_before = self.usage_cost(&state.budget.monthly);
            state.budget.charge(record.estimated_bytes);

            let checks = [
                (
                    BudgetPeriod::Daily,
                    daily_before,
                    self.usage_cost(&state.budget.daily),
                    self.config.daily_budget_usd,
                ),
                (
                    BudgetPeriod::Monthly,
                    monthly_before,
                    self.usage_cost(&state.budget.monthly),
                    self.config.monthly_budget_usd,
                ),
            ];
            for (period, before, after, budget) in checks {
                if budget <= 0.0 {
                    continue;
                }
                let percent = after / budget * 100.0;
                let alerted = match period {
                    BudgetPeriod::Daily => &mut state.budget.daily.alerted,
                    BudgetPeriod::Monthly => &mut state.budget.monthly.alerted,
                };
                if percent >= self.config.alert_threshold_percent && !*alerted {
                    *alerted = true;
                    events.push(Event::new(
                        Severity::Warn,
                        Category::Cost,
                        Payload::BudgetAlert {
                            database: database.clone(),
                            period,
                            consumed_usd: after,
                            budget_usd: budget,
                            percent,
                        },
                    ));
                }
                if before < budget && after >= budget {
                    events.push(Event::new(
                        Severity::Error,
                        Category::Cost,
                        Payload::BudgetExhausted {
                            database: database.clone(),
                            period,
                        },
                    ));
                    if self.config.enforcement_enabled {
                        state.budget.enforced = true;
                    }
                }
            }

            (Decision::Keep, events)
        });

        for event in events {
            self.report(&event);
            self.collector.emit(event);
        }
        decision
    }

    /// USD cost of one period's usage: bytes at the per-GB rate plus
    /// events at the per-million rate.
    fn usage_cost(&self, usage: &PeriodUsage) -> f64 {
        usage.consumed_bytes as f64 / BYTES_PER_GB * self.config.cost_per_gb
            + usage.events as f64 / 1_000_000.0 * self.config.cost_per_million_events
    }

    /// Roll every account forward. Catches databases with no traffic at a
    /// period boundary, which the inline rollover never visits.
    pub fn rollover_sweep(&self, today: Date) -> usize {
        let mut rolled = 0;
        let mut events = Vec::new();
        self.registry.for_each(|id, state| {
            let was_enforced = state.budget.enforced;
            if state.budget.roll_over(today) {
                rolled += 1;
                if was_enforced {
                    events.push(Event::new(
                        Severity::Info,
                        Category::Cost,
                        Payload::EnforcementCleared {
                            database: id.to_string(),
                        },
                    ));
                }
            }
        });
        for event in events {
            self.report(&event);
            self.collector.emit(event);
        }
        rolled
    }

    fn report(&self, event: &Event) {
        match &event.payload {
            Payload::BudgetAlert {
                database, percent, ..
            } => {
                self.collector.record_budget_alert();
                warn!(database = %database, percent, "budget alert threshold crossed");
            }
            Payload::BudgetExhausted { database, period } => {
                warn!(database = %database, ?period, "budget exhausted");
            }
            Payload::EnforcementCleared { database } => {
                info!(database = %database, "budget period rolled over, enforcement cleared");
            }
            _ => {}
        }
    }
}
