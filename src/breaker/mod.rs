/*!
 * Circuit Breaker
 * Per-database failure isolation for the collection pipeline
 *
 * Sits upstream of the sampler: when a database's circuit is open, every
 * record for it is dropped so the collector stops loading a struggling
 * database. The breaker never raises an error; the drop decision is the
 * only signal.
 */

use crate::core::config::CircuitBreakerConfig;
use crate::core::types::{DatabaseId, Decision, DropReason, TelemetryRecord};
use crate::monitoring::{Category, Collector, Event, Payload, Severity};
use crate::registry::{CircuitState, HealthRegistry, HealthState};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// State transition observed during one record, reported outside the lock.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Transition {
    Opened {
        consecutive_failures: u32,
        failure_percentage: Option<f64>,
    },
    HalfOpened,
    Closed,
    Reopened,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    registry: Arc<HealthRegistry>,
    collector: Collector,
    /// Reserved key used when `per_database` is off.
    global_key: DatabaseId,
}

impl CircuitBreaker {
    pub fn new(
        config: CircuitBreakerConfig,
        registry: Arc<HealthRegistry>,
        collector: Collector,
    ) -> Self {
        Self {
            config,
            registry,
            collector,
            global_key: DatabaseId::global(),
        }
    }

    /// Decide admission for one record using the current instant.
    pub fn process(&self, record: &TelemetryRecord) -> Decision {
        self.process_at(record, Instant::now())
    }

    /// Decide admission as of an explicit instant. The decision and the
    /// outcome update happen in one per-key critical section, so no record
    /// is left half-applied.
    pub fn process_at(&self, record: &TelemetryRecord, now: Instant) -> Decision {
        let key = if self.config.per_database {
            &record.database_id
        } else {
            &self.global_key
        };

        let (decision, transitions) = self.registry.with_lock(key, |state| {
            let mut transitions = Vec::new();
            let decision = self.step(state, record, now, &mut transitions);
            (decision, transitions)
        });

        for transition in transitions {
            self.report(key, transition);
        }
        decision
    }

    /// Run the state machine for one record. Caller holds the key lock.
    fn step(
        &self,
        state: &mut HealthState,
        record: &TelemetryRecord,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) -> Decision {
        match state.circuit {
            CircuitState::Closed {
                consecutive_failures,
            } => self.step_closed(state, record, now, consecutive_failures, transitions),
            CircuitState::Open { opened_at } => {
                if now.duration_since(opened_at) >= self.config.recovery_timeout {
                    state.circuit = CircuitState::HalfOpen {
                        probes_used: 0,
                        window_started_at: now,
                    };
                    transitions.push(Transition::HalfOpened);
                    self.step_half_open(state, record, now, transitions)
                } else {
                    // Collection is presumed harmful; outcomes while open
                    // are not counted.
                    Decision::Drop(DropReason::CircuitOpen)
                }
            }
            CircuitState::HalfOpen { .. } => self.step_half_open(state, record, now, transitions),
        }
    }

    fn step_closed(
        &self,
        state: &mut HealthState,
        record: &TelemetryRecord,
        now: Instant,
        consecutive_failures: u32,
        transitions: &mut Vec<Transition>,
    ) -> Decision {
        // Unknown outcomes pass through without biasing the statistics.
        if let Some(failure) = record.outcome.as_failure() {
            state.window.record(failure);
            let fails = if failure { consecutive_failures + 1 } else { 0 };
            let percentage = state.window.percentage_if_full();

            let tripped = fails >= self.config.max_consecutive_failures
                || percentage.is_some_and(|p| p >= self.config.failure_threshold_percent);
            if tripped {
                state.circuit = CircuitState::Open { opened_at: now };
                transitions.push(Transition::Opened {
                    consecutive_failures: fails,
                    failure_percentage: percentage,
                });
            } else {
                state.circuit = CircuitState::Closed {
                    consecutive_failures: fails,
                };
            }
        }
        Decision::Keep
    }

    fn step_half_open(
        &self,
        state: &mut HealthState,
        record: &TelemetryRecord,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) -> Decision {
        let CircuitState::HalfOpen {
            mut probes_used,
            mut window_started_at,
        } = state.circuit
        else {
            // step() only routes half-open circuits here
            return Decision::Keep;
        };

        if now.duration_since(window_started_at) >= self.config.health_check_interval {
            window_started_at = now;
            probes_used = 0;
        }

        if probes_used >= self.config.half_open_max_probes {
            state.circuit = CircuitState::HalfOpen {
                probes_used,
                window_started_at,
            };
            return Decision::Drop(DropReason::CircuitOpen);
        }
        probes_used += 1;

        // Probe admitted; its outcome decides the transition.
        match record.outcome.as_failure() {
            Some(false) => {
                state.circuit = CircuitState::Closed {
                    consecutive_failures: 0,
                };
                state.window.reset();
                transitions.push(Transition::Closed);
            }
            Some(true) => {
                state.circuit = CircuitState::Open { opened_at: now };
                transitions.push(Transition::Reopened);
            }
            None => {
                state.circuit = CircuitState::HalfOpen {
                    probes_used,
                    window_started_at,
                };
            }
        }
        Decision::Keep
    }

    fn report(&self, key: &DatabaseId, transition: Transition) {
        self.collector.record_transition();
        let database = key.to_string();
        match transition {
            Transition::Opened {
                consecutive_failures,
                failure_percentage,
            } => {
                warn!(
                    database = %database,
                    consecutive_failures,
                    failure_percentage,
                    "circuit opened, dropping records for this database"
                );
                self.collector.emit(Event::new(
                    Severity::Warn,
                    Category::Breaker,
                    Payload::CircuitOpened {
                        database,
                        consecutive_failures,
                        failure_percentage,
                    },
                ));
            }
            Transition::HalfOpened => {
                info!(database = %database, "circuit half-open, probing");
                self.collector.emit(Event::new(
                    Severity::Info,
                    Category::Breaker,
                    Payload::CircuitHalfOpen { database },
                ));
            }
            Transition::Closed => {
                info!(database = %database, "circuit closed, resuming collection");
                self.collector.emit(Event::new(
                    Severity::Info,
                    Category::Breaker,
                    Payload::CircuitClosed { database },
                ));
            }
            Transition::Reopened => {
                warn!(database = %database, "probe failed, circuit reopened");
                self.collector.emit(Event::new(
                    Severity::Warn,
                    Category::Breaker,
                    Payload::CircuitReopened { database },
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Outcome, QueryType};
    use crate::registry::StateSeed;
    use std::time::Duration;

    fn setup(config: CircuitBreakerConfig) -> (CircuitBreaker, Arc<HealthRegistry>) {
        let registry = Arc::new(HealthRegistry::new(StateSeed {
            rates: [0.05, 0.5, 1.0, 0.01, 0.01],
            window_size: config.failure_window_size,
        }));
        let breaker = CircuitBreaker::new(config, Arc::clone(&registry), Collector::new());
        (breaker, registry)
    }

    fn record(id: &DatabaseId, outcome: Outcome) -> TelemetryRecord {
        TelemetryRecord::new(id.clone(), QueryType::Select).with_outcome(outcome)
    }

    #[test]
    fn test_trips_on_consecutive_failures() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 3,
            ..Default::default()
        };
        let (breaker, registry) = setup(config);
        let id = DatabaseId::new("pg", "orders");
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(breaker.process_at(&record(&id, Outcome::Error), now), Decision::Keep);
        }
        // Circuit is now open
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Success), now),
            Decision::Drop(DropReason::CircuitOpen)
        );
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.circuit, crate::registry::CircuitStateKind::Open);
    }

    #[test]
    fn test_success_resets_consecutive() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 3,
            ..Default::default()
        };
        let (breaker, registry) = setup(config);
        let id = DatabaseId::new("pg", "orders");
        let now = Instant::now();

        breaker.process_at(&record(&id, Outcome::Error), now);
        breaker.process_at(&record(&id, Outcome::Error), now);
        breaker.process_at(&record(&id, Outcome::Success), now);
        breaker.process_at(&record(&id, Outcome::Error), now);
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.circuit, crate::registry::CircuitStateKind::Closed);
        assert_eq!(snap.consecutive_failures, 1);
    }

    #[test]
    fn test_trips_on_failure_percentage() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 100,
            failure_threshold_percent: 50.0,
            failure_window_size: 4,
            ..Default::default()
        };
        let (breaker, registry) = setup(config);
        let id = DatabaseId::new("pg", "orders");
        let now = Instant::now();

        // Alternate: 50% failures over a full window of 4
        breaker.process_at(&record(&id, Outcome::Error), now);
        breaker.process_at(&record(&id, Outcome::Success), now);
        breaker.process_at(&record(&id, Outcome::Error), now);
        breaker.process_at(&record(&id, Outcome::Success), now);
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.circuit, crate::registry::CircuitStateKind::Open);
    }

    #[test]
    fn test_unknown_outcomes_excluded() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 2,
            ..Default::default()
        };
        let (breaker, registry) = setup(config);
        let id = DatabaseId::new("pg", "orders");
        let now = Instant::now();

        breaker.process_at(&record(&id, Outcome::Error), now);
        for _ in 0..10 {
            assert_eq!(
                breaker.process_at(&record(&id, Outcome::Unknown), now),
                Decision::Keep
            );
        }
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.consecutive_failures, 1);
        assert_eq!(snap.circuit, crate::registry::CircuitStateKind::Closed);
    }

    #[test]
    fn test_recovery_probe_success_closes() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 3,
            recovery_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let (breaker, registry) = setup(config);
        let id = DatabaseId::new("pg", "orders");
        let t0 = Instant::now();

        for _ in 0..3 {
            breaker.process_at(&record(&id, Outcome::Error), t0);
        }
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Success), t0),
            Decision::Drop(DropReason::CircuitOpen)
        );

        // Past the recovery timeout a probe is admitted and closes
        let t1 = t0 + Duration::from_secs(31);
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Success), t1),
            Decision::Keep
        );
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.circuit, crate::registry::CircuitStateKind::Closed);
        assert_eq!(snap.consecutive_failures, 0);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 3,
            recovery_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let (breaker, registry) = setup(config);
        let id = DatabaseId::new("pg", "orders");
        let t0 = Instant::now();

        for _ in 0..3 {
            breaker.process_at(&record(&id, Outcome::Error), t0);
        }
        let t1 = t0 + Duration::from_secs(31);
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Error), t1),
            Decision::Keep
        );
        let snap = registry.snapshot(&id).unwrap();
        assert_eq!(snap.circuit, crate::registry::CircuitStateKind::Open);

        // Reopened with a fresh opened_at: still dropping before the new
        // cooldown elapses
        let t2 = t1 + Duration::from_secs(29);
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Success), t2),
            Decision::Drop(DropReason::CircuitOpen)
        );
    }

    #[test]
    fn test_half_open_probe_budget() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 1,
            recovery_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(10),
            half_open_max_probes: 1,
            ..Default::default()
        };
        let (breaker, _) = setup(config);
        let id = DatabaseId::new("pg", "orders");
        let t0 = Instant::now();

        breaker.process_at(&record(&id, Outcome::Error), t0);
        let t1 = t0 + Duration::from_secs(31);
        // Unknown-outcome probe keeps the circuit half-open
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Unknown), t1),
            Decision::Keep
        );
        // Probe budget for this interval is spent
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Unknown), t1),
            Decision::Drop(DropReason::CircuitOpen)
        );
        // Next interval allows another probe
        let t2 = t1 + Duration::from_secs(10);
        assert_eq!(
            breaker.process_at(&record(&id, Outcome::Success), t2),
            Decision::Keep
        );
    }

    #[test]
    fn test_global_mode_shares_one_circuit() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 2,
            per_database: false,
            ..Default::default()
        };
        let (breaker, _) = setup(config);
        let now = Instant::now();

        let a = DatabaseId::new("pg", "a");
        let b = DatabaseId::new("pg", "b");
        breaker.process_at(&record(&a, Outcome::Error), now);
        breaker.process_at(&record(&b, Outcome::Error), now);
        // Failures from different databases tripped the shared circuit
        assert_eq!(
            breaker.process_at(&record(&a, Outcome::Success), now),
            Decision::Drop(DropReason::CircuitOpen)
        );
    }

    #[test]
    fn test_transitions_observable() {
        let config = CircuitBreakerConfig {
            max_consecutive_failures: 1,
            ..Default::default()
        };
        let registry = Arc::new(HealthRegistry::new(StateSeed {
            rates: [0.05, 0.5, 1.0, 0.01, 0.01],
            window_size: config.failure_window_size,
        }));
        let collector = Collector::new();
        let breaker = CircuitBreaker::new(config, registry, collector.clone());
        let id = DatabaseId::new("pg", "orders");

        breaker.process_at(&record(&id, Outcome::Error), Instant::now());

        assert_eq!(collector.snapshot().circuit_transitions, 1);
        let mut sub = collector.subscribe();
        let events = sub.drain();
        assert!(matches!(
            events[0].payload,
            Payload::CircuitOpened { .. }
        ));
    }
}
