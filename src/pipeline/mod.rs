/*!
 * Pipeline
 * Admission chain wiring, worker pool, background maintenance, shutdown
 *
 * The chain runs breaker, sampler, cost in that order: a tripped circuit
 * short-circuits everything downstream, and only records that survived
 * sampling are charged against budgets. Each stage reads and writes the
 * shared health registry, so the chain itself holds no state.
 */

use crate::breaker::CircuitBreaker;
use crate::core::config::SentinelConfig;
use crate::core::errors::ConfigError;
use crate::core::types::{DecidedRecord, Decision, TelemetryRecord};
use crate::cost::CostController;
use crate::monitoring::{Category, Collector, Event, Payload, Severity};
use crate::registry::{HealthRegistry, StateSeed};
use crate::sampler::AdaptiveSampler;
use miette::Diagnostic;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("pipeline is shut down")]
    #[diagnostic(
        code(db_sentinel::pipeline::closed),
        help("submit only while the handle returned by run() is live")
    )]
    Closed,
}

/// The full admission pipeline. Construction validates configuration and
/// wires every stage onto one shared registry and collector.
pub struct Pipeline {
    config: SentinelConfig,
    registry: Arc<HealthRegistry>,
    collector: Collector,
    breaker: CircuitBreaker,
    sampler: AdaptiveSampler,
    cost: CostController,
}

impl Pipeline {
    pub fn new(config: SentinelConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(HealthRegistry::new(StateSeed {
            rates: config.adaptivesampler.rate_fractions(),
            window_size: config.circuit_breaker.failure_window_size,
        }));
        let collector = Collector::new();

        let breaker = CircuitBreaker::new(
            config.circuit_breaker.clone(),
            Arc::clone(&registry),
            collector.clone(),
        );
        let sampler = AdaptiveSampler::new(
            config.adaptivesampler.clone(),
            Arc::clone(&registry),
            collector.clone(),
        );
        let cost = CostController::new(
            config.costcontrol.clone(),
            Arc::clone(&registry),
            collector.clone(),
        );

        Ok(Self {
            config,
            registry,
            collector,
            breaker,
            sampler,
            cost,
        })
    }

    /// Run one record through the full chain and count the outcome.
    pub fn process_record(&self, record: TelemetryRecord) -> DecidedRecord {
        let decision = self.decide(&record);
        self.collector.record_decision(decision);
        DecidedRecord { record, decision }
    }

    fn decide(&self, record: &TelemetryRecord) -> Decision {
        let decision = self.breaker.process(record);
        if !decision.is_keep() {
            return decision;
        }
        let decision = self.sampler.process(record);
        if !decision.is_keep() {
            return decision;
        }
        self.cost.process(record)
    }

    /// Run a whole batch; decisions are per record.
    pub fn process_batch(&self, batch: Vec<TelemetryRecord>) -> Vec<DecidedRecord> {
        batch
            .into_iter()
            .map(|record| self.process_record(record))
            .collect()
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn registry(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    /// Spawn workers and background maintenance onto the current runtime.
    /// The pipeline stays usable through other clones of the `Arc`.
    pub fn run(self: Arc<Self>) -> PipelineHandle {
        let depth = self.config.pipeline.batch_queue_depth;
        let (submit_tx, submit_rx) = mpsc::channel::<Vec<TelemetryRecord>>(depth);
        let (output_tx, output_rx) = mpsc::channel::<Vec<DecidedRecord>>(depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let submit_rx = Arc::new(Mutex::new(submit_rx));
        let mut tasks = Vec::new();

        let workers = self.config.pipeline.effective_workers();
        info!(workers, "starting admission pipeline");
        for worker_id in 0..workers {
            let pipeline = Arc::clone(&self);
            let submit_rx = Arc::clone(&submit_rx);
            let output_tx = output_tx.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let batch = {
                        let mut rx = submit_rx.lock().await;
                        tokio::select! {
                            _ = shutdown_rx.changed() => None,
                            batch = rx.recv() => batch,
                        }
                    };
                    let Some(batch) = batch else { break };
                    debug!(worker_id, records = batch.len(), "processing batch");
                    let decided = pipeline.process_batch(batch);
                    if output_tx.send(decided).await.is_err() {
                        break;
                    }
                }
            }));
        }

        tasks.push(Self::spawn_reaper(&self, shutdown_rx.clone()));
        tasks.push(Self::spawn_dedup_sweep(&self, shutdown_rx.clone()));
        tasks.push(Self::spawn_rate_adjust(&self, shutdown_rx.clone()));
        tasks.push(Self::spawn_rollover_sweep(&self, shutdown_rx));

        PipelineHandle {
            submit_tx,
            output_rx: Some(output_rx),
            shutdown_tx,
            tasks,
            grace: self.config.pipeline.shutdown_grace,
        }
    }

    fn spawn_reaper(pipeline: &Arc<Self>, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = pipeline.config.pipeline.reap_interval;
        let ttl = pipeline.config.pipeline.idle_ttl;
        let pipeline = Arc::clone(pipeline);
        Self::spawn_periodic(shutdown_rx, period, move || {
            let reaped = pipeline.registry.reap_idle(ttl);
            if reaped > 0 {
                info!(reaped, "reaped idle database entries");
                pipeline.collector.record_reaped(reaped);
                pipeline.collector.emit(Event::new(
                    Severity::Info,
                    Category::Registry,
                    Payload::EntriesReaped { count: reaped },
                ));
            }
        })
    }

    fn spawn_dedup_sweep(pipeline: &Arc<Self>, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = pipeline.config.pipeline.dedup_sweep_interval;
        let pipeline = Arc::clone(pipeline);
        Self::spawn_periodic(shutdown_rx, period, move || {
            let evicted = pipeline.sampler.sweep_dedup(Instant::now());
            if evicted > 0 {
                debug!(evicted, "swept expired dedup entries");
            }
        })
    }

    fn spawn_rate_adjust(pipeline: &Arc<Self>, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = pipeline.config.adaptivesampler.evaluation_interval;
        let pipeline = Arc::clone(pipeline);
        Self::spawn_periodic(shutdown_rx, period, move || {
            pipeline.sampler.adjust_rates(Instant::now());
        })
    }

    fn spawn_rollover_sweep(
        pipeline: &Arc<Self>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let period = pipeline.config.pipeline.rollover_check_interval;
        let pipeline = Arc::clone(pipeline);
        Self::spawn_periodic(shutdown_rx, period, move || {
            pipeline
                .cost
                .rollover_sweep(OffsetDateTime::now_utc().date());
        })
    }

    fn spawn_periodic(
        mut shutdown_rx: watch::Receiver<bool>,
        period: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so cadence starts
            // one period after spawn.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => tick(),
                }
            }
        })
    }
}

/// Live handle onto a running pipeline: submit batches, take the output
/// side, shut down with a grace period.
pub struct PipelineHandle {
    submit_tx: mpsc::Sender<Vec<TelemetryRecord>>,
    output_rx: Option<mpsc::Receiver<Vec<DecidedRecord>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl PipelineHandle {
    /// Queue one batch for the workers.
    pub async fn submit(&self, batch: Vec<TelemetryRecord>) -> Result<(), PipelineError> {
        self.submit_tx
            .send(batch)
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Take the receiver of decided batches. Yields `None` after the first
    /// call.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<Vec<DecidedRecord>>> {
        self.output_rx.take()
    }

    /// Signal shutdown and wait up to the grace period for each task.
    /// Workers finish their in-flight batch; stragglers are aborted.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        drop(self.submit_tx);
        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(self.grace, task).await.is_err() {
                abort.abort();
                warn!("pipeline task did not stop within grace period, aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CircuitBreakerConfig;
    use crate::core::types::{DatabaseId, Outcome, QueryType};

    fn sample_config() -> SentinelConfig {
        SentinelConfig {
            circuit_breaker: CircuitBreakerConfig {
                max_consecutive_failures: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SentinelConfig::default();
        config.adaptivesampler.sampling_percentage = -5.0;
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn test_chain_short_circuits_on_open_breaker() {
        let pipeline = Pipeline::new(sample_config()).unwrap();
        let id = DatabaseId::new("pg", "orders");

        for fp in 0..2 {
            pipeline.process_record(
                TelemetryRecord::new(id.clone(), QueryType::Ddl)
                    .with_outcome(Outcome::Error)
                    .with_fingerprint(fp),
            );
        }
        let decided = pipeline.process_record(
            TelemetryRecord::new(id.clone(), QueryType::Ddl)
                .with_outcome(Outcome::Success)
                .with_fingerprint(99)
                .with_bytes(1000),
        );
        assert!(!decided.decision.is_keep());
        // Dropped records are never charged
        assert_eq!(
            pipeline.registry().snapshot(&id).unwrap().daily_consumed_bytes,
            0
        );
    }

    #[test]
    fn test_counters_track_decisions() {
        let pipeline = Pipeline::new(sample_config()).unwrap();
        let id = DatabaseId::new("pg", "orders");

        pipeline.process_record(
            TelemetryRecord::new(id.clone(), QueryType::Ddl)
                .with_outcome(Outcome::Success)
                .with_fingerprint(1),
        );
        pipeline.process_record(
            TelemetryRecord::new(id, QueryType::Ddl)
                .with_outcome(Outcome::Success)
                .with_fingerprint(1),
        );

        let snap = pipeline.collector().snapshot();
        assert_eq!(snap.records_seen, 2);
        assert_eq!(snap.kept, 1);
        assert_eq!(snap.dropped_duplicate, 1);
    }

    #[tokio::test]
    async fn test_run_submit_shutdown() {
        let pipeline = Arc::new(Pipeline::new(sample_config()).unwrap());
        let mut handle = pipeline.run();
        let mut output = handle.take_output().unwrap();
        assert!(handle.take_output().is_none());

        let id = DatabaseId::new("pg", "orders");
        let batch: Vec<TelemetryRecord> = (0..4)
            .map(|fp| {
                TelemetryRecord::new(id.clone(), QueryType::Ddl)
                    .with_outcome(Outcome::Success)
                    .with_fingerprint(fp)
            })
            .collect();
        handle.submit(batch).await.unwrap();

        let decided = output.recv().await.unwrap();
        assert_eq!(decided.len(), 4);
        assert!(decided.iter().all(|d| d.decision.is_keep()));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_tasks() {
        let pipeline = Arc::new(Pipeline::new(sample_config()).unwrap());
        let handle = pipeline.run();
        // Completes within the grace period even with idle workers
        tokio::time::timeout(Duration::from_secs(10), handle.shutdown())
            .await
            .unwrap();
    }
}
