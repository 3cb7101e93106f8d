/*!
 * Configuration
 * Recognized options for the three admission stages and the pipeline shell
 *
 * Validation fails fast; a collector with an invalid admission config must
 * refuse to start.
 */

use crate::core::errors::ConfigError;
use crate::core::limits::*;
use crate::core::types::QueryType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-query-type sampling percentages (0-100). `ddl` is pinned at 100:
/// schema changes are always kept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryTypeRates {
    pub select: f64,
    pub dml: f64,
    pub ddl: f64,
    pub audit: f64,
}

impl Default for QueryTypeRates {
    fn default() -> Self {
        Self {
            select: 5.0,
            dml: 50.0,
            ddl: 100.0,
            audit: 1.0,
        }
    }
}

impl QueryTypeRates {
    /// Rule rates as fractions indexed by [`QueryType::index`]. Records
    /// with an unknown type get the strictest configured rule (lowest
    /// trust); [`AdaptiveSamplerConfig::rate_fractions`] further caps that
    /// with the overall default percentage.
    pub fn as_fractions(&self) -> [f64; QueryType::COUNT] {
        let strictest = self
            .select
            .min(self.dml)
            .min(self.ddl)
            .min(self.audit);
        [
            self.select / 100.0,
            self.dml / 100.0,
            self.ddl / 100.0,
            self.audit / 100.0,
            strictest / 100.0,
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("query_types.select", self.select),
            ("query_types.dml", self.dml),
            ("query_types.ddl", self.ddl),
            ("query_types.audit", self.audit),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::percentage(field, value));
            }
        }
        if self.ddl != 100.0 {
            return Err(ConfigError::DdlNotFull { value: self.ddl });
        }
        Ok(())
    }
}

/// Optional per-type admission ceilings, records per second.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryTypeLimits {
    pub select: Option<u32>,
    pub dml: Option<u32>,
    pub ddl: Option<u32>,
    pub audit: Option<u32>,
}

impl QueryTypeLimits {
    pub fn get(&self, query_type: QueryType) -> Option<u32> {
        match query_type {
            QueryType::Select => self.select,
            QueryType::Dml => self.dml,
            QueryType::Ddl => self.ddl,
            QueryType::Audit => self.audit,
            QueryType::Unknown => None,
        }
    }
}

/// `adaptivesampler` options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptiveSamplerConfig {
    /// Overall default sampling percentage (0-100). The fallback rate for
    /// records no per-type rule covers; see [`Self::rate_fractions`].
    pub sampling_percentage: f64,
    /// Global admission ceiling, records per second.
    pub max_traces_per_second: u32,
    /// Dedup cache capacity (distinct fingerprints).
    pub cache_size: usize,
    /// Per-type percentages; `ddl` fixed at 100.
    pub query_types: QueryTypeRates,
    /// Optional per-type sub-limits.
    pub per_type_limits: QueryTypeLimits,
    /// Window within which an identical fingerprint is dropped.
    pub dedup_window: Duration,
    /// Cadence of the adaptive feedback loop.
    pub evaluation_interval: Duration,
}

impl Default for AdaptiveSamplerConfig {
    fn default() -> Self {
        Self {
            sampling_percentage: DEFAULT_SAMPLING_PERCENTAGE,
            max_traces_per_second: DEFAULT_MAX_TRACES_PER_SECOND,
            cache_size: DEFAULT_DEDUP_CACHE_SIZE,
            query_types: QueryTypeRates::default(),
            per_type_limits: QueryTypeLimits::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL,
        }
    }
}

impl AdaptiveSamplerConfig {
    /// Effective seed rates indexed by [`QueryType::index`]: the per-type
    /// rules, with the unknown-type fallback capped by the overall default
    /// percentage. A record nothing classifies never samples above
    /// `sampling_percentage`.
    pub fn rate_fractions(&self) -> [f64; QueryType::COUNT] {
        let mut rates = self.query_types.as_fractions();
        let unknown = QueryType::Unknown.index();
        rates[unknown] = rates[unknown].min(self.sampling_percentage / 100.0);
        rates
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.sampling_percentage) {
            return Err(ConfigError::percentage(
                "sampling_percentage",
                self.sampling_percentage,
            ));
        }
        if self.max_traces_per_second == 0 {
            return Err(ConfigError::non_positive("max_traces_per_second", 0.0));
        }
        if self.cache_size == 0 {
            return Err(ConfigError::non_positive("cache_size", 0.0));
        }
        if self.dedup_window.is_zero() {
            return Err(ConfigError::zero_duration("dedup_window"));
        }
        if self.evaluation_interval.is_zero() {
            return Err(ConfigError::zero_duration("evaluation_interval"));
        }
        self.query_types.validate()
    }
}

/// `circuit_breaker` options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit.
    pub max_consecutive_failures: u32,
    /// Failure percentage over the window that trips the circuit.
    pub failure_threshold_percent: f64,
    /// Per-attempt collection timeout. Enforced by the receivers, not by
    /// this crate; carried so one block describes the whole breaker.
    pub timeout: Duration,
    /// Open-state cooldown before probing.
    pub recovery_timeout: Duration,
    /// Track state per database (default) or as one global circuit.
    pub per_database: bool,
    /// Probe cadence while half-open.
    pub health_check_interval: Duration,
    /// Probes admitted per health-check interval while half-open.
    pub half_open_max_probes: u32,
    /// Fixed-size outcome window for the failure percentage.
    pub failure_window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            failure_threshold_percent: DEFAULT_FAILURE_THRESHOLD_PERCENT,
            timeout: DEFAULT_COLLECTION_TIMEOUT,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            per_database: true,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            half_open_max_probes: DEFAULT_HALF_OPEN_MAX_PROBES,
            failure_window_size: DEFAULT_FAILURE_WINDOW_SIZE,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::non_positive("max_consecutive_failures", 0.0));
        }
        if !(0.0..=100.0).contains(&self.failure_threshold_percent) {
            return Err(ConfigError::percentage(
                "failure_threshold_percent",
                self.failure_threshold_percent,
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::zero_duration("timeout"));
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::zero_duration("recovery_timeout"));
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::zero_duration("health_check_interval"));
        }
        if self.half_open_max_probes == 0 {
            return Err(ConfigError::non_positive("half_open_max_probes", 0.0));
        }
        if self.failure_window_size < MIN_FAILURE_WINDOW_SIZE {
            return Err(ConfigError::WindowTooSmall {
                min: MIN_FAILURE_WINDOW_SIZE,
                value: self.failure_window_size,
            });
        }
        Ok(())
    }
}

/// `costcontrol` options. Budgets apply per monitored database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostControlConfig {
    pub daily_budget_usd: f64,
    pub monthly_budget_usd: f64,
    pub cost_per_gb: f64,
    pub cost_per_million_events: f64,
    /// Percent of budget at which a non-blocking alert is raised.
    pub alert_threshold_percent: f64,
    /// When true, exhausting a budget sets the enforcement flag and drops
    /// further low-priority records until rollover.
    pub enforcement_enabled: bool,
}

impl Default for CostControlConfig {
    fn default() -> Self {
        Self {
            daily_budget_usd: 10.0,
            monthly_budget_usd: 200.0,
            cost_per_gb: 0.35,
            cost_per_million_events: 0.25,
            alert_threshold_percent: DEFAULT_ALERT_THRESHOLD_PERCENT,
            enforcement_enabled: true,
        }
    }
}

impl CostControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("daily_budget_usd", self.daily_budget_usd),
            ("monthly_budget_usd", self.monthly_budget_usd),
            ("cost_per_gb", self.cost_per_gb),
            ("cost_per_million_events", self.cost_per_million_events),
        ] {
            if value < 0.0 {
                return Err(ConfigError::negative(field, value));
            }
        }
        if !(0.0..=100.0).contains(&self.alert_threshold_percent) {
            return Err(ConfigError::percentage(
                "alert_threshold_percent",
                self.alert_threshold_percent,
            ));
        }
        Ok(())
    }
}

/// Pipeline shell options: workers, queues, background task cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker task count; 0 derives from available parallelism.
    pub workers: usize,
    /// Batch queue depth between submitters and workers.
    pub batch_queue_depth: usize,
    /// Idle TTL before a registry entry is reaped.
    pub idle_ttl: Duration,
    /// Reaper cadence.
    pub reap_interval: Duration,
    /// Dedup TTL sweep cadence.
    pub dedup_sweep_interval: Duration,
    /// Budget rollover sweep cadence.
    pub rollover_check_interval: Duration,
    /// Grace period for in-flight batches at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            batch_queue_depth: DEFAULT_BATCH_QUEUE_DEPTH,
            idle_ttl: DEFAULT_IDLE_TTL,
            reap_interval: DEFAULT_REAP_INTERVAL,
            dedup_sweep_interval: DEFAULT_DEDUP_SWEEP_INTERVAL,
            rollover_check_interval: DEFAULT_ROLLOVER_CHECK_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_queue_depth == 0 {
            return Err(ConfigError::non_positive("batch_queue_depth", 0.0));
        }
        for (field, d) in [
            ("idle_ttl", self.idle_ttl),
            ("reap_interval", self.reap_interval),
            ("dedup_sweep_interval", self.dedup_sweep_interval),
            ("rollover_check_interval", self.rollover_check_interval),
        ] {
            if d.is_zero() {
                return Err(ConfigError::zero_duration(field));
            }
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

/// Aggregate configuration for the whole admission pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SentinelConfig {
    pub adaptivesampler: AdaptiveSamplerConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub costcontrol: CostControlConfig,
    pub pipeline: PipelineConfig,
}

impl SentinelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.adaptivesampler.validate()?;
        self.circuit_breaker.validate()?;
        self.costcontrol.validate()?;
        self.pipeline.validate()
    }
}
