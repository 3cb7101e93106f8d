/*!
 * db-sentinel
 * Admission control for database telemetry
 *
 * Three cooperating stages decide, per record, whether telemetry from a
 * monitored database enters the export path: a circuit breaker isolates
 * struggling databases, an adaptive sampler bounds volume with
 * deterministic per-query-type sampling, and a cost controller enforces
 * daily and monthly ingest budgets. All stages share one sharded health
 * registry keyed by database.
 */

pub mod breaker;
pub mod core;
pub mod cost;
pub mod monitoring;
pub mod pipeline;
pub mod registry;
pub mod sampler;

pub use crate::core::config::SentinelConfig;
pub use crate::core::errors::ConfigError;
pub use crate::core::types::{
    DatabaseId, DecidedRecord, Decision, DropReason, Outcome, QueryType, TelemetryRecord,
};
pub use crate::monitoring::{init_tracing, Collector, CountersSnapshot, Event, Subscriber};
pub use crate::pipeline::{Pipeline, PipelineError, PipelineHandle};
