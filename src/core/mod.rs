/*!
 * Core
 * Shared types, configuration, errors, and limits
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod types;

pub use config::{
    AdaptiveSamplerConfig, CircuitBreakerConfig, CostControlConfig, PipelineConfig,
    QueryTypeLimits, QueryTypeRates, SentinelConfig,
};
pub use errors::ConfigError;
pub use types::{
    DatabaseId, DecidedRecord, Decision, DropReason, Outcome, QueryType, TelemetryRecord,
};
