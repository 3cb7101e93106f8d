/*!
 * Error Types
 * Configuration validation errors with thiserror and miette support
 *
 * The admission path itself is total: stages return a `Decision`, never an
 * error. Everything here fails fast at startup.
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors; the collector refuses to start on any of these.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("{field} must be a percentage in [0, 100], got {value}")]
    #[diagnostic(
        code(config::invalid_percentage),
        help("Sampling percentages and thresholds are expressed as 0-100.")
    )]
    InvalidPercentage { field: String, value: f64 },

    #[error("{field} must be positive, got {value}")]
    #[diagnostic(
        code(config::non_positive),
        help("Zero or negative values would disable the component entirely.")
    )]
    NonPositive { field: String, value: f64 },

    #[error("{field} cannot be negative, got {value}")]
    #[diagnostic(
        code(config::negative_budget),
        help("Budgets and unit costs are denominated in USD and must be >= 0.")
    )]
    Negative { field: String, value: f64 },

    #[error("ddl sampling is pinned at 100%, got {value}")]
    #[diagnostic(
        code(config::ddl_not_full),
        help("Schema-changing queries are always kept; leave query_types.ddl at 100.")
    )]
    DdlNotFull { value: f64 },

    #[error("{field} duration must be non-zero")]
    #[diagnostic(
        code(config::zero_duration),
        help("Intervals and timeouts drive background tasks and cannot be zero.")
    )]
    ZeroDuration { field: String },

    #[error("failure_window_size must be at least {min}, got {value}")]
    #[diagnostic(
        code(config::window_too_small),
        help("The failure percentage is meaningless over a near-empty window.")
    )]
    WindowTooSmall { min: usize, value: usize },
}

impl ConfigError {
    pub(crate) fn percentage(field: &str, value: f64) -> Self {
        ConfigError::InvalidPercentage {
            field: field.to_string(),
            value,
        }
    }

    pub(crate) fn non_positive(field: &str, value: f64) -> Self {
        ConfigError::NonPositive {
            field: field.to_string(),
            value,
        }
    }

    pub(crate) fn negative(field: &str, value: f64) -> Self {
        ConfigError::Negative {
            field: field.to_string(),
            value,
        }
    }

    pub(crate) fn zero_duration(field: &str) -> Self {
        ConfigError::ZeroDuration {
            field: field.to_string(),
        }
    }
}
