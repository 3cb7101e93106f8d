/*!
 * Core Types
 * Record model and admission decisions shared by all pipeline stages
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Correlation key for a monitored database: endpoint plus logical name.
///
/// Every piece of shared state (circuit, sampling rates, budgets) is keyed
/// by this identity. Records never mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseId {
    pub endpoint: String,
    pub name: String,
}

impl DatabaseId {
    pub fn new(endpoint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            name: name.into(),
        }
    }

    /// Reserved key used when breaker state is collapsed to a single
    /// global circuit (`per_database = false`).
    pub fn global() -> Self {
        Self {
            endpoint: String::new(),
            name: "*".to_string(),
        }
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.endpoint, self.name)
    }
}

/// Query classification extracted by the receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum QueryType {
    Select = 0,
    Dml = 1,
    Ddl = 2,
    Audit = 3,
    Unknown = 4,
}

impl QueryType {
    pub const COUNT: usize = 5;

    /// Index into per-type rate tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            QueryType::Select => "select",
            QueryType::Dml => "dml",
            QueryType::Ddl => "ddl",
            QueryType::Audit => "audit",
            QueryType::Unknown => "unknown",
        }
    }
}

/// Outcome of the collection attempt that produced a record.
///
/// `Unknown` covers records missing classification; those are excluded from
/// breaker statistics rather than failing processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    Timeout,
    Unknown,
}

impl Outcome {
    /// Failure classification for the circuit breaker window.
    /// Returns `None` for outcomes excluded from the statistic.
    #[inline]
    pub fn as_failure(self) -> Option<bool> {
        match self {
            Outcome::Success => Some(false),
            Outcome::Error | Outcome::Timeout => Some(true),
            Outcome::Unknown => None,
        }
    }
}

/// One span, metric point, or log event describing database activity.
///
/// Immutable once produced by a receiver; stages attach a [`Decision`]
/// but never mutate `database_id` or `fingerprint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub database_id: DatabaseId,
    pub query_type: QueryType,
    pub duration: Duration,
    pub outcome: Outcome,
    /// Serialized size used for cost accounting.
    pub estimated_bytes: u64,
    /// Hash of the normalized query text, used for dedup and for the
    /// deterministic sampling decision.
    pub fingerprint: u64,
}

impl TelemetryRecord {
    pub fn new(database_id: DatabaseId, query_type: QueryType) -> Self {
        Self {
            database_id,
            query_type,
            duration: Duration::ZERO,
            outcome: Outcome::Unknown,
            estimated_bytes: 0,
            fingerprint: 0,
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.estimated_bytes = bytes;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = fingerprint;
        self
    }
}

/// Why a record was dropped, for exact per-stage accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The database's circuit is open; collection is presumed harmful.
    CircuitOpen,
    /// Identical fingerprint already sampled within the dedup window.
    Duplicate,
    /// Failed the per-type probability check.
    NotSampled,
    /// Eligible, but no token was available.
    RateLimited,
    /// Budget exhausted and enforcement active.
    BudgetExceeded,
}

/// Admission decision attached to each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Keep,
    Drop(DropReason),
}

impl Decision {
    #[inline]
    pub fn is_keep(self) -> bool {
        matches!(self, Decision::Keep)
    }
}

/// A record with its final admission decision.
#[derive(Debug, Clone)]
pub struct DecidedRecord {
    pub record: TelemetryRecord,
    pub decision: Decision,
}
