/*!
 * Limits and Constants
 *
 * Centralized defaults, bounds, and tuning constants for the admission
 * pipeline, grouped by component.
 */

use std::time::Duration;

// =============================================================================
// REGISTRY
// =============================================================================

/// Minimum shard count for the health registry.
/// Avoids degenerate sharding on 1-2 core hosts.
pub const MIN_REGISTRY_SHARDS: usize = 8;

/// Maximum shard count for the health registry.
/// Diminishing returns beyond this; memory overhead grows linearly.
pub const MAX_REGISTRY_SHARDS: usize = 512;

/// Default idle TTL before a database entry is reaped.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3600);

/// Default reaper cadence.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(300);

// =============================================================================
// CIRCUIT BREAKER
// =============================================================================

/// Default consecutive-failure trip threshold.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Default failure percentage trip threshold over the window.
pub const DEFAULT_FAILURE_THRESHOLD_PERCENT: f64 = 50.0;

/// Default open-state cooldown before probing.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-attempt collection timeout (consumed by receivers, carried
/// here so one config block describes the whole breaker).
pub const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default probe cadence while half-open.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default probes admitted per health-check interval while half-open.
pub const DEFAULT_HALF_OPEN_MAX_PROBES: u32 = 1;

/// Default fixed-size outcome window.
/// Count-based rather than wall-clock to bound memory and avoid drift.
pub const DEFAULT_FAILURE_WINDOW_SIZE: usize = 50;

/// Smallest window for which a failure percentage is meaningful.
pub const MIN_FAILURE_WINDOW_SIZE: usize = 4;

// =============================================================================
// ADAPTIVE SAMPLER
// =============================================================================

/// Default overall sampling percentage when no per-type rate applies.
pub const DEFAULT_SAMPLING_PERCENTAGE: f64 = 10.0;

/// Default global admission ceiling.
pub const DEFAULT_MAX_TRACES_PER_SECOND: u32 = 100;

/// Default dedup cache capacity (fingerprints).
pub const DEFAULT_DEDUP_CACHE_SIZE: usize = 10_000;

/// Default dedup window.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// Default dedup TTL sweep cadence.
pub const DEFAULT_DEDUP_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default cadence of the adaptive feedback loop.
pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(30);

/// EMA smoothing factor for the token-bucket fill signal.
pub const FEEDBACK_EMA_ALPHA: f64 = 0.3;

/// Bucket fill fraction above which the sampler is considered
/// under-admitting (sustained headroom).
pub const HEADROOM_FILL_THRESHOLD: f64 = 0.7;

/// Largest single-step rate adjustment per evaluation interval.
pub const MAX_RATE_STEP: f64 = 0.10;

/// Multiplicative decay applied to low-priority rates under enforcement.
pub const ENFORCEMENT_DECAY: f64 = 0.5;

/// Rates never decay below this while enforced, so recovery is possible.
pub const ENFORCED_MIN_RATE: f64 = 0.001;

// =============================================================================
// COST CONTROLLER
// =============================================================================

/// Bytes per GB for cost conversion.
pub const BYTES_PER_GB: f64 = (1024 * 1024 * 1024) as f64;

/// Default alert threshold as percent of budget.
pub const DEFAULT_ALERT_THRESHOLD_PERCENT: f64 = 80.0;

/// Default budget rollover sweep cadence (also runs inline with accounting;
/// the sweep only matters for databases with no traffic at the boundary).
pub const DEFAULT_ROLLOVER_CHECK_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// PIPELINE / OBSERVABILITY
// =============================================================================

/// Observability event ring capacity (power of 2).
pub const EVENT_RING_SIZE: usize = 4096;

/// Default worker task count (0 = derive from available parallelism).
pub const DEFAULT_WORKERS: usize = 0;

/// Default batch queue depth between submitters and workers.
pub const DEFAULT_BATCH_QUEUE_DEPTH: usize = 64;

/// Default shutdown grace period for in-flight batches.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Fixed seed for the deterministic sampling hash. The admission decision
/// must be reproducible for a given fingerprint and rate.
pub const SAMPLING_HASH_SEED: [u64; 4] = [
    0x9e37_79b9_7f4a_7c15,
    0xf39c_c060_5ced_c834,
    0x1082_276b_f3a2_7251,
    0x7f4a_7c15_9e37_79b9,
];
