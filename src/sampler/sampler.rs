/*!
 * Adaptive Sampler
 * Deduplication, per-type probability sampling, and token-bucket ceilings
 *
 * Stage order is cheapest-reject-first: dedup, then the probability check,
 * then per-type and global token buckets. The probability check is a
 * deterministic hash of the fingerprint, so the same query sampled at the
 * same rate always gets the same answer regardless of worker or restart.
 */

use crate::core::config::AdaptiveSamplerConfig;
use crate::core::limits::{
    ENFORCED_MIN_RATE, ENFORCEMENT_DECAY, FEEDBACK_EMA_ALPHA, HEADROOM_FILL_THRESHOLD,
    MAX_RATE_STEP, SAMPLING_HASH_SEED,
};
use crate::core::types::{Decision, DropReason, QueryType, TelemetryRecord};
use crate::monitoring::{Category, Collector, Event, Payload, Severity};
use crate::registry::HealthRegistry;
use crate::sampler::bucket::TokenBucket;
use crate::sampler::dedup::DedupCache;
use ahash::RandomState;
use parking_lot::Mutex;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct AdaptiveSampler {
    config: AdaptiveSamplerConfig,
    registry: Arc<HealthRegistry>,
    collector: Collector,
    dedup: DedupCache,
    global_bucket: TokenBucket,
    type_buckets: [Option<TokenBucket>; QueryType::COUNT],
    /// Fixed-seed hasher so the probability check is reproducible.
    hasher: RandomState,
    /// EMA of the global bucket's fill fraction, sampled each evaluation.
    fill_ema: Mutex<f64>,
}

impl AdaptiveSampler {
    pub fn new(
        config: AdaptiveSamplerConfig,
        registry: Arc<HealthRegistry>,
        collector: Collector,
    ) -> Self {
        let now = Instant::now();
        let limits = &config.per_type_limits;
        let type_buckets = [
            limits.get(QueryType::Select),
            limits.get(QueryType::Dml),
            limits.get(QueryType::Ddl),
            limits.get(QueryType::Audit),
            limits.get(QueryType::Unknown),
        ]
        .map(|limit| limit.map(|rate| TokenBucket::new(rate, now)));

        Self {
            dedup: DedupCache::new(config.cache_size, config.dedup_window),
            global_bucket: TokenBucket::new(config.max_traces_per_second, now),
            type_buckets,
            hasher: RandomState::with_seeds(
                SAMPLING_HASH_SEED[0],
                SAMPLING_HASH_SEED[1],
                SAMPLING_HASH_SEED[2],
                SAMPLING_HASH_SEED[3],
            ),
            fill_ema: Mutex::new(1.0),
            config,
            registry,
            collector,
        }
    }

    /// Decide admission for one record using the current instant.
    pub fn process(&self, record: &TelemetryRecord) -> Decision {
        self.process_at(record, Instant::now())
    }

    /// Decide admission as of an explicit instant.
    pub fn process_at(&self, record: &TelemetryRecord, now: Instant) -> Decision {
        if self.dedup.check_and_update(record.fingerprint, now) {
            return Decision::Drop(DropReason::Duplicate);
        }

        let rate = self
            .registry
            .with_lock(&record.database_id, |state| {
                state.rates[record.query_type.index()]
            });
        if !self.eligible(record.fingerprint, rate) {
            return Decision::Drop(DropReason::NotSampled);
        }

        if let Some(bucket) = &self.type_buckets[record.query_type.index()] {
            if !bucket.try_acquire(now) {
                return Decision::Drop(DropReason::RateLimited);
            }
            if !self.global_bucket.try_acquire(now) {
                // A global denial must not eat into the type's allowance
                bucket.refund();
                return Decision::Drop(DropReason::RateLimited);
            }
        } else if !self.global_bucket.try_acquire(now) {
            return Decision::Drop(DropReason::RateLimited);
        }
        Decision::Keep
    }

    /// Deterministic probability check: hash the fingerprint into [0, 1)
    /// and keep the record if it falls under the rate.
    fn eligible(&self, fingerprint: u64, rate: f64) -> bool {
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        let hashed = self.hasher.hash_one(fingerprint);
        // Top 53 bits give a uniform fraction with full f64 precision
        let fraction = (hashed >> 11) as f64 / (1u64 << 53) as f64;
        fraction < rate
    }

    /// One step of the feedback loop, run on the evaluation cadence.
    ///
    /// Databases under budget enforcement have their low-priority rates
    /// decayed multiplicatively; once enforcement clears, rates step back
    /// toward the configured baseline, but only while the global bucket
    /// shows sustained headroom. DDL and audit keep their floors
    /// throughout.
    pub fn adjust_rates(&self, now: Instant) {
        let fill = self.global_bucket.fill_fraction(now);
        let headroom = {
            let mut ema = self.fill_ema.lock();
            *ema = FEEDBACK_EMA_ALPHA * fill + (1.0 - FEEDBACK_EMA_ALPHA) * *ema;
            *ema >= HEADROOM_FILL_THRESHOLD
        };

        let baseline = self.config.rate_fractions();
        let adjustable = [QueryType::Select, QueryType::Dml, QueryType::Unknown];

        let mut events = Vec::new();
        self.registry.for_each(|id, state| {
            let enforced = state.budget.enforced;
            let mut changed = false;
            for query_type in adjustable {
                let idx = query_type.index();
                let current = state.rates[idx];
                let next = if enforced {
                    (current * ENFORCEMENT_DECAY).max(ENFORCED_MIN_RATE)
                } else if headroom && current < baseline[idx] {
                    (current + MAX_RATE_STEP).min(baseline[idx])
                } else {
                    current
                };
                if (next - current).abs() > f64::EPSILON {
                    state.rates[idx] = next;
                    changed = true;
                }
            }
            if changed {
                events.push(Event::new(
                    Severity::Info,
                    Category::Sampler,
                    Payload::RatesAdjusted {
                        database: id.to_string(),
                        select: state.rates[QueryType::Select.index()],
                        dml: state.rates[QueryType::Dml.index()],
                        audit: state.rates[QueryType::Audit.index()],
                    },
                ));
            }
        });

        for event in events {
            debug!(?event.payload, "sampling rates adjusted");
            self.collector.emit(event);
        }
    }

    /// Evict expired dedup entries. Runs on the sweep cadence.
    pub fn sweep_dedup(&self, now: Instant) -> usize {
        self.dedup.sweep(now)
    }
}
