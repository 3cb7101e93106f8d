/*!
 * Health Registry
 * Sharded concurrent store of per-database health state
 *
 * The registry does no business logic: it creates entries lazily, runs
 * caller closures under the key's shard lock, and reaps idle entries.
 * There is no cross-shard coordination, so throughput scales with cores
 * up to the shard count.
 */

use crate::core::limits::{MAX_REGISTRY_SHARDS, MIN_REGISTRY_SHARDS};
use crate::core::types::{DatabaseId, QueryType};
use crate::registry::state::{HealthSnapshot, HealthState};
use ahash::RandomState;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Template for lazily-created entries.
#[derive(Debug, Clone)]
pub struct StateSeed {
    pub rates: [f64; QueryType::COUNT],
    pub window_size: usize,
}

/// Sharded per-database health store.
pub struct HealthRegistry {
    states: DashMap<DatabaseId, HealthState, RandomState>,
    seed: StateSeed,
}

impl HealthRegistry {
    pub fn new(seed: StateSeed) -> Self {
        Self {
            states: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                Self::shard_count(),
            ),
            seed,
        }
    }

    /// CPU-proportional power-of-two shard count, clamped. Hot per-record
    /// access from every worker puts this in the high-contention profile.
    fn shard_count() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        (cpus * 4)
            .next_power_of_two()
            .clamp(MIN_REGISTRY_SHARDS, MAX_REGISTRY_SHARDS)
    }

    /// Run `f` on the entry for `id` under its shard lock, creating the
    /// entry if this is the first sight of the database. The closure is the
    /// atomic read-modify-write unit; nothing escapes the lock.
    pub fn with_lock<R>(&self, id: &DatabaseId, f: impl FnOnce(&mut HealthState) -> R) -> R {
        let mut entry = self.states.entry(id.clone()).or_insert_with(|| {
            HealthState::new(
                self.seed.rates,
                self.seed.window_size,
                Instant::now(),
                OffsetDateTime::now_utc().date(),
            )
        });
        entry.last_seen = Instant::now();
        f(entry.value_mut())
    }

    /// Visit every entry under its shard lock. Used by the periodic
    /// feedback and rollover sweeps, never on the per-record path.
    pub fn for_each(&self, mut f: impl FnMut(&DatabaseId, &mut HealthState)) {
        for mut entry in self.states.iter_mut() {
            let (key, state) = entry.pair_mut();
            let key = key.clone();
            f(&key, state);
        }
    }

    /// Read-only copy of one entry.
    pub fn snapshot(&self, id: &DatabaseId) -> Option<HealthSnapshot> {
        self.states.get(id).map(|entry| entry.snapshot())
    }

    /// Read-only copy of every entry, for metrics and debugging.
    pub fn snapshot_all(&self) -> Vec<(DatabaseId, HealthSnapshot)> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.snapshot()))
            .collect()
    }

    /// Remove entries unseen for `ttl`. Returns how many were reaped.
    pub fn reap_idle(&self, ttl: Duration) -> usize {
        let before = self.states.len();
        let now = Instant::now();
        self.states
            .retain(|_, state| now.duration_since(state.last_seen) < ttl);
        before - self.states.len()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
