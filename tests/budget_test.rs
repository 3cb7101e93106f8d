/*!
 * Budget Property Tests
 * Conservation and enforcement invariants of the cost controller
 */

use db_sentinel::cost::CostController;
use db_sentinel::core::config::CostControlConfig;
use db_sentinel::monitoring::Collector;
use db_sentinel::registry::{HealthRegistry, StateSeed};
use db_sentinel::{DatabaseId, Decision, QueryType, TelemetryRecord};
use proptest::prelude::*;
use std::sync::Arc;
use time::macros::date;

fn controller(config: CostControlConfig) -> (CostController, Arc<HealthRegistry>) {
    let registry = Arc::new(HealthRegistry::new(StateSeed {
        rates: [0.05, 0.5, 1.0, 0.01, 0.01],
        window_size: 10,
    }));
    let ctl = CostController::new(config, Arc::clone(&registry), Collector::new());
    (ctl, registry)
}

proptest! {
    /// Every byte of every kept record is accounted, and nothing else is.
    #[test]
    fn prop_charged_bytes_equal_kept_bytes(sizes in prop::collection::vec(0u64..10_000_000, 1..100)) {
        let (ctl, registry) = controller(CostControlConfig::default());
        let id = DatabaseId::new("pg", "orders");
        let today = date!(2026 - 08 - 24);

        let mut kept_bytes = 0u64;
        let mut kept_events = 0u64;
        for &bytes in &sizes {
            let record = TelemetryRecord::new(id.clone(), QueryType::Select).with_bytes(bytes);
            if ctl.process_at(&record, today) == Decision::Keep {
                kept_bytes += bytes;
                kept_events += 1;
            }
        }

        let snap = registry.snapshot(&id).unwrap();
        prop_assert_eq!(snap.daily_consumed_bytes, kept_bytes);
        prop_assert_eq!(snap.monthly_consumed_bytes, kept_bytes);
        prop_assert!(kept_events >= 1);
    }

    /// Once a low-priority record is shed within a period, every later
    /// low-priority record in that period is shed too.
    #[test]
    fn prop_enforcement_monotonic_within_period(sizes in prop::collection::vec(0u64..200_000_000, 1..200)) {
        let config = CostControlConfig {
            daily_budget_usd: 0.35,
            monthly_budget_usd: 10_000.0,
            ..Default::default()
        };
        let (ctl, _) = controller(config);
        let id = DatabaseId::new("pg", "orders");
        let today = date!(2026 - 08 - 24);

        let mut shedding = false;
        for &bytes in &sizes {
            let record = TelemetryRecord::new(id.clone(), QueryType::Select).with_bytes(bytes);
            match ctl.process_at(&record, today) {
                Decision::Keep => prop_assert!(!shedding, "kept after shedding began"),
                Decision::Drop(_) => shedding = true,
            }
        }
    }

    /// Schema changes pass regardless of enforcement state.
    #[test]
    fn prop_ddl_never_shed(sizes in prop::collection::vec(1u64..200_000_000, 1..50)) {
        let config = CostControlConfig {
            daily_budget_usd: 0.35,
            monthly_budget_usd: 10_000.0,
            ..Default::default()
        };
        let (ctl, _) = controller(config);
        let id = DatabaseId::new("pg", "orders");
        let today = date!(2026 - 08 - 24);

        for &bytes in &sizes {
            let select = TelemetryRecord::new(id.clone(), QueryType::Select).with_bytes(bytes);
            let _ = ctl.process_at(&select, today);
            let ddl = TelemetryRecord::new(id.clone(), QueryType::Ddl).with_bytes(bytes);
            prop_assert_eq!(ctl.process_at(&ddl, today), Decision::Keep);
        }
    }

    /// Rollover to a new day resets daily usage but preserves the monthly
    /// account.
    #[test]
    fn prop_daily_rollover_preserves_monthly(sizes in prop::collection::vec(1u64..1_000_000, 1..50)) {
        let (ctl, registry) = controller(CostControlConfig::default());
        let id = DatabaseId::new("pg", "orders");

        let mut total = 0u64;
        for &bytes in &sizes {
            let record = TelemetryRecord::new(id.clone(), QueryType::Select).with_bytes(bytes);
            if ctl.process_at(&record, date!(2026 - 08 - 24)) == Decision::Keep {
                total += bytes;
            }
        }
        let record = TelemetryRecord::new(id.clone(), QueryType::Select).with_bytes(100);
        prop_assert_eq!(ctl.process_at(&record, date!(2026 - 08 - 25)), Decision::Keep);

        let snap = registry.snapshot(&id).unwrap();
        prop_assert_eq!(snap.daily_consumed_bytes, 100);
        prop_assert_eq!(snap.monthly_consumed_bytes, total + 100);
    }
}
