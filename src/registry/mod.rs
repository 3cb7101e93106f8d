/*!
 * Database Health Registry
 * Concurrent per-database state shared by all admission stages
 */

mod state;
mod store;

pub use state::{
    BudgetAccount, CircuitState, CircuitStateKind, FailureWindow, HealthSnapshot, HealthState,
    PeriodUsage,
};
pub use store::{HealthRegistry, StateSeed};
