/*!
 * Cost Control
 * Budget accounting, alerts, and enforcement for telemetry ingest
 */

mod controller;

pub use controller::CostController;
