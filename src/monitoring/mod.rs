/*!
 * Monitoring
 * Self-observability for the admission pipeline: events and counters
 */

mod collector;
mod events;
mod tracer;

pub use collector::{Collector, CountersSnapshot};
pub use events::{BudgetPeriod, Category, Event, EventStream, Payload, Severity, StreamStats, Subscriber};
pub use tracer::init_tracing;
