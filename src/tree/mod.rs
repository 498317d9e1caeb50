/// Aggregate state store fed by hierarchy walks
pub mod store;

pub use store::{AggregateStore, MonitorRecord};
