pub mod collector;
pub mod process;

pub use collector::ReplicationMetrics;
pub use process::ProcessMetricsCollector;
