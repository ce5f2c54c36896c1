pub mod context;
pub mod error;
pub mod replicate;
pub mod scheduler;
pub mod schema;
pub mod watchdog;
pub mod watermark;

pub use context::ReplicationContext;
pub use error::{Phase, ReplicationError, Result};
pub use replicate::BatchReplicator;
pub use scheduler::{Backoff, MeasurementFailure, SchedulerOptions, SyncCycle, SyncScheduler};
pub use schema::{field_keys_from_sample, tag_keys_from_series, MeasurementSchema, SchemaDiscoverer};
pub use watchdog::{
    Liveness, LivenessClock, LivenessWatchdog, StallReport, TimeSource, LIVENESS_EXIT_CODE,
};
pub use watermark::{Watermark, WatermarkResolver};
