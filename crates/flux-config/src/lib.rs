pub mod loader;
pub mod settings;

pub use loader::{ConfigLoader, ENV_PREFIX};
pub use settings::{
    LoggingConfig, MetricsConfig, ReplicatorConfig, StoreConfig, SyncConfig, WatchdogConfig,
};
