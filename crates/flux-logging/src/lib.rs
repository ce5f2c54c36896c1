pub mod subscriber;

pub use subscriber::{build_filter, init, parse_filter, LoggingError, LoggingOptions};
