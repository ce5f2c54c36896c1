pub mod error;
pub mod influx;
pub mod line_protocol;
pub mod memory;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use influx::{InfluxConfig, InfluxStore};
pub use memory::{MemoryStore, StoreOp};
pub use query::{quote_ident, InfluxQuery};
pub use store::TimeSeriesStore;

pub use flux_types::{FieldValue, Point, Row, SeriesKey};
