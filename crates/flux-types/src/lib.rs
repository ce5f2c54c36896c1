pub mod point;
pub mod series;

pub use point::{FieldValue, Point, Row};
pub use series::{escape_key, escape_measurement, SeriesKey, SeriesKeyError};
