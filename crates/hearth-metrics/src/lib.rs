pub mod error;
pub mod names;
pub mod sink;
pub mod writer;

pub use error::MetricsError;
pub use sink::MetricsSink;
pub use writer::{InMemoryWriter, TimeSeriesWriter};
