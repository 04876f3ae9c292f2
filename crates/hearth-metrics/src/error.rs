use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("time-series writer error: {0}")]
    Writer(String),
}
