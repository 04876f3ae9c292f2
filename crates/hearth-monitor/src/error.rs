use thiserror::Error;

/// Errors surfaced through the collaborator-facing controller API. Transient
/// external failures never appear here; they are reflected in node state,
/// metrics and the action log instead.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("invalid desired state '{state}' for node '{node}': {reason}")]
    InvalidDesiredState {
        node: String,
        state: String,
        reason: String,
    },

    #[error("store error: {0}")]
    Store(#[from] hearth_store::StoreError),

    #[error("metrics error: {0}")]
    Metrics(#[from] hearth_metrics::MetricsError),
}
