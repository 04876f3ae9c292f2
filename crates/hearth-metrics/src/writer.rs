use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_domain::MetricSample;
use tokio::sync::RwLock;

use crate::error::MetricsError;

/// The persistent time-series store. The on-disk layout is the writer's
/// business; the core only pushes samples and delegates range queries.
#[async_trait]
pub trait TimeSeriesWriter: Send + Sync + 'static {
    async fn write_batch(&self, samples: &[MetricSample]) -> Result<(), MetricsError>;

    /// All series for a node in `[start, end)`, keyed by metric name.
    async fn query_range(
        &self,
        node_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<(DateTime<Utc>, f64)>>, MetricsError>;
}

/// Keeps every sample in memory. Backs tests and ephemeral deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWriter {
    samples: Arc<RwLock<Vec<MetricSample>>>,
}

impl InMemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn samples(&self) -> Vec<MetricSample> {
        self.samples.read().await.clone()
    }
}

#[async_trait]
impl TimeSeriesWriter for InMemoryWriter {
    async fn write_batch(&self, samples: &[MetricSample]) -> Result<(), MetricsError> {
        self.samples.write().await.extend_from_slice(samples);
        Ok(())
    }

    async fn query_range(
        &self,
        node_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<(DateTime<Utc>, f64)>>, MetricsError> {
        let guard = self.samples.read().await;
        let mut out: HashMap<String, Vec<(DateTime<Utc>, f64)>> = HashMap::new();
        for sample in guard.iter() {
            if sample.node_id == node_id && sample.timestamp >= start && sample.timestamp < end {
                out.entry(sample.metric_name.clone())
                    .or_default()
                    .push((sample.timestamp, sample.value));
            }
        }
        Ok(out)
    }
}
