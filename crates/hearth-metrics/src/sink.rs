use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hearth_domain::MetricSample;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::names;
use crate::writer::TimeSeriesWriter;

#[derive(Debug, Default)]
struct Inner {
    /// Latest value per metric, per node; backs UI snapshots without a
    /// round-trip to the historical store.
    latest: HashMap<String, HashMap<String, f64>>,
    buffer: Vec<MetricSample>,
}

/// Buffered push interface in front of the time-series writer. Pushes never
/// perform I/O; a periodic [`flush`](MetricsSink::flush) drains the buffer.
/// Writer failures are logged and the batch dropped; metrics never steer
/// control flow.
#[derive(Clone)]
pub struct MetricsSink {
    writer: Arc<dyn TimeSeriesWriter>,
    inner: Arc<RwLock<Inner>>,
}

impl MetricsSink {
    pub fn new(writer: Arc<dyn TimeSeriesWriter>) -> Self {
        MetricsSink {
            writer,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub async fn push(&self, node_id: &str, metric_name: &str, value: f64) {
        let mut guard = self.inner.write().await;
        guard
            .latest
            .entry(node_id.to_string())
            .or_default()
            .insert(metric_name.to_string(), value);
        guard.buffer.push(MetricSample {
            node_id: node_id.to_string(),
            metric_name: metric_name.to_string(),
            value,
            timestamp: Utc::now(),
        });
    }

    /// Latest value per metric name for one node.
    pub async fn latest_values(&self, node_id: &str) -> HashMap<String, f64> {
        let guard = self.inner.read().await;
        guard.latest.get(node_id).cloned().unwrap_or_default()
    }

    pub fn tracked_names(&self) -> &'static [&'static str] {
        names::TRACKED
    }

    /// Drain the buffer into the writer. Returns the number of samples
    /// handed over (also on writer failure, when they are dropped).
    pub async fn flush(&self) -> usize {
        let batch: Vec<MetricSample> = {
            let mut guard = self.inner.write().await;
            std::mem::take(&mut guard.buffer)
        };
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        if let Err(e) = self.writer.write_batch(&batch).await {
            warn!(dropped = count, error = %e, "metric flush failed, batch dropped");
        } else {
            debug!(flushed = count, "metric batch flushed");
        }
        count
    }

    /// Background flusher; stops when `stop` flips.
    pub fn spawn_flusher(
        &self,
        period: Duration,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let sink = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sink.flush().await;
                    }
                    _ = stop.changed() => {
                        // final drain so short-lived runs don't lose samples
                        sink.flush().await;
                        return;
                    }
                }
            }
        })
    }
}
