//! The five periodic loops. Each tick fans out short-lived per-node
//! workers; the loops themselves never block on I/O and observe the stop
//! signal between ticks. In-flight workers are allowed to finish after
//! stop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hearth_config::Settings;
use hearth_domain::PowerState;
use hearth_metrics::{names, MetricsSink};
use hearth_store::NodeStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::discovery::Discovery;
use crate::init::{should_attempt_initialization, Initializer};
use crate::reconcile::{needs_reconcile, Reconciler};
use crate::status::StatusCheck;
use crate::telemetry::SystemCheck;

const FLUSH_PERIOD: Duration = Duration::from_secs(30);

pub struct Scheduler {
    pub store: Arc<dyn NodeStore>,
    pub sink: MetricsSink,
    pub settings: Settings,
    pub status: Arc<StatusCheck>,
    pub reconciler: Arc<Reconciler>,
    pub telemetry: Arc<SystemCheck>,
    pub initializer: Arc<Initializer>,
    pub discovery: Arc<Discovery>,
}

impl Scheduler {
    /// Start every loop plus the metric flusher. The returned handles
    /// finish once `stop` flips to true.
    pub fn spawn(self: &Arc<Self>, stop: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            status = ?self.settings.status_period,
            reconcile = ?self.settings.reconcile_period,
            telemetry = ?self.settings.telemetry_period,
            init = ?self.settings.init_period,
            discovery = ?self.settings.discovery_period,
            "starting control loops"
        );

        vec![
            self.spawn_status_loop(stop.clone()),
            self.spawn_reconcile_loop(stop.clone()),
            self.spawn_telemetry_loop(stop.clone()),
            self.spawn_init_loop(stop.clone()),
            self.spawn_discovery_loop(stop.clone()),
            self.sink.spawn_flusher(FLUSH_PERIOD, stop),
        ]
    }

    fn spawn_status_loop(self: &Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.settings.status_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let nodes = this.store.list().await;
                        let online = nodes
                            .iter()
                            .filter(|n| n.observed == PowerState::On)
                            .count();
                        this.sink.push(names::SYSTEM_NODE_ID, names::MONITORING_CYCLE, 1.0).await;
                        this.sink
                            .push(names::SYSTEM_NODE_ID, names::MONITORING_SERVER_COUNT, nodes.len() as f64)
                            .await;
                        this.sink
                            .push(names::SYSTEM_NODE_ID, names::TOTAL_SERVERS, nodes.len() as f64)
                            .await;
                        this.sink
                            .push(names::SYSTEM_NODE_ID, names::ONLINE_SERVERS, online as f64)
                            .await;

                        for node in nodes {
                            let status = this.status.clone();
                            tokio::spawn(async move { status.check(&node.id).await });
                        }
                    }
                    _ = stop.changed() => return,
                }
            }
        })
    }

    fn spawn_reconcile_loop(self: &Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.settings.reconcile_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        for node in this.store.list().await {
                            if !needs_reconcile(&node, &this.settings, now) {
                                continue;
                            }
                            let reconciler = this.reconciler.clone();
                            tokio::spawn(async move {
                                reconciler.reconcile_node(&node.id, "reconciler").await
                            });
                        }
                    }
                    _ = stop.changed() => return,
                }
            }
        })
    }

    fn spawn_telemetry_loop(self: &Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.settings.telemetry_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let nodes = this.store.list().await;
                        let eligible: Vec<_> = nodes
                            .iter()
                            .filter(|n| SystemCheck::eligible(n))
                            .collect();
                        this.sink.push(names::SYSTEM_NODE_ID, names::SYSTEM_CHECK_CYCLE, 1.0).await;
                        this.sink
                            .push(names::SYSTEM_NODE_ID, names::CHECKED_SERVERS, eligible.len() as f64)
                            .await;

                        for node in eligible {
                            let telemetry = this.telemetry.clone();
                            let id = node.id.clone();
                            tokio::spawn(async move { telemetry.check(&id).await });
                        }
                    }
                    _ = stop.changed() => return,
                }
            }
        })
    }

    fn spawn_init_loop(self: &Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.settings.init_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        for node in this.store.list().await {
                            if !should_attempt_initialization(&node, &this.settings, now) {
                                continue;
                            }
                            let initializer = this.initializer.clone();
                            tokio::spawn(async move { initializer.run(&node.id).await; });
                        }
                    }
                    _ = stop.changed() => return,
                }
            }
        })
    }

    fn spawn_discovery_loop(self: &Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.settings.discovery_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.discovery.tick().await;
                    }
                    _ = stop.changed() => return,
                }
            }
        })
    }
}
