use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use hearth_config::load_config;
use hearth_effector::{ProxmoxConnector, SshExecutor, WolSender};
use hearth_metrics::InMemoryWriter;
use hearth_monitor::Controller;
use tracing::{debug, info};

pub async fn run(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(nodes = config.nodes.len(), "config loaded");

    let connector = Arc::new(ProxmoxConnector {
        verify_certs: config.settings.verify_hypervisor_certs,
    });
    let controller = Controller::new(
        config,
        Arc::new(InMemoryWriter::new()),
        Arc::new(SshExecutor::new()),
        Arc::new(WolSender::new()),
        connector,
    )
    .await?;

    // The HTTP layer would own this stream; standalone we log transitions.
    if let Some(mut updates) = controller.updates().await {
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                debug!(node_id = %update.id, observed = %update.observed, "node update");
            }
        });
    }

    let handles = controller.start();
    info!("hearth running, ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("stopping");
    controller.stop();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

pub async fn check(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)
        .with_context(|| format!("validating {}", config_path.display()))?;

    println!("config ok: {} node(s)", config.nodes.len());
    for node in &config.nodes {
        let parent = node
            .parent
            .as_ref()
            .map(|p| format!(" (child of {})", p))
            .unwrap_or_default();
        println!(
            "  {}  {}  mac={}{}",
            node.id,
            node.hostname,
            node.mac.map(|m| m.to_string()).unwrap_or_else(|| "-".into()),
            parent
        );
    }
    Ok(())
}
