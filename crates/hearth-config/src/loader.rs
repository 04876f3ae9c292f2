use std::path::Path;

use hearth_domain::{
    Node, NodeId, Service, ServiceStatus, ServiceType, Source,
};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawConfig, RawNode, RawService};
use crate::settings::Settings;

/// A fully loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub nodes: Vec<Node>,
}

/// Load the config file at `path` and validate it.
///
/// Unknown keys anywhere in the file are load errors; the parent graph
/// must be a forest.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    let nodes = raw
        .nodes
        .into_iter()
        .map(|n| convert_node(n, path))
        .collect::<Result<Vec<_>, _>>()?;

    hearth_graph::validate(&nodes)?;

    debug!(nodes = nodes.len(), "loaded config from {}", path.display());

    Ok(Config {
        settings: raw.controller,
        nodes,
    })
}

fn convert_node(raw: RawNode, path: &Path) -> Result<Node, ConfigError> {
    if raw.id.is_empty() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "node id must not be empty".to_string(),
        });
    }

    let mut node = Node::physical(&raw.id, raw.hostname);
    node.name = raw.name.unwrap_or_default();
    node.source = Source::Config;

    if let Some(mac) = raw.mac {
        node.mac = Some(mac.parse().map_err(|_| ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("node '{}': invalid mac '{}'", raw.id, mac),
        })?);
    }
    node.parent = raw.parent_id.map(NodeId::new);

    if let Some(user) = raw.ssh_user {
        node.ssh.user = user;
    }
    if let Some(port) = raw.ssh_port {
        node.ssh.port = port;
    }
    if let Some(key_path) = raw.ssh_key_path {
        node.ssh.key_path = key_path;
    }

    node.services = raw
        .services
        .into_iter()
        .map(|s| convert_service(s, &node.id, path))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(node)
}

fn convert_service(raw: RawService, node_id: &NodeId, path: &Path) -> Result<Service, ConfigError> {
    let service_type = parse_service_type(&raw.service_type, path)?;
    let display_name = raw.name.unwrap_or_else(|| service_type.to_string());
    Ok(Service {
        id: Service::discovered_id(node_id, raw.port),
        node_id: node_id.clone(),
        display_name,
        port: raw.port,
        service_type,
        status: ServiceStatus::Down,
        last_check: None,
        source: Source::Config,
    })
}

fn parse_service_type(s: &str, path: &Path) -> Result<ServiceType, ConfigError> {
    match s {
        "ssh" => Ok(ServiceType::Ssh),
        "rdp" => Ok(ServiceType::Rdp),
        "vnc" => Ok(ServiceType::Vnc),
        "smb" => Ok(ServiceType::Smb),
        "http" => Ok(ServiceType::Http),
        "https" => Ok(ServiceType::Https),
        "telnet" => Ok(ServiceType::Telnet),
        "nfs" => Ok(ServiceType::Nfs),
        "ftp" => Ok(ServiceType::Ftp),
        "database" => Ok(ServiceType::Database),
        "dns" => Ok(ServiceType::Dns),
        "mail" => Ok(ServiceType::Mail),
        "ldap" => Ok(ServiceType::Ldap),
        "proxmox" => Ok(ServiceType::Proxmox),
        "custom" => Ok(ServiceType::Custom),
        other => Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("unknown service type '{}'", other),
        }),
    }
}
