use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Raw YAML representation of the whole config file.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub controller: Settings,
    #[serde(default)]
    pub nodes: Vec<RawNode>,
}

/// Raw YAML representation of one managed node.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawNode {
    pub id: String,
    /// Human name; defaults to the id.
    pub name: Option<String>,
    pub hostname: String,
    /// Hardware address for wake-on-LAN.
    pub mac: Option<String>,
    pub parent_id: Option<String>,

    pub ssh_user: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_key_path: Option<String>,

    #[serde(default)]
    pub services: Vec<RawService>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawService {
    /// Display name; defaults to the type.
    pub name: Option<String>,
    pub port: u16,
    #[serde(rename = "type")]
    pub service_type: String,
}
