use std::io::Write;
use std::time::Duration;

use hearth_config::{load_config, ConfigError};
use hearth_domain::{PowerState, ServiceType, Source};

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(yaml.as_bytes()).expect("write config");
    file
}

const VALID: &str = r#"
controller:
  status_period: 15s
  reconcile_period: 5s
  reinit_interval: 30m
nodes:
  - id: host1
    name: Proxmox box
    hostname: 10.0.0.2
    mac: "aa:bb:cc:dd:ee:01"
    ssh_user: root
    ssh_key_path: /home/op/.ssh/id_ed25519
  - id: srv1
    hostname: 10.0.0.10
    mac: "aa:bb:cc:dd:ee:02"
    ssh_user: admin
    ssh_port: 2222
    parent_id: host1
    services:
      - name: web
        port: 443
        type: https
"#;

#[test]
fn load_valid_config() {
    let file = write_config(VALID);
    let config = load_config(file.path()).expect("should load without error");

    assert_eq!(config.settings.status_period, Duration::from_secs(15));
    assert_eq!(config.settings.reconcile_period, Duration::from_secs(5));
    assert_eq!(config.settings.reinit_interval, Duration::from_secs(1800));
    // Unset tunables keep their defaults
    assert_eq!(config.settings.wake_timeout, Duration::from_secs(300));
    assert!(config.settings.verify_hypervisor_certs);

    assert_eq!(config.nodes.len(), 2);
    let srv1 = config.nodes.iter().find(|n| n.id.as_str() == "srv1").unwrap();
    assert_eq!(srv1.ssh.user, "admin");
    assert_eq!(srv1.ssh.port, 2222);
    assert_eq!(srv1.parent.as_ref().unwrap().as_str(), "host1");
    assert_eq!(srv1.observed, PowerState::Unknown);
    assert_eq!(srv1.desired, PowerState::Off);
    assert_eq!(srv1.source, Source::Config);

    assert_eq!(srv1.services.len(), 1);
    assert_eq!(srv1.services[0].service_type, ServiceType::Https);
    assert_eq!(srv1.services[0].display_name, "web");
    assert_eq!(srv1.services[0].source, Source::Config);
}

#[test]
fn unknown_controller_key_rejected() {
    let file = write_config(
        r#"
controller:
  status_period: 15s
  frobnicate: true
nodes: []
"#,
    );
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::YamlParse { .. })
    ));
}

#[test]
fn unknown_node_key_rejected() {
    let file = write_config(
        r#"
nodes:
  - id: srv1
    hostname: 10.0.0.10
    favourite_colour: teal
"#,
    );
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::YamlParse { .. })
    ));
}

#[test]
fn invalid_mac_rejected() {
    let file = write_config(
        r#"
nodes:
  - id: srv1
    hostname: 10.0.0.10
    mac: "not-a-mac"
"#,
    );
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::Conversion { .. })
    ));
}

#[test]
fn unknown_service_type_rejected() {
    let file = write_config(
        r#"
nodes:
  - id: srv1
    hostname: 10.0.0.10
    services:
      - port: 1234
        type: quantum
"#,
    );
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::Conversion { .. })
    ));
}

#[test]
fn parent_cycle_rejected() {
    let file = write_config(
        r#"
nodes:
  - id: a
    hostname: 10.0.0.1
    parent_id: b
  - id: b
    hostname: 10.0.0.2
    parent_id: a
"#,
    );
    assert!(matches!(load_config(file.path()), Err(ConfigError::Graph(_))));
}

#[test]
fn dangling_parent_rejected() {
    let file = write_config(
        r#"
nodes:
  - id: a
    hostname: 10.0.0.1
    parent_id: ghost
"#,
    );
    assert!(matches!(load_config(file.path()), Err(ConfigError::Graph(_))));
}

#[test]
fn missing_file_returns_error() {
    let path = std::path::Path::new("/nonexistent/path/hearth.yml");
    assert!(matches!(load_config(path), Err(ConfigError::Io { .. })));
}
