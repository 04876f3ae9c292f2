use hearth_domain::ServiceType;

/// Curated catalog of ports worth probing on a homelab host, with friendly
/// names. Discovery scans offer these to nodes believed on; ports already
/// declared in config are skipped.
pub const WELL_KNOWN_PORTS: &[(u16, &str, ServiceType)] = &[
    (21, "FTP", ServiceType::Ftp),
    (22, "SSH", ServiceType::Ssh),
    (23, "Telnet", ServiceType::Telnet),
    (25, "SMTP", ServiceType::Mail),
    (53, "DNS", ServiceType::Dns),
    (80, "HTTP", ServiceType::Http),
    (110, "POP3", ServiceType::Mail),
    (111, "Portmapper", ServiceType::Custom),
    (139, "NetBIOS", ServiceType::Smb),
    (143, "IMAP", ServiceType::Mail),
    (389, "LDAP", ServiceType::Ldap),
    (443, "HTTPS", ServiceType::Https),
    (445, "SMB", ServiceType::Smb),
    (465, "SMTPS", ServiceType::Mail),
    (548, "AFP", ServiceType::Custom),
    (554, "RTSP", ServiceType::Custom),
    (587, "SMTP submission", ServiceType::Mail),
    (631, "CUPS", ServiceType::Http),
    (636, "LDAPS", ServiceType::Ldap),
    (853, "DNS over TLS", ServiceType::Dns),
    (873, "rsync", ServiceType::Custom),
    (993, "IMAPS", ServiceType::Mail),
    (995, "POP3S", ServiceType::Mail),
    (1194, "OpenVPN", ServiceType::Custom),
    (1433, "MS SQL", ServiceType::Database),
    (1521, "Oracle DB", ServiceType::Database),
    (1880, "Node-RED", ServiceType::Http),
    (1883, "MQTT", ServiceType::Custom),
    (2049, "NFS", ServiceType::Nfs),
    (2222, "SSH (alt)", ServiceType::Ssh),
    (2375, "Docker API", ServiceType::Custom),
    (2376, "Docker API (TLS)", ServiceType::Custom),
    (3000, "Grafana", ServiceType::Http),
    (3001, "Uptime Kuma", ServiceType::Http),
    (3128, "Squid proxy", ServiceType::Custom),
    (3306, "MySQL", ServiceType::Database),
    (3389, "RDP", ServiceType::Rdp),
    (3493, "Network UPS Tools", ServiceType::Custom),
    (4533, "Navidrome", ServiceType::Http),
    (5000, "Synology DSM", ServiceType::Http),
    (5001, "Synology DSM (TLS)", ServiceType::Https),
    (5044, "Logstash", ServiceType::Custom),
    (5080, "VPN portal", ServiceType::Http),
    (5432, "PostgreSQL", ServiceType::Database),
    (5601, "Kibana", ServiceType::Http),
    (5800, "VNC (web)", ServiceType::Vnc),
    (5900, "VNC", ServiceType::Vnc),
    (5901, "VNC (display 1)", ServiceType::Vnc),
    (6379, "Redis", ServiceType::Database),
    (6443, "Kubernetes API", ServiceType::Https),
    (6881, "BitTorrent", ServiceType::Custom),
    (7878, "Radarr", ServiceType::Http),
    (8000, "HTTP (alt)", ServiceType::Http),
    (8006, "Proxmox VE", ServiceType::Proxmox),
    (8007, "Proxmox Backup", ServiceType::Proxmox),
    (8008, "HTTP (alt)", ServiceType::Http),
    (8080, "HTTP proxy", ServiceType::Http),
    (8081, "HTTP (alt)", ServiceType::Http),
    (8083, "Calibre-Web", ServiceType::Http),
    (8086, "InfluxDB", ServiceType::Database),
    (8089, "Splunk", ServiceType::Https),
    (8096, "Jellyfin", ServiceType::Http),
    (8112, "Deluge", ServiceType::Http),
    (8123, "Home Assistant", ServiceType::Http),
    (8200, "MinIO console", ServiceType::Http),
    (8384, "Syncthing", ServiceType::Http),
    (8443, "HTTPS (alt)", ServiceType::Https),
    (8581, "Homebridge", ServiceType::Http),
    (8686, "Lidarr", ServiceType::Http),
    (8888, "Jupyter", ServiceType::Http),
    (8920, "Jellyfin (TLS)", ServiceType::Https),
    (8989, "Sonarr", ServiceType::Http),
    (9000, "Portainer", ServiceType::Http),
    (9001, "SupervisorD", ServiceType::Http),
    (9090, "Prometheus", ServiceType::Http),
    (9091, "Transmission", ServiceType::Http),
    (9093, "Alertmanager", ServiceType::Http),
    (9100, "Node exporter", ServiceType::Http),
    (9117, "Jackett", ServiceType::Http),
    (9200, "Elasticsearch", ServiceType::Database),
    (9443, "Portainer (TLS)", ServiceType::Https),
    (9696, "Prowlarr", ServiceType::Http),
    (10000, "Webmin", ServiceType::Https),
    (11434, "Ollama", ServiceType::Http),
    (19999, "Netdata", ServiceType::Http),
    (25565, "Minecraft", ServiceType::Custom),
    (27017, "MongoDB", ServiceType::Database),
    (32400, "Plex", ServiceType::Http),
    (32469, "Plex DLNA", ServiceType::Custom),
];

/// Look up a catalog entry by port.
pub fn catalog_entry(port: u16) -> Option<(&'static str, ServiceType)> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _, _)| *p == port)
        .map(|(_, name, ty)| (*name, *ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_no_duplicate_ports() {
        let mut seen = std::collections::HashSet::new();
        for (port, _, _) in WELL_KNOWN_PORTS {
            assert!(seen.insert(port), "duplicate catalog port {}", port);
        }
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(catalog_entry(8006), Some(("Proxmox VE", ServiceType::Proxmox)));
        assert_eq!(catalog_entry(22), Some(("SSH", ServiceType::Ssh)));
        assert_eq!(catalog_entry(1), None);
    }
}
