//! Pure parsers for remote command output. Every function takes the raw
//! text and reports failures as plain strings; the commander wraps them
//! into `CommandError`s with the command context attached.

use std::collections::HashMap;

use hearth_domain::{DiskStats, InterfaceInfo, LoadAvg, MemoryStats, NetworkRates};

/// Busy/total jiffy pair from one `cpu ` aggregate line of /proc/stat.
fn proc_stat_cpu_line(line: &str) -> Result<(u64, u64), String> {
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bad /proc/stat field: {}", e))?;
    if fields.len() < 4 {
        return Err(format!("short /proc/stat cpu line: '{}'", line.trim()));
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait count as not-busy
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Ok((total - idle, total))
}

/// Aggregate cpu utilisation from two `/proc/stat` samples taken a second
/// apart (both `cpu ` lines present in the output, first sample first).
pub fn cpu_percent_from_proc_stat(output: &str) -> Result<f64, String> {
    let lines: Vec<&str> = output
        .lines()
        .filter(|l| l.starts_with("cpu "))
        .collect();
    if lines.len() < 2 {
        return Err(format!(
            "expected two cpu samples, found {}",
            lines.len()
        ));
    }
    let (busy_a, total_a) = proc_stat_cpu_line(lines[0])?;
    let (busy_b, total_b) = proc_stat_cpu_line(lines[1])?;

    let total = total_b.saturating_sub(total_a);
    if total == 0 {
        return Ok(0.0);
    }
    let busy = busy_b.saturating_sub(busy_a);
    Ok((busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

/// `wmic cpu get loadpercentage /value` → `LoadPercentage=12`.
pub fn cpu_percent_from_wmic(output: &str) -> Result<f64, String> {
    let value = wmic_value(output, "LoadPercentage")?;
    value
        .parse::<f64>()
        .map_err(|e| format!("bad LoadPercentage '{}': {}", value, e))
}

/// First three fields of /proc/loadavg.
pub fn load_from_loadavg(output: &str) -> Result<LoadAvg, String> {
    let fields: Vec<&str> = output.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(format!("short /proc/loadavg: '{}'", output.trim()));
    }
    let parse = |s: &str| {
        s.parse::<f64>()
            .map_err(|e| format!("bad loadavg field '{}': {}", s, e))
    };
    Ok(LoadAvg {
        one: parse(fields[0])?,
        five: parse(fields[1])?,
        fifteen: parse(fields[2])?,
    })
}

/// The `Mem:` row of `free -b`.
pub fn memory_from_free(output: &str) -> Result<MemoryStats, String> {
    let line = output
        .lines()
        .find(|l| l.starts_with("Mem:"))
        .ok_or("no Mem: row in free output")?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(format!("short Mem: row: '{}'", line));
    }
    let parse = |s: &str| {
        s.parse::<u64>()
            .map_err(|e| format!("bad free field '{}': {}", s, e))
    };
    let total = parse(fields[1])?;
    let used = parse(fields[2])?;
    let free = parse(fields[3])?;
    let used_percent = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    Ok(MemoryStats {
        total_bytes: total,
        used_bytes: used,
        free_bytes: free,
        used_percent,
    })
}

/// `wmic OS get FreePhysicalMemory,TotalVisibleMemorySize /value`, values
/// in kilobytes.
pub fn memory_from_wmic(output: &str) -> Result<MemoryStats, String> {
    let free_kb: u64 = wmic_value(output, "FreePhysicalMemory")?
        .parse()
        .map_err(|e| format!("bad FreePhysicalMemory: {}", e))?;
    let total_kb: u64 = wmic_value(output, "TotalVisibleMemorySize")?
        .parse()
        .map_err(|e| format!("bad TotalVisibleMemorySize: {}", e))?;
    let total = total_kb * 1024;
    let free = free_kb * 1024;
    let used = total.saturating_sub(free);
    Ok(MemoryStats {
        total_bytes: total,
        used_bytes: used,
        free_bytes: free,
        used_percent: if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        },
    })
}

/// Sum rx/tx byte counters over every non-loopback interface in one
/// /proc/net/dev sample.
fn net_dev_totals(sample: &str) -> Result<(u64, u64), String> {
    let mut rx = 0u64;
    let mut tx = 0u64;
    for line in sample.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name == "lo" {
            continue;
        }
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 9 {
            return Err(format!("short /proc/net/dev row for '{}'", name));
        }
        rx += fields[0]
            .parse::<u64>()
            .map_err(|e| format!("bad rx counter for '{}': {}", name, e))?;
        tx += fields[8]
            .parse::<u64>()
            .map_err(|e| format!("bad tx counter for '{}': {}", name, e))?;
    }
    Ok((rx, tx))
}

/// Two /proc/net/dev samples separated by a `===` marker line, taken
/// `interval_secs` apart.
pub fn rates_from_net_dev(output: &str, interval_secs: f64) -> Result<NetworkRates, String> {
    let (first, second) = output
        .split_once("===")
        .ok_or("missing sample separator in /proc/net/dev output")?;
    let (rx_a, tx_a) = net_dev_totals(first)?;
    let (rx_b, tx_b) = net_dev_totals(second)?;
    if interval_secs <= 0.0 {
        return Err("non-positive sample interval".to_string());
    }
    Ok(NetworkRates {
        rx_bytes: rx_b,
        tx_bytes: tx_b,
        rx_bps: rx_b.saturating_sub(rx_a) as f64 / interval_secs,
        tx_bps: tx_b.saturating_sub(tx_a) as f64 / interval_secs,
    })
}

/// Interface name → MAC from `ip -o link show`.
pub fn macs_from_ip_link(output: &str) -> HashMap<String, String> {
    let mut macs = HashMap::new();
    for line in output.lines() {
        // "2: enp3s0: <BROADCAST,...> mtu 1500 ... link/ether aa:bb:cc:dd:ee:ff brd ..."
        let mut parts = line.splitn(3, ':');
        let _index = parts.next();
        let Some(name) = parts.next() else { continue };
        let name = name.trim().split('@').next().unwrap_or("").to_string();
        if name.is_empty() {
            continue;
        }
        if let Some(pos) = line.find("link/ether") {
            if let Some(mac) = line[pos..].split_whitespace().nth(1) {
                macs.insert(name, mac.to_string());
            }
        }
    }
    macs
}

/// Interfaces with addresses from `ip -o addr show`, merged with the MAC
/// map from [`macs_from_ip_link`]. Loopback is skipped.
pub fn interfaces_from_ip_addr(
    output: &str,
    macs: &HashMap<String, String>,
) -> Vec<InterfaceInfo> {
    let mut by_name: HashMap<String, InterfaceInfo> = HashMap::new();

    for line in output.lines() {
        // "2: enp3s0    inet 10.0.0.5/24 brd ..." / "2: enp3s0    inet6 fe80::1/64 ..."
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let name = fields[1].split('@').next().unwrap_or("").to_string();
        if name.is_empty() || name == "lo" {
            continue;
        }
        let entry = by_name.entry(name.clone()).or_insert_with(|| InterfaceInfo {
            mac: macs.get(&name).and_then(|m| m.parse().ok()),
            name,
            ip: None,
            ipv6: None,
        });
        let addr = fields[3].split('/').next().unwrap_or("");
        match fields[2] {
            "inet" if entry.ip.is_none() => entry.ip = Some(addr.to_string()),
            "inet6" if entry.ipv6.is_none() && !addr.starts_with("fe80") => {
                entry.ipv6 = Some(addr.to_string())
            }
            _ => {}
        }
    }

    let mut interfaces: Vec<InterfaceInfo> = by_name.into_values().collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

/// PRETTY_NAME from /etc/os-release.
pub fn pretty_name_from_os_release(output: &str) -> Result<String, String> {
    output
        .lines()
        .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim_matches('"').to_string())
        .ok_or_else(|| "no PRETTY_NAME in os-release".to_string())
}

/// Data row of `df -B1 --output=size,used,avail,pcent,target <mount>`.
pub fn disk_from_df(output: &str) -> Result<DiskStats, String> {
    let line = output
        .lines()
        .nth(1)
        .ok_or("df produced no data row")?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(format!("short df row: '{}'", line));
    }
    let parse = |s: &str| {
        s.parse::<u64>()
            .map_err(|e| format!("bad df field '{}': {}", s, e))
    };
    let total = parse(fields[0])?;
    let used = parse(fields[1])?;
    let free = parse(fields[2])?;
    let used_percent = fields[3]
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|e| format!("bad df percent '{}': {}", fields[3], e))?;
    Ok(DiskStats {
        total_bytes: total,
        used_bytes: used,
        free_bytes: free,
        used_percent,
        mount: fields[4].to_string(),
    })
}

/// `wmic logicaldisk ... get Size,FreeSpace /value`.
pub fn disk_from_wmic(output: &str, mount: &str) -> Result<DiskStats, String> {
    let free: u64 = wmic_value(output, "FreeSpace")?
        .parse()
        .map_err(|e| format!("bad FreeSpace: {}", e))?;
    let total: u64 = wmic_value(output, "Size")?
        .parse()
        .map_err(|e| format!("bad Size: {}", e))?;
    let used = total.saturating_sub(free);
    Ok(DiskStats {
        total_bytes: total,
        used_bytes: used,
        free_bytes: free,
        used_percent: if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        },
        mount: mount.to_string(),
    })
}

/// Per-interface ethtool wake-on-LAN report: which interfaces support the
/// magic-packet mode and which have it armed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WolReport {
    pub supported: Vec<String>,
    pub armed: Vec<String>,
}

/// Blocks of `IFACE <name>` followed by ethtool's `Supports Wake-on:` and
/// `Wake-on:` lines.
pub fn wol_from_ethtool(output: &str) -> WolReport {
    let mut report = WolReport::default();
    let mut current: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("IFACE ") {
            current = Some(name.trim().to_string());
            continue;
        }
        let Some(iface) = &current else { continue };
        if let Some(modes) = trimmed.strip_prefix("Supports Wake-on:") {
            if modes.contains('g') {
                report.supported.push(iface.clone());
            }
        } else if let Some(modes) = trimmed.strip_prefix("Wake-on:") {
            if modes.contains('g') && !modes.contains('d') {
                report.armed.push(iface.clone());
            }
        }
    }
    report
}

/// `pveum user token add ... --output-format json` value field.
pub fn token_secret_from_pveum(output: &str) -> Result<String, String> {
    let value: serde_json::Value =
        serde_json::from_str(output.trim()).map_err(|e| format!("bad pveum json: {}", e))?;
    value
        .get("value")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| "pveum output has no 'value' field".to_string())
}

/// Extract `Key=value` from wmic /value output.
pub fn wmic_value(output: &str, key: &str) -> Result<String, String> {
    output
        .lines()
        .filter_map(|l| l.trim().split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_string())
        .ok_or_else(|| format!("no {} in wmic output", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_from_two_proc_stat_samples() {
        let output = "\
cpu  100 0 100 800 0 0 0 0 0 0
cpu0 50 0 50 400 0 0 0 0 0 0
cpu  150 0 150 900 0 0 0 0 0 0
cpu0 75 0 75 450 0 0 0 0 0 0
";
        // busy delta 100, total delta 200
        let pct = cpu_percent_from_proc_stat(output).unwrap();
        assert!((pct - 50.0).abs() < 0.01, "got {}", pct);
    }

    #[test]
    fn cpu_rejects_single_sample() {
        assert!(cpu_percent_from_proc_stat("cpu  1 2 3 4 5 6 7\n").is_err());
    }

    #[test]
    fn cpu_from_wmic_output() {
        let output = "\r\nLoadPercentage=12\r\n\r\n";
        assert_eq!(cpu_percent_from_wmic(output).unwrap(), 12.0);
    }

    #[test]
    fn load_from_proc_loadavg() {
        let load = load_from_loadavg("0.52 0.58 0.59 1/1143 12345\n").unwrap();
        assert_eq!(load.one, 0.52);
        assert_eq!(load.five, 0.58);
        assert_eq!(load.fifteen, 0.59);
    }

    #[test]
    fn memory_from_free_b() {
        let output = "\
              total        used        free      shared  buff/cache   available
Mem:    16652005376  5234491392  1594728448   536870912  9822785536 10553851904
Swap:    2147479552           0  2147479552
";
        let mem = memory_from_free(output).unwrap();
        assert_eq!(mem.total_bytes, 16652005376);
        assert_eq!(mem.used_bytes, 5234491392);
        assert_eq!(mem.free_bytes, 1594728448);
        assert!((mem.used_percent - 31.43).abs() < 0.1);
    }

    #[test]
    fn memory_from_wmic_kb() {
        let output = "FreePhysicalMemory=4194304\r\nTotalVisibleMemorySize=16777216\r\n";
        let mem = memory_from_wmic(output).unwrap();
        assert_eq!(mem.total_bytes, 16777216 * 1024);
        assert_eq!(mem.free_bytes, 4194304 * 1024);
        assert!((mem.used_percent - 75.0).abs() < 0.01);
    }

    #[test]
    fn rates_from_two_net_dev_samples() {
        let output = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  999999    1000    0    0    0     0          0         0   999999    1000    0    0    0     0       0          0
  eth0: 1000000    5000    0    0    0     0          0         0  2000000    4000    0    0    0     0       0          0
===
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1099999    1100    0    0    0     0          0         0  1099999    1100    0    0    0     0       0          0
  eth0: 1500000    5500    0    0    0     0          0         0  2250000    4400    0    0    0     0       0          0
";
        let rates = rates_from_net_dev(output, 1.0).unwrap();
        assert_eq!(rates.rx_bytes, 1500000);
        assert_eq!(rates.tx_bytes, 2250000);
        assert_eq!(rates.rx_bps, 500000.0);
        assert_eq!(rates.tx_bps, 250000.0);
    }

    #[test]
    fn interfaces_merge_link_and_addr() {
        let links = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\\    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
2: enp3s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP mode DEFAULT group default qlen 1000\\    link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff
";
        let addrs = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: enp3s0    inet 10.0.0.5/24 brd 10.0.0.255 scope global dynamic enp3s0\\       valid_lft 86000sec preferred_lft 86000sec
2: enp3s0    inet6 fe80::aabb:ccff:fedd:eeff/64 scope link\\       valid_lft forever preferred_lft forever
";
        let macs = macs_from_ip_link(links);
        assert_eq!(macs.get("enp3s0").map(String::as_str), Some("aa:bb:cc:dd:ee:ff"));

        let interfaces = interfaces_from_ip_addr(addrs, &macs);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].name, "enp3s0");
        assert_eq!(interfaces[0].ip.as_deref(), Some("10.0.0.5"));
        assert!(interfaces[0].ipv6.is_none(), "link-local must be skipped");
        assert_eq!(
            interfaces[0].mac.unwrap().to_string(),
            "aa:bb:cc:dd:ee:ff"
        );
    }

    #[test]
    fn pretty_name_parsed() {
        let output = "\
NAME=\"Debian GNU/Linux\"
VERSION_ID=\"12\"
PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"
";
        assert_eq!(
            pretty_name_from_os_release(output).unwrap(),
            "Debian GNU/Linux 12 (bookworm)"
        );
    }

    #[test]
    fn disk_from_df_output() {
        let output = "\
         1B-blocks         Used       Avail Use% Mounted on
      503316480000 243269632000 234881024000  51% /
";
        let disk = disk_from_df(output).unwrap();
        assert_eq!(disk.total_bytes, 503316480000);
        assert_eq!(disk.used_percent, 51.0);
        assert_eq!(disk.mount, "/");
    }

    #[test]
    fn wol_blocks_parsed() {
        let output = "\
IFACE enp3s0
	Supports Wake-on: pumbg
	Wake-on: g
IFACE wlan0
	Supports Wake-on: d
	Wake-on: d
";
        let report = wol_from_ethtool(output);
        assert_eq!(report.supported, vec!["enp3s0"]);
        assert_eq!(report.armed, vec!["enp3s0"]);
    }

    #[test]
    fn wol_disarmed_interface() {
        let output = "\
IFACE eno1
	Supports Wake-on: pumbg
	Wake-on: d
";
        let report = wol_from_ethtool(output);
        assert_eq!(report.supported, vec!["eno1"]);
        assert!(report.armed.is_empty());
    }

    #[test]
    fn token_secret_extracted() {
        let output = r#"{"full-tokenid":"root@pam!hearth-1a2b3c4d","info":{"privsep":"0"},"value":"12345678-9abc-def0-1234-56789abcdef0"}"#;
        assert_eq!(
            token_secret_from_pveum(output).unwrap(),
            "12345678-9abc-def0-1234-56789abcdef0"
        );
    }

    #[test]
    fn token_secret_missing_value() {
        assert!(token_secret_from_pveum("{}").is_err());
        assert!(token_secret_from_pveum("not json").is_err());
    }
}
