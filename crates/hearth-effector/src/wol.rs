use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use hearth_domain::MacAddr;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::WolError;

/// Wake-on-LAN magic packet: six 0xFF bytes followed by sixteen repetitions
/// of the target hardware address. 102 bytes total.
pub fn magic_packet(mac: MacAddr) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    let octets = mac.octets();
    for rep in 0..16 {
        let start = 6 + rep * 6;
        packet[start..start + 6].copy_from_slice(&octets);
    }
    packet
}

/// The wake effector seam; lets the reconciler take a recording fake in
/// tests.
#[async_trait]
pub trait WakeSender: Send + Sync + 'static {
    async fn send_magic_packet(&self, mac: MacAddr) -> Result<(), WolError>;
}

/// Broadcasts magic packets over UDP. At-least-one delivery counts as sent;
/// per-destination failures are aggregated into the error otherwise.
#[derive(Debug, Clone)]
pub struct WolSender {
    destinations: Vec<SocketAddr>,
}

impl WolSender {
    /// Global broadcast on the discard and echo ports.
    pub fn new() -> Self {
        let broadcast = IpAddr::V4(Ipv4Addr::BROADCAST);
        WolSender {
            destinations: vec![SocketAddr::new(broadcast, 9), SocketAddr::new(broadcast, 7)],
        }
    }

    /// Replace the destination set, e.g. to add subnet broadcasts.
    pub fn with_destinations(destinations: Vec<SocketAddr>) -> Self {
        WolSender { destinations }
    }
}

impl Default for WolSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeSender for WolSender {
    async fn send_magic_packet(&self, mac: MacAddr) -> Result<(), WolError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(WolError::Socket)?;
        socket.set_broadcast(true).map_err(WolError::Socket)?;

        let packet = magic_packet(mac);
        let mut delivered = 0usize;
        let mut failures: Vec<String> = Vec::new();

        for dest in &self.destinations {
            match socket.send_to(&packet, dest).await {
                Ok(_) => {
                    debug!(mac = %mac, dest = %dest, "magic packet sent");
                    delivered += 1;
                }
                Err(e) => failures.push(format!("{}: {}", dest, e)),
            }
        }

        if delivered == 0 {
            return Err(WolError::AllDestinationsFailed(failures.join("; ")));
        }
        Ok(())
    }
}
