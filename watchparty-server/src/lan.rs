//! LAN address discovery for same-network sharing

use std::net::{IpAddr, Ipv4Addr};

use local_ip_address::{list_afinet_netifas, local_ip};
use tracing::{debug, warn};

/// IPv4 addresses other devices on the network may reach us at, private
/// ranges first, otherwise in interface order
pub fn detect_lan_ips() -> Vec<Ipv4Addr> {
    let addrs: Vec<IpAddr> = match list_afinet_netifas() {
        Ok(netifas) => netifas
            .into_iter()
            .inspect(|(name, ip)| debug!("Interface {}: {}", name, ip))
            .map(|(_, ip)| ip)
            .collect(),
        Err(e) => {
            warn!("Failed to list network interfaces: {}", e);
            local_ip().into_iter().collect()
        }
    };

    rank_lan_ips(addrs)
}

/// Keep usable IPv4 addresses, drop duplicates, put private ranges first
pub fn rank_lan_ips(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    let mut ips: Vec<Ipv4Addr> = Vec::new();
    for addr in addrs {
        if let IpAddr::V4(ip) = addr {
            if is_lan_candidate(ip) && !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    ips.sort_by_key(|ip| !ip.is_private());
    ips
}

fn is_lan_candidate(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified() && !ip.is_link_local()
}

/// URLs other devices on the network can use
pub fn lan_urls(ips: &[Ipv4Addr], port: u16) -> Vec<String> {
    ips.iter()
        .map(|ip| format!("http://{}:{}", ip, port))
        .collect()
}
