//! Primary network interface lookup for the config snapshot.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};

pub const FALLBACK_MAC: &str = "38:60:77:7c:53:18";
pub const FALLBACK_IP: &str = "127.0.0.1";
pub const FALLBACK_NETMASK: &str = "255.0.0.0";

/// Addresses of the interface the gateway reports as its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub ip: String,
    pub netmask: String,
    pub mac: String,
}

impl InterfaceInfo {
    pub fn fallback() -> Self {
        Self {
            ip: FALLBACK_IP.to_string(),
            netmask: FALLBACK_NETMASK.to_string(),
            mac: FALLBACK_MAC.to_string(),
        }
    }
}

/// First non-loopback interface with an IPv4 address, or the fixed
/// placeholder values when there is none.
pub fn primary_interface() -> InterfaceInfo {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            tracing::error!(error = %err, "listing network interfaces failed");
            return InterfaceInfo::fallback();
        }
    };

    let found = interfaces.into_iter().find_map(|(name, addr)| match addr {
        IpAddr::V4(ip) if !ip.is_loopback() => Some((name, ip)),
        _ => None,
    });

    let Some((name, ip)) = found else {
        tracing::error!("no valid ethernet interface found");
        return InterfaceInfo::fallback();
    };

    let netmask = fs::read_to_string("/proc/net/route")
        .ok()
        .and_then(|table| route_netmask(&table, &name, ip))
        .map(|mask| mask.to_string())
        .unwrap_or_else(|| FALLBACK_NETMASK.to_string());

    let mac = fs::read_to_string(format!("/sys/class/net/{name}/address"))
        .map(|raw| raw.trim().to_string())
        .unwrap_or_else(|_| FALLBACK_MAC.to_string());

    InterfaceInfo {
        ip: ip.to_string(),
        netmask,
        mac,
    }
}

/// Netmask of the on-link route of `iface` that contains `ip`.
///
/// `table` is the text of `/proc/net/route`; addresses there are hex words in
/// little-endian byte order.
fn route_netmask(table: &str, iface: &str, ip: Ipv4Addr) -> Option<Ipv4Addr> {
    let ip = u32::from(ip);

    table.lines().skip(1).find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 8 || cols[0] != iface {
            return None;
        }
        let dest = Ipv4Addr::from(u32::from_str_radix(cols[1], 16).ok()?.to_le_bytes());
        let mask = Ipv4Addr::from(u32::from_str_radix(cols[7], 16).ok()?.to_le_bytes());
        let (dest, mask) = (u32::from(dest), u32::from(mask));

        (mask != 0 && ip & mask == dest).then(|| Ipv4Addr::from(mask))
    })
}
