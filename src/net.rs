//! Local address discovery for metric grouping labels.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Label used when no outbound address can be determined.
pub const UNKNOWN_INSTANCE: &str = "unknown";

/// The local IPv4 address the host would use to reach the public internet.
///
/// Connecting a UDP socket sends no packets; it only resolves a route.
pub fn outbound_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("1.1.1.1:53").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// [`outbound_ip`] as a label value.
pub fn outbound_instance() -> String {
    outbound_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_INSTANCE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_instance_is_ip_or_unknown() {
        let instance = outbound_instance();
        assert!(instance == UNKNOWN_INSTANCE || instance.parse::<Ipv4Addr>().is_ok());
    }
}
