//! Listener address handling.
//!
//! # Responsibilities
//! - Resolve the configured bind address before anything is started
//! - Classify serve errors (address in use is fatal, the rest are not)
//! - Derive the advertised host name, port and local IP

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Normalise ":port" to "0.0.0.0:port".
fn normalize(bind_addr: &str) -> String {
    if bind_addr.starts_with(':') {
        format!("0.0.0.0{bind_addr}")
    } else {
        bind_addr.to_string()
    }
}

/// Resolve the bind address to the first socket address it names.
pub async fn resolve_bind_addr(bind_addr: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(normalize(bind_addr))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing"))
}

/// Whether a listener error means another process owns the port.
pub fn is_addr_in_use(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::AddrInUse
}

fn split(bind_addr: &str) -> (&str, &str) {
    match bind_addr.rsplit_once(':') {
        Some((host, port)) => (host.trim_start_matches('[').trim_end_matches(']'), port),
        None => (bind_addr, ""),
    }
}

/// Port portion of the bind address.
pub fn port(bind_addr: &str) -> String {
    split(bind_addr).1.to_string()
}

/// Host portion of the bind address, or the machine's host name when the
/// bind host is empty or a wildcard.
pub fn host_name(bind_addr: &str) -> String {
    let host = split(bind_addr).0;
    match host {
        "" | "0.0.0.0" | "::" => machine_host_name(),
        other => other.to_string(),
    }
}

fn machine_host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
    Ok(socket.local_addr()?.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_port_only_address() {
        let addr = resolve_bind_addr(":8443").await.unwrap();
        assert_eq!(addr.port(), 8443);
        assert!(addr.ip().is_unspecified());
    }

    #[tokio::test]
    async fn unresolvable_address_fails() {
        assert!(resolve_bind_addr("no-such-host.invalid:80").await.is_err());
        assert!(resolve_bind_addr("127.0.0.1").await.is_err());
    }

    #[test]
    fn splits_host_and_port() {
        assert_eq!(port("127.0.0.1:8080"), "8080");
        assert_eq!(host_name("127.0.0.1:8080"), "127.0.0.1");
        assert_eq!(host_name("[::1]:8080"), "::1");
        assert!(!host_name(":8080").is_empty());
    }

    #[test]
    fn addr_in_use_classification() {
        assert!(is_addr_in_use(&io::Error::from(io::ErrorKind::AddrInUse)));
        assert!(!is_addr_in_use(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }
}
