//! Network endpoint types.

use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};

/// A network endpoint (IP address + port).
///
/// Wrapper around [`SocketAddr`] that provides a stable API across the
/// crate; constructors are IPv6-first to match the mesh addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Creates a new endpoint from an IP address and port.
    #[must_use]
    pub const fn new(addr: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(addr, port))
    }

    /// Creates a new IPv6 endpoint.
    #[must_use]
    pub const fn v6(addr: Ipv6Addr, port: u16) -> Self {
        Self(SocketAddr::V6(SocketAddrV6::new(addr, port, 0, 0)))
    }

    /// Creates an endpoint bound to all interfaces (`[::]`) on the given port.
    #[must_use]
    pub const fn any(port: u16) -> Self {
        Self::v6(Ipv6Addr::UNSPECIFIED, port)
    }

    /// Creates a localhost (`[::1]`) endpoint on the given port.
    #[must_use]
    pub const fn localhost(port: u16) -> Self {
        Self::v6(Ipv6Addr::LOCALHOST, port)
    }

    /// Returns the IP address.
    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0.port()
    }

    /// Returns the underlying [`SocketAddr`].
    #[must_use]
    pub const fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl From<SocketAddrV6> for Endpoint {
    fn from(addr: SocketAddrV6) -> Self {
        Self(SocketAddr::V6(addr))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_v6() {
        let ep = Endpoint::v6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1), 8765);
        assert_eq!(
            ep.ip(),
            IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1))
        );
        assert_eq!(ep.port(), 8765);
    }

    #[test]
    fn endpoint_any() {
        let ep = Endpoint::any(5678);
        assert_eq!(ep.ip(), IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        assert_eq!(ep.port(), 5678);
    }

    #[test]
    fn endpoint_localhost() {
        let ep = Endpoint::localhost(3000);
        assert_eq!(ep.ip(), IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(ep.port(), 3000);
    }

    #[test]
    fn endpoint_from_socket_addr() {
        let addr: SocketAddr = "[fd00::2]:5000".parse().unwrap();
        let ep = Endpoint::from(addr);
        assert_eq!(ep.as_socket_addr(), addr);
    }

    #[test]
    fn endpoint_display() {
        let ep = Endpoint::localhost(8080);
        assert_eq!(format!("{ep}"), "[::1]:8080");
    }
}
