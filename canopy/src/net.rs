//! Network transport primitives.
//!
//! Provides the UDP socket abstraction both node roles are built on. The
//! mesh is IPv6 (routing parents are IPv6 neighbors), so endpoint helpers
//! default to v6 addresses; v4 still round-trips through [`Endpoint`] for
//! lab setups.

pub mod endpoint;
pub mod socket;

pub use endpoint::Endpoint;
pub use socket::UdpSocket;
