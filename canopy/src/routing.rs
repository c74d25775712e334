//! Route state seam.
//!
//! The reporter does not run a routing protocol itself; it asks a
//! [`RouteSource`] for the two facts the mesh layer owns: whether the root
//! is currently reachable (and at what endpoint), and which neighbor is the
//! node's preferred parent toward that root.

use std::net::Ipv6Addr;

use crate::net::Endpoint;

/// Provider of the node's current routing state.
pub trait RouteSource {
    /// Returns the root's endpoint when it is currently reachable.
    fn root(&self) -> Option<Endpoint>;

    /// Returns the preferred parent's address, if one is known.
    fn preferred_parent(&self) -> Option<Ipv6Addr>;
}

/// Fixed route for deployments where the collector address is known ahead
/// of time. Stands in for a live routing daemon; the root is always
/// considered reachable.
#[derive(Debug, Clone, Copy)]
pub struct StaticRoute {
    root: Endpoint,
    parent: Option<Ipv6Addr>,
}

impl StaticRoute {
    /// Creates a static route to `root` with no parent information.
    #[must_use]
    pub const fn new(root: Endpoint) -> Self {
        Self { root, parent: None }
    }

    /// Creates a static route to `root` reporting `parent` as the
    /// preferred parent.
    #[must_use]
    pub const fn with_parent(root: Endpoint, parent: Ipv6Addr) -> Self {
        Self {
            root,
            parent: Some(parent),
        }
    }
}

impl RouteSource for StaticRoute {
    fn root(&self) -> Option<Endpoint> {
        Some(self.root)
    }

    fn preferred_parent(&self) -> Option<Ipv6Addr> {
        self.parent
    }
}
