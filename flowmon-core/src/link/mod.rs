mod flowed;

pub use self::flowed::{Endpoint, EndpointKind, FlowedLink};
use crate::{
    flow::Flow,
    node::{NodeId, NodePort, PortId},
};
use std::fmt;

/// A unidirectional link between two switch ports.
///
/// Packets leave the network through the source port and enter the next
/// switch through the destination port. Two links are the same link only
/// if both of their ends are the same.
///
/// ```
/// # use flowmon_core::{link::Link, node::{NodeId, NodePort, PortId}};
/// let a = NodePort::new(NodeId::new(1), PortId::new(2));
/// let b = NodePort::new(NodeId::new(2), PortId::new(1));
///
/// let link = Link::new(a, b);
/// assert_ne!(link, link.reversed());
/// assert!(link.coincides_with(&link.reversed()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    src: NodePort,
    dest: NodePort,
}

impl Link {
    pub const fn new(src: NodePort, dest: NodePort) -> Self {
        Self { src, dest }
    }

    #[inline]
    pub fn src(&self) -> NodePort {
        self.src
    }

    #[inline]
    pub fn dest(&self) -> NodePort {
        self.dest
    }

    #[inline]
    pub fn src_node(&self) -> NodeId {
        self.src.node()
    }

    #[inline]
    pub fn src_port(&self) -> PortId {
        self.src.port()
    }

    #[inline]
    pub fn dest_node(&self) -> NodeId {
        self.dest.node()
    }

    #[inline]
    pub fn dest_port(&self) -> PortId {
        self.dest.port()
    }

    /// the link going the opposite way
    pub fn reversed(&self) -> Self {
        Self::new(self.dest, self.src)
    }

    /// check if the two links have at least one switch in common
    pub fn coincides_with(&self, other: &Self) -> bool {
        self.src_node() == other.src_node()
            || self.src_node() == other.dest_node()
            || self.dest_node() == other.src_node()
            || self.dest_node() == other.dest_node()
    }

    pub fn flowed(self, flow: Flow) -> FlowedLink {
        FlowedLink::new(self, flow)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >> {}", self.src, self.dest)
    }
}
