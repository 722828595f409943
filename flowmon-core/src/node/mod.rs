mod id;
mod port;

pub use self::{id::NodeId, port::PortId};
use std::fmt;

/// A port of a given switch.
///
/// ```
/// # use flowmon_core::node::{NodeId, NodePort, PortId};
/// let node_port = NodePort::new(NodeId::new(1), PortId::new(4));
/// assert_eq!(node_port.to_string(), "0x0000000000000001:4");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePort {
    node: NodeId,
    port: PortId,
}

impl NodePort {
    pub const fn new(node: NodeId, port: PortId) -> Self {
        Self { node, port }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn port(&self) -> PortId {
        self.port
    }
}

impl fmt::Display for NodePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}
