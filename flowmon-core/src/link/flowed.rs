use super::Link;
use crate::{
    flow::Flow,
    node::{NodeId, NodePort, PortId},
};
use std::fmt;

/// A [`Link`] restricted to the packets of a [`Flow`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowedLink {
    link: Link,
    flow: Flow,
}

impl FlowedLink {
    pub fn new(link: Link, flow: Flow) -> Self {
        Self { link, flow }
    }

    #[inline]
    pub fn link(&self) -> Link {
        self.link
    }

    #[inline]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    #[inline]
    pub fn src_node(&self) -> NodeId {
        self.link.src_node()
    }

    #[inline]
    pub fn dest_node(&self) -> NodeId {
        self.link.dest_node()
    }

    pub fn src_endpoint(&self) -> Endpoint {
        Endpoint::new(self.link.src(), self.flow.clone(), EndpointKind::Source)
    }

    pub fn dest_endpoint(&self) -> Endpoint {
        Endpoint::new(self.link.dest(), self.flow.clone(), EndpointKind::Destination)
    }
}

impl fmt::Display for FlowedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.link, self.flow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EndpointKind {
    Source,
    Destination,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("SRC"),
            Self::Destination => f.write_str("DEST"),
        }
    }
}

/// One end of a [`FlowedLink`]: the switch port, the flow and the side of
/// the link it stands for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    node_port: NodePort,
    flow: Flow,
    kind: EndpointKind,
}

impl Endpoint {
    pub fn new(node_port: NodePort, flow: Flow, kind: EndpointKind) -> Self {
        Self {
            node_port,
            flow,
            kind,
        }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node_port.node()
    }

    #[inline]
    pub fn port(&self) -> PortId {
        self.node_port.port()
    }

    #[inline]
    pub fn node_port(&self) -> NodePort {
        self.node_port
    }

    #[inline]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    #[inline]
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] {}", self.node_port, self.kind, self.flow)
    }
}
