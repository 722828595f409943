use crate::Sampler;
use anyhow::Result;
use flowmon_core::{
    link::Link,
    node::{NodeId, NodePort},
};
use log::{debug, error};
use std::fmt;

/// A change in the topology of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyEvent {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    NodeActivated(NodeId),
    NodeUpdated(NodeId),
    NodeDeactivated(NodeId),
    PortAdded(NodePort),
    PortActivated(NodePort),
    PortUpdated(NodePort),
    PortDeactivated(NodePort),
    PortRemoved(NodePort),
    LinkAdded(Link),
    LinkUpdated(Link),
    LinkRemoved(Link),
}

impl fmt::Display for TopologyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeAdded(node) => write!(f, "SWITCH ADDED: {node}"),
            Self::NodeRemoved(node) => write!(f, "SWITCH REMOVED: {node}"),
            Self::NodeActivated(node) => write!(f, "SWITCH ACTIVATED: {node}"),
            Self::NodeUpdated(node) => write!(f, "SWITCH UPDATED: {node}"),
            Self::NodeDeactivated(node) => write!(f, "SWITCH DEACTIVATED: {node}"),
            Self::PortAdded(port) => write!(f, "SWITCH PORT ADDED: {port}"),
            Self::PortActivated(port) => write!(f, "SWITCH PORT ACTIVATED: {port}"),
            Self::PortUpdated(port) => write!(f, "SWITCH PORT UPDATED: {port}"),
            Self::PortDeactivated(port) => write!(f, "SWITCH PORT DEACTIVATED: {port}"),
            Self::PortRemoved(port) => write!(f, "SWITCH PORT REMOVED: {port}"),
            Self::LinkAdded(link) => write!(f, "LINK ADDED: {link}"),
            Self::LinkUpdated(link) => write!(f, "LINK UPDATED: {link}"),
            Self::LinkRemoved(link) => write!(f, "LINK REMOVED: {link}"),
        }
    }
}

impl Sampler {
    /// Keep the sampling tables and the sampled links in line with the
    /// topology.
    ///
    /// Switch communication failures are logged and the event is dropped.
    /// A link whose sampling entries could not be installed is not sampled.
    pub fn on_topology_event(&self, event: &TopologyEvent) -> Result<()> {
        let driver = &self.shared().driver;
        match *event {
            TopologyEvent::NodeAdded(node) => {
                debug!("{event}");
                if let Err(comm_error) = driver.handle_added_switch(node) {
                    error!("{comm_error}");
                }
            }
            TopologyEvent::NodeRemoved(_) => debug!("{event}"),
            TopologyEvent::PortAdded(port) => {
                debug!("{event}");
                if let Err(comm_error) = driver.handle_added_switch_port(port.node(), port.port())
                {
                    error!("{comm_error}");
                }
            }
            TopologyEvent::LinkAdded(link) => {
                debug!("{event}");
                match driver.handle_added_link(&link) {
                    Ok(()) => self.on_added_link(link)?,
                    Err(comm_error) => error!("{comm_error}"),
                }
            }
            TopologyEvent::LinkRemoved(link) => {
                debug!("{event}");
                self.on_removed_link(&link)?;
                driver.handle_removed_link(&link);
            }
            TopologyEvent::NodeActivated(_)
            | TopologyEvent::NodeUpdated(_)
            | TopologyEvent::NodeDeactivated(_)
            | TopologyEvent::PortActivated(_)
            | TopologyEvent::PortUpdated(_)
            | TopologyEvent::PortDeactivated(_)
            | TopologyEvent::PortRemoved(_)
            | TopologyEvent::LinkUpdated(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmon_core::node::PortId;

    #[test]
    fn display() {
        let a = NodePort::new(NodeId::new(1), PortId::new(2));
        let b = NodePort::new(NodeId::new(2), PortId::new(1));
        assert_eq!(
            TopologyEvent::NodeAdded(NodeId::new(1)).to_string(),
            "SWITCH ADDED: 0x0000000000000001"
        );
        assert_eq!(
            TopologyEvent::PortAdded(a).to_string(),
            "SWITCH PORT ADDED: 0x0000000000000001:2"
        );
        assert!(
            TopologyEvent::LinkRemoved(Link::new(a, b))
                .to_string()
                .starts_with("LINK REMOVED: ")
        );
    }
}
