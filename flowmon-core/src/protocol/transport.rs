use super::Message;
use crate::node::{NodeId, PortId};
use std::sync::mpsc;
use thiserror::Error;

/// Receives a single `()` once the switch has processed every message sent
/// before the barrier. The sender being dropped means the switch went away.
pub type BarrierReply = mpsc::Receiver<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("switch {0} is not connected")]
pub struct SwitchDisconnected(pub NodeId);

/// What the sampler needs to know about a connected switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInfo {
    pub num_tables: u8,
    pub ports: Vec<PortId>,
}

/// The connection to the switches of the network.
///
/// Implementations must not call back into the sampler from within these
/// methods: the sampler may be holding its lock.
pub trait Transport: Send + Sync {
    /// `None` if the switch is not connected
    fn switch(&self, node: NodeId) -> Option<SwitchInfo>;

    fn write(&self, node: NodeId, message: Message) -> Result<(), SwitchDisconnected>;

    fn send_barrier(&self, node: NodeId) -> Result<BarrierReply, SwitchDisconnected>;
}
