//! The subset of the switch protocol messages the sampler sends and
//! receives.

use crate::{
    flow::{Match, MatchField},
    node::PortId,
};
use std::{fmt, time::Duration};

/// A flow table of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(u8);

impl TableId {
    /// wildcard table id, only meaningful in deletions
    pub const ALL: Self = Self(0xff);

    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            f.write_str("ALL")
        } else {
            self.0.fmt(f)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowModCommand {
    Add,
    Modify,
    ModifyStrict,
    Delete,
    DeleteStrict,
}

impl FlowModCommand {
    pub fn is_delete(self) -> bool {
        matches!(self, Self::Delete | Self::DeleteStrict)
    }

    pub fn is_modify(self) -> bool {
        matches!(self, Self::Modify | Self::ModifyStrict)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlowModFlags {
    pub send_flow_removed: bool,
    pub check_overlap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Output { port: PortId, max_len: u16 },
    PushVlan,
    PopVlan,
    SetField { field: MatchField, value: u64 },
    /// copy the `bits` lower bits of `src` into `dst`
    CopyField {
        src: MatchField,
        dst: MatchField,
        bits: u32,
    },
    Group(u32),
    SetQueue(u32),
}

impl Action {
    /// send the whole packet through the given port
    pub const fn output(port: PortId) -> Self {
        Self::Output {
            port,
            max_len: u16::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    ApplyActions(Vec<Action>),
    WriteActions(Vec<Action>),
    ClearActions,
    WriteMetadata { metadata: u64, mask: u64 },
    GotoTable(TableId),
}

/// Adds, modifies or deletes flow entries of a switch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCommand,
    pub table_id: TableId,
    pub priority: u16,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub matching: Match,
    pub instructions: Vec<Instruction>,
    pub out_port: PortId,
    pub flags: FlowModFlags,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
}

impl FlowMod {
    /// an eternal flow-mod matching every packet with no instructions
    pub fn new(command: FlowModCommand, table_id: TableId) -> Self {
        Self {
            command,
            table_id,
            priority: 0,
            cookie: 0,
            cookie_mask: 0,
            matching: Match::all(),
            instructions: Vec::new(),
            out_port: PortId::ANY,
            flags: FlowModFlags::default(),
            idle_timeout: 0,
            hard_timeout: 0,
        }
    }

    #[must_use = "function returns the modified flow-mod"]
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    #[must_use = "function returns the modified flow-mod"]
    pub fn with_match(mut self, matching: Match) -> Self {
        self.matching = matching;
        self
    }

    #[must_use = "function returns the modified flow-mod"]
    pub fn with_instructions(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = instructions;
        self
    }

    #[must_use = "function returns the modified flow-mod"]
    pub fn with_cookie(mut self, cookie: u64, cookie_mask: u64) -> Self {
        self.cookie = cookie;
        self.cookie_mask = cookie_mask;
        self
    }

    #[must_use = "function returns the modified flow-mod"]
    pub fn notify_removal(mut self) -> Self {
        self.flags.send_flow_removed = true;
        self
    }

    #[must_use = "function returns the modified flow-mod"]
    pub fn no_overlap(mut self) -> Self {
        self.flags.check_overlap = true;
        self
    }
}

/// Injects a packet into the data plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub in_port: PortId,
    pub actions: Vec<Action>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    FlowMod(FlowMod),
    PacketOut(PacketOut),
}

impl From<FlowMod> for Message {
    fn from(value: FlowMod) -> Self {
        Self::FlowMod(value)
    }
}

impl From<PacketOut> for Message {
    fn from(value: PacketOut) -> Self {
        Self::PacketOut(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
    GroupDelete,
}

/// Sent by a switch when a flow entry with the send-flow-removed flag is
/// removed, along with the entry's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRemoved {
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub table_id: TableId,
    /// how long the entry was installed
    pub duration: Duration,
    /// `None` if the switch does not count packets
    pub packet_count: Option<u64>,
    /// `None` if the switch does not count bytes
    pub byte_count: Option<u64>,
    pub matching: Match,
}

impl fmt::Display for FlowRemoved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlowRemoved(table={}, cookie={:#x}, priority={}, reason={:?}, match={}",
            self.table_id, self.cookie, self.priority, self.reason, self.matching
        )?;
        match self.packet_count {
            Some(count) => write!(f, ", packets={count}")?,
            None => f.write_str(", packets=?")?,
        }
        match self.byte_count {
            Some(count) => write!(f, ", bytes={count})"),
            None => f.write_str(", bytes=?)"),
        }
    }
}
