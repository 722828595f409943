//! Everything the sampler writes to, and reads from, the switches.

mod barrier;
mod convert;
mod driver;
mod matching;
mod message;
mod tables;
mod transport;

pub use self::{
    barrier::BarrierHandler,
    convert::{AppFlowModError, convert_app_flow_mod, convert_app_message},
    driver::{SwitchCommError, SwitchDriver, SwitchOperation},
    matching::{
        dest_port, samplable_match_violation, src_port, without_dest_params,
        without_src_params,
    },
    message::{
        Action, FlowMod, FlowModCommand, FlowModFlags, FlowRemoved, FlowRemovedReason,
        Instruction, Message, PacketOut, TableId,
    },
    tables::{MIN_REQUIRED_TABLES, NotEnoughTables, SamplingCookie, TableLayout},
    transport::{BarrierReply, SwitchDisconnected, SwitchInfo, Transport},
};
