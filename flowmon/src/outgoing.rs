use crate::Sampler;
use flowmon_core::{
    node::NodeId,
    protocol::{Message, SamplingCookie, TableLayout, convert_app_message},
};
use log::{debug, trace, warn};

fn describe(message: &Message) -> String {
    match message {
        Message::FlowMod(flow_mod) => format!("FLOW_MOD ({:?})", flow_mod.command),
        Message::PacketOut(_) => "PACKET_OUT".to_owned(),
    }
}

/// Adapt a message an application sends to the switch `node` to the table
/// layout of the sampling pipeline.
///
/// Returns `None` when the message cannot be adapted and must not be
/// sent.
pub fn adapt_outgoing(node: NodeId, layout: &TableLayout, message: Message) -> Option<Message> {
    let reason = match &message {
        Message::FlowMod(flow_mod) => match SamplingCookie::of(flow_mod) {
            Some(SamplingCookie::Default) => Some("is a default sampling flow"),
            Some(SamplingCookie::Ephemeral) => Some("is an ephemeral sampling flow"),
            None => None,
        },
        Message::PacketOut(_) => Some("packet-out is not adapted"),
    };
    if let Some(reason) = reason {
        trace!(
            "Passed an unmodified outgoing message of type {} to switch {node}: {reason}",
            describe(&message)
        );
        return Some(message);
    }

    let kind = describe(&message);
    match convert_app_message(layout, message.clone()) {
        Ok(converted) => {
            debug!("Replaced an outgoing message of type {kind} to switch {node}");
            trace!("Replaced message {message:?} to {converted:?}");
            Some(converted)
        }
        Err(reason) => {
            warn!("Aborted an outgoing message of type {kind} to switch {node}: {reason}");
            trace!("Aborted message: {message:?}");
            None
        }
    }
}

impl Sampler {
    /// [`adapt_outgoing`] with the table layout of the connected switch.
    pub fn adapt_outgoing(&self, node: NodeId, message: Message) -> Option<Message> {
        match self.shared().driver.table_layout(node) {
            Ok(Some(layout)) => adapt_outgoing(node, &layout, message),
            Ok(None) => {
                warn!(
                    "Aborted an outgoing message of type {} to switch {node}: switch is not connected",
                    describe(&message)
                );
                None
            }
            Err(not_enough_tables) => {
                warn!(
                    "Aborted an outgoing message of type {} to switch {node}: {not_enough_tables}",
                    describe(&message)
                );
                None
            }
        }
    }
}
