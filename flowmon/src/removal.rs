use crate::Sampler;
use anyhow::Result;
use flowmon_core::{
    demux::{Demuxed, demux},
    node::NodeId,
    protocol::FlowRemoved,
    time::Timed,
};
use log::{debug, trace};

impl Sampler {
    /// Route a flow-removed message received from `node` to the round in
    /// progress.
    ///
    /// Returns `true` if the message came from one of the sampling tables,
    /// in which case no one else should handle it.
    pub fn on_flow_removed(&self, node: NodeId, removal: FlowRemoved) -> Result<bool> {
        let removal = Timed::now(removal);
        let layout = match self.shared().driver.table_layout(node) {
            Ok(Some(layout)) => layout,
            Ok(None) => {
                trace!("Ignored flow statistics from disconnected switch {node}");
                return Ok(false);
            }
            Err(not_enough_tables) => {
                debug!("Ignored flow statistics: {not_enough_tables}");
                return Ok(false);
            }
        };

        match demux(node, &layout, removal) {
            Demuxed::Resolved { endpoint, removal } => {
                trace!(
                    "Received {} flow statistics from switch {node} with flow {}",
                    endpoint.kind(),
                    endpoint.flow()
                );
                self.receive_sampling_result(&endpoint, removal)?;
                Ok(true)
            }
            Demuxed::MissingPort { .. } => Ok(true),
            Demuxed::Ignored => Ok(false),
        }
    }
}
