//! Routes the flow-removed messages of the sampling tables to the endpoint
//! they measured.

use crate::{
    flow::Flow,
    link::{Endpoint, EndpointKind},
    node::{NodeId, NodePort},
    protocol::{self, FlowRemoved, TableLayout},
    time::Timed,
};
use log::{trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Demuxed {
    /// a sampling entry of `endpoint` was removed
    Resolved {
        endpoint: Endpoint,
        removal: Timed<FlowRemoved>,
    },
    /// the entry came from a sampling table but did not carry its port
    MissingPort { node: NodeId, kind: EndpointKind },
    /// the entry did not come from a sampling table
    Ignored,
}

/// Identify the endpoint whose sampling entry was removed from `node`.
///
/// ```
/// # use flowmon_core::{demux::{demux, Demuxed}, flow::{Match, MatchField}, node::NodeId,
/// #     protocol::{FlowRemoved, FlowRemovedReason, TableLayout}, time::Timed};
/// # use std::time::Duration;
/// let layout = TableLayout::new(NodeId::ONE, 254).unwrap();
/// let removal = FlowRemoved {
///     cookie: 0,
///     priority: 3,
///     reason: FlowRemovedReason::Delete,
///     table_id: layout.dest_sampling(),
///     duration: Duration::from_secs(1),
///     packet_count: Some(10),
///     byte_count: Some(1_000),
///     matching: Match::all().with(MatchField::InPort, 4).with(MatchField::VlanVid, 0x1ff7),
/// };
///
/// let Demuxed::Resolved { endpoint, .. } = demux(NodeId::ONE, &layout, Timed::now(removal)) else {
///     panic!("expected a destination endpoint");
/// };
/// assert_eq!(endpoint.port().into_u32(), 4);
/// assert!(endpoint.flow().as_match().is_all());
/// ```
pub fn demux(node: NodeId, layout: &TableLayout, removal: Timed<FlowRemoved>) -> Demuxed {
    let table = removal.value.table_id;
    let (kind, port, original) = if table == layout.src_sampling() {
        let matching = &removal.value.matching;
        (
            EndpointKind::Source,
            protocol::src_port(matching),
            protocol::without_src_params(matching.clone()),
        )
    } else if table == layout.dest_sampling() {
        let matching = &removal.value.matching;
        (
            EndpointKind::Destination,
            protocol::dest_port(matching),
            protocol::without_dest_params(matching.clone()),
        )
    } else {
        trace!("Ignored received flow statistics (not from our tables) from switch {node}");
        return Demuxed::Ignored;
    };

    let Some(port) = port else {
        warn!(
            "Expected {kind} port in flow statistics from switch {node} with flow {}, but found none!",
            removal.value.matching
        );
        return Demuxed::MissingPort { node, kind };
    };

    let endpoint = Endpoint::new(NodePort::new(node, port), Flow::new(original), kind);
    Demuxed::Resolved { endpoint, removal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flow::{Match, MatchField},
        node::PortId,
        protocol::{FlowRemovedReason, TableId},
    };
    use std::time::Duration;

    fn removal(table_id: TableId, matching: Match) -> Timed<FlowRemoved> {
        Timed::now(FlowRemoved {
            cookie: 0,
            priority: 3,
            reason: FlowRemovedReason::Delete,
            table_id,
            duration: Duration::from_millis(1_500),
            packet_count: Some(4),
            byte_count: Some(256),
            matching,
        })
    }

    fn layout() -> TableLayout {
        TableLayout::new(NodeId::ONE, 254).unwrap()
    }

    #[test]
    fn source_endpoint() {
        let tcp = Match::all().with(MatchField::IpProto, 6);
        let matching = tcp
            .clone()
            .with(MatchField::Metadata, 7)
            .with(MatchField::Reg0, 4090);

        let Demuxed::Resolved { endpoint, removal } =
            demux(NodeId::ONE, &layout(), removal(layout().src_sampling(), matching))
        else {
            panic!("expected a source endpoint");
        };
        assert_eq!(endpoint.kind(), EndpointKind::Source);
        assert_eq!(endpoint.port(), PortId::new(7));
        assert_eq!(endpoint.flow(), &Flow::new(tcp));
        assert_eq!(removal.value.byte_count, Some(256));
    }

    #[test]
    fn missing_port() {
        let matching = Match::all().with(MatchField::Reg0, 4090);
        assert_eq!(
            demux(NodeId::ONE, &layout(), removal(layout().src_sampling(), matching)),
            Demuxed::MissingPort {
                node: NodeId::ONE,
                kind: EndpointKind::Source
            }
        );
    }

    #[test]
    fn other_tables_are_ignored() {
        assert_eq!(
            demux(NodeId::ONE, &layout(), removal(layout().first_app(), Match::all())),
            Demuxed::Ignored
        );
    }
}
