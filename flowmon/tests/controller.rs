mod common;

use common::{FakeNetwork, NoCollector, link, tcp};
use flowmon::{
    FlowedStatsStore, InvalidSamplableFlow, Message, NodeId, PortId, Sampler, SamplingConfig,
    TopologyEvent,
};
use flowmon_core::{
    flow::Match,
    protocol::{
        Action, FlowMod, FlowModCommand, FlowRemoved, FlowRemovedReason, Instruction,
        SamplingCookie, TableId, TableLayout,
    },
};
use std::{sync::Arc, time::Duration};

fn sampler(network: &Arc<FakeNetwork>, config: SamplingConfig) -> Sampler {
    Sampler::new(
        config,
        network.clone(),
        Arc::new(NoCollector),
        Arc::new(FlowedStatsStore::new()),
    )
    .unwrap()
}

fn removal(table_id: TableId) -> FlowRemoved {
    FlowRemoved {
        cookie: 0x10,
        priority: 5,
        reason: FlowRemovedReason::IdleTimeout,
        table_id,
        duration: Duration::from_secs(3),
        packet_count: Some(1),
        byte_count: Some(64),
        matching: Match::all(),
    }
}

#[test]
fn added_switch_gets_default_entries() {
    let network = FakeNetwork::new();
    network.connect(NodeId::ONE, 254, &[1, 2, 0xffff_fffe]);
    let sampler = sampler(&network, SamplingConfig::new());

    sampler
        .on_topology_event(&TopologyEvent::NodeAdded(NodeId::ONE))
        .unwrap();

    let layout = TableLayout::new(NodeId::ONE, 254).unwrap();
    let pass_through = network.entries(NodeId::ONE, layout.dest_sampling());
    assert_eq!(pass_through.len(), 1);
    assert_eq!(
        SamplingCookie::of(&pass_through[0].flow_mod),
        Some(SamplingCookie::Default)
    );
    assert_eq!(
        pass_through[0].flow_mod.instructions.last(),
        Some(&Instruction::GotoTable(layout.first_app()))
    );

    // one register entry per regular port
    assert_eq!(network.entries(NodeId::ONE, layout.tag_register()).len(), 2);

    sampler
        .on_topology_event(&TopologyEvent::PortAdded(flowmon::NodePort::new(
            NodeId::ONE,
            PortId::new(3),
        )))
        .unwrap();
    assert_eq!(network.entries(NodeId::ONE, layout.tag_register()).len(), 3);

    sampler.shutdown().unwrap();
}

#[test]
fn link_with_disconnected_switch_is_not_sampled() {
    let network = FakeNetwork::new();
    network.connect(NodeId::new(1), 254, &[1]);
    let sampler = sampler(&network, SamplingConfig::new());

    sampler
        .on_topology_event(&TopologyEvent::LinkAdded(link(1, 1, 2, 1)))
        .unwrap();
    assert!(sampler.links().unwrap().is_empty());

    network.connect(NodeId::new(2), 254, &[1]);
    sampler
        .on_topology_event(&TopologyEvent::LinkAdded(link(1, 1, 2, 1)))
        .unwrap();
    assert_eq!(sampler.links().unwrap(), vec![link(1, 1, 2, 1)]);

    // duplicates and unknown removals are tolerated
    sampler
        .on_topology_event(&TopologyEvent::LinkAdded(link(1, 1, 2, 1)))
        .unwrap();
    sampler
        .on_topology_event(&TopologyEvent::LinkRemoved(link(2, 1, 1, 1)))
        .unwrap();
    assert_eq!(sampler.links().unwrap(), vec![link(1, 1, 2, 1)]);

    sampler
        .on_topology_event(&TopologyEvent::LinkRemoved(link(1, 1, 2, 1)))
        .unwrap();
    assert!(sampler.links().unwrap().is_empty());

    sampler.shutdown().unwrap();
}

#[test]
fn ignored_topology_events() {
    let network = FakeNetwork::new();
    let sampler = sampler(&network, SamplingConfig::new());
    let port = flowmon::NodePort::new(NodeId::ONE, PortId::new(1));

    for event in [
        TopologyEvent::NodeRemoved(NodeId::ONE),
        TopologyEvent::NodeActivated(NodeId::ONE),
        TopologyEvent::PortUpdated(port),
        TopologyEvent::PortRemoved(port),
        TopologyEvent::LinkUpdated(link(1, 1, 2, 1)),
    ] {
        sampler.on_topology_event(&event).unwrap();
    }
    assert!(network.writes().is_empty());

    sampler.shutdown().unwrap();
}

#[test]
fn foreign_flow_removals_are_ignored() {
    let network = FakeNetwork::new();
    network.connect(NodeId::ONE, 254, &[1]);
    let sampler = sampler(&network, SamplingConfig::new());
    let layout = TableLayout::new(NodeId::ONE, 254).unwrap();

    assert!(
        !sampler
            .on_flow_removed(NodeId::ONE, removal(layout.first_app()))
            .unwrap()
    );
    // from a switch that is not connected
    assert!(
        !sampler
            .on_flow_removed(NodeId::new(7), removal(layout.src_sampling()))
            .unwrap()
    );

    // ours, but missing the port: consumed without a round to feed
    assert!(
        sampler
            .on_flow_removed(NodeId::ONE, removal(layout.src_sampling()))
            .unwrap()
    );
    assert!(sampler.active_sampling_links().unwrap().is_empty());

    sampler.shutdown().unwrap();
}

#[test]
fn small_switches_are_left_alone() {
    let network = FakeNetwork::new();
    network.connect(NodeId::ONE, 8, &[1]);
    let sampler = sampler(&network, SamplingConfig::new());

    sampler
        .on_topology_event(&TopologyEvent::NodeAdded(NodeId::ONE))
        .unwrap();
    assert!(network.writes().is_empty());
    assert!(
        !sampler
            .on_flow_removed(NodeId::ONE, removal(TableId::new(0)))
            .unwrap()
    );

    sampler.shutdown().unwrap();
}

#[test]
fn samplable_flows() {
    let network = FakeNetwork::new();
    let probe = "eth_type=0x800".parse().unwrap();
    let sampler = sampler(
        &network,
        SamplingConfig::new().set_secure_probe_base_flow(probe),
    );

    let in_port = "in_port=1".parse().unwrap();
    assert!(!sampler.is_valid_samplable_flow(&in_port));
    let error = sampler.start_sampling_flow(in_port).unwrap_err();
    assert_eq!(
        error.downcast_ref::<InvalidSamplableFlow>(),
        Some(&InvalidSamplableFlow::Match(
            "match cannot specify an in-port field"
        ))
    );

    let tagged = "vlan_vid=12".parse().unwrap();
    assert_eq!(
        sampler.validate_samplable_flow(&tagged),
        Err(InvalidSamplableFlow::Match(
            "match cannot specify a VLAN tag ID"
        ))
    );

    let error = sampler.start_sampling_flow(tcp()).unwrap_err();
    assert_eq!(
        error.to_string(),
        "invalid samplable flow: is contained by secure probe base flow of Flow[eth_type=0x800]"
    );
    assert!(sampler.flows().unwrap().is_empty());

    let udp: flowmon::Flow = "ip_proto=17".parse().unwrap();
    assert!(sampler.start_sampling_flow(udp.clone()).unwrap());
    assert_eq!(sampler.flows().unwrap(), vec![udp.clone()]);
    assert!(sampler.stop_sampling_flow(&udp).unwrap());
    assert!(!sampler.stop_sampling_flow(&udp).unwrap());

    sampler.shutdown().unwrap();
}

#[test]
fn outgoing_messages() {
    let network = FakeNetwork::new();
    network.connect(NodeId::ONE, 255, &[1, 2]);
    let sampler = sampler(&network, SamplingConfig::new());
    let layout = TableLayout::new(NodeId::ONE, 255).unwrap();

    let app = FlowMod::new(FlowModCommand::Add, TableId::new(1)).with_instructions(vec![
        Instruction::ApplyActions(vec![Action::output(PortId::new(2))]),
    ]);
    let Some(Message::FlowMod(adapted)) = sampler.adapt_outgoing(NodeId::ONE, app.into()) else {
        panic!("application flow-mod should be adapted");
    };
    assert_eq!(adapted.table_id, layout.last_app());
    assert_eq!(
        adapted.instructions.last(),
        Some(&Instruction::GotoTable(layout.tag_register()))
    );

    let sampling = SamplingCookie::Default.apply(FlowMod::new(
        FlowModCommand::Delete,
        layout.src_sampling(),
    ));
    assert_eq!(
        sampler.adapt_outgoing(NodeId::ONE, sampling.clone().into()),
        Some(Message::FlowMod(sampling))
    );

    let to_all_tables = FlowMod::new(FlowModCommand::Add, TableId::ALL);
    assert_eq!(
        sampler.adapt_outgoing(NodeId::ONE, to_all_tables.clone().into()),
        None
    );
    assert_eq!(
        sampler.adapt_outgoing(NodeId::new(9), to_all_tables.into()),
        None
    );

    sampler.shutdown().unwrap();
}
