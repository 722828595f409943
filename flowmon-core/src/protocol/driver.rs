use super::{
    Action, BarrierHandler, FlowMod, FlowModCommand, Instruction, Message, NotEnoughTables,
    SamplingCookie, SwitchDisconnected, TableLayout, Transport, matching,
};
use crate::{
    flow::Match,
    link::{FlowedLink, Link},
    node::{NodeId, PortId},
    sampling::{TagPool, VlanTag},
};
use log::{debug, trace, warn};
use std::{fmt, sync::Arc};
use thiserror::Error;

const DEFAULT_ENTRY_PRIORITY: u16 = 0;
const LINK_ENTRY_PRIORITY: u16 = 1;
const UNTAGGED_SAMPLING_PRIORITY: u16 = 2;
const SAMPLING_PRIORITY: u16 = 3;

/// The switch operations that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchOperation {
    InstallSamplingFlows,
    UpdateTag,
    PurgeSamplingTables,
    SendBarrier,
    HandleAddedSwitch,
    HandleAddedSwitchPort,
    HandleAddedLink,
}

impl fmt::Display for SwitchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InstallSamplingFlows => "install sampling flows",
            Self::UpdateTag => "update tag",
            Self::PurgeSamplingTables => "purge sampling tables",
            Self::SendBarrier => "send barrier",
            Self::HandleAddedSwitch => "handle added switch",
            Self::HandleAddedSwitchPort => "handle added switch port",
            Self::HandleAddedLink => "handle added link",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchCommError {
    #[error(
        "could not {op} due to failed communication with SRC and DEST switches: {src} and {dest}"
    )]
    BothSwitches {
        op: SwitchOperation,
        src: NodeId,
        dest: NodeId,
    },
    #[error("could not {op} due to failed communication with SRC switch: {node}")]
    SrcSwitch { op: SwitchOperation, node: NodeId },
    #[error("could not {op} due to failed communication with DEST switch: {node}")]
    DestSwitch { op: SwitchOperation, node: NodeId },
    #[error("could not {op} due to failed communication with switch: {node}")]
    Switch { op: SwitchOperation, node: NodeId },
    #[error(transparent)]
    NotEnoughTables(#[from] NotEnoughTables),
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Src,
    Dest,
    Single,
}

impl Role {
    fn error(self, op: SwitchOperation) -> impl Fn(SwitchDisconnected) -> SwitchCommError {
        move |SwitchDisconnected(node)| match self {
            Self::Src => SwitchCommError::SrcSwitch { op, node },
            Self::Dest => SwitchCommError::DestSwitch { op, node },
            Self::Single => SwitchCommError::Switch { op, node },
        }
    }
}

#[derive(Debug)]
struct Connected {
    node: NodeId,
    layout: TableLayout,
    ports: Vec<PortId>,
}

/// Writes the sampling tables of the switches.
pub struct SwitchDriver {
    transport: Arc<dyn Transport>,
    tags: TagPool,
}

impl SwitchDriver {
    pub fn new(transport: Arc<dyn Transport>, tags: TagPool) -> Self {
        Self { transport, tags }
    }

    pub fn tags(&self) -> &TagPool {
        &self.tags
    }

    /// `Ok(None)` if the switch is not connected
    pub fn table_layout(&self, node: NodeId) -> Result<Option<TableLayout>, NotEnoughTables> {
        self.transport
            .switch(node)
            .map(|info| TableLayout::new(node, info.num_tables))
            .transpose()
    }

    fn connected(&self, node: NodeId) -> Result<Option<Connected>, NotEnoughTables> {
        let Some(info) = self.transport.switch(node) else {
            return Ok(None);
        };
        let layout = TableLayout::new(node, info.num_tables)?;
        Ok(Some(Connected {
            node,
            layout,
            ports: info.ports,
        }))
    }

    fn connected_or(
        &self,
        node: NodeId,
        op: SwitchOperation,
    ) -> Result<Connected, SwitchCommError> {
        self.connected(node)?
            .ok_or(SwitchCommError::Switch { op, node })
    }

    fn connected_pair(
        &self,
        link: &Link,
        op: SwitchOperation,
    ) -> Result<(Connected, Connected), SwitchCommError> {
        let src = self.connected(link.src_node())?;
        let dest = self.connected(link.dest_node())?;
        match (src, dest) {
            (Some(src), Some(dest)) => Ok((src, dest)),
            (None, None) => Err(SwitchCommError::BothSwitches {
                op,
                src: link.src_node(),
                dest: link.dest_node(),
            }),
            (None, Some(_)) => Err(SwitchCommError::SrcSwitch {
                op,
                node: link.src_node(),
            }),
            (Some(_), None) => Err(SwitchCommError::DestSwitch {
                op,
                node: link.dest_node(),
            }),
        }
    }

    fn write(&self, node: NodeId, flow_mod: FlowMod) -> Result<(), SwitchDisconnected> {
        trace!("writing to switch {node}: {flow_mod:?}");
        self.transport.write(node, Message::FlowMod(flow_mod))
    }

    fn barrier(
        &self,
        node: NodeId,
        barriers: &mut BarrierHandler,
    ) -> Result<(), SwitchDisconnected> {
        barriers.send_request(self.transport.send_barrier(node)?);
        Ok(())
    }

    /// Install the entries that sample `link` during a round tagged with
    /// `tag`. Both entries notify their removal so that their counters
    /// reach the sampler.
    ///
    /// The optional actions mirror the sampled packets to a collector.
    pub fn install_sampling_flows(
        &self,
        link: &FlowedLink,
        tag: VlanTag,
        src_action: Option<Action>,
        dest_action: Option<Action>,
        barriers: &mut BarrierHandler,
    ) -> Result<(), SwitchCommError> {
        let op = SwitchOperation::InstallSamplingFlows;
        let (src, dest) = self.connected_pair(&link.link(), op)?;
        let original = link.flow().as_match();

        let dest_error = Role::Dest.error(op);
        let in_port = link.link().dest_port();

        let mut actions = matching::pop_dest_tag_actions();
        actions.extend(dest_action);
        let tagged = FlowMod::new(FlowModCommand::Add, dest.layout.dest_sampling())
            .with_priority(SAMPLING_PRIORITY)
            .with_match(matching::with_dest_params(original.clone(), in_port, tag))
            .with_instructions(vec![
                Instruction::ApplyActions(actions),
                Instruction::GotoTable(dest.layout.first_app()),
            ])
            .notify_removal()
            .no_overlap();
        self.write(dest.node, SamplingCookie::Ephemeral.apply(tagged))
            .map_err(&dest_error)?;

        let untagged = FlowMod::new(FlowModCommand::Add, dest.layout.dest_sampling())
            .with_priority(UNTAGGED_SAMPLING_PRIORITY)
            .with_match(matching::untagged_dest_match(in_port))
            .with_instructions(vec![
                Instruction::ApplyActions(dest_action.into_iter().collect()),
                Instruction::GotoTable(dest.layout.first_app()),
            ])
            .no_overlap();
        self.write(dest.node, SamplingCookie::Ephemeral.apply(untagged))
            .map_err(&dest_error)?;
        self.barrier(dest.node, barriers).map_err(&dest_error)?;

        let src_error = Role::Src.error(op);
        let out_port = link.link().src_port();

        let mut actions: Vec<Action> = src_action.into_iter().collect();
        actions.extend(matching::push_src_tag_actions());
        actions.push(Action::output(out_port));
        let sampling = FlowMod::new(FlowModCommand::Add, src.layout.src_sampling())
            .with_priority(SAMPLING_PRIORITY)
            .with_match(matching::with_src_params(original.clone(), out_port, tag))
            .with_instructions(vec![Instruction::ApplyActions(actions)])
            .notify_removal()
            .no_overlap();
        self.write(src.node, SamplingCookie::Ephemeral.apply(sampling))
            .map_err(&src_error)?;
        self.barrier(src.node, barriers).map_err(&src_error)?;

        debug!("installed sampling flows of {link} with {tag}");
        Ok(())
    }

    /// Delete the sampling entries of `link` from whichever of its switches
    /// are still connected.
    pub fn remove_sampling_flows(&self, link: &FlowedLink) {
        let original = link.flow().as_match();

        if let Some(src) = self.connected_quietly(link.src_node()) {
            let delete = FlowMod::new(FlowModCommand::Delete, src.layout.src_sampling())
                .with_match(matching::with_src_port(
                    original.clone(),
                    link.link().src_port(),
                ));
            self.write_quietly(src.node, SamplingCookie::Ephemeral.apply(delete));
        }

        if let Some(dest) = self.connected_quietly(link.dest_node()) {
            let delete = FlowMod::new(FlowModCommand::Delete, dest.layout.dest_sampling())
                .with_match(matching::with_dest_port(
                    original.clone(),
                    link.link().dest_port(),
                ));
            self.write_quietly(dest.node, SamplingCookie::Ephemeral.apply(delete));
        }
    }

    /// Register `tag` for the packets leaving `node` through `out_port`.
    /// From then on the source sampling entries of that tag see them.
    pub fn update_tag(
        &self,
        node: NodeId,
        out_port: PortId,
        tag: VlanTag,
    ) -> Result<(), SwitchCommError> {
        let op = SwitchOperation::UpdateTag;
        let switch = self.connected_or(node, op)?;
        let modify = tag_register_entry(&switch.layout, FlowModCommand::Modify, out_port, tag);
        self.write(node, modify).map_err(Role::Single.error(op))
    }

    /// Delete every sampling entry of the round tagged with `tag`.
    pub fn purge_sampling_tables(
        &self,
        node: NodeId,
        tag: VlanTag,
        barriers: &mut BarrierHandler,
    ) -> Result<(), SwitchCommError> {
        let op = SwitchOperation::PurgeSamplingTables;
        let switch = self.connected_or(node, op)?;
        let error = Role::Single.error(op);

        let deletions = [
            (switch.layout.src_sampling(), matching::src_tag_match(tag)),
            (
                switch.layout.dest_sampling(),
                matching::untagged_dest_match(PortId::ANY),
            ),
            (switch.layout.dest_sampling(), matching::dest_tag_match(tag)),
        ];
        for (table, matching) in deletions {
            let delete = FlowMod::new(FlowModCommand::Delete, table).with_match(matching);
            self.write(node, SamplingCookie::Ephemeral.apply(delete))
                .map_err(&error)?;
        }
        self.barrier(node, barriers).map_err(error)
    }

    pub fn send_barrier(
        &self,
        node: NodeId,
        barriers: &mut BarrierHandler,
    ) -> Result<(), SwitchCommError> {
        self.barrier(node, barriers)
            .map_err(Role::Single.error(SwitchOperation::SendBarrier))
    }

    /// Reset the sampling tables of a newly connected switch and prepare the
    /// tag register of every one of its ports.
    pub fn handle_added_switch(&self, node: NodeId) -> Result<(), SwitchCommError> {
        let op = SwitchOperation::HandleAddedSwitch;
        let switch = self.connected_or(node, op)?;
        let error = Role::Single.error(op);
        let layout = switch.layout;

        for table in [
            layout.dest_sampling(),
            layout.tag_register(),
            layout.src_sampling(),
        ] {
            let clear = FlowMod::new(FlowModCommand::Delete, table);
            self.write(node, SamplingCookie::Default.apply(clear))
                .map_err(&error)?;
        }

        let pass_through = FlowMod::new(FlowModCommand::Add, layout.dest_sampling())
            .with_priority(DEFAULT_ENTRY_PRIORITY)
            .with_instructions(vec![
                Instruction::ApplyActions(Vec::new()),
                Instruction::GotoTable(layout.first_app()),
            ])
            .no_overlap();
        self.write(node, SamplingCookie::Default.apply(pass_through))
            .map_err(&error)?;

        for port in switch.ports.iter().copied().filter(|port| !port.is_special()) {
            self.write(node, default_tag_register_entry(&layout, FlowModCommand::Add, port))
                .map_err(&error)?;
        }

        debug!("prepared sampling tables of switch {node}");
        Ok(())
    }

    pub fn handle_added_switch_port(
        &self,
        node: NodeId,
        port: PortId,
    ) -> Result<(), SwitchCommError> {
        if port.is_special() {
            return Ok(());
        }
        let op = SwitchOperation::HandleAddedSwitchPort;
        let switch = self.connected_or(node, op)?;
        self.write(
            node,
            default_tag_register_entry(&switch.layout, FlowModCommand::Add, port),
        )
        .map_err(Role::Single.error(op))
    }

    /// Prepare the permanent entries of a new link: the destination pops
    /// every sampling tag arriving through the link and the source tags the
    /// packets leaving through it with the first tag of the pool.
    pub fn handle_added_link(&self, link: &Link) -> Result<(), SwitchCommError> {
        let op = SwitchOperation::HandleAddedLink;
        let (src, dest) = self.connected_pair(link, op)?;

        let dest_error = Role::Dest.error(op);
        for tag in self.tags.iter() {
            let pop = FlowMod::new(FlowModCommand::Add, dest.layout.dest_sampling())
                .with_priority(LINK_ENTRY_PRIORITY)
                .with_match(matching::with_dest_params(
                    Match::all(),
                    link.dest_port(),
                    tag,
                ))
                .with_instructions(vec![
                    Instruction::ApplyActions(matching::pop_dest_tag_actions()),
                    Instruction::GotoTable(dest.layout.first_app()),
                ])
                .no_overlap();
            self.write(dest.node, SamplingCookie::Default.apply(pop))
                .map_err(&dest_error)?;
        }

        let src_error = Role::Src.error(op);
        let out_port = link.src_port();
        let mut actions = matching::push_src_tag_actions();
        actions.push(Action::output(out_port));
        let push = FlowMod::new(FlowModCommand::Add, src.layout.src_sampling())
            .with_priority(LINK_ENTRY_PRIORITY)
            .with_match(matching::src_port_match(out_port))
            .with_instructions(vec![Instruction::ApplyActions(actions)])
            .no_overlap();
        self.write(src.node, SamplingCookie::Default.apply(push))
            .map_err(&src_error)?;
        self.write(
            src.node,
            tag_register_entry(
                &src.layout,
                FlowModCommand::Modify,
                out_port,
                self.tags.first(),
            ),
        )
        .map_err(&src_error)?;

        debug!("prepared sampling tables of link {link}");
        Ok(())
    }

    /// Undo [`Self::handle_added_link`] on whichever of the link's switches
    /// are still connected.
    pub fn handle_removed_link(&self, link: &Link) {
        if let Some(src) = self.connected_quietly(link.src_node()) {
            let out_port = link.src_port();
            self.write_quietly(
                src.node,
                default_tag_register_entry(&src.layout, FlowModCommand::Modify, out_port),
            );
            let delete = FlowMod::new(FlowModCommand::DeleteStrict, src.layout.src_sampling())
                .with_priority(LINK_ENTRY_PRIORITY)
                .with_match(matching::src_port_match(out_port));
            self.write_quietly(src.node, SamplingCookie::Default.apply(delete));
        }

        if let Some(dest) = self.connected_quietly(link.dest_node()) {
            for tag in self.tags.iter() {
                let delete =
                    FlowMod::new(FlowModCommand::DeleteStrict, dest.layout.dest_sampling())
                        .with_priority(LINK_ENTRY_PRIORITY)
                        .with_match(matching::with_dest_params(
                            Match::all(),
                            link.dest_port(),
                            tag,
                        ));
                self.write_quietly(dest.node, SamplingCookie::Default.apply(delete));
            }
        }
    }

    fn connected_quietly(&self, node: NodeId) -> Option<Connected> {
        self.connected(node).unwrap_or_else(|error| {
            warn!("{error}");
            None
        })
    }

    fn write_quietly(&self, node: NodeId, flow_mod: FlowMod) {
        if let Err(error) = self.write(node, flow_mod) {
            debug!("{error}");
        }
    }
}

fn tag_register_entry(
    layout: &TableLayout,
    command: FlowModCommand,
    out_port: PortId,
    tag: VlanTag,
) -> FlowMod {
    let entry = FlowMod::new(command, layout.tag_register())
        .with_priority(LINK_ENTRY_PRIORITY)
        .with_match(matching::src_port_match(out_port))
        .with_instructions(vec![
            Instruction::ApplyActions(matching::register_tag_actions(tag)),
            Instruction::GotoTable(layout.src_sampling()),
        ]);
    SamplingCookie::Default.apply(entry)
}

/// forward straight through the port, packets of ports without a link are
/// never sampled
fn default_tag_register_entry(
    layout: &TableLayout,
    command: FlowModCommand,
    out_port: PortId,
) -> FlowMod {
    let mut entry = FlowMod::new(command, layout.tag_register())
        .with_priority(LINK_ENTRY_PRIORITY)
        .with_match(matching::src_port_match(out_port))
        .with_instructions(vec![Instruction::ApplyActions(vec![Action::output(
            out_port,
        )])]);
    if command == FlowModCommand::Add {
        entry = entry.no_overlap();
    }
    SamplingCookie::Default.apply(entry)
}

impl fmt::Debug for SwitchDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchDriver")
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
