//! Rewrites the flow-mods of the applications so that they live between the
//! sampling tables.
//!
//! Application table `n` becomes table `n + 1`, and an output through a
//! regular port becomes a jump to the tag register table carrying the port
//! in the metadata.

use super::{Action, FlowMod, Instruction, Message, SamplingCookie, TableId, TableLayout};
use crate::node::PortId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppFlowModError {
    #[error("cookie value {0:#x} is not supported (is default sampling flow cookie)")]
    DefaultCookie(u64),
    #[error("cookie value {0:#x} is not supported (is ephemeral sampling flow cookie)")]
    EphemeralCookie(u64),
    #[error("cookie mask value {0:#x} is not supported (only all-zeros or all-ones are permitted)")]
    CookieMask(u64),
    #[error("write-metadata instruction is not supported")]
    WriteMetadata,
    #[error("write-actions with output action is not supported")]
    WriteActionsOutput,
    #[error("more than one output action is not supported")]
    MultipleOutputs,
    #[error("group action is not supported")]
    GroupAction,
    #[error("output action and goto-table instruction are not supported together")]
    OutputWithGoto,
    #[error("output port {0} is not supported")]
    OutputPort(PortId),
    #[error("table ID of ALL {context}is not supported")]
    AllTables { context: &'static str },
    #[error("table ID of {id} {context}is not supported (max allowed ID is {max})")]
    TableOutOfRange {
        id: TableId,
        context: &'static str,
        max: u8,
    },
}

/// Convert any message an application sends to a switch.
pub fn convert_app_message(
    layout: &TableLayout,
    message: Message,
) -> Result<Message, AppFlowModError> {
    match message {
        Message::FlowMod(flow_mod) => convert_app_flow_mod(layout, flow_mod).map(Message::FlowMod),
        packet_out @ Message::PacketOut(_) => Ok(packet_out),
    }
}

/// Convert a flow-mod of an application.
///
/// ```
/// # use flowmon_core::{node::{NodeId, PortId}, protocol::*};
/// let layout = TableLayout::new(NodeId::ONE, 254).unwrap();
/// let flow_mod = FlowMod::new(FlowModCommand::Add, TableId::new(0))
///     .with_instructions(vec![Instruction::ApplyActions(vec![Action::output(PortId::new(4))])]);
///
/// let converted = convert_app_flow_mod(&layout, flow_mod).unwrap();
/// assert_eq!(converted.table_id, layout.first_app());
/// assert_eq!(
///     converted.instructions,
///     vec![
///         Instruction::WriteMetadata { metadata: 4, mask: u64::MAX },
///         Instruction::GotoTable(layout.tag_register()),
///     ]
/// );
/// ```
pub fn convert_app_flow_mod(
    layout: &TableLayout,
    mut flow_mod: FlowMod,
) -> Result<FlowMod, AppFlowModError> {
    if flow_mod.cookie == SamplingCookie::Default.cookie() {
        return Err(AppFlowModError::DefaultCookie(flow_mod.cookie));
    }
    if flow_mod.cookie == SamplingCookie::Ephemeral.cookie() {
        return Err(AppFlowModError::EphemeralCookie(flow_mod.cookie));
    }
    let masked = flow_mod.command.is_modify() || flow_mod.command.is_delete();
    if masked && !matches!(flow_mod.cookie_mask, 0 | u64::MAX) {
        return Err(AppFlowModError::CookieMask(flow_mod.cookie_mask));
    }

    flow_mod.table_id = convert_app_table_id(layout, flow_mod.table_id, "")?;

    if flow_mod.command.is_delete() {
        flow_mod.out_port = PortId::ANY;
    } else {
        flow_mod.instructions = convert_instructions(layout, flow_mod.instructions)?;
    }
    Ok(flow_mod)
}

fn convert_app_table_id(
    layout: &TableLayout,
    id: TableId,
    context: &'static str,
) -> Result<TableId, AppFlowModError> {
    if id == TableId::ALL {
        return Err(AppFlowModError::AllTables { context });
    }
    let max = layout.last_app().into_u8() - layout.first_app().into_u8();
    if id.into_u8() > max {
        return Err(AppFlowModError::TableOutOfRange { id, context, max });
    }
    Ok(TableId::new(layout.first_app().into_u8() + id.into_u8()))
}

fn convert_instructions(
    layout: &TableLayout,
    instructions: Vec<Instruction>,
) -> Result<Vec<Instruction>, AppFlowModError> {
    let mut output = None;
    let mut has_goto = false;
    for instruction in &instructions {
        match instruction {
            Instruction::WriteMetadata { .. } => return Err(AppFlowModError::WriteMetadata),
            Instruction::WriteActions(actions) => {
                for action in actions {
                    match action {
                        Action::Output { .. } => return Err(AppFlowModError::WriteActionsOutput),
                        Action::Group(_) => return Err(AppFlowModError::GroupAction),
                        _ => {}
                    }
                }
            }
            Instruction::ApplyActions(actions) => {
                for action in actions {
                    match action {
                        Action::Output { .. } if output.is_some() => {
                            return Err(AppFlowModError::MultipleOutputs);
                        }
                        Action::Output { port, .. } => output = Some(*port),
                        Action::Group(_) => return Err(AppFlowModError::GroupAction),
                        _ => {}
                    }
                }
            }
            Instruction::GotoTable(_) => has_goto = true,
            Instruction::ClearActions => {}
        }
    }

    match output {
        Some(_) if has_goto => Err(AppFlowModError::OutputWithGoto),
        Some(port @ (PortId::IN_PORT | PortId::ALL | PortId::FLOOD)) => {
            Err(AppFlowModError::OutputPort(port))
        }
        Some(port) if port.is_special() => Ok(instructions),
        Some(port) => Ok(redirect_output(layout, instructions, port)),
        None => instructions
            .into_iter()
            .map(|instruction| match instruction {
                Instruction::GotoTable(id) => {
                    convert_app_table_id(layout, id, "for goto-table ").map(Instruction::GotoTable)
                }
                other => Ok(other),
            })
            .collect(),
    }
}

fn redirect_output(
    layout: &TableLayout,
    instructions: Vec<Instruction>,
    port: PortId,
) -> Vec<Instruction> {
    let mut converted: Vec<Instruction> = instructions
        .into_iter()
        .filter_map(|instruction| match instruction {
            Instruction::ApplyActions(actions) => {
                let actions: Vec<Action> = actions
                    .into_iter()
                    .filter(|action| !matches!(action, Action::Output { .. }))
                    .collect();
                (!actions.is_empty()).then_some(Instruction::ApplyActions(actions))
            }
            other => Some(other),
        })
        .collect();
    converted.push(Instruction::WriteMetadata {
        metadata: u64::from(port.into_u32()),
        mask: u64::MAX,
    });
    converted.push(Instruction::GotoTable(layout.tag_register()));
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flow::MatchField,
        node::NodeId,
        protocol::{FlowModCommand, PacketOut},
    };

    fn layout() -> TableLayout {
        TableLayout::new(NodeId::ONE, 255).unwrap()
    }

    fn add(instructions: Vec<Instruction>) -> FlowMod {
        FlowMod::new(FlowModCommand::Add, TableId::new(0)).with_instructions(instructions)
    }

    #[test]
    fn reserved_cookies() {
        let flow_mod = add(Vec::new()).with_cookie(SamplingCookie::Default.cookie(), 0);
        assert_eq!(
            convert_app_flow_mod(&layout(), flow_mod).unwrap_err().to_string(),
            "cookie value 0x12c000004f3a24e7 is not supported (is default sampling flow cookie)"
        );
        let flow_mod = add(Vec::new()).with_cookie(SamplingCookie::Ephemeral.cookie(), 0);
        assert!(matches!(
            convert_app_flow_mod(&layout(), flow_mod),
            Err(AppFlowModError::EphemeralCookie(_))
        ));
    }

    #[test]
    fn partial_cookie_mask() {
        let flow_mod = FlowMod::new(FlowModCommand::Delete, TableId::new(0)).with_cookie(7, 0xff);
        assert_eq!(
            convert_app_flow_mod(&layout(), flow_mod),
            Err(AppFlowModError::CookieMask(0xff))
        );

        // adds ignore the mask
        let flow_mod = add(Vec::new()).with_cookie(7, 0xff);
        assert!(convert_app_flow_mod(&layout(), flow_mod).is_ok());
    }

    #[test]
    fn output_keeps_other_actions() {
        let set_field = Action::SetField {
            field: MatchField::EthDst,
            value: 0xaabb,
        };
        let flow_mod = add(vec![Instruction::ApplyActions(vec![
            set_field,
            Action::output(PortId::new(2)),
        ])]);
        let converted = convert_app_flow_mod(&layout(), flow_mod).unwrap();
        assert_eq!(
            converted.instructions,
            vec![
                Instruction::ApplyActions(vec![set_field]),
                Instruction::WriteMetadata {
                    metadata: 2,
                    mask: u64::MAX
                },
                Instruction::GotoTable(TableId::new(3)),
            ]
        );
    }

    #[test]
    fn unsupported_instructions() {
        let cases = [
            (
                vec![Instruction::WriteMetadata {
                    metadata: 1,
                    mask: 1,
                }],
                AppFlowModError::WriteMetadata,
            ),
            (
                vec![Instruction::WriteActions(vec![Action::output(PortId::new(1))])],
                AppFlowModError::WriteActionsOutput,
            ),
            (
                vec![Instruction::ApplyActions(vec![
                    Action::output(PortId::new(1)),
                    Action::output(PortId::new(2)),
                ])],
                AppFlowModError::MultipleOutputs,
            ),
            (
                vec![Instruction::ApplyActions(vec![Action::Group(1)])],
                AppFlowModError::GroupAction,
            ),
            (
                vec![
                    Instruction::ApplyActions(vec![Action::output(PortId::new(1))]),
                    Instruction::GotoTable(TableId::new(1)),
                ],
                AppFlowModError::OutputWithGoto,
            ),
            (
                vec![Instruction::ApplyActions(vec![Action::output(PortId::FLOOD)])],
                AppFlowModError::OutputPort(PortId::FLOOD),
            ),
        ];
        for (instructions, expected) in cases {
            assert_eq!(
                convert_app_flow_mod(&layout(), add(instructions)),
                Err(expected)
            );
        }
    }

    #[test]
    fn controller_output_is_untouched() {
        let instructions = vec![Instruction::ApplyActions(vec![Action::output(
            PortId::CONTROLLER,
        )])];
        let converted = convert_app_flow_mod(&layout(), add(instructions.clone())).unwrap();
        assert_eq!(converted.instructions, instructions);
        assert_eq!(converted.table_id, TableId::new(1));
    }

    #[test]
    fn goto_table() {
        let flow_mod = add(vec![Instruction::GotoTable(TableId::new(1))]);
        let converted = convert_app_flow_mod(&layout(), flow_mod).unwrap();
        assert_eq!(
            converted.instructions,
            vec![Instruction::GotoTable(TableId::new(2))]
        );

        let flow_mod = add(vec![Instruction::GotoTable(TableId::new(2))]);
        assert_eq!(
            convert_app_flow_mod(&layout(), flow_mod)
                .unwrap_err()
                .to_string(),
            "table ID of 2 for goto-table is not supported (max allowed ID is 1)"
        );
    }

    #[test]
    fn table_ids() {
        let flow_mod = FlowMod::new(FlowModCommand::Delete, TableId::ALL);
        assert_eq!(
            convert_app_flow_mod(&layout(), flow_mod)
                .unwrap_err()
                .to_string(),
            "table ID of ALL is not supported"
        );

        let mut flow_mod = FlowMod::new(FlowModCommand::Delete, TableId::new(1));
        flow_mod.out_port = PortId::new(3);
        let converted = convert_app_flow_mod(&layout(), flow_mod).unwrap();
        assert_eq!(converted.table_id, TableId::new(2));
        assert_eq!(converted.out_port, PortId::ANY);
    }

    #[test]
    fn packet_out_passes_through() {
        let packet_out = Message::PacketOut(PacketOut {
            in_port: PortId::CONTROLLER,
            actions: vec![Action::output(PortId::new(1))],
            data: vec![0; 64],
        });
        assert_eq!(
            convert_app_message(&layout(), packet_out.clone()),
            Ok(packet_out)
        );
    }
}
