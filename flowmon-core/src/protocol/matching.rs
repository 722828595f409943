//! Match and action conventions of the sampling tables.
//!
//! At the destination switch the sampled packets are recognised by their
//! ingress port and VLAN tag. At the source switch the egress port travels
//! in the pipeline metadata and the tag of the round in register 0.

use super::Action;
use crate::{
    flow::{Match, MatchField},
    node::PortId,
    sampling::VlanTag,
};

/// bits of the VLAN id copied from register 0 into the pushed header
const VLAN_ID_BITS: u32 = 12;

fn with_in_port(mut matching: Match, in_port: PortId) -> Match {
    if in_port == PortId::ANY {
        matching.remove(MatchField::InPort);
    } else {
        matching.set_masked(
            MatchField::InPort,
            u64::from(in_port.into_u32()),
            MatchField::InPort.full_mask(),
        );
    }
    matching
}

/// `matching` restricted to packets entering through `in_port` with `tag`
pub fn with_dest_params(matching: Match, in_port: PortId, tag: VlanTag) -> Match {
    with_in_port(matching, in_port).with(MatchField::VlanVid, tag.match_value())
}

/// `matching` restricted to packets entering through `in_port`
pub fn with_dest_port(matching: Match, in_port: PortId) -> Match {
    with_in_port(matching, in_port)
}

/// packets without a VLAN header entering through `in_port`
///
/// [`PortId::ANY`] leaves the ingress port wildcarded.
pub fn untagged_dest_match(in_port: PortId) -> Match {
    with_in_port(Match::all(), in_port).with(MatchField::VlanVid, 0)
}

/// packets with `tag`, on any port
pub fn dest_tag_match(tag: VlanTag) -> Match {
    Match::all().with(MatchField::VlanVid, tag.match_value())
}

/// `matching` restricted to packets leaving through `out_port` while `tag`
/// is registered
pub fn with_src_params(matching: Match, out_port: PortId, tag: VlanTag) -> Match {
    with_src_port(matching, out_port).with(MatchField::Reg0, u64::from(tag.vid()))
}

/// `matching` restricted to packets leaving through `out_port`
pub fn with_src_port(matching: Match, out_port: PortId) -> Match {
    matching.with(MatchField::Metadata, u64::from(out_port.into_u32()))
}

/// packets leaving through `out_port`
pub fn src_port_match(out_port: PortId) -> Match {
    with_src_port(Match::all(), out_port)
}

/// packets registered with `tag`, on any port
pub fn src_tag_match(tag: VlanTag) -> Match {
    Match::all().with(MatchField::Reg0, u64::from(tag.vid()))
}

/// the egress port carried in the metadata of a source sampling match
pub fn src_port(matching: &Match) -> Option<PortId> {
    let metadata = matching.exact(MatchField::Metadata)?;
    u32::try_from(metadata).ok().map(PortId::new)
}

/// the ingress port of a destination sampling match
pub fn dest_port(matching: &Match) -> Option<PortId> {
    let in_port = matching.exact(MatchField::InPort)?;
    u32::try_from(in_port).ok().map(PortId::new)
}

/// the application match of a source sampling match
pub fn without_src_params(matching: Match) -> Match {
    matching.without(MatchField::Metadata).without(MatchField::Reg0)
}

/// the application match of a destination sampling match
pub fn without_dest_params(matching: Match) -> Match {
    matching.without(MatchField::InPort).without(MatchField::VlanVid)
}

/// Why `matching` cannot be the flow of a sampled link, if it cannot.
///
/// ```
/// # use flowmon_core::{flow::{Match, MatchField}, protocol::samplable_match_violation};
/// assert_eq!(samplable_match_violation(&Match::all().with(MatchField::TcpDst, 80)), None);
/// assert_eq!(
///     samplable_match_violation(&Match::all().with(MatchField::InPort, 1)),
///     Some("match cannot specify an in-port field")
/// );
/// ```
pub fn samplable_match_violation(matching: &Match) -> Option<&'static str> {
    [
        (MatchField::InPort, "match cannot specify an in-port field"),
        (MatchField::Metadata, "match cannot specify a metadata field"),
        (MatchField::VlanVid, "match cannot specify a VLAN tag ID"),
        (MatchField::Reg0, "match cannot specify nicira register 0"),
    ]
    .into_iter()
    .find(|(field, _)| !matching.is_wildcarded(*field))
    .map(|(_, reason)| reason)
}

/// store `tag` in register 0
pub fn register_tag_actions(tag: VlanTag) -> Vec<Action> {
    vec![Action::SetField {
        field: MatchField::Reg0,
        value: u64::from(tag.vid()),
    }]
}

/// push a VLAN header carrying the registered tag
pub fn push_src_tag_actions() -> Vec<Action> {
    vec![
        Action::PushVlan,
        Action::CopyField {
            src: MatchField::Reg0,
            dst: MatchField::VlanVid,
            bits: VLAN_ID_BITS,
        },
    ]
}

pub fn pop_dest_tag_actions() -> Vec<Action> {
    vec![Action::PopVlan]
}
