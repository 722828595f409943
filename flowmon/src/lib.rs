/*!
# Flow monitoring

Runs the sampling rounds of [`flowmon_core`] against live switches.

A [`Sampler`] is created with a [`SamplingConfig`], a [`Transport`] to
the switches, a [`Collector`] for the trajectory samples and a
[`StatsSink`] receiving the statistics. The controller then feeds it the
topology changes ([`Sampler::on_topology_event`]), the flow-removed
messages of the switches ([`Sampler::on_flow_removed`]) and the messages
the applications send ([`Sampler::adapt_outgoing`]).

*/

mod config;
mod outgoing;
mod removal;
mod sampler;
mod topology;

// convenient re-export of `flowmon_core` core objects
pub use flowmon_core::{
    flow::Flow,
    link::{FlowedLink, Link},
    node::{NodeId, NodePort, PortId},
    protocol::{Message, SwitchInfo, Transport},
    sampling::Collector,
    stats::{FlowedStatsStore, StatsSink},
};

pub use self::{
    config::{
        ConfigError, MAX_SAMPLING_ROUND_DURATION_KEY, MAX_SIMULTANEOUS_SAMPLINGS_KEY,
        MIN_SAMPLING_ROUND_DURATION_KEY, POST_SAMPLING_EXCESS_DURATION_KEY,
        PRE_SAMPLING_EXCESS_DURATION_KEY, SECURE_PROBE_BASE_FLOW_KEY, SamplingConfig,
    },
    outgoing::adapt_outgoing,
    sampler::{InvalidSamplableFlow, RoundPhase, Sampler},
    topology::TopologyEvent,
};
