//! Simulated example: sample a ring of in-memory switches and print the
//! statistics every flowed link ends up with.
//!
//! Run with:
//!   RUST_LOG=flowmon=debug cargo run --example simulated -p flowmon -- --switches 4

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use flowmon::{
    Collector, Flow, FlowedLink, FlowedStatsStore, Link, Message, NodeId, NodePort, PortId,
    Sampler, SamplingConfig, SwitchInfo, TopologyEvent, Transport,
};
use flowmon_core::{
    protocol::{
        BarrierReply, FlowMod, FlowModCommand, FlowRemoved, FlowRemovedReason, SwitchDisconnected,
    },
    sampling::{CollectionError, CollectionReply},
    time::HumanDuration,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, mpsc},
    time::{Duration, Instant},
};

#[derive(Parser)]
struct Command {
    /// number of switches in the ring
    #[arg(long, default_value = "3")]
    switches: u64,

    /// how long to sample for
    #[arg(long, default_value = "30s")]
    time: HumanDuration,

    #[arg(long, default_value = "500ms")]
    min_round: HumanDuration,

    #[arg(long, default_value = "1s")]
    max_round: HumanDuration,

    /// flows to sample, `*` samples every packet
    #[arg(long, default_values = ["ip_proto=6", "ip_proto=17"])]
    flow: Vec<String>,

    /// flowed links sampled in the same round, at most
    #[arg(long, default_value = "2")]
    max_simultaneous: usize,

    /// packets lost out of every thousand
    #[arg(long, default_value = "10")]
    loss_per_mille: u64,
}

const NUM_TABLES: u8 = 255;
const PACKETS_PER_MS: u64 = 20;
const PACKET_SIZE: u64 = 1_200;

struct Entry {
    flow_mod: FlowMod,
    installed: Instant,
}

/// In-memory switches. Every sampling entry sees a constant traffic and
/// the destination entries miss a fraction of it.
struct Network {
    switches: Mutex<HashMap<NodeId, Vec<Entry>>>,
    removals: Mutex<mpsc::Sender<(NodeId, FlowRemoved)>>,
    ports: Vec<PortId>,
    loss_per_mille: u64,
}

impl Network {
    fn removal(&self, entry: &Entry) -> FlowRemoved {
        let elapsed = entry.installed.elapsed();
        let mut packets = u64::try_from(elapsed.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(PACKETS_PER_MS);
        // destination sampling entries live in the first table
        if entry.flow_mod.table_id.into_u8() == 0 {
            packets -= packets * self.loss_per_mille.min(1_000) / 1_000;
        }
        FlowRemoved {
            cookie: entry.flow_mod.cookie,
            priority: entry.flow_mod.priority,
            reason: FlowRemovedReason::Delete,
            table_id: entry.flow_mod.table_id,
            duration: elapsed,
            packet_count: Some(packets),
            byte_count: Some(packets.saturating_mul(PACKET_SIZE)),
            matching: entry.flow_mod.matching.clone(),
        }
    }
}

fn covers(command: &FlowMod, entry: &FlowMod) -> bool {
    command.table_id == entry.table_id
        && entry.cookie & command.cookie_mask == command.cookie & command.cookie_mask
        && command.matching.matches_all_of(&entry.matching)
}

impl Transport for Network {
    fn switch(&self, node: NodeId) -> Option<SwitchInfo> {
        let switches = self.switches.lock().ok()?;
        switches.contains_key(&node).then(|| SwitchInfo {
            num_tables: NUM_TABLES,
            ports: self.ports.clone(),
        })
    }

    fn write(&self, node: NodeId, message: Message) -> Result<(), SwitchDisconnected> {
        let mut switches = self.switches.lock().map_err(|_| SwitchDisconnected(node))?;
        let entries = switches.get_mut(&node).ok_or(SwitchDisconnected(node))?;
        let Message::FlowMod(flow_mod) = message else {
            return Ok(());
        };
        match flow_mod.command {
            FlowModCommand::Add => entries.push(Entry {
                flow_mod,
                installed: Instant::now(),
            }),
            FlowModCommand::Modify | FlowModCommand::ModifyStrict => {}
            FlowModCommand::Delete | FlowModCommand::DeleteStrict => {
                let (removed, kept): (Vec<_>, Vec<_>) = entries
                    .drain(..)
                    .partition(|entry| covers(&flow_mod, &entry.flow_mod));
                *entries = kept;
                let removals = self.removals.lock().map_err(|_| SwitchDisconnected(node))?;
                for entry in removed
                    .iter()
                    .filter(|entry| entry.flow_mod.flags.send_flow_removed)
                {
                    let _ = removals.send((node, self.removal(entry)));
                }
            }
        }
        Ok(())
    }

    fn send_barrier(&self, _: NodeId) -> Result<BarrierReply, SwitchDisconnected> {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(());
        Ok(rx)
    }
}

struct NoCollector;

impl Collector for NoCollector {
    fn has_necessary_collectors(&self, _: &FlowedLink) -> bool {
        false
    }

    fn sampling_port(&self) -> PortId {
        PortId::LOCAL
    }

    fn send_sampling_request(&self, link: &FlowedLink, _: Duration) -> CollectionReply {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(Err(CollectionError::Unavailable(link.clone())));
        rx
    }
}

fn ring(switches: u64) -> Vec<Link> {
    (1..=switches)
        .flat_map(|node| {
            let next = node % switches + 1;
            let forward = Link::new(
                NodePort::new(NodeId::new(node), PortId::new(2)),
                NodePort::new(NodeId::new(next), PortId::new(1)),
            );
            [forward, forward.reversed()]
        })
        .collect()
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cmd = Command::parse();
    if cmd.switches < 2 {
        bail!("a ring needs at least 2 switches");
    }

    let flows = cmd
        .flow
        .iter()
        .map(|flow| {
            flow.parse::<Flow>()
                .with_context(|| format!("Invalid flow `{flow}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    let (removals_tx, removals) = mpsc::channel();
    let network = Arc::new(Network {
        switches: Mutex::new(
            (1..=cmd.switches)
                .map(|node| (NodeId::new(node), Vec::new()))
                .collect(),
        ),
        removals: Mutex::new(removals_tx),
        ports: vec![PortId::new(1), PortId::new(2)],
        loss_per_mille: cmd.loss_per_mille,
    });
    let store = Arc::new(FlowedStatsStore::new());

    let config = SamplingConfig::new()
        .set_sampling_round_duration(cmd.min_round.into_duration(), cmd.max_round.into_duration())
        .set_max_simultaneous_samplings(cmd.max_simultaneous);
    let sampler = Sampler::new(config, network, Arc::new(NoCollector), store.clone())?;

    for node in 1..=cmd.switches {
        sampler.on_topology_event(&TopologyEvent::NodeAdded(NodeId::new(node)))?;
    }
    let links = ring(cmd.switches);
    for link in &links {
        sampler.on_topology_event(&TopologyEvent::LinkAdded(*link))?;
    }
    for flow in &flows {
        sampler.start_sampling_flow(flow.clone())?;
    }

    let deadline = Instant::now() + cmd.time.into_duration();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match removals.recv_timeout(left.min(Duration::from_millis(100))) {
            Ok((node, removal)) => {
                sampler.on_flow_removed(node, removal)?;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    sampler.shutdown()?;

    for flow in &flows {
        for link in &links {
            let stats = store.flowed_stats(&link.flowed(flow.clone()));
            let throughput = stats
                .throughput()
                .value()
                .map_or_else(|| "-".to_owned(), |rate| rate.to_string());
            let loss = stats
                .packet_loss()
                .value()
                .map_or_else(|| "-".to_owned(), |loss| loss.latest.to_string());
            println!(
                "{link} {flow}: throughput {throughput}, packet loss {loss} ({} updates)",
                stats.total_updates()
            );
        }
    }
    Ok(())
}
