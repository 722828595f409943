//! An in-memory network of switches for driving the sampler in tests.

#![allow(dead_code)]

use flowmon::{
    Collector, Flow, FlowedLink, FlowedStatsStore, Link, Message, NodeId, NodePort, PortId,
    Sampler, StatsSink, SwitchInfo, Transport,
};
use flowmon_core::{
    protocol::{
        BarrierReply, FlowMod, FlowModCommand, FlowRemoved, FlowRemovedReason, SwitchDisconnected,
        TableId,
    },
    sampling::{CollectionError, CollectionReply},
    stats::{SwitchCounterSample, TrajectorySample},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

pub const PACKETS_PER_ENTRY: u64 = 100;
pub const BYTES_PER_ENTRY: u64 = 64_000;

#[derive(Debug, Clone)]
pub struct Entry {
    pub flow_mod: FlowMod,
    pub installed: Instant,
}

#[derive(Debug)]
struct Switch {
    info: SwitchInfo,
    entries: Vec<Entry>,
}

/// Switches applying flow-mods to their tables the way an OpenFlow switch
/// does, reporting the removal of entries installed with the
/// send-flow-removed flag.
pub struct FakeNetwork {
    switches: Mutex<HashMap<NodeId, Switch>>,
    removals: Mutex<mpsc::Sender<(NodeId, FlowRemoved)>>,
    removals_rx: Mutex<Option<mpsc::Receiver<(NodeId, FlowRemoved)>>>,
    writes: Mutex<Vec<(NodeId, Message)>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        Arc::new(Self {
            switches: Mutex::new(HashMap::new()),
            removals: Mutex::new(tx),
            removals_rx: Mutex::new(Some(rx)),
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn connect(&self, node: NodeId, num_tables: u8, ports: &[u32]) {
        let info = SwitchInfo {
            num_tables,
            ports: ports.iter().copied().map(PortId::new).collect(),
        };
        self.switches.lock().unwrap().insert(
            node,
            Switch {
                info,
                entries: Vec::new(),
            },
        );
    }

    pub fn disconnect(&self, node: NodeId) {
        self.switches.lock().unwrap().remove(&node);
    }

    pub fn entries(&self, node: NodeId, table: TableId) -> Vec<Entry> {
        self.switches
            .lock()
            .unwrap()
            .get(&node)
            .map(|switch| {
                switch
                    .entries
                    .iter()
                    .filter(|entry| entry.flow_mod.table_id == table)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<(NodeId, Message)> {
        self.writes.lock().unwrap().clone()
    }

    /// Deliver the removal notifications to `sampler` from a separate
    /// thread, the way a controller would.
    pub fn forward_removals(&self, sampler: Arc<Sampler>) -> Forwarder {
        let removals = self
            .removals_rx
            .lock()
            .unwrap()
            .take()
            .expect("removals are already forwarded");
        let stop = Arc::new(AtomicBool::new(false));
        let thread = thread::spawn({
            let stop = Arc::clone(&stop);
            move || {
                while !stop.load(Ordering::SeqCst) {
                    match removals.recv_timeout(Duration::from_millis(10)) {
                        Ok((node, removal)) => {
                            sampler.on_flow_removed(node, removal).unwrap();
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        });
        Forwarder { stop, thread }
    }

    fn apply(&self, switch: &mut Switch, node: NodeId, flow_mod: FlowMod) {
        match flow_mod.command {
            FlowModCommand::Add => {
                switch.entries.retain(|entry| {
                    entry.flow_mod.table_id != flow_mod.table_id
                        || entry.flow_mod.priority != flow_mod.priority
                        || entry.flow_mod.matching != flow_mod.matching
                });
                switch.entries.push(Entry {
                    flow_mod,
                    installed: Instant::now(),
                });
            }
            FlowModCommand::Modify | FlowModCommand::ModifyStrict => {
                for entry in &mut switch.entries {
                    if covers(&flow_mod, &entry.flow_mod) {
                        entry.flow_mod.instructions = flow_mod.instructions.clone();
                    }
                }
            }
            FlowModCommand::Delete | FlowModCommand::DeleteStrict => {
                let (removed, kept) = switch
                    .entries
                    .drain(..)
                    .partition(|entry| covers(&flow_mod, &entry.flow_mod));
                switch.entries = kept;
                let removals = self.removals.lock().unwrap();
                for entry in removed {
                    if !entry.flow_mod.flags.send_flow_removed {
                        continue;
                    }
                    let _ = removals.send((node, removal_of(&entry)));
                }
            }
        }
    }
}

/// non-strict semantics: every entry the command's match is more general
/// than, and whose cookie agrees under the mask
fn covers(command: &FlowMod, entry: &FlowMod) -> bool {
    (command.table_id == TableId::ALL || command.table_id == entry.table_id)
        && entry.cookie & command.cookie_mask == command.cookie & command.cookie_mask
        && command.matching.matches_all_of(&entry.matching)
}

fn removal_of(entry: &Entry) -> FlowRemoved {
    FlowRemoved {
        cookie: entry.flow_mod.cookie,
        priority: entry.flow_mod.priority,
        reason: FlowRemovedReason::Delete,
        table_id: entry.flow_mod.table_id,
        duration: entry.installed.elapsed(),
        packet_count: Some(PACKETS_PER_ENTRY),
        byte_count: Some(BYTES_PER_ENTRY),
        matching: entry.flow_mod.matching.clone(),
    }
}

impl Transport for FakeNetwork {
    fn switch(&self, node: NodeId) -> Option<SwitchInfo> {
        self.switches
            .lock()
            .unwrap()
            .get(&node)
            .map(|switch| switch.info.clone())
    }

    fn write(&self, node: NodeId, message: Message) -> Result<(), SwitchDisconnected> {
        let mut switches = self.switches.lock().unwrap();
        let switch = switches.get_mut(&node).ok_or(SwitchDisconnected(node))?;
        self.writes.lock().unwrap().push((node, message.clone()));
        if let Message::FlowMod(flow_mod) = message {
            self.apply(switch, node, flow_mod);
        }
        Ok(())
    }

    fn send_barrier(&self, node: NodeId) -> Result<BarrierReply, SwitchDisconnected> {
        if !self.switches.lock().unwrap().contains_key(&node) {
            return Err(SwitchDisconnected(node));
        }
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(());
        Ok(rx)
    }
}

pub struct Forwarder {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Forwarder {
    pub fn stop(self) {
        self.join().unwrap();
    }

    /// stop forwarding, `Err` if the forwarding thread panicked
    pub fn join(self) -> thread::Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.thread.join()
    }
}

/// A collector that is never attached to any switch.
pub struct NoCollector;

impl Collector for NoCollector {
    fn has_necessary_collectors(&self, _: &FlowedLink) -> bool {
        false
    }

    fn sampling_port(&self) -> PortId {
        PortId::new(99)
    }

    fn send_sampling_request(&self, link: &FlowedLink, _: Duration) -> CollectionReply {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(Err(CollectionError::Unavailable(link.clone())));
        rx
    }
}

/// A collector attached everywhere that fails every capture, keeping the
/// requested durations.
#[derive(Default)]
pub struct RecordingCollector {
    pub requests: Mutex<Vec<(FlowedLink, Duration)>>,
}

impl Collector for RecordingCollector {
    fn has_necessary_collectors(&self, _: &FlowedLink) -> bool {
        true
    }

    fn sampling_port(&self) -> PortId {
        PortId::new(99)
    }

    fn send_sampling_request(&self, link: &FlowedLink, duration: Duration) -> CollectionReply {
        self.requests.lock().unwrap().push((link.clone(), duration));
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(Err(CollectionError::Failed {
            link: link.clone(),
            reason: "capture interface is down".to_owned(),
        }));
        rx
    }
}

/// A collector attached everywhere that drops every reply channel.
pub struct HangupCollector;

impl Collector for HangupCollector {
    fn has_necessary_collectors(&self, _: &FlowedLink) -> bool {
        true
    }

    fn sampling_port(&self) -> PortId {
        PortId::new(99)
    }

    fn send_sampling_request(&self, _: &FlowedLink, _: Duration) -> CollectionReply {
        mpsc::channel().1
    }
}

/// Keeps the trajectory samples and records everything in a store.
#[derive(Default)]
pub struct RecordingSink {
    pub store: FlowedStatsStore,
    pub trajectories: Mutex<Vec<TrajectorySample>>,
}

impl StatsSink for RecordingSink {
    fn update_switch_counter(&self, sample: SwitchCounterSample) {
        self.store.update_switch_counter(sample);
    }

    fn update_trajectory(&self, sample: TrajectorySample) {
        self.trajectories.lock().unwrap().push(sample.clone());
        self.store.update_trajectory(sample);
    }

    fn clear_all_flowed_stats(&self, flow: &Flow) {
        self.store.clear_all_flowed_stats(flow);
    }
}

/// A sink that panics when the statistics of a flow are cleared.
pub struct PanickingSink;

impl StatsSink for PanickingSink {
    fn update_switch_counter(&self, _: SwitchCounterSample) {}

    fn update_trajectory(&self, _: TrajectorySample) {}

    fn clear_all_flowed_stats(&self, flow: &Flow) {
        panic!("cannot clear the statistics of {flow}");
    }
}

pub fn link(src: u64, src_port: u32, dest: u64, dest_port: u32) -> Link {
    Link::new(
        NodePort::new(NodeId::new(src), PortId::new(src_port)),
        NodePort::new(NodeId::new(dest), PortId::new(dest_port)),
    )
}

pub fn tcp() -> Flow {
    "eth_type=0x800,ip_proto=6".parse().unwrap()
}

/// poll `condition` until it holds, panics after `timeout`
pub fn wait_until(timeout: Duration, what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}
