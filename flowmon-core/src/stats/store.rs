use super::{
    FlowedLinkStats, GeneralLinkStats, StatsSink, SwitchCounterBuilder, SwitchCounterSample,
    TrajectoryBuilder, TrajectorySample, calculator,
};
use crate::{
    flow::Flow,
    link::{FlowedLink, Link},
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

#[derive(Debug, Default)]
struct FlowedBuilders {
    switch_counter: SwitchCounterBuilder,
    trajectory: TrajectoryBuilder,
}

#[derive(Debug, Default)]
struct Inner {
    flowed: HashMap<FlowedLink, FlowedBuilders>,
    general: HashMap<Link, GeneralLinkStats>,
}

impl Inner {
    fn snapshot(&self, link: &FlowedLink) -> FlowedLinkStats {
        let mut stats = FlowedLinkStats::absent(link.clone());
        if let Some(general) = self.general.get(&link.link()) {
            stats.general = *general;
        }
        if let Some(builders) = self.flowed.get(link) {
            stats.switch_counter = builders.switch_counter.build();
            stats.trajectory = builders.trajectory.build();
        }
        stats
    }
}

/// In-memory statistics of every sampled flowed link.
///
/// Samples are folded into per-link builders as they arrive, and
/// [`FlowedLinkStats`] snapshots are built on demand.
///
/// ```
/// # use flowmon_core::{flow::Flow, link::Link, node::*, stats::*};
/// let link = Link::new(
///     NodePort::new(NodeId::new(1), PortId::new(1)),
///     NodePort::new(NodeId::new(2), PortId::new(1)),
/// )
/// .flowed(Flow::all());
///
/// let store = FlowedStatsStore::new();
/// store.record_switch_counter(&SwitchCounterSample::no_results(link.clone()));
///
/// let stats = store.flowed_stats(&link);
/// assert_eq!(stats.switch_counter.num_updates, 1);
/// assert!(!stats.latency().is_present());
/// ```
#[derive(Debug, Default)]
pub struct FlowedStatsStore {
    inner: Mutex<Inner>,
}

impl FlowedStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|error| {
            log::warn!("Stats store mutex poisoned, recovering");
            PoisonError::into_inner(error)
        })
    }

    /// Fold a switch counter sample into the statistics of its link.
    ///
    /// Returns `true` if the core statistics of the link changed.
    pub fn record_switch_counter(&self, sample: &SwitchCounterSample) -> bool {
        let mut inner = self.lock();
        let before = inner.snapshot(sample.link());
        let builders = inner.flowed.entry(sample.link().clone()).or_default();
        calculator::calc_switch_counter(&mut builders.switch_counter, sample);
        let after = inner.snapshot(sample.link());

        log::debug!("Updated switch-counter statistics of {}", sample.link());
        !after.has_same_core_stats(&before)
    }

    /// Fold a trajectory sample into the statistics of its link.
    ///
    /// Returns `true` if the core statistics of the link changed.
    pub fn record_trajectory(&self, sample: &TrajectorySample) -> bool {
        let mut inner = self.lock();
        let before = inner.snapshot(sample.link());
        let builders = inner.flowed.entry(sample.link().clone()).or_default();
        calculator::calc_trajectory(&mut builders.trajectory, sample);
        let after = inner.snapshot(sample.link());

        log::debug!("Updated trajectory statistics of {}", sample.link());
        !after.has_same_core_stats(&before)
    }

    /// Replace the general statistics of a link, shared by every flow
    /// sampled on it.
    pub fn set_general_stats(&self, stats: GeneralLinkStats) -> bool {
        let mut inner = self.lock();
        let changed = inner
            .general
            .get(&stats.link)
            .is_none_or(|current| !current.has_same_core_stats(&stats));
        inner.general.insert(stats.link, stats);
        changed
    }

    /// Forget the statistics of every link sampled with `flow`, returning
    /// how many flowed links were dropped.
    pub fn clear_flow(&self, flow: &Flow) -> usize {
        let mut inner = self.lock();
        let before = inner.flowed.len();
        inner.flowed.retain(|link, _| link.flow() != flow);
        before - inner.flowed.len()
    }

    /// A snapshot of the statistics of `link`. Links that were never
    /// sampled have absent flowed statistics.
    pub fn flowed_stats(&self, link: &FlowedLink) -> FlowedLinkStats {
        self.lock().snapshot(link)
    }

    pub fn general_stats(&self, link: &Link) -> GeneralLinkStats {
        self.lock()
            .general
            .get(link)
            .copied()
            .unwrap_or_else(|| GeneralLinkStats::absent(*link))
    }

    /// every flowed link that has statistics, in no particular order
    pub fn flowed_links(&self) -> Vec<FlowedLink> {
        self.lock().flowed.keys().cloned().collect()
    }
}

impl StatsSink for FlowedStatsStore {
    fn update_switch_counter(&self, sample: SwitchCounterSample) {
        if self.record_switch_counter(&sample) {
            log::trace!("Core statistics of {} changed", sample.link());
        }
    }

    fn update_trajectory(&self, sample: TrajectorySample) {
        if self.record_trajectory(&sample) {
            log::trace!("Core statistics of {} changed", sample.link());
        }
    }

    fn clear_all_flowed_stats(&self, flow: &Flow) {
        let removed = self.clear_flow(flow);
        log::debug!("Cleared the statistics of {removed} flowed links of {flow}");
    }
}
