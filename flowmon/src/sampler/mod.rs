//! The sampler context: owns the sampling state and the thread running the
//! sampling rounds.

mod round;
mod stop;

pub use self::round::RoundPhase;
use self::{round::Rounds, stop::Stop};
use crate::config::SamplingConfig;
use anyhow::{Context as _, Result, anyhow, bail};
use flowmon_core::{
    flow::Flow,
    link::{Endpoint, FlowedLink, Link},
    protocol::{FlowRemoved, SwitchDriver, Transport, samplable_match_violation},
    sampling::{Collector, Grouping, ResultRejected, TagCursor, TagPool},
    stats::StatsSink,
    time::{DurationRange, HumanDuration, Timed},
};
use log::{debug, info, warn};
use rand::{RngCore as _, rngs::OsRng};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSamplableFlow {
    #[error("{0}")]
    Match(&'static str),
    #[error("invalid samplable flow: is contained by secure probe base flow of {0}")]
    ContainedByProbeFlow(Flow),
}

/// State shared between the sampler handle and the round loop.
pub(crate) struct Shared {
    grouping: Mutex<Grouping>,
    phase: Mutex<RoundPhase>,
    pub(crate) driver: SwitchDriver,
    pub(crate) sink: Arc<dyn StatsSink>,
    pub(crate) config: SamplingConfig,
    pub(crate) round_duration: DurationRange,
    pub(crate) cursor: TagCursor,
    collector: Arc<dyn Collector>,
}

impl Shared {
    pub(crate) fn grouping(&self) -> Result<MutexGuard<'_, Grouping>> {
        self.grouping
            .lock()
            .map_err(|error| anyhow!("Failed to acquire the sampling state, mutex poisoned {error}"))
    }

    pub(crate) fn collector(&self) -> &Arc<dyn Collector> {
        &self.collector
    }

    pub(crate) fn phase(&self) -> Result<RoundPhase> {
        self.phase
            .lock()
            .map(|phase| *phase)
            .map_err(|error| anyhow!("Failed to read the round phase, mutex poisoned {error}"))
    }

    pub(crate) fn set_phase(&self, phase: RoundPhase) -> Result<()> {
        let mut current = self
            .phase
            .lock()
            .map_err(|error| anyhow!("Failed to set the round phase, mutex poisoned {error}"))?;
        *current = phase;
        Ok(())
    }
}

/// Samples every known link for every started flow, one aggregate of
/// flowed links per round.
///
/// Creating the sampler starts the round loop in the background. Make
/// sure to call [`Sampler::shutdown`] for a clean shutdown of the
/// background thread.
pub struct Sampler {
    shared: Arc<Shared>,
    stop: Arc<Stop>,
    thread: JoinHandle<Result<()>>,
}

impl Sampler {
    pub fn new(
        config: SamplingConfig,
        transport: Arc<dyn Transport>,
        collector: Arc<dyn Collector>,
        sink: Arc<dyn StatsSink>,
    ) -> Result<Self> {
        let round_duration = config
            .validate()
            .context("Invalid sampling configuration")?;
        let max_simultaneous = config
            .max_simultaneous_samplings()
            .context("Invalid sampling configuration")?;

        let tags = TagPool::sampling();
        let offset = os_random().context("Failed to draw the first sampling tag")?;
        let seed = os_random().context("Failed to seed the sampling round durations")?;
        let cursor = TagCursor::new(tags.clone(), offset as usize);

        info!("Using a sampling round duration range of {round_duration}");
        info!(
            "Using a pre-sampling excess duration of {}",
            HumanDuration::new(config.pre_sampling_excess_duration())
        );
        info!(
            "Using a post-sampling excess duration of {}",
            HumanDuration::new(config.post_sampling_excess_duration())
        );
        info!("Using a maximum of {max_simultaneous} simultaneous samplings");

        let shared = Arc::new(Shared {
            grouping: Mutex::new(Grouping::new(max_simultaneous, Arc::clone(&sink))),
            phase: Mutex::new(RoundPhase::Idle),
            driver: SwitchDriver::new(transport, tags),
            sink,
            config,
            round_duration,
            cursor,
            collector,
        });
        let stop = Arc::new(Stop::new());

        let rounds = Rounds::new(Arc::clone(&shared), Arc::clone(&stop), seed);
        let thread = thread::Builder::new()
            .name("flowmon-sampler".to_owned())
            .spawn(move || rounds.run())
            .context("Failed to spawn the sampler thread")?;

        debug!("Starting up sampler");
        Ok(Self {
            shared,
            stop,
            thread,
        })
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// the phase the round loop is currently in
    pub fn phase(&self) -> Result<RoundPhase> {
        self.shared.phase()
    }

    /// the links being sampled, in the order they were added
    pub fn links(&self) -> Result<Vec<Link>> {
        Ok(self.shared.grouping()?.links().to_vec())
    }

    /// the flows being sampled, in the order they were started
    pub fn flows(&self) -> Result<Vec<Flow>> {
        Ok(self.shared.grouping()?.flows().to_vec())
    }

    /// the flowed links of the round in progress
    pub fn active_sampling_links(&self) -> Result<Vec<FlowedLink>> {
        Ok(active_links(&*self.shared.grouping()?, |_| true))
    }

    pub fn shutdown(self) -> Result<()> {
        debug!("Shutting down sampler");
        self.stop.toggle();

        // a round waiting for results that will never come sees its
        // units as disconnected
        if let Ok(mut grouping) = self.shared.grouping() {
            grouping.clear_active_sampling();
        }

        match self.thread.join() {
            Err(join_error) => {
                bail!("Sampler failed to clean shutdown: {join_error:?}")
            }
            Ok(Err(error)) => Err(error).context("Sampler failed with error"),
            Ok(Ok(())) => Ok(()),
        }
    }

    pub fn is_valid_samplable_flow(&self, flow: &Flow) -> bool {
        self.validate_samplable_flow(flow).is_ok()
    }

    pub fn validate_samplable_flow(&self, flow: &Flow) -> Result<(), InvalidSamplableFlow> {
        if let Some(reason) = samplable_match_violation(flow.as_match()) {
            return Err(InvalidSamplableFlow::Match(reason));
        }
        if let Some(probe) = self.shared.config.secure_probe_base_flow() {
            if probe.matches_all_of(flow) {
                return Err(InvalidSamplableFlow::ContainedByProbeFlow(probe.clone()));
            }
        }
        Ok(())
    }

    /// Sample `flow` on every known link.
    ///
    /// Returns `false` if the flow is already sampled. Fails with an
    /// [`InvalidSamplableFlow`] without touching the sampling state if the
    /// flow cannot be sampled.
    pub fn start_sampling_flow(&self, flow: Flow) -> Result<bool> {
        self.validate_samplable_flow(&flow)?;
        debug!("Starting sampling flow {flow}");
        if let Some(probe) = self.shared.config.secure_probe_base_flow() {
            if flow.matches_all_of(probe) {
                warn!("Secure probe packets will not be sampled (secure probe base flow is {probe})");
            }
        }

        Ok(self.shared.grouping()?.add_flow(flow))
    }

    /// Stop sampling `flow` and clear its statistics.
    ///
    /// Returns `false` if the flow was not sampled.
    pub fn stop_sampling_flow(&self, flow: &Flow) -> Result<bool> {
        self.validate_samplable_flow(flow)?;
        debug!("Stopping sampling flow {flow}");

        let mut grouping = self.shared.grouping()?;
        let sampled = active_links(&grouping, |link| link.flow() == flow);
        let removed = grouping.remove_flow(flow);
        for link in &sampled {
            self.shared.driver.remove_sampling_flows(link);
        }
        Ok(removed)
    }

    pub(crate) fn on_added_link(&self, link: Link) -> Result<()> {
        let mut grouping = self.shared.grouping()?;
        if grouping.contains_link(&link) {
            warn!("Link {link} is already sampled");
            return Ok(());
        }
        grouping.add_link(link)?;
        Ok(())
    }

    pub(crate) fn on_removed_link(&self, link: &Link) -> Result<()> {
        let mut grouping = self.shared.grouping()?;
        if !grouping.contains_link(link) {
            warn!("Link {link} is not sampled");
            return Ok(());
        }
        let sampled = active_links(&grouping, |flowed| flowed.link() == *link);
        grouping.remove_link(link)?;
        for flowed in &sampled {
            self.shared.driver.remove_sampling_flows(flowed);
        }
        Ok(())
    }

    /// Hand the flow-removed message of a sampling entry to the round in
    /// progress.
    pub fn receive_sampling_result(
        &self,
        endpoint: &Endpoint,
        result: Timed<FlowRemoved>,
    ) -> Result<()> {
        let mut grouping = self.shared.grouping()?;
        let Some(sampling) = grouping.active_sampling_mut() else {
            warn!("! Received a sampling result when there is no active sampling");
            return Ok(());
        };

        let removal = result.value.to_string();
        match sampling.receive_result(endpoint, result) {
            Ok(_) => debug!(
                "Received {} flow statistics for flowed-link end-point {endpoint}: {removal}",
                endpoint.kind()
            ),
            Err(ResultRejected::UnknownEndpoint(_)) => warn!(
                "! Received sampling result with unknown flowed-link end-point {endpoint}: {removal}"
            ),
            Err(ResultRejected::Rejected { kind, .. }) => warn!(
                "Received duplicate or premature {kind} flow statistics for flowed-link end-point {endpoint}: {removal}"
            ),
        }
        Ok(())
    }
}

fn active_links(grouping: &Grouping, filter: impl Fn(&FlowedLink) -> bool) -> Vec<FlowedLink> {
    grouping
        .active_sampling()
        .map(|sampling| sampling.links().filter(|link| filter(link)).cloned().collect())
        .unwrap_or_default()
}

fn os_random() -> Result<u64> {
    let mut bytes = [0; 8];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("The OS random source is unavailable")?;
    Ok(u64::from_le_bytes(bytes))
}
