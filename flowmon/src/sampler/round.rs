use super::{Shared, stop::Stop};
use anyhow::{Context as _, Result};
use flowmon_core::{
    defaults::IDLE_SLEEP_DURATION,
    link::Link,
    protocol::BarrierHandler,
    sampling::{
        CollectionDisconnected, CompletionError, PendingCollection, Sampling,
        SamplingParameters, VlanTag,
    },
    stats::TrajectorySample,
    time::HumanDuration,
};
use log::{debug, error, trace, warn};
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng as _;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Where the round loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundPhase {
    /// nothing to sample
    Idle,
    Preparing,
    Installing,
    RegisteringFirstTag,
    SamplingWait,
    RegisteringSecondTag,
    PostWait,
    Finalizing,
    AwaitingCompletion,
    /// the loop exited
    Stopped,
}

pub(super) struct Rounds {
    shared: Arc<Shared>,
    stop: Arc<Stop>,
    rng: ChaChaRng,
}

impl Rounds {
    pub(super) fn new(shared: Arc<Shared>, stop: Arc<Stop>, seed: u64) -> Self {
        Self {
            shared,
            stop,
            rng: ChaChaRng::seed_from_u64(seed),
        }
    }

    pub(super) fn run(mut self) -> Result<()> {
        let result = self.rounds();
        if let Err(error) = &result {
            error!("Sampling rounds stopped on a fatal error: {error:#}");
        }
        let stopped = self.enter(RoundPhase::Stopped);
        result.and(stopped)
    }

    fn rounds(&mut self) -> Result<()> {
        while !self.stop.get() {
            if !self.next_sampling()? {
                self.enter(RoundPhase::Idle)?;
                trace!(
                    "No sampling is scheduled; sleeping for {} ...",
                    HumanDuration::new(IDLE_SLEEP_DURATION)
                );
                self.stop.sleep(IDLE_SLEEP_DURATION);
                continue;
            }
            self.round()?;
        }

        debug!("Sampler was stopped, now exiting");
        Ok(())
    }

    fn enter(&self, phase: RoundPhase) -> Result<()> {
        trace!("Entering round phase {phase:?}");
        self.shared.set_phase(phase)
    }

    fn next_sampling(&self) -> Result<bool> {
        let mut grouping = self.shared.grouping()?;
        Ok(grouping.next_sampling(self.shared.collector()))
    }

    fn round(&mut self) -> Result<()> {
        self.enter(RoundPhase::Preparing)?;
        debug!("===== Running a new sampling round =====");
        debug!("Sampling the following links: {}", self.describe_active()?);

        let config = &self.shared.config;
        let pre = config.pre_sampling_excess_duration();
        let post = config.post_sampling_excess_duration();
        let duration = self.shared.round_duration.random_duration(&mut self.rng);
        let first_tag = self.shared.cursor.next_tag();
        let second_tag = self.shared.cursor.next_tag();
        debug!(
            "Sampling duration will be {}; tags will be {} and {}",
            HumanDuration::new(duration),
            first_tag.vid(),
            second_tag.vid()
        );

        let mut barriers = BarrierHandler::new();

        self.enter(RoundPhase::Installing)?;
        debug!("Installing sampling flows with VLAN tag {}", first_tag.vid());
        self.install_sampling_flows(first_tag, &mut barriers)?;
        debug!("Waiting for barrier replies");
        barriers.wait_for_replies();

        debug!("Sending packet collection requests");
        let collections = self.request_collections(pre + duration + post)?;

        debug!(
            "Waiting for a pre-sampling excess duration of {} ...",
            HumanDuration::new(pre)
        );
        if self.stop.sleep(pre) {
            return self.interrupt(first_tag);
        }

        self.enter(RoundPhase::RegisteringFirstTag)?;
        debug!(
            "Updating current tag in switches to tag {} (1st pass)",
            first_tag.vid()
        );
        let first_times = self.update_tag(first_tag, &mut barriers)?;
        debug!("Waiting for barrier replies");
        barriers.wait_for_replies();

        self.enter(RoundPhase::SamplingWait)?;
        debug!(
            "Waiting for a sampling duration of {} ...",
            HumanDuration::new(duration)
        );
        if self.stop.sleep(duration) {
            return self.interrupt(first_tag);
        }

        self.enter(RoundPhase::RegisteringSecondTag)?;
        debug!(
            "Updating current tag in switches to tag {} (2nd pass)",
            second_tag.vid()
        );
        let second_times = self.update_tag(second_tag, &mut barriers)?;
        debug!("Waiting for barrier replies");
        barriers.wait_for_replies();

        self.enter(RoundPhase::PostWait)?;
        debug!(
            "Waiting for a post-sampling excess duration of {} ...",
            HumanDuration::new(post)
        );
        if self.stop.sleep(post) {
            return self.interrupt(first_tag);
        }

        self.enter(RoundPhase::Finalizing)?;
        debug!("Optimizing sampling durations");
        let durations = sampling_durations(&first_times, &second_times);
        self.set_sampling_parameters(&durations, pre, post, first_tag)?;

        debug!("Removing sampling flows with VLAN tag {}", first_tag.vid());
        self.purge_sampling_flows(first_tag, &mut barriers)?;
        debug!("Waiting for barrier replies");
        barriers.wait_for_replies();

        self.enter(RoundPhase::AwaitingCompletion)?;
        debug!("Waiting until sampling completes...");
        self.await_completion(collections)
    }

    /// leave the round half way, without waiting for its results
    fn interrupt(&self, tag: VlanTag) -> Result<()> {
        debug!("Sampling round interrupted, removing sampling flows with VLAN tag {}", tag.vid());
        let mut barriers = BarrierHandler::new();
        self.purge_sampling_flows(tag, &mut barriers)?;
        barriers.wait_for_replies();
        Ok(())
    }

    fn describe_active(&self) -> Result<String> {
        let grouping = self.shared.grouping()?;
        let links: Vec<String> = grouping
            .active_sampling()
            .into_iter()
            .flat_map(Sampling::links)
            .map(ToString::to_string)
            .collect();
        Ok(format!("[{}]", links.join(", ")))
    }

    fn install_sampling_flows(&self, tag: VlanTag, barriers: &mut BarrierHandler) -> Result<()> {
        let grouping = self.shared.grouping()?;
        let Some(sampling) = grouping.active_sampling() else {
            return Ok(());
        };

        for unit in sampling.units() {
            let link = unit.link();
            match self.shared.driver.install_sampling_flows(
                link,
                tag,
                unit.src_sampling_action(),
                unit.dest_sampling_action(),
                barriers,
            ) {
                Ok(()) => trace!("Sampling flows installed for flowed-link {link}"),
                Err(comm_error) => error!("{comm_error}"),
            }
        }
        Ok(())
    }

    fn request_collections(&self, duration: Duration) -> Result<Vec<PendingCollection>> {
        let grouping = self.shared.grouping()?;
        Ok(grouping
            .active_sampling()
            .into_iter()
            .flat_map(Sampling::units)
            .map(|unit| unit.request_collection(duration))
            .collect())
    }

    /// Register `tag` at the source of every known link. Returns the
    /// instant right after each successful update.
    fn update_tag(
        &self,
        tag: VlanTag,
        barriers: &mut BarrierHandler,
    ) -> Result<HashMap<Link, Instant>> {
        let grouping = self.shared.grouping()?;
        let mut times = HashMap::with_capacity(grouping.links().len());

        for link in grouping.links() {
            let node = link.src_node();
            if let Err(comm_error) = self.shared.driver.update_tag(node, link.src_port(), tag) {
                error!("{comm_error}");
                continue;
            }
            times.insert(*link, Instant::now());

            match self.shared.driver.send_barrier(node, barriers) {
                Ok(()) => trace!("Updated tag to {} for datapath-link {link}", tag.vid()),
                Err(comm_error) => error!("{comm_error}"),
            }
        }
        Ok(times)
    }

    fn set_sampling_parameters(
        &self,
        durations: &HashMap<Link, Duration>,
        pre_duration: Duration,
        post_duration: Duration,
        tag: VlanTag,
    ) -> Result<()> {
        let mut grouping = self.shared.grouping()?;
        let Some(sampling) = grouping.active_sampling_mut() else {
            return Ok(());
        };

        for unit in sampling.units_mut() {
            // the link may have been removed meanwhile
            let duration = durations
                .get(&unit.link().link())
                .copied()
                .unwrap_or(Duration::ZERO);
            unit.set_params(SamplingParameters {
                pre_duration,
                duration,
                post_duration,
                tag,
            });
        }
        Ok(())
    }

    fn purge_sampling_flows(&self, tag: VlanTag, barriers: &mut BarrierHandler) -> Result<()> {
        let grouping = self.shared.grouping()?;
        let Some(sampling) = grouping.active_sampling() else {
            return Ok(());
        };

        for node in sampling.nodes() {
            if let Err(comm_error) = self.shared.driver.purge_sampling_tables(node, tag, barriers) {
                error!("{comm_error}");
            }
        }
        Ok(())
    }

    fn await_completion(&self, collections: Vec<PendingCollection>) -> Result<()> {
        let completion = self
            .shared
            .grouping()?
            .active_sampling_mut()
            .and_then(Sampling::take_completion);

        if let Some(completion) = completion {
            match completion.wait() {
                Ok(()) => debug!("Sampling completed"),
                Err(CompletionError::Aborted(aborted)) => warn!("{aborted}"),
                Err(disconnected) if self.stop.get() => {
                    debug!("Sampling abandoned while stopping: {disconnected}");
                    return Ok(());
                }
                Err(disconnected) => {
                    return Err(disconnected).context("Sampling round failed to complete");
                }
            }
        }

        for pending in collections {
            match pending.wait() {
                Ok(sample) => self.shared.sink.update_trajectory(sample),
                Err(disconnected) if self.stop.get() => {
                    debug!("Trajectory sampling abandoned while stopping: {disconnected}");
                }
                Err(CollectionDisconnected(link)) => {
                    warn!("! Collector of {link} hung up without replying");
                    self.shared
                        .sink
                        .update_trajectory(TrajectorySample::no_results(link));
                }
            }
        }
        Ok(())
    }
}

/// Time elapsed between the two tag updates of every link updated twice.
pub(crate) fn sampling_durations(
    first: &HashMap<Link, Instant>,
    second: &HashMap<Link, Instant>,
) -> HashMap<Link, Duration> {
    first
        .iter()
        .filter_map(|(link, first)| {
            let second = second.get(link)?;
            Some((*link, second.saturating_duration_since(*first)))
        })
        .collect()
}
