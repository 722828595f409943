use super::{CollectionRequester, PendingCollection, VlanTag};
use crate::{
    link::FlowedLink,
    protocol::{Action, FlowRemoved},
    stats::{StatsSink, SwitchCounterSample},
    time::{HumanDuration, Timed},
};
use std::{
    fmt,
    sync::{Arc, mpsc},
    time::Duration,
};
use thiserror::Error;

/// The timing and tag of one sampling round, as measured by the
/// scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingParameters {
    pub pre_duration: Duration,
    /// time between the two tag updates of the link
    pub duration: Duration,
    pub post_duration: Duration,
    pub tag: VlanTag,
}

impl fmt::Display for SamplingParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pre={}, sampling={}, post={}, tag={}",
            HumanDuration::new(self.pre_duration),
            HumanDuration::new(self.duration),
            HumanDuration::new(self.post_duration),
            self.tag
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplingError {
    #[error("sampling aborted: {0}")]
    Aborted(String),
}

/// How a sampling unit resolved.
pub type UnitOutcome = Result<FlowedLink, SamplingError>;

/// The sampling of one flowed link during a round.
///
/// Collects the flow-removed messages of the source and destination
/// sampling entries. Once both are known, the unit resolves and the
/// switch counter sample is handed to the statistics sink. A unit
/// resolves at most once.
pub struct SamplingUnit {
    link: FlowedLink,
    requester: CollectionRequester,
    params: Option<SamplingParameters>,
    src: Option<Timed<FlowRemoved>>,
    dest: Option<Timed<FlowRemoved>>,
    resolved: bool,
    sink: Arc<dyn StatsSink>,
    outcomes: mpsc::Sender<UnitOutcome>,
}

impl SamplingUnit {
    pub fn new(
        link: FlowedLink,
        requester: CollectionRequester,
        sink: Arc<dyn StatsSink>,
        outcomes: mpsc::Sender<UnitOutcome>,
    ) -> Self {
        Self {
            link,
            requester,
            params: None,
            src: None,
            dest: None,
            resolved: false,
            sink,
            outcomes,
        }
    }

    pub fn link(&self) -> &FlowedLink {
        &self.link
    }

    pub fn params(&self) -> Option<&SamplingParameters> {
        self.params.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn src_sampling_action(&self) -> Option<Action> {
        self.requester.src_sampling_action()
    }

    pub fn dest_sampling_action(&self) -> Option<Action> {
        self.requester.dest_sampling_action()
    }

    pub fn request_collection(&self, duration: Duration) -> PendingCollection {
        self.requester.request(&self.link, duration)
    }

    pub fn set_params(&mut self, params: SamplingParameters) {
        self.params = Some(params);
    }

    /// Returns `false` if the source result is already known or the
    /// parameters are not yet set.
    pub fn set_src_result(&mut self, result: Timed<FlowRemoved>) -> bool {
        if self.src.is_some() || self.params.is_none() {
            return false;
        }
        self.src = Some(result);
        self.try_resolve();
        true
    }

    /// Returns `false` if the destination result is already known or the
    /// parameters are not yet set.
    pub fn set_dest_result(&mut self, result: Timed<FlowRemoved>) -> bool {
        if self.dest.is_some() || self.params.is_none() {
            return false;
        }
        self.dest = Some(result);
        self.try_resolve();
        true
    }

    /// Resolve the unit as failed. The statistics sink receives a sample
    /// without results.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.resolved {
            return;
        }
        let error = SamplingError::Aborted(reason.into());
        log::warn!("Switch counter sampling failed: {error}");
        self.resolve(SwitchCounterSample::no_results(self.link.clone()), Err(error));
    }

    fn try_resolve(&mut self) {
        if self.resolved {
            return;
        }
        let (Some(src), Some(dest), Some(params)) = (&self.src, &self.dest, self.params) else {
            return;
        };
        let sample = SwitchCounterSample::new(self.link.clone(), src.clone(), dest.clone(), params);
        self.resolve(sample, Ok(self.link.clone()));
    }

    fn resolve(&mut self, sample: SwitchCounterSample, outcome: UnitOutcome) {
        self.resolved = true;
        self.sink.update_switch_counter(sample);
        if self.outcomes.send(outcome).is_err() {
            log::trace!("Nobody is waiting for the sampling of {}", self.link);
        }
    }
}

impl fmt::Debug for SamplingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingUnit")
            .field("link", &self.link)
            .field("requester", &self.requester)
            .field("params", &self.params)
            .field("src", &self.src.is_some())
            .field("dest", &self.dest.is_some())
            .field("resolved", &self.resolved)
            .finish()
    }
}
