//! Link statistics.
//!
//! Statistics are grouped by source: the [`GeneralLinkStats`] of a link are
//! fed by configuration and probing, the [`FlowedLinkStats`] of a flowed
//! link add what the sampling rounds measured for one flow. Every value is
//! a [`Stat`], telling whether it is present and whether it can be trusted
//! ([`StatKind`]).

mod calculator;
mod flowed;
mod general;
mod sample;
mod stat;
mod store;
mod tracker;

pub use self::{
    calculator::{calc_switch_counter, calc_trajectory},
    flowed::{
        FlowedLinkStats, SwitchCounterBuilder, SwitchCounterSubStats, TrajectoryBuilder,
        TrajectorySubStats,
    },
    general::{
        GeneralLinkStats, LinkConfigBuilder, LinkConfigSubStats, LldpProbingBuilder,
        LldpProbingSubStats, SecureProbingBuilder, SecureProbingSubStats, SwitchesBuilder,
        SwitchesSubStats,
    },
    sample::{
        CapturedTraffic, PacketSummary, SwitchCounterResults, SwitchCounterSample,
        TrajectoryResults, TrajectorySample,
    },
    stat::{Stat, StatKind},
    store::FlowedStatsStore,
    tracker::{RateTracker, SummaryTracker},
};
use crate::flow::Flow;

/// Receives the results of the sampling rounds.
///
/// Implementations are shared between the sampling thread and the threads
/// delivering collection results, hence `&self`.
pub trait StatsSink: Send + Sync {
    fn update_switch_counter(&self, sample: SwitchCounterSample);

    fn update_trajectory(&self, sample: TrajectorySample);

    /// called when `flow` is no longer sampled
    fn clear_all_flowed_stats(&self, flow: &Flow);
}
