//! Raw results of one sampling round, before they are turned into
//! statistics.

use crate::{
    link::FlowedLink,
    protocol::FlowRemoved,
    sampling::SamplingParameters,
    time::Timed,
};
use std::{
    fmt,
    time::{Duration, Instant},
};

/// The flow-removed messages of the source and destination sampling
/// entries of a flowed link.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCounterResults {
    pub src: Timed<FlowRemoved>,
    pub dest: Timed<FlowRemoved>,
    pub params: SamplingParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCounterSample {
    link: FlowedLink,
    results: Option<SwitchCounterResults>,
}

impl SwitchCounterSample {
    pub fn new(
        link: FlowedLink,
        src: Timed<FlowRemoved>,
        dest: Timed<FlowRemoved>,
        params: SamplingParameters,
    ) -> Self {
        Self {
            link,
            results: Some(SwitchCounterResults { src, dest, params }),
        }
    }

    /// the sample of a round that did not complete
    pub fn no_results(link: FlowedLink) -> Self {
        Self {
            link,
            results: None,
        }
    }

    pub fn link(&self) -> &FlowedLink {
        &self.link
    }

    pub fn has_results(&self) -> bool {
        self.results.is_some()
    }

    pub fn results(&self) -> Option<&SwitchCounterResults> {
        self.results.as_ref()
    }
}

impl fmt::Display for SwitchCounterSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.results {
            Some(results) => write!(
                f,
                "SwitchCounterSample({}, src={}, dest={}, {})",
                self.link, results.src.value, results.dest.value, results.params
            ),
            None => write!(f, "SwitchCounterSample({}, no results)", self.link),
        }
    }
}

/// Digest of a captured packet, used to correlate the packets seen at
/// both ends of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketSummary {
    pub digest: u64,
    /// length of the original packet, in bytes
    pub length: u32,
}

impl PacketSummary {
    pub const fn new(digest: u64, length: u32) -> Self {
        Self { digest, length }
    }
}

impl fmt::Display for PacketSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}({}B)", self.digest, self.length)
    }
}

/// The traffic a collector captured at one end of a link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedTraffic {
    /// captured packets, in capture order
    pub summaries: Vec<Timed<PacketSummary>>,
    /// bytes captured that did not belong to the sampled flow
    pub unmatched_bytes: u64,
    pub unmatched_packets: u64,
}

impl CapturedTraffic {
    fn last_timestamp(&self) -> Option<Instant> {
        self.summaries.last().map(|summary| summary.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryResults {
    pub collection_duration: Duration,
    pub finish_time: Instant,
    pub src: CapturedTraffic,
    pub dest: CapturedTraffic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySample {
    link: FlowedLink,
    results: Option<TrajectoryResults>,
}

impl TrajectorySample {
    /// a sample whose finishing time is `finish_time`
    pub fn new(
        link: FlowedLink,
        collection_duration: Duration,
        finish_time: Instant,
        src: CapturedTraffic,
        dest: CapturedTraffic,
    ) -> Self {
        Self {
            link,
            results: Some(TrajectoryResults {
                collection_duration,
                finish_time,
                src,
                dest,
            }),
        }
    }

    /// a sample whose finishing time is the latest capture timestamp of
    /// either end, or `fallback` if nothing was captured
    pub fn from_captures(
        link: FlowedLink,
        collection_duration: Duration,
        src: CapturedTraffic,
        dest: CapturedTraffic,
        fallback: Instant,
    ) -> Self {
        let finish_time = match (src.last_timestamp(), dest.last_timestamp()) {
            (Some(a), Some(b)) => a.max(b),
            (Some(t), None) | (None, Some(t)) => t,
            (None, None) => fallback,
        };
        Self::new(link, collection_duration, finish_time, src, dest)
    }

    pub fn no_results(link: FlowedLink) -> Self {
        Self {
            link,
            results: None,
        }
    }

    pub fn link(&self) -> &FlowedLink {
        &self.link
    }

    pub fn has_results(&self) -> bool {
        self.results.is_some()
    }

    pub fn results(&self) -> Option<&TrajectoryResults> {
        self.results.as_ref()
    }
}

impl fmt::Display for TrajectorySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.results {
            Some(results) => write!(
                f,
                "TrajectorySample({}, src={} packets, dest={} packets)",
                self.link,
                results.src.summaries.len(),
                results.dest.summaries.len()
            ),
            None => write!(f, "TrajectorySample({}, no results)", self.link),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flow::Flow,
        link::Link,
        node::{NodeId, NodePort, PortId},
    };

    fn flowed_link() -> FlowedLink {
        Link::new(
            NodePort::new(NodeId::new(1), PortId::new(1)),
            NodePort::new(NodeId::new(2), PortId::new(2)),
        )
        .flowed(Flow::all())
    }

    fn captured(at: &[Instant]) -> CapturedTraffic {
        CapturedTraffic {
            summaries: at
                .iter()
                .map(|t| Timed::new(PacketSummary::new(7, 64), *t))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn finish_time_is_latest_capture() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(3);
        let t2 = t0 + Duration::from_millis(5);

        let sample = TrajectorySample::from_captures(
            flowed_link(),
            Duration::from_secs(1),
            captured(&[t0, t2]),
            captured(&[t1]),
            t0,
        );
        assert_eq!(sample.results().unwrap().finish_time, t2);
    }

    #[test]
    fn finish_time_falls_back_without_captures() {
        let t0 = Instant::now();
        let sample = TrajectorySample::from_captures(
            flowed_link(),
            Duration::from_secs(1),
            CapturedTraffic::default(),
            CapturedTraffic::default(),
            t0,
        );
        assert_eq!(sample.results().unwrap().finish_time, t0);
    }

    #[test]
    fn no_results() {
        let sample = SwitchCounterSample::no_results(flowed_link());
        assert!(!sample.has_results());
        assert!(sample.to_string().ends_with("no results)"));

        let sample = TrajectorySample::no_results(flowed_link());
        assert!(sample.results().is_none());
    }
}
