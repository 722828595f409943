//! Requests to the packet collectors that capture the sampled traffic at
//! both ends of a link.

use crate::{
    link::FlowedLink,
    node::PortId,
    protocol::Action,
    stats::TrajectorySample,
};
use std::{
    sync::{Arc, mpsc},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("no collector available for {0}")]
    Unavailable(FlowedLink),
    #[error("collection of {link} failed: {reason}")]
    Failed { link: FlowedLink, reason: String },
}

/// Where a collector delivers the outcome of one sampling request.
pub type CollectionReply = mpsc::Receiver<Result<TrajectorySample, CollectionError>>;

/// The packet collectors attached to the switches.
pub trait Collector: Send + Sync {
    /// whether both ends of `link` have a collector attached
    fn has_necessary_collectors(&self, link: &FlowedLink) -> bool;

    /// the switch port that mirrors the sampled packets to the collectors
    fn sampling_port(&self) -> PortId;

    /// ask the collectors to capture the traffic of `link` during
    /// `duration`
    fn send_sampling_request(&self, link: &FlowedLink, duration: Duration) -> CollectionReply;
}

/// The collection side of a sampling unit.
#[derive(Clone)]
pub enum CollectionRequester {
    Active(Arc<dyn Collector>),
    /// no collector can capture this link, requests yield no results
    Inactive,
}

impl CollectionRequester {
    pub fn for_link(collector: &Arc<dyn Collector>, link: &FlowedLink) -> Self {
        if collector.has_necessary_collectors(link) {
            Self::Active(Arc::clone(collector))
        } else {
            log::debug!("No collectors for {link}, trajectory sampling is disabled");
            Self::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// action mirroring the sampled packets at the source switch
    pub fn src_sampling_action(&self) -> Option<Action> {
        self.sampling_action()
    }

    /// action mirroring the sampled packets at the destination switch
    pub fn dest_sampling_action(&self) -> Option<Action> {
        self.sampling_action()
    }

    fn sampling_action(&self) -> Option<Action> {
        match self {
            Self::Active(collector) => Some(Action::output(collector.sampling_port())),
            Self::Inactive => None,
        }
    }

    pub fn request(&self, link: &FlowedLink, duration: Duration) -> PendingCollection {
        match self {
            Self::Active(collector) => {
                log::trace!("Requesting collection of {link} during {duration:?}");
                PendingCollection::Waiting {
                    link: link.clone(),
                    reply: collector.send_sampling_request(link, duration),
                }
            }
            Self::Inactive => PendingCollection::Ready(TrajectorySample::no_results(link.clone())),
        }
    }
}

impl std::fmt::Debug for CollectionRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active(_) => f.write_str("Active"),
            Self::Inactive => f.write_str("Inactive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("collector of {0} hung up without replying")]
pub struct CollectionDisconnected(pub FlowedLink);

/// A collection request whose sample is not yet known.
#[derive(Debug)]
pub enum PendingCollection {
    Ready(TrajectorySample),
    Waiting {
        link: FlowedLink,
        reply: CollectionReply,
    },
}

impl PendingCollection {
    /// Block until the collector replies.
    ///
    /// A failed collection yields a sample without results. Only a
    /// collector that drops the reply channel is an error.
    pub fn wait(self) -> Result<TrajectorySample, CollectionDisconnected> {
        match self {
            Self::Ready(sample) => Ok(sample),
            Self::Waiting { link, reply } => match reply.recv() {
                Ok(Ok(sample)) => Ok(sample),
                Ok(Err(error)) => {
                    log::warn!("{error}");
                    Ok(TrajectorySample::no_results(link))
                }
                Err(mpsc::RecvError) => Err(CollectionDisconnected(link)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flow::Flow,
        link::Link,
        node::{NodeId, NodePort},
        stats::CapturedTraffic,
    };
    use std::time::Instant;

    struct OneSided;

    impl Collector for OneSided {
        fn has_necessary_collectors(&self, link: &FlowedLink) -> bool {
            link.src_node() == NodeId::ONE
        }

        fn sampling_port(&self) -> PortId {
            PortId::new(99)
        }

        fn send_sampling_request(&self, link: &FlowedLink, duration: Duration) -> CollectionReply {
            let (tx, rx) = mpsc::channel();
            if duration.is_zero() {
                tx.send(Err(CollectionError::Failed {
                    link: link.clone(),
                    reason: "empty capture window".to_owned(),
                }))
                .unwrap();
            } else if duration < Duration::from_secs(10) {
                let sample = TrajectorySample::new(
                    link.clone(),
                    duration,
                    Instant::now(),
                    CapturedTraffic::default(),
                    CapturedTraffic::default(),
                );
                tx.send(Ok(sample)).unwrap();
            }
            rx
        }
    }

    fn link(src: u64) -> FlowedLink {
        Link::new(
            NodePort::new(NodeId::new(src), PortId::new(1)),
            NodePort::new(NodeId::new(7), PortId::new(2)),
        )
        .flowed(Flow::all())
    }

    fn collector() -> Arc<dyn Collector> {
        Arc::new(OneSided)
    }

    #[test]
    fn inactive_without_collectors() {
        let requester = CollectionRequester::for_link(&collector(), &link(2));
        assert!(!requester.is_active());
        assert_eq!(requester.src_sampling_action(), None);

        let sample = requester.request(&link(2), Duration::from_secs(1)).wait().unwrap();
        assert!(!sample.has_results());
    }

    #[test]
    fn active_collection() {
        let requester = CollectionRequester::for_link(&collector(), &link(1));
        assert_eq!(
            requester.dest_sampling_action(),
            Some(Action::output(PortId::new(99)))
        );

        let sample = requester.request(&link(1), Duration::from_secs(1)).wait().unwrap();
        assert!(sample.has_results());
    }

    #[test]
    fn failed_collection_has_no_results() {
        let requester = CollectionRequester::for_link(&collector(), &link(1));
        let sample = requester.request(&link(1), Duration::ZERO).wait().unwrap();
        assert!(!sample.has_results());
    }

    #[test]
    fn disconnected_collector() {
        let requester = CollectionRequester::for_link(&collector(), &link(1));
        let error = requester
            .request(&link(1), Duration::from_secs(60))
            .wait()
            .unwrap_err();
        assert_eq!(error, CollectionDisconnected(link(1)));
    }
}
