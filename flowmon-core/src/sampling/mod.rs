//! The sampling engine: which flowed links are sampled together, and the
//! bookkeeping of one sampling round.

mod aggregate;
mod collection;
mod grouping;
mod tags;
mod unit;

pub use self::{
    aggregate::FlowedLinkAggregate,
    collection::{
        CollectionDisconnected, CollectionError, CollectionReply, CollectionRequester, Collector,
        PendingCollection,
    },
    grouping::{Grouping, GroupingError},
    tags::{TagCursor, TagPool, VlanTag},
    unit::{SamplingError, SamplingParameters, SamplingUnit, UnitOutcome},
};
use crate::{
    link::{Endpoint, EndpointKind, FlowedLink},
    node::NodeId,
    protocol::FlowRemoved,
    stats::StatsSink,
    time::Timed,
};
use std::{
    collections::HashMap,
    sync::{Arc, mpsc},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultRejected {
    #[error("endpoint {0} is not part of the active sampling")]
    UnknownEndpoint(Endpoint),
    #[error("{kind} result of {link} is a duplicate or arrived before the sampling parameters")]
    Rejected { link: FlowedLink, kind: EndpointKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Aborted(#[from] SamplingError),
    #[error("sampling units were dropped before resolving ({resolved}/{expected} resolved)")]
    Disconnected { resolved: usize, expected: usize },
}

/// One round over the members of an aggregate.
#[derive(Debug)]
pub struct Sampling {
    units: Vec<SamplingUnit>,
    by_link: HashMap<FlowedLink, usize>,
    by_endpoint: HashMap<Endpoint, usize>,
    completion: Option<SamplingCompletion>,
}

impl Sampling {
    pub fn new(
        aggregate: &FlowedLinkAggregate,
        collector: &Arc<dyn Collector>,
        sink: &Arc<dyn StatsSink>,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::channel();

        let mut units = Vec::with_capacity(aggregate.len());
        let mut by_link = HashMap::with_capacity(aggregate.len());
        let mut by_endpoint = HashMap::with_capacity(2 * aggregate.len());
        for (index, link) in aggregate.iter().enumerate() {
            let requester = CollectionRequester::for_link(collector, link);
            units.push(SamplingUnit::new(
                link.clone(),
                requester,
                Arc::clone(sink),
                outcomes_tx.clone(),
            ));
            by_link.insert(link.clone(), index);
            by_endpoint.insert(link.src_endpoint(), index);
            by_endpoint.insert(link.dest_endpoint(), index);
        }

        let completion = SamplingCompletion {
            outcomes: outcomes_rx,
            expected: units.len(),
        };
        Self {
            units,
            by_link,
            by_endpoint,
            completion: Some(completion),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> impl Iterator<Item = &SamplingUnit> + '_ {
        self.units.iter()
    }

    pub fn units_mut(&mut self) -> impl Iterator<Item = &mut SamplingUnit> + '_ {
        self.units.iter_mut()
    }

    pub fn links(&self) -> impl Iterator<Item = &FlowedLink> + '_ {
        self.units.iter().map(SamplingUnit::link)
    }

    pub fn contains(&self, link: &FlowedLink) -> bool {
        self.by_link.contains_key(link)
    }

    /// the flowed link sampled at `endpoint`
    pub fn resolve_endpoint(&self, endpoint: &Endpoint) -> Option<&FlowedLink> {
        self.by_endpoint
            .get(endpoint)
            .map(|index| self.units[*index].link())
    }

    /// the switches touched by this sampling, source then destination of
    /// every unit, without duplicates
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(2 * self.units.len());
        for unit in &self.units {
            for node in [unit.link().src_node(), unit.link().dest_node()] {
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
        }
        nodes
    }

    /// Hand the flow-removed message of a sampling entry to its unit.
    pub fn receive_result(
        &mut self,
        endpoint: &Endpoint,
        result: Timed<FlowRemoved>,
    ) -> Result<&FlowedLink, ResultRejected> {
        let Some(index) = self.by_endpoint.get(endpoint).copied() else {
            return Err(ResultRejected::UnknownEndpoint(endpoint.clone()));
        };
        let unit = &mut self.units[index];
        let accepted = match endpoint.kind() {
            EndpointKind::Source => unit.set_src_result(result),
            EndpointKind::Destination => unit.set_dest_result(result),
        };
        if accepted {
            Ok(unit.link())
        } else {
            Err(ResultRejected::Rejected {
                link: unit.link().clone(),
                kind: endpoint.kind(),
            })
        }
    }

    /// Abort the unit of `link`, returns `false` if `link` is not sampled.
    pub fn abort_unit(&mut self, link: &FlowedLink, reason: impl Into<String>) -> bool {
        match self.by_link.get(link) {
            Some(index) => {
                self.units[*index].abort(reason);
                true
            }
            None => false,
        }
    }

    /// Take the handle to wait for every unit to resolve. Only the first
    /// call returns it.
    pub fn take_completion(&mut self) -> Option<SamplingCompletion> {
        self.completion.take()
    }
}

/// Waits for the units of a [`Sampling`] to resolve, without holding the
/// sampling itself.
#[derive(Debug)]
pub struct SamplingCompletion {
    outcomes: mpsc::Receiver<UnitOutcome>,
    expected: usize,
}

impl SamplingCompletion {
    /// Block until every unit resolved.
    ///
    /// Fails with the first abort if any unit was aborted.
    pub fn wait(self) -> Result<(), CompletionError> {
        let mut first_abort = None;
        for resolved in 0..self.expected {
            match self.outcomes.recv() {
                Ok(Ok(_link)) => {}
                Ok(Err(error)) => {
                    first_abort.get_or_insert(error);
                }
                Err(mpsc::RecvError) => {
                    return Err(CompletionError::Disconnected {
                        resolved,
                        expected: self.expected,
                    });
                }
            }
        }
        match first_abort {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{unit::tests::*, *};
    use crate::{
        flow::Flow,
        link::Link,
        node::{NodeId, NodePort, PortId},
    };
    use std::{num::NonZeroUsize, thread, time::Duration};

    struct NoCollectors;

    impl Collector for NoCollectors {
        fn has_necessary_collectors(&self, _: &FlowedLink) -> bool {
            false
        }

        fn sampling_port(&self) -> PortId {
            PortId::new(99)
        }

        fn send_sampling_request(&self, _: &FlowedLink, _: Duration) -> CollectionReply {
            mpsc::channel().1
        }
    }

    fn link(src: u64, dest: u64) -> FlowedLink {
        Link::new(
            NodePort::new(NodeId::new(src), PortId::new(1)),
            NodePort::new(NodeId::new(dest), PortId::new(2)),
        )
        .flowed(Flow::all())
    }

    fn sampling(links: &[FlowedLink]) -> (Sampling, Arc<RecordingSink>) {
        let mut aggregate = FlowedLinkAggregate::new(NonZeroUsize::new(8).unwrap());
        for link in links {
            assert!(aggregate.try_add(link.clone()));
        }
        let collector: Arc<dyn Collector> = Arc::new(NoCollectors);
        let recording = Arc::new(RecordingSink::default());
        let sink: Arc<dyn StatsSink> = recording.clone();
        (Sampling::new(&aggregate, &collector, &sink), recording)
    }

    #[test]
    fn endpoints_resolve_to_links() {
        let a = link(1, 2);
        let b = link(3, 4);
        let (sampling, _) = sampling(&[a.clone(), b.clone()]);

        assert_eq!(sampling.resolve_endpoint(&b.dest_endpoint()), Some(&b));
        assert_eq!(sampling.resolve_endpoint(&a.src_endpoint()), Some(&a));
        assert_eq!(sampling.nodes(), [1, 2, 3, 4].map(NodeId::new).to_vec());
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let (mut sampling, _) = sampling(&[link(1, 2)]);
        let foreign = link(5, 6).src_endpoint();
        assert_eq!(
            sampling.receive_result(&foreign, removal(5)),
            Err(ResultRejected::UnknownEndpoint(foreign))
        );
    }

    #[test]
    fn completes_when_every_unit_resolves() {
        let a = link(1, 2);
        let b = link(3, 4);
        let (mut sampling, sink) = sampling(&[a.clone(), b.clone()]);
        let completion = sampling.take_completion().unwrap();
        assert!(sampling.take_completion().is_none());

        for unit in sampling.units_mut() {
            unit.set_params(params());
        }
        let waiter = thread::spawn(move || completion.wait());

        for link in [&a, &b] {
            sampling.receive_result(&link.src_endpoint(), removal(5)).unwrap();
            sampling.receive_result(&link.dest_endpoint(), removal(0)).unwrap();
        }
        assert!(matches!(
            sampling.receive_result(&a.dest_endpoint(), removal(0)),
            Err(ResultRejected::Rejected { .. })
        ));

        assert_eq!(waiter.join().unwrap(), Ok(()));
        assert_eq!(sink.switch_counter.lock().unwrap().len(), 2);
    }

    #[test]
    fn abort_fails_the_completion() {
        let a = link(1, 2);
        let (mut sampling, _) = sampling(&[a.clone()]);
        let completion = sampling.take_completion().unwrap();

        assert!(sampling.abort_unit(&a, format!("link was removed: {a}")));
        assert!(!sampling.abort_unit(&link(7, 8), "unknown"));

        let error = completion.wait().unwrap_err();
        assert!(error.to_string().contains("link was removed"));
    }

    #[test]
    fn dropped_sampling_disconnects() {
        let (mut sampling, _) = sampling(&[link(1, 2)]);
        let completion = sampling.take_completion().unwrap();
        drop(sampling);

        assert_eq!(
            completion.wait(),
            Err(CompletionError::Disconnected {
                resolved: 0,
                expected: 1
            })
        );
    }
}
