use super::{Collector, FlowedLinkAggregate, Sampling};
use crate::{
    flow::Flow,
    link::{FlowedLink, Link},
    stats::StatsSink,
};
use std::{num::NonZeroUsize, sync::Arc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupingError {
    #[error("duplicate link addition: {0}")]
    DuplicateLink(Link),
    #[error("unknown link removal: {0}")]
    UnknownLink(Link),
}

/// Partitions the sampled flowed links into conflict free aggregates and
/// cycles through them, one sampling round per aggregate.
///
/// Every known link is sampled for every known flow.
///
/// ```
/// # use flowmon_core::{flow::Flow, link::Link, node::*, sampling::Grouping, stats::*};
/// # use std::{num::NonZeroUsize, sync::Arc};
/// let sink: Arc<dyn StatsSink> = Arc::new(FlowedStatsStore::new());
/// let mut grouping = Grouping::new(NonZeroUsize::MIN, sink);
///
/// grouping.add_flow(Flow::all());
/// for (src, dest) in [(1, 2), (2, 3), (3, 1)] {
///     let link = Link::new(
///         NodePort::new(NodeId::new(src), PortId::new(1)),
///         NodePort::new(NodeId::new(dest), PortId::new(2)),
///     );
///     grouping.add_link(link).unwrap();
/// }
/// assert_eq!(grouping.aggregates().len(), 3);
/// ```
pub struct Grouping {
    links: Vec<Link>,
    flows: Vec<Flow>,
    aggregates: Vec<FlowedLinkAggregate>,
    /// index of the aggregate of the next round
    cursor: usize,
    active: Option<Sampling>,
    max_simultaneous: NonZeroUsize,
    sink: Arc<dyn StatsSink>,
}

impl Grouping {
    pub fn new(max_simultaneous: NonZeroUsize, sink: Arc<dyn StatsSink>) -> Self {
        Self {
            links: Vec::new(),
            flows: Vec::new(),
            aggregates: Vec::new(),
            cursor: 0,
            active: None,
            max_simultaneous,
            sink,
        }
    }

    /// known links, in insertion order
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// known flows, in insertion order
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn aggregates(&self) -> &[FlowedLinkAggregate] {
        &self.aggregates
    }

    pub fn active_sampling(&self) -> Option<&Sampling> {
        self.active.as_ref()
    }

    pub fn active_sampling_mut(&mut self) -> Option<&mut Sampling> {
        self.active.as_mut()
    }

    /// Drop the active sampling. Whoever waits for its completion sees its
    /// unresolved units as disconnected.
    pub fn clear_active_sampling(&mut self) -> Option<Sampling> {
        self.active.take()
    }

    pub fn contains_link(&self, link: &Link) -> bool {
        self.links.contains(link)
    }

    pub fn add_link(&mut self, link: Link) -> Result<(), GroupingError> {
        if self.links.contains(&link) {
            debug_assert!(false, "duplicate link addition: {link}");
            return Err(GroupingError::DuplicateLink(link));
        }
        self.links.push(link);

        let flowed: Vec<FlowedLink> = self
            .flows
            .iter()
            .map(|flow| link.flowed(flow.clone()))
            .collect();
        for flowed_link in flowed {
            self.add_flowed_link(flowed_link);
        }
        Ok(())
    }

    pub fn remove_link(&mut self, link: &Link) -> Result<(), GroupingError> {
        let Some(index) = self.links.iter().position(|known| known == link) else {
            debug_assert!(false, "unknown link removal: {link}");
            return Err(GroupingError::UnknownLink(*link));
        };
        self.links.remove(index);

        let flowed: Vec<FlowedLink> = self
            .flows
            .iter()
            .map(|flow| link.flowed(flow.clone()))
            .collect();
        for flowed_link in flowed {
            self.remove_flowed_link(&flowed_link);
        }
        Ok(())
    }

    /// Returns `false` if the flow is already known.
    pub fn add_flow(&mut self, flow: Flow) -> bool {
        if self.flows.contains(&flow) {
            return false;
        }
        self.flows.push(flow.clone());

        let flowed: Vec<FlowedLink> = self
            .links
            .iter()
            .map(|link| link.flowed(flow.clone()))
            .collect();
        for flowed_link in flowed {
            self.add_flowed_link(flowed_link);
        }
        true
    }

    /// Returns `false` if the flow is unknown. Otherwise the statistics
    /// of the flow are cleared.
    pub fn remove_flow(&mut self, flow: &Flow) -> bool {
        let Some(index) = self.flows.iter().position(|known| known == flow) else {
            return false;
        };
        self.flows.remove(index);
        self.sink.clear_all_flowed_stats(flow);

        let flowed: Vec<FlowedLink> = self
            .links
            .iter()
            .map(|link| link.flowed(flow.clone()))
            .collect();
        for flowed_link in flowed {
            self.remove_flowed_link(&flowed_link);
        }
        true
    }

    /// Start the sampling of the next aggregate.
    ///
    /// Returns `false`, and clears the active sampling, when there is
    /// nothing to sample.
    pub fn next_sampling(&mut self, collector: &Arc<dyn Collector>) -> bool {
        if self.aggregates.is_empty() {
            self.active = None;
            return false;
        }

        let index = self.cursor % self.aggregates.len();
        self.cursor = index + 1;
        let aggregate = &self.aggregates[index];
        log::trace!("Next sampling over {aggregate}");
        self.active = Some(Sampling::new(aggregate, collector, &self.sink));
        true
    }

    fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    fn add_flowed_link(&mut self, link: FlowedLink) {
        log::debug!("Adding flowed-link to be sampled: {link}");

        let accepted = self
            .aggregates
            .iter_mut()
            .any(|aggregate| aggregate.try_add(link.clone()));
        if !accepted {
            let mut aggregate = FlowedLinkAggregate::new(self.max_simultaneous);
            aggregate.try_add(link);
            self.aggregates.push(aggregate);
            self.reset_cursor();
        }

        log::trace!("Current aggregates: {}", self.aggregates.len());
    }

    fn remove_flowed_link(&mut self, link: &FlowedLink) {
        log::debug!("Removing flowed-link from being sampled: {link}");

        if let Some(index) = self.aggregates.iter().position(|a| a.contains(link)) {
            self.aggregates[index].remove(link);
            if self.aggregates[index].is_empty() {
                self.aggregates.remove(index);
                self.reset_cursor();
            }
        }

        if let Some(sampling) = self.active.as_mut() {
            if sampling.contains(link) {
                log::debug!("Aborting active sampling for flowed-link {link}");
                sampling.abort_unit(link, format!("link was removed: {link}"));
            }
        }
    }
}

impl std::fmt::Debug for Grouping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grouping")
            .field("links", &self.links)
            .field("flows", &self.flows)
            .field("aggregates", &self.aggregates)
            .field("cursor", &self.cursor)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        node::{NodeId, NodePort, PortId},
        sampling::{CollectionReply, unit::tests::RecordingSink},
    };
    use std::{sync::mpsc, time::Duration};

    struct NoCollectors;

    impl Collector for NoCollectors {
        fn has_necessary_collectors(&self, _: &FlowedLink) -> bool {
            false
        }

        fn sampling_port(&self) -> PortId {
            PortId::LOCAL
        }

        fn send_sampling_request(&self, _: &FlowedLink, _: Duration) -> CollectionReply {
            mpsc::channel().1
        }
    }

    fn link(src: u64, dest: u64) -> Link {
        Link::new(
            NodePort::new(NodeId::new(src), PortId::new(1)),
            NodePort::new(NodeId::new(dest), PortId::new(2)),
        )
    }

    fn grouping(max: usize) -> (Grouping, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let grouping = Grouping::new(NonZeroUsize::new(max).unwrap(), sink.clone());
        (grouping, sink)
    }

    fn collector() -> Arc<dyn Collector> {
        Arc::new(NoCollectors)
    }

    #[test]
    fn cross_product_of_links_and_flows() {
        let (mut grouping, _) = grouping(4);
        let tcp: Flow = "ip_proto=6".parse().unwrap();
        let udp: Flow = "ip_proto=17".parse().unwrap();

        grouping.add_link(link(1, 2)).unwrap();
        assert!(grouping.aggregates().is_empty());
        assert!(grouping.add_flow(tcp.clone()));
        assert!(!grouping.add_flow(tcp.clone()));
        assert!(grouping.add_flow(udp));
        grouping.add_link(link(3, 4)).unwrap();

        let total: usize = grouping.aggregates().iter().map(FlowedLinkAggregate::len).sum();
        assert_eq!(total, 4);
        // disjoint flows and links fit in one aggregate
        assert_eq!(grouping.aggregates().len(), 1);
        assert!(grouping.aggregates()[0].contains(&link(3, 4).flowed(tcp)));
    }

    #[test]
    fn three_links_one_at_a_time() {
        let (mut grouping, _) = grouping(1);
        grouping.add_flow(Flow::all());
        for (src, dest) in [(1, 2), (3, 4), (5, 6)] {
            grouping.add_link(link(src, dest)).unwrap();
        }

        assert_eq!(grouping.aggregates().len(), 3);
        assert!(grouping.aggregates().iter().all(|a| a.len() == 1));
    }

    #[test]
    fn add_then_remove_restores_state() {
        let (mut grouping, _) = grouping(2);
        grouping.add_flow(Flow::all());
        grouping.add_flow("eth_type=0x800".parse().unwrap());
        grouping.add_link(link(1, 2)).unwrap();
        grouping.add_link(link(3, 4)).unwrap();

        let links = grouping.links().to_vec();
        let aggregates = grouping.aggregates().to_vec();

        grouping.add_link(link(2, 3)).unwrap();
        grouping.remove_link(&link(2, 3)).unwrap();

        assert_eq!(grouping.links(), links);
        assert_eq!(grouping.aggregates(), aggregates);
    }

    #[test]
    fn cycles_through_aggregates() {
        let (mut grouping, _) = grouping(1);
        let collector = collector();
        assert!(!grouping.next_sampling(&collector));

        grouping.add_flow(Flow::all());
        grouping.add_link(link(1, 2)).unwrap();
        grouping.add_link(link(3, 4)).unwrap();

        let sampled = |grouping: &Grouping| -> Vec<FlowedLink> {
            grouping.active_sampling().unwrap().links().cloned().collect()
        };

        assert!(grouping.next_sampling(&collector));
        assert_eq!(sampled(&grouping), [link(1, 2).flowed(Flow::all())]);
        assert!(grouping.next_sampling(&collector));
        assert_eq!(sampled(&grouping), [link(3, 4).flowed(Flow::all())]);
        assert!(grouping.next_sampling(&collector));
        assert_eq!(sampled(&grouping), [link(1, 2).flowed(Flow::all())]);

        // a new aggregate restarts the cycle
        grouping.add_link(link(5, 6)).unwrap();
        assert!(grouping.next_sampling(&collector));
        assert_eq!(sampled(&grouping), [link(1, 2).flowed(Flow::all())]);

        grouping.remove_flow(&Flow::all());
        assert!(!grouping.next_sampling(&collector));
        assert!(grouping.active_sampling().is_none());
    }

    #[test]
    fn removing_an_active_link_aborts_its_unit() {
        let (mut grouping, sink) = grouping(1);
        let collector = collector();
        grouping.add_flow(Flow::all());
        grouping.add_link(link(1, 2)).unwrap();

        assert!(grouping.next_sampling(&collector));
        let completion = grouping
            .active_sampling_mut()
            .and_then(Sampling::take_completion)
            .unwrap();

        grouping.remove_link(&link(1, 2)).unwrap();

        let error = completion.wait().unwrap_err();
        assert_eq!(
            error.to_string(),
            format!(
                "sampling aborted: link was removed: {}",
                link(1, 2).flowed(Flow::all())
            )
        );
        assert_eq!(sink.switch_counter.lock().unwrap().len(), 1);
    }

    #[test]
    fn removing_a_flow_clears_its_stats() {
        let (mut grouping, sink) = grouping(1);
        let flow: Flow = "eth_type=0x806".parse().unwrap();
        assert!(!grouping.remove_flow(&flow));
        grouping.add_flow(flow.clone());
        assert!(grouping.remove_flow(&flow));
        assert_eq!(*sink.cleared.lock().unwrap(), [flow]);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "duplicate link addition"))]
    fn duplicate_link() {
        let (mut grouping, _) = grouping(1);
        grouping.add_link(link(1, 2)).unwrap();
        assert_eq!(
            grouping.add_link(link(1, 2)),
            Err(GroupingError::DuplicateLink(link(1, 2)))
        );
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "unknown link removal"))]
    fn unknown_link() {
        let (mut grouping, _) = grouping(1);
        assert_eq!(
            grouping.remove_link(&link(1, 2)),
            Err(GroupingError::UnknownLink(link(1, 2)))
        );
    }
}
