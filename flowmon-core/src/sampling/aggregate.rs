use crate::{flow::Flow, link::FlowedLink};
use std::{fmt, num::NonZeroUsize};

/// Flowed links that can be sampled in the same round.
///
/// Two members never share a node while having inclusive flows: the
/// sampling entries of one would capture the packets of the other.
///
/// ```
/// # use flowmon_core::{flow::Flow, link::Link, node::*, sampling::FlowedLinkAggregate};
/// # use std::num::NonZeroUsize;
/// let a = Link::new(
///     NodePort::new(NodeId::new(1), PortId::new(1)),
///     NodePort::new(NodeId::new(2), PortId::new(1)),
/// );
/// let b = Link::new(
///     NodePort::new(NodeId::new(2), PortId::new(2)),
///     NodePort::new(NodeId::new(3), PortId::new(1)),
/// );
///
/// let mut aggregate = FlowedLinkAggregate::new(NonZeroUsize::new(2).unwrap());
/// assert!(aggregate.try_add(a.flowed(Flow::all())));
/// // shares node 2 with the first link, with the same flow
/// assert!(!aggregate.try_add(b.flowed(Flow::all())));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowedLinkAggregate {
    members: Vec<FlowedLink>,
    max: NonZeroUsize,
}

impl FlowedLinkAggregate {
    pub fn new(max: NonZeroUsize) -> Self {
        Self {
            members: Vec::with_capacity(max.get()),
            max,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max.get()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max.get()
    }

    pub fn contains(&self, link: &FlowedLink) -> bool {
        self.members.contains(link)
    }

    /// whether `link` would conflict with one of the members
    pub fn conflicts_with(&self, link: &FlowedLink) -> bool {
        self.members.iter().any(|member| {
            member.link().coincides_with(&link.link())
                && Flow::are_inclusive(member.flow(), link.flow())
        })
    }

    /// Add `link` unless the aggregate is full, already holds it or holds
    /// a conflicting link.
    pub fn try_add(&mut self, link: FlowedLink) -> bool {
        if self.is_full() || self.contains(&link) || self.conflicts_with(&link) {
            return false;
        }
        self.members.push(link);
        true
    }

    /// Returns `false` if `link` is not a member.
    pub fn remove(&mut self, link: &FlowedLink) -> bool {
        match self.members.iter().position(|member| member == link) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowedLink> + '_ {
        self.members.iter()
    }
}

impl fmt::Display for FlowedLinkAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aggregate({}/{})[", self.members.len(), self.max)?;
        for (index, member) in self.members.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            member.fmt(f)?;
        }
        f.write_str("]")
    }
}
