use super::{RateTracker, Stat, StatKind, SummaryTracker};
use crate::{
    link::Link,
    measure::{DataRate, Latency, PacketRate, Ratio, Summary},
};
use std::time::Instant;

/// Configured capacities of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfigSubStats {
    /// Capacity of the physical medium.
    pub physical_capacity: Stat<DataRate>,
    /// Capacity allocated to the link by the operator, if any.
    pub virtual_capacity: Stat<DataRate>,
    pub num_updates: u64,
}

impl LinkConfigSubStats {
    pub const fn absent() -> Self {
        Self {
            physical_capacity: Stat::absent(),
            virtual_capacity: Stat::absent(),
            num_updates: 0,
        }
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.physical_capacity == other.physical_capacity
            && self.virtual_capacity == other.virtual_capacity
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfigBuilder {
    physical_capacity: RateTracker<DataRate>,
    virtual_capacity: RateTracker<DataRate>,
    num_updates: u64,
}

impl LinkConfigBuilder {
    pub fn set_physical_capacity(&mut self, capacity: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.physical_capacity.set(capacity, timestamp);
        self
    }

    pub fn set_virtual_capacity(&mut self, capacity: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.virtual_capacity.set(capacity, timestamp);
        self
    }

    pub fn increment_num_updates(&mut self) -> &mut Self {
        self.num_updates = self.num_updates.saturating_add(1);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.physical_capacity.clear();
        self.virtual_capacity.clear();
        self
    }

    pub fn build(&self) -> LinkConfigSubStats {
        LinkConfigSubStats {
            physical_capacity: self.physical_capacity.stat(StatKind::Safe),
            virtual_capacity: self.virtual_capacity.stat(StatKind::Safe),
            num_updates: self.num_updates,
        }
    }
}

impl Default for LinkConfigBuilder {
    fn default() -> Self {
        Self {
            physical_capacity: RateTracker::exact(),
            virtual_capacity: RateTracker::exact(),
            num_updates: 0,
        }
    }
}

/// Packet drops reported by the switches at both ends of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchesSubStats {
    pub src_packet_drop_rate: Stat<Summary<PacketRate>>,
    pub dest_packet_drop_rate: Stat<Summary<PacketRate>>,
    pub num_updates: u64,
}

impl SwitchesSubStats {
    pub const fn absent() -> Self {
        Self {
            src_packet_drop_rate: Stat::absent(),
            dest_packet_drop_rate: Stat::absent(),
            num_updates: 0,
        }
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.src_packet_drop_rate == other.src_packet_drop_rate
            && self.dest_packet_drop_rate == other.dest_packet_drop_rate
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwitchesBuilder {
    src_packet_drop_rate: SummaryTracker<PacketRate>,
    dest_packet_drop_rate: SummaryTracker<PacketRate>,
    num_updates: u64,
}

impl SwitchesBuilder {
    pub fn collect_src_packet_drop_rate(&mut self, rate: PacketRate, timestamp: Instant) -> &mut Self {
        self.src_packet_drop_rate.collect(rate, timestamp);
        self
    }

    pub fn collect_dest_packet_drop_rate(&mut self, rate: PacketRate, timestamp: Instant) -> &mut Self {
        self.dest_packet_drop_rate.collect(rate, timestamp);
        self
    }

    pub fn increment_num_updates(&mut self) -> &mut Self {
        self.num_updates = self.num_updates.saturating_add(1);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.src_packet_drop_rate.clear();
        self.dest_packet_drop_rate.clear();
        self
    }

    pub fn build(&self) -> SwitchesSubStats {
        SwitchesSubStats {
            src_packet_drop_rate: self.src_packet_drop_rate.stat(StatKind::Safe),
            dest_packet_drop_rate: self.dest_packet_drop_rate.stat(StatKind::Safe),
            num_updates: self.num_updates,
        }
    }
}

/// Latency estimated from the topology discovery probes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LldpProbingSubStats {
    pub latency: Stat<Summary<Latency>>,
    pub num_updates: u64,
}

impl LldpProbingSubStats {
    pub const fn absent() -> Self {
        Self {
            latency: Stat::absent(),
            num_updates: 0,
        }
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.latency == other.latency
    }
}

#[derive(Debug, Clone, Default)]
pub struct LldpProbingBuilder {
    latency: SummaryTracker<Latency>,
    num_updates: u64,
}

impl LldpProbingBuilder {
    pub fn collect_latency(&mut self, latency: Latency, timestamp: Instant) -> &mut Self {
        self.latency.collect(latency, timestamp);
        self
    }

    pub fn reset_latency(&mut self, timestamp: Instant) -> &mut Self {
        self.latency.reset(timestamp);
        self
    }

    pub fn increment_num_updates(&mut self) -> &mut Self {
        self.num_updates = self.num_updates.saturating_add(1);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.latency.clear();
        self
    }

    pub fn build(&self) -> LldpProbingSubStats {
        LldpProbingSubStats {
            latency: self.latency.stat(StatKind::Unsafe),
            num_updates: self.num_updates,
        }
    }
}

/// Latency and losses measured with the secure probe packets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecureProbingSubStats {
    pub latency: Stat<Summary<Latency>>,
    pub byte_loss: Stat<Summary<Ratio>>,
    pub packet_loss: Stat<Summary<Ratio>>,
    pub num_updates: u64,
}

impl SecureProbingSubStats {
    pub const fn absent() -> Self {
        Self {
            latency: Stat::absent(),
            byte_loss: Stat::absent(),
            packet_loss: Stat::absent(),
            num_updates: 0,
        }
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.latency == other.latency
            && self.byte_loss == other.byte_loss
            && self.packet_loss == other.packet_loss
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecureProbingBuilder {
    latency: SummaryTracker<Latency>,
    byte_loss: SummaryTracker<Ratio>,
    packet_loss: SummaryTracker<Ratio>,
    num_updates: u64,
}

impl SecureProbingBuilder {
    pub fn collect_latency(&mut self, latency: Latency, timestamp: Instant) -> &mut Self {
        self.latency.collect(latency, timestamp);
        self
    }

    pub fn reset_latency(&mut self, timestamp: Instant) -> &mut Self {
        self.latency.reset(timestamp);
        self
    }

    pub fn collect_byte_loss(&mut self, loss: Ratio, timestamp: Instant) -> &mut Self {
        self.byte_loss.collect(loss, timestamp);
        self
    }

    pub fn reset_byte_loss(&mut self, timestamp: Instant) -> &mut Self {
        self.byte_loss.reset(timestamp);
        self
    }

    pub fn collect_packet_loss(&mut self, loss: Ratio, timestamp: Instant) -> &mut Self {
        self.packet_loss.collect(loss, timestamp);
        self
    }

    pub fn reset_packet_loss(&mut self, timestamp: Instant) -> &mut Self {
        self.packet_loss.reset(timestamp);
        self
    }

    pub fn increment_num_updates(&mut self) -> &mut Self {
        self.num_updates = self.num_updates.saturating_add(1);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.latency.clear();
        self.byte_loss.clear();
        self.packet_loss.clear();
        self
    }

    pub fn build(&self) -> SecureProbingSubStats {
        SecureProbingSubStats {
            latency: self.latency.stat(StatKind::Safe),
            byte_loss: self.byte_loss.stat(StatKind::Safe),
            packet_loss: self.packet_loss.stat(StatKind::Safe),
            num_updates: self.num_updates,
        }
    }
}

/// Statistics of a link regardless of the flows going through it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneralLinkStats {
    pub link: Link,
    pub config: LinkConfigSubStats,
    pub switches: SwitchesSubStats,
    pub lldp_probing: LldpProbingSubStats,
    pub secure_probing: SecureProbingSubStats,
}

impl GeneralLinkStats {
    pub const fn absent(link: Link) -> Self {
        Self {
            link,
            config: LinkConfigSubStats::absent(),
            switches: SwitchesSubStats::absent(),
            lldp_probing: LldpProbingSubStats::absent(),
            secure_probing: SecureProbingSubStats::absent(),
        }
    }

    /// the virtual capacity if configured, the physical one otherwise
    pub fn data_capacity(&self) -> Stat<DataRate> {
        self.config
            .virtual_capacity
            .or(self.config.physical_capacity)
    }

    /// the secure probing latency if known, the LLDP one otherwise
    pub fn latency(&self) -> Stat<Summary<Latency>> {
        self.secure_probing.latency.or(self.lldp_probing.latency)
    }

    pub fn byte_loss(&self) -> Stat<Summary<Ratio>> {
        self.secure_probing.byte_loss
    }

    pub fn packet_loss(&self) -> Stat<Summary<Ratio>> {
        self.secure_probing.packet_loss
    }

    /// what is left of the capacity once `used` is taken out of it.
    ///
    /// ```
    /// # use flowmon_core::{link::Link, node::*, measure::DataRate, stats::*};
    /// # use std::time::Instant;
    /// # let link = Link::new(
    /// #     NodePort::new(NodeId::new(1), PortId::new(1)),
    /// #     NodePort::new(NodeId::new(2), PortId::new(1)),
    /// # );
    /// let mut config = LinkConfigBuilder::default();
    /// config.set_physical_capacity(DataRate::from_bits_per_sec(100.0), Instant::now());
    ///
    /// let mut stats = GeneralLinkStats::absent(link);
    /// stats.config = config.build();
    ///
    /// let used = Stat::new(DataRate::from_bits_per_sec(30.0), None, StatKind::Safe);
    /// assert_eq!(
    ///     stats.available_bandwidth(used).value(),
    ///     DataRate::from_bits_per_sec(70.0),
    /// );
    /// ```
    pub fn available_bandwidth(&self, used: Stat<DataRate>) -> Stat<DataRate> {
        self.data_capacity()
            .combine(used, |capacity, used| Some(capacity.pos_diff(used)))
    }

    /// fraction of the capacity taken by `used`, absent if the capacity is
    /// zero
    pub fn data_utilization(&self, used: Stat<DataRate>) -> Stat<f64> {
        self.data_capacity().combine(used, |capacity, used| {
            let capacity = capacity.bits_per_sec();
            (capacity > 0.0).then(|| used.bits_per_sec() / capacity)
        })
    }

    pub fn total_updates(&self) -> u64 {
        self.config
            .num_updates
            .saturating_add(self.switches.num_updates)
            .saturating_add(self.lldp_probing.num_updates)
            .saturating_add(self.secure_probing.num_updates)
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.link == other.link
            && self.config.has_same_core_stats(&other.config)
            && self.switches.has_same_core_stats(&other.switches)
            && self.lldp_probing.has_same_core_stats(&other.lldp_probing)
            && self.secure_probing.has_same_core_stats(&other.secure_probing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeId, NodePort, PortId};
    use std::time::Duration;

    fn link() -> Link {
        Link::new(
            NodePort::new(NodeId::new(1), PortId::new(1)),
            NodePort::new(NodeId::new(2), PortId::new(1)),
        )
    }

    fn rate(bps: f64) -> Option<DataRate> {
        DataRate::from_bits_per_sec(bps)
    }

    #[test]
    fn virtual_capacity_takes_precedence() {
        let now = Instant::now();
        let mut builder = LinkConfigBuilder::default();
        builder.set_physical_capacity(rate(1_000.0), now);

        let mut stats = GeneralLinkStats::absent(link());
        stats.config = builder.build();
        assert_eq!(stats.data_capacity().value(), rate(1_000.0));
        assert!(stats.data_capacity().is_safe());

        builder.set_virtual_capacity(rate(500.0), now);
        stats.config = builder.build();
        assert_eq!(stats.data_capacity().value(), rate(500.0));
    }

    #[test]
    fn secure_latency_takes_precedence() {
        let now = Instant::now();
        let lldp_latency = Latency::from_duration(Duration::from_millis(5));
        let secure_latency = Latency::from_duration(Duration::from_millis(7));

        let mut lldp = LldpProbingBuilder::default();
        lldp.collect_latency(lldp_latency, now);
        let mut stats = GeneralLinkStats::absent(link());
        stats.lldp_probing = lldp.build();

        let latency = stats.latency();
        assert_eq!(latency.value().unwrap().latest, lldp_latency);
        assert_eq!(latency.kind(), StatKind::Unsafe);

        let mut secure = SecureProbingBuilder::default();
        secure.collect_latency(secure_latency, now);
        stats.secure_probing = secure.build();

        let latency = stats.latency();
        assert_eq!(latency.value().unwrap().latest, secure_latency);
        assert_eq!(latency.kind(), StatKind::Safe);
    }

    #[test]
    fn utilization() {
        let now = Instant::now();
        let mut builder = LinkConfigBuilder::default();
        builder.set_physical_capacity(rate(200.0), now);
        let mut stats = GeneralLinkStats::absent(link());
        stats.config = builder.build();

        let used = Stat::new(rate(50.0), Some(now), StatKind::Safe);
        assert_eq!(stats.data_utilization(used).value(), Some(0.25));

        let over = Stat::new(rate(300.0), Some(now), StatKind::Safe);
        assert_eq!(stats.available_bandwidth(over).value(), Some(DataRate::ZERO));

        builder.set_physical_capacity(rate(0.0), now);
        stats.config = builder.build();
        assert!(!stats.data_utilization(used).is_present());
    }

    #[test]
    fn total_updates_saturate() {
        let mut stats = GeneralLinkStats::absent(link());
        stats.config.num_updates = u64::MAX;
        stats.switches.num_updates = 3;
        assert_eq!(stats.total_updates(), u64::MAX);
    }

    #[test]
    fn core_stats_ignore_update_counters() {
        let mut a = GeneralLinkStats::absent(link());
        let b = GeneralLinkStats::absent(link());
        a.secure_probing.num_updates = 4;
        assert!(a.has_same_core_stats(&b));

        let mut builder = SecureProbingBuilder::default();
        builder.collect_packet_loss(Ratio::ZERO, Instant::now());
        a.secure_probing = builder.build();
        assert!(!a.has_same_core_stats(&b));
    }
}
