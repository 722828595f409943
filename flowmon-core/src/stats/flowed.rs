use super::{GeneralLinkStats, RateTracker, Stat, StatKind, SummaryTracker};
use crate::{
    link::FlowedLink,
    measure::{DataRate, Latency, PacketRate, Ratio, Summary},
};
use std::time::{Duration, Instant};

/// Rates derived from the switch flow counters of the last sampling round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchCounterSubStats {
    pub data_tx_rate: Stat<DataRate>,
    pub data_rx_rate: Stat<DataRate>,
    pub packet_tx_rate: Stat<PacketRate>,
    pub packet_rx_rate: Stat<PacketRate>,
    pub last_round_duration: Option<Duration>,
    pub num_updates: u64,
}

impl SwitchCounterSubStats {
    pub const fn absent() -> Self {
        Self {
            data_tx_rate: Stat::absent(),
            data_rx_rate: Stat::absent(),
            packet_tx_rate: Stat::absent(),
            packet_rx_rate: Stat::absent(),
            last_round_duration: None,
            num_updates: 0,
        }
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.data_tx_rate == other.data_tx_rate
            && self.data_rx_rate == other.data_rx_rate
            && self.packet_tx_rate == other.packet_tx_rate
            && self.packet_rx_rate == other.packet_rx_rate
    }

    /// the fraction of the transmitted bytes that were not received
    pub fn byte_loss(&self) -> Stat<Summary<Ratio>> {
        self.data_tx_rate.combine(self.data_rx_rate, |tx, rx| {
            loss(tx.bits_per_sec(), tx.pos_diff(rx).bits_per_sec())
        })
    }

    /// the fraction of the transmitted packets that were not received
    pub fn packet_loss(&self) -> Stat<Summary<Ratio>> {
        self.packet_tx_rate.combine(self.packet_rx_rate, |tx, rx| {
            loss(tx.per_sec(), tx.pos_diff(rx).per_sec())
        })
    }
}

fn loss(transmitted: f64, lost: f64) -> Option<Summary<Ratio>> {
    if transmitted <= 0.0 {
        return None;
    }
    Ratio::new(lost / transmitted).ok().map(Summary::single)
}

#[derive(Debug, Clone, Default)]
pub struct SwitchCounterBuilder {
    data_tx_rate: RateTracker<DataRate>,
    data_rx_rate: RateTracker<DataRate>,
    packet_tx_rate: RateTracker<PacketRate>,
    packet_rx_rate: RateTracker<PacketRate>,
    last_round_duration: Option<Duration>,
    num_updates: u64,
}

impl SwitchCounterBuilder {
    pub fn set_data_tx_rate(&mut self, rate: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.data_tx_rate.set(rate, timestamp);
        self
    }

    pub fn set_data_rx_rate(&mut self, rate: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.data_rx_rate.set(rate, timestamp);
        self
    }

    pub fn set_packet_tx_rate(&mut self, rate: Option<PacketRate>, timestamp: Instant) -> &mut Self {
        self.packet_tx_rate.set(rate, timestamp);
        self
    }

    pub fn set_packet_rx_rate(&mut self, rate: Option<PacketRate>, timestamp: Instant) -> &mut Self {
        self.packet_rx_rate.set(rate, timestamp);
        self
    }

    pub fn set_last_round_duration(&mut self, duration: Duration) -> &mut Self {
        self.last_round_duration = Some(duration);
        self
    }

    pub fn increment_num_updates(&mut self) -> &mut Self {
        self.num_updates = self.num_updates.saturating_add(1);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.data_tx_rate.clear();
        self.data_rx_rate.clear();
        self.packet_tx_rate.clear();
        self.packet_rx_rate.clear();
        self.last_round_duration = None;
        self
    }

    pub fn build(&self) -> SwitchCounterSubStats {
        SwitchCounterSubStats {
            data_tx_rate: self.data_tx_rate.stat(StatKind::Safe),
            data_rx_rate: self.data_rx_rate.stat(StatKind::Safe),
            packet_tx_rate: self.packet_tx_rate.stat(StatKind::Safe),
            packet_rx_rate: self.packet_rx_rate.stat(StatKind::Safe),
            last_round_duration: self.last_round_duration,
            num_updates: self.num_updates,
        }
    }
}

/// Statistics computed from the packets captured by the collectors at both
/// ends of a flowed link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySubStats {
    pub latency: Stat<Summary<Latency>>,
    pub byte_loss: Stat<Summary<Ratio>>,
    pub packet_loss: Stat<Summary<Ratio>>,
    /// rate of the bytes that were both transmitted and received
    pub data_throughput: Stat<DataRate>,
    /// rate of the packets that were both transmitted and received
    pub packet_throughput: Stat<PacketRate>,
    pub data_tx_rate: Stat<DataRate>,
    pub data_rx_rate: Stat<DataRate>,
    pub packet_tx_rate: Stat<PacketRate>,
    pub packet_rx_rate: Stat<PacketRate>,
    pub unmatched_data_tx_rate: Stat<DataRate>,
    pub unmatched_data_rx_rate: Stat<DataRate>,
    pub unmatched_packet_tx_rate: Stat<PacketRate>,
    pub unmatched_packet_rx_rate: Stat<PacketRate>,
    pub last_round_duration: Option<Duration>,
    pub last_round_tx_duration: Option<Duration>,
    pub last_round_rx_duration: Option<Duration>,
    pub num_updates: u64,
}

impl TrajectorySubStats {
    pub const fn absent() -> Self {
        Self {
            latency: Stat::absent(),
            byte_loss: Stat::absent(),
            packet_loss: Stat::absent(),
            data_throughput: Stat::absent(),
            packet_throughput: Stat::absent(),
            data_tx_rate: Stat::absent(),
            data_rx_rate: Stat::absent(),
            packet_tx_rate: Stat::absent(),
            packet_rx_rate: Stat::absent(),
            unmatched_data_tx_rate: Stat::absent(),
            unmatched_data_rx_rate: Stat::absent(),
            unmatched_packet_tx_rate: Stat::absent(),
            unmatched_packet_rx_rate: Stat::absent(),
            last_round_duration: None,
            last_round_tx_duration: None,
            last_round_rx_duration: None,
            num_updates: 0,
        }
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.latency == other.latency
            && self.byte_loss == other.byte_loss
            && self.packet_loss == other.packet_loss
            && self.data_throughput == other.data_throughput
            && self.packet_throughput == other.packet_throughput
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrajectoryBuilder {
    latency: SummaryTracker<Latency>,
    byte_loss: SummaryTracker<Ratio>,
    packet_loss: SummaryTracker<Ratio>,
    data_throughput: RateTracker<DataRate>,
    packet_throughput: RateTracker<PacketRate>,
    data_tx_rate: RateTracker<DataRate>,
    data_rx_rate: RateTracker<DataRate>,
    packet_tx_rate: RateTracker<PacketRate>,
    packet_rx_rate: RateTracker<PacketRate>,
    unmatched_data_tx_rate: RateTracker<DataRate>,
    unmatched_data_rx_rate: RateTracker<DataRate>,
    unmatched_packet_tx_rate: RateTracker<PacketRate>,
    unmatched_packet_rx_rate: RateTracker<PacketRate>,
    last_round_duration: Option<Duration>,
    last_round_tx_duration: Option<Duration>,
    last_round_rx_duration: Option<Duration>,
    num_updates: u64,
}

impl TrajectoryBuilder {
    pub fn collect_latencies<I>(&mut self, latencies: I, timestamp: Instant) -> &mut Self
    where
        I: IntoIterator<Item = Latency>,
    {
        self.latency.collect_all(latencies, timestamp);
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

    pub fn set_data_throughput(&mut self, rate: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.data_throughput.set(rate, timestamp);
        self
    }

    pub fn set_packet_throughput(&mut self, rate: Option<PacketRate>, timestamp: Instant) -> &mut Self {
        self.packet_throughput.set(rate, timestamp);
        self
    }

    pub fn set_data_tx_rate(&mut self, rate: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.data_tx_rate.set(rate, timestamp);
        self
    }

    pub fn set_data_rx_rate(&mut self, rate: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.data_rx_rate.set(rate, timestamp);
        self
    }

    pub fn set_packet_tx_rate(&mut self, rate: Option<PacketRate>, timestamp: Instant) -> &mut Self {
        self.packet_tx_rate.set(rate, timestamp);
        self
    }

    pub fn set_packet_rx_rate(&mut self, rate: Option<PacketRate>, timestamp: Instant) -> &mut Self {
        self.packet_rx_rate.set(rate, timestamp);
        self
    }

    pub fn set_unmatched_data_tx_rate(&mut self, rate: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.unmatched_data_tx_rate.set(rate, timestamp);
        self
    }

    pub fn set_unmatched_data_rx_rate(&mut self, rate: Option<DataRate>, timestamp: Instant) -> &mut Self {
        self.unmatched_data_rx_rate.set(rate, timestamp);
        self
    }

    pub fn set_unmatched_packet_tx_rate(
        &mut self,
        rate: Option<PacketRate>,
        timestamp: Instant,
    ) -> &mut Self {
        self.unmatched_packet_tx_rate.set(rate, timestamp);
        self
    }

    pub fn set_unmatched_packet_rx_rate(
        &mut self,
        rate: Option<PacketRate>,
        timestamp: Instant,
    ) -> &mut Self {
        self.unmatched_packet_rx_rate.set(rate, timestamp);
        self
    }

    pub fn set_last_round_durations(
        &mut self,
        round: Duration,
        tx: Duration,
        rx: Duration,
    ) -> &mut Self {
        self.last_round_duration = Some(round);
        self.last_round_tx_duration = Some(tx);
        self.last_round_rx_duration = Some(rx);
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
        self.data_throughput.clear();
        self.packet_throughput.clear();
        self.data_tx_rate.clear();
        self.data_rx_rate.clear();
        self.packet_tx_rate.clear();
        self.packet_rx_rate.clear();
        self.unmatched_data_tx_rate.clear();
        self.unmatched_data_rx_rate.clear();
        self.unmatched_packet_tx_rate.clear();
        self.unmatched_packet_rx_rate.clear();
        self.last_round_duration = None;
        self.last_round_tx_duration = None;
        self.last_round_rx_duration = None;
        self
    }

    pub fn build(&self) -> TrajectorySubStats {
        let safe = StatKind::Safe;
        TrajectorySubStats {
            latency: self.latency.stat(safe),
            byte_loss: self.byte_loss.stat(safe),
            packet_loss: self.packet_loss.stat(safe),
            data_throughput: self.data_throughput.stat(safe),
            packet_throughput: self.packet_throughput.stat(safe),
            data_tx_rate: self.data_tx_rate.stat(safe),
            data_rx_rate: self.data_rx_rate.stat(safe),
            packet_tx_rate: self.packet_tx_rate.stat(safe),
            packet_rx_rate: self.packet_rx_rate.stat(safe),
            unmatched_data_tx_rate: self.unmatched_data_tx_rate.stat(safe),
            unmatched_data_rx_rate: self.unmatched_data_rx_rate.stat(safe),
            unmatched_packet_tx_rate: self.unmatched_packet_tx_rate.stat(safe),
            unmatched_packet_rx_rate: self.unmatched_packet_rx_rate.stat(safe),
            last_round_duration: self.last_round_duration,
            last_round_tx_duration: self.last_round_tx_duration,
            last_round_rx_duration: self.last_round_rx_duration,
            num_updates: self.num_updates,
        }
    }
}

/// Statistics of the traffic of one flow over one link.
///
/// Combines the sampling results with the [`GeneralLinkStats`] of the
/// link. Values from trajectory sampling are preferred, then the general
/// statistics, and the switch counters are used as a last resort.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowedLinkStats {
    pub link: FlowedLink,
    pub switch_counter: SwitchCounterSubStats,
    pub trajectory: TrajectorySubStats,
    pub general: GeneralLinkStats,
}

impl FlowedLinkStats {
    pub fn absent(link: FlowedLink) -> Self {
        let general = GeneralLinkStats::absent(link.link());
        Self {
            link,
            switch_counter: SwitchCounterSubStats::absent(),
            trajectory: TrajectorySubStats::absent(),
            general,
        }
    }

    pub fn latency(&self) -> Stat<Summary<Latency>> {
        self.trajectory.latency.or(self.general.latency())
    }

    pub fn throughput(&self) -> Stat<DataRate> {
        self.trajectory
            .data_throughput
            .or(self.switch_counter.data_rx_rate.with_kind(StatKind::Unsafe))
    }

    pub fn byte_loss(&self) -> Stat<Summary<Ratio>> {
        self.trajectory
            .byte_loss
            .or(self.general.byte_loss())
            .or(self.switch_counter.byte_loss().with_kind(StatKind::Unsafe))
    }

    pub fn packet_loss(&self) -> Stat<Summary<Ratio>> {
        self.trajectory
            .packet_loss
            .or(self.general.packet_loss())
            .or(self.switch_counter.packet_loss().with_kind(StatKind::Unsafe))
    }

    pub fn data_capacity(&self) -> Stat<DataRate> {
        self.general.data_capacity()
    }

    /// the capacity of the link left once the flow throughput is taken out
    pub fn available_bandwidth(&self) -> Stat<DataRate> {
        self.general.available_bandwidth(self.throughput())
    }

    pub fn data_utilization(&self) -> Stat<f64> {
        self.general.data_utilization(self.throughput())
    }

    pub fn total_updates(&self) -> u64 {
        self.switch_counter
            .num_updates
            .saturating_add(self.trajectory.num_updates)
            .saturating_add(self.general.total_updates())
    }

    pub fn has_same_core_stats(&self, other: &Self) -> bool {
        self.link == other.link
            && self.switch_counter.has_same_core_stats(&other.switch_counter)
            && self.trajectory.has_same_core_stats(&other.trajectory)
            && self.general.has_same_core_stats(&other.general)
    }
}
