//! Turns sampling results into sub-statistics updates.

use super::{
    CapturedTraffic, PacketSummary, SwitchCounterBuilder, SwitchCounterSample, TrajectoryBuilder,
    TrajectorySample,
};
use crate::{
    measure::{DataRate, Latency, PacketRate, Ratio},
    time::Timed,
};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Update the switch counter statistics of a flowed link.
///
/// A sample without results clears the statistics. Otherwise the
/// transmission rates are the counts of the source sampling entry and the
/// reception rates are the counts of the destination sampling entry, both
/// over the measured sampling duration.
pub fn calc_switch_counter(builder: &mut SwitchCounterBuilder, sample: &SwitchCounterSample) {
    let Some(results) = sample.results() else {
        log::trace!(
            "Resetting switch-counter sub-statistics for flowed-link {}",
            sample.link()
        );
        builder.clear().increment_num_updates();
        return;
    };

    log::trace!(
        "Calculating switch-counter sub-statistics for flowed-link {}",
        sample.link()
    );

    let duration = results.params.duration;
    let src = &results.src;
    let dest = &results.dest;
    if src.value.byte_count.is_none() || src.value.packet_count.is_none() {
        log::trace!(
            "flow counters are not fully supported in switch {}",
            sample.link().src_node()
        );
    }
    if dest.value.byte_count.is_none() || dest.value.packet_count.is_none() {
        log::trace!(
            "flow counters are not fully supported in switch {}",
            sample.link().dest_node()
        );
    }

    builder
        .set_data_tx_rate(data_rate(src.value.byte_count, duration), src.timestamp)
        .set_data_rx_rate(data_rate(dest.value.byte_count, duration), dest.timestamp)
        .set_packet_tx_rate(packet_rate(src.value.packet_count, duration), src.timestamp)
        .set_packet_rx_rate(packet_rate(dest.value.packet_count, duration), dest.timestamp)
        .set_last_round_duration(duration)
        .increment_num_updates();
}

fn data_rate(bytes: Option<u64>, duration: Duration) -> Option<DataRate> {
    bytes.and_then(|bytes| DataRate::from_bytes(bytes, duration))
}

fn packet_rate(packets: Option<u64>, duration: Duration) -> Option<PacketRate> {
    packets.and_then(|packets| PacketRate::from_packets(packets, duration))
}

#[derive(Default)]
struct PacketTimes {
    src: Vec<Instant>,
    dest: Vec<Instant>,
}

#[derive(Default)]
struct Totals {
    bytes: u64,
    packets: u64,
}

impl Totals {
    fn count(&mut self, summary: &PacketSummary) {
        self.bytes = self.bytes.saturating_add(u64::from(summary.length));
        self.packets = self.packets.saturating_add(1);
    }
}

/// Update the trajectory statistics of a flowed link.
///
/// The packets captured at the source are correlated with the identical
/// packets captured at the destination, in capture order. A packet
/// received before it was sent counts as lost.
pub fn calc_trajectory(builder: &mut TrajectoryBuilder, sample: &TrajectorySample) {
    let Some(results) = sample.results() else {
        log::trace!(
            "Resetting trajectory sub-statistics for flowed-link {}",
            sample.link()
        );
        builder.clear().increment_num_updates();
        return;
    };

    log::trace!(
        "Calculating trajectory sub-statistics for flowed-link {}",
        sample.link()
    );

    let mut transmitted = Totals::default();
    let mut received = Totals::default();
    let mut correct = Totals::default();

    let mut index: HashMap<PacketSummary, usize> = HashMap::new();
    let mut packets: Vec<(PacketSummary, PacketTimes)> = Vec::new();

    for summary in &results.src.summaries {
        let slot = *index.entry(summary.value).or_insert_with(|| {
            packets.push((summary.value, PacketTimes::default()));
            packets.len() - 1
        });
        packets[slot].1.src.push(summary.timestamp);
        transmitted.count(&summary.value);
    }

    for summary in &results.dest.summaries {
        if let Some(slot) = index.get(&summary.value) {
            packets[*slot].1.dest.push(summary.timestamp);
        }
        received.count(&summary.value);
    }

    let mut delays = Vec::new();
    let mut correct_dest_times = Vec::new();
    for (summary, times) in &packets {
        for (src_time, dest_time) in times.src.iter().zip(&times.dest) {
            match dest_time.checked_duration_since(*src_time) {
                Some(delay) => {
                    correct.count(summary);
                    delays.push(Latency::from_duration(delay));
                    correct_dest_times.push(*dest_time);
                }
                None => {
                    log::warn!(
                        "Found negative delay of {:?} in trajectory sample for flowed-link {}",
                        src_time.duration_since(*dest_time),
                        sample.link()
                    );
                }
            }
        }
    }

    let collection = results.collection_duration;
    let tx_duration = tight_duration(summary_times(&results.src)).unwrap_or(collection);
    let rx_duration = tight_duration(summary_times(&results.dest)).unwrap_or(collection);
    let correct_duration = tight_duration(correct_dest_times.iter().copied()).unwrap_or(collection);

    let at = results.finish_time;

    match Ratio::of(transmitted.bytes.saturating_sub(correct.bytes), transmitted.bytes) {
        Some(loss) => builder.collect_byte_loss(loss, at),
        None => builder.reset_byte_loss(at),
    };
    match Ratio::of(
        transmitted.packets.saturating_sub(correct.packets),
        transmitted.packets,
    ) {
        Some(loss) => builder.collect_packet_loss(loss, at),
        None => builder.reset_packet_loss(at),
    };
    if delays.is_empty() {
        builder.reset_latency(at);
    } else {
        builder.collect_latencies(delays, at);
    }

    let unmatched_src = &results.src;
    let unmatched_dest = &results.dest;
    builder
        .set_data_throughput(DataRate::from_bytes(correct.bytes, correct_duration), at)
        .set_packet_throughput(PacketRate::from_packets(correct.packets, correct_duration), at)
        .set_data_tx_rate(DataRate::from_bytes(transmitted.bytes, tx_duration), at)
        .set_data_rx_rate(DataRate::from_bytes(received.bytes, rx_duration), at)
        .set_packet_tx_rate(PacketRate::from_packets(transmitted.packets, tx_duration), at)
        .set_packet_rx_rate(PacketRate::from_packets(received.packets, rx_duration), at)
        .set_unmatched_data_tx_rate(
            DataRate::from_bytes(unmatched_src.unmatched_bytes, tx_duration),
            at,
        )
        .set_unmatched_data_rx_rate(
            DataRate::from_bytes(unmatched_dest.unmatched_bytes, rx_duration),
            at,
        )
        .set_unmatched_packet_tx_rate(
            PacketRate::from_packets(unmatched_src.unmatched_packets, tx_duration),
            at,
        )
        .set_unmatched_packet_rx_rate(
            PacketRate::from_packets(unmatched_dest.unmatched_packets, rx_duration),
            at,
        )
        .set_last_round_durations(collection, tx_duration, rx_duration)
        .increment_num_updates();
}

fn summary_times(traffic: &CapturedTraffic) -> impl Iterator<Item = Instant> + '_ {
    traffic.summaries.iter().map(|summary: &Timed<PacketSummary>| summary.timestamp)
}

/// the span between the first and the last instant, `None` if there are
/// fewer than two instants or the span is empty
fn tight_duration<I>(times: I) -> Option<Duration>
where
    I: IntoIterator<Item = Instant>,
{
    let mut times = times.into_iter();
    let first = times.next()?;
    let last = times.last()?;
    let span = last.saturating_duration_since(first);
    (!span.is_zero()).then_some(span)
}
