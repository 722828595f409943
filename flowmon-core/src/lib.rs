/*!
Building blocks of a link sampling monitor for software defined networks.

Every link of the network is sampled, one flow at a time, by installing a
pair of counting entries at both of its ends for the duration of a round.
The counters reported when those entries are removed, and optionally the
packets mirrored to a collector, are turned into per link statistics:
throughput, packet loss and latency.

* [`sampling`] decides which flowed links are sampled together and keeps
  track of the results of a round;
* [`protocol`] is what is written to, and read from, the switches;
* [`stats`] turns the results into smoothed link statistics.
*/

pub mod defaults;
pub mod demux;
pub mod flow;
pub mod link;
pub mod measure;
pub mod node;
pub mod protocol;
pub mod sampling;
pub mod stats;
pub mod time;
