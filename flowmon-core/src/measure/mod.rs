mod data_rate;
mod hysteresis;
mod latency;
mod ratio;
mod summary;

pub use self::{
    data_rate::{DataRate, DataRateParseError, PacketRate},
    hysteresis::{HysteresisError, Hysteresible},
    latency::Latency,
    ratio::{Ratio, RatioError, RatioParseError},
    summary::{Summary, SummaryWindow},
};

/// A measured quantity that can be smoothed and summarised as a raw `f64`.
///
/// `from_raw` returns `None` for values the measure cannot represent
/// (NaN, negative values, out of range ratios...).
pub trait Measure: Copy {
    fn into_raw(self) -> f64;

    fn from_raw(raw: f64) -> Option<Self>;
}
