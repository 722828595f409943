use super::Measure;
use std::{fmt, str::FromStr, time::Duration};

/// The latency is a measure of how much time a packet takes to
/// travel between the two ends of a link.
///
/// Latencies are kept in nanoseconds as floating point values because
/// they are mostly the result of averaging several delays.
///
/// ```
/// # use flowmon_core::measure::Latency;
/// # use std::time::Duration;
/// let latency = Latency::from_duration(Duration::from_micros(1_500));
/// assert_eq!(latency.to_string(), "1.5ms");
/// assert_eq!(latency.as_nanos(), 1_500_000.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Latency(f64);

impl Latency {
    /// The `0` latency. I.e. no latency.
    ///
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration.as_nanos() as f64)
    }

    /// Returns `None` if `nanos` is negative, infinite or NaN.
    pub fn from_nanos(nanos: f64) -> Option<Self> {
        (nanos.is_finite() && nanos >= 0.0).then_some(Self(nanos))
    }

    #[inline]
    pub fn as_nanos(self) -> f64 {
        self.0
    }

    /// get the closest [`Duration`], rounded to the nanosecond.
    pub fn into_duration(self) -> Duration {
        Duration::from_nanos(self.0.round() as u64)
    }
}

impl Measure for Latency {
    fn into_raw(self) -> f64 {
        self.0
    }

    fn from_raw(raw: f64) -> Option<Self> {
        Self::from_nanos(raw)
    }
}

impl From<Duration> for Latency {
    fn from(value: Duration) -> Self {
        Self::from_duration(value)
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::time::HumanDuration::new(self.into_duration()).fmt(f)
    }
}

impl FromStr for Latency {
    type Err = crate::time::DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = crate::time::HumanDuration::from_str(s)?;

        Ok(Self::from_duration(duration.into_duration()))
    }
}
