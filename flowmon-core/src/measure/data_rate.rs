use super::Measure;
use logos::{Lexer, Logos};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

/// A rate of data, in bits per second.
///
/// Rates are estimations computed from counters divided by measurement
/// windows, so they are kept as floating point values. A [`DataRate`] is
/// always finite and non-negative.
///
/// # Example
///
/// ```
/// # use flowmon_core::measure::DataRate;
/// # use std::time::Duration;
/// // 125_000 bytes in half a second
/// let rate = DataRate::from_bytes(125_000, Duration::from_millis(500)).unwrap();
/// assert_eq!(rate.to_string(), "2mbps");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DataRate(f64);

impl DataRate {
    pub const ZERO: Self = Self(0.0);

    /// create a rate from a number of bits per second.
    ///
    /// Returns `None` if the value is negative, infinite or NaN.
    pub fn from_bits_per_sec(bps: f64) -> Option<Self> {
        (bps.is_finite() && bps >= 0.0).then_some(Self(bps))
    }

    /// rate of `bytes` transferred during `per`.
    ///
    /// Returns `None` if `per` is zero.
    pub fn from_bytes(bytes: u64, per: Duration) -> Option<Self> {
        let secs = per.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Self::from_bits_per_sec(bytes as f64 * 8.0 / secs)
    }

    #[inline]
    pub fn bits_per_sec(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn bytes_per_sec(self) -> f64 {
        self.0 / 8.0
    }

    /// `self - other` if positive, zero otherwise.
    ///
    /// ```
    /// # use flowmon_core::measure::DataRate;
    /// let a = DataRate::from_bits_per_sec(10.0).unwrap();
    /// let b = DataRate::from_bits_per_sec(25.0).unwrap();
    /// assert_eq!(b.pos_diff(a).bits_per_sec(), 15.0);
    /// assert_eq!(a.pos_diff(b), DataRate::ZERO);
    /// ```
    pub fn pos_diff(self, other: Self) -> Self {
        Self((self.0 - other.0).max(0.0))
    }
}

impl Measure for DataRate {
    fn into_raw(self) -> f64 {
        self.0
    }

    fn from_raw(raw: f64) -> Option<Self> {
        Self::from_bits_per_sec(raw)
    }
}

const K: f64 = 1_000.0;
const M: f64 = 1_000_000.0;
const G: f64 = 1_000_000_000.0;

fn write_scaled(f: &mut fmt::Formatter<'_>, value: f64, unit: &str) -> fmt::Result {
    if value.fract() == 0.0 {
        write!(f, "{}{unit}", value as u64)
    } else {
        write!(f, "{value:.2}{unit}")
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        if v < K {
            write_scaled(f, v, "bps")
        } else if v < M {
            write_scaled(f, v / K, "kbps")
        } else if v < G {
            write_scaled(f, v / M, "mbps")
        } else {
            write_scaled(f, v / G, "gbps")
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum DataRateToken {
    #[token("bps")]
    Bps,
    #[token("kbps")]
    Kbps,
    #[token("mbps")]
    Mbps,
    #[token("gbps")]
    Gbps,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataRateParseError {
    #[error("expecting to parse a number")]
    ExpectedNumber,
    #[error("expecting to parse a unit (bps, kbps, mbps or gbps)")]
    ExpectedUnit,
    #[error("not expecting any other tokens to parse a data rate")]
    TrailingInput,
}

impl FromStr for DataRate {
    type Err = DataRateParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, DataRateToken>::new(s);

        let Some(Ok(DataRateToken::Value)) = lex.next() else {
            return Err(DataRateParseError::ExpectedNumber);
        };
        let number: f64 = lex
            .slice()
            .parse()
            .map_err(|_| DataRateParseError::ExpectedNumber)?;
        let Some(Ok(token)) = lex.next() else {
            return Err(DataRateParseError::ExpectedUnit);
        };
        let bps = match token {
            DataRateToken::Bps => number,
            DataRateToken::Kbps => number * K,
            DataRateToken::Mbps => number * M,
            DataRateToken::Gbps => number * G,
            DataRateToken::Value => return Err(DataRateParseError::ExpectedUnit),
        };

        if lex.next().is_some() {
            return Err(DataRateParseError::TrailingInput);
        }

        Self::from_bits_per_sec(bps).ok_or(DataRateParseError::ExpectedNumber)
    }
}

/// A rate of packets per second.
///
/// ```
/// # use flowmon_core::measure::PacketRate;
/// # use std::time::Duration;
/// let rate = PacketRate::from_packets(300, Duration::from_secs(2)).unwrap();
/// assert_eq!(rate.to_string(), "150pps");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PacketRate(f64);

impl PacketRate {
    pub const ZERO: Self = Self(0.0);

    pub fn from_per_sec(pps: f64) -> Option<Self> {
        (pps.is_finite() && pps >= 0.0).then_some(Self(pps))
    }

    /// Returns `None` if `per` is zero.
    pub fn from_packets(packets: u64, per: Duration) -> Option<Self> {
        let secs = per.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Self::from_per_sec(packets as f64 / secs)
    }

    #[inline]
    pub fn per_sec(self) -> f64 {
        self.0
    }

    pub fn pos_diff(self, other: Self) -> Self {
        Self((self.0 - other.0).max(0.0))
    }
}

impl Measure for PacketRate {
    fn into_raw(self) -> f64 {
        self.0
    }

    fn from_raw(raw: f64) -> Option<Self> {
        Self::from_per_sec(raw)
    }
}

impl fmt::Display for PacketRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.0, "pps")
    }
}
