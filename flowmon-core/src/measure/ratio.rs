use super::Measure;
use std::{fmt, str::FromStr};

/// A validated ratio in the range `[0.0, 1.0]`.
///
/// Used for byte and packet loss estimations. `0.0` means nothing was lost
/// and `1.0` means everything was lost.
///
/// # Example
///
/// ```
/// use flowmon_core::measure::Ratio;
///
/// let loss = Ratio::new(0.05).unwrap();
/// assert_eq!(loss.to_string(), "5%");
///
/// let parsed: Ratio = "5%".parse().unwrap();
/// assert_eq!(parsed, loss);
///
/// // 3 lost out of 12
/// assert_eq!(Ratio::of(3, 12).unwrap().value(), 0.25);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);

    /// Create a new validated ratio.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError`] if `ratio` is NaN, negative, or
    /// greater than `1.0`.
    pub fn new(ratio: f64) -> Result<Self, RatioError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(RatioError(ratio));
        }
        Ok(Self(ratio))
    }

    /// `part / total`, or `None` when `total` is `0` or `part > total`.
    pub fn of(part: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        Self::new(part as f64 / total as f64).ok()
    }

    /// Returns the inner `f64` value.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Measure for Ratio {
    fn into_raw(self) -> f64 {
        self.0
    }

    fn from_raw(raw: f64) -> Option<Self> {
        Self::new(raw).ok()
    }
}

impl fmt::Display for Ratio {
    /// Formats as a percentage with up to 2 decimal places.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = self.0 * 100.0;
        if pct.fract() == 0.0 {
            write!(f, "{}%", pct as u64)
        } else {
            write!(f, "{:.2}%", pct)
        }
    }
}

impl FromStr for Ratio {
    type Err = RatioParseError;

    /// Parses a percentage string like `"0%"`, `"5%"`, `"12.30%"`, `"100%"`.
    ///
    /// The `%` suffix is required.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(num) = s.strip_suffix('%') else {
            return Err(RatioParseError::MissingSuffix);
        };
        let pct: f64 = num
            .trim()
            .parse()
            .map_err(|_| RatioParseError::InvalidNumber)?;
        Ratio::new(pct / 100.0).map_err(RatioParseError::OutOfRange)
    }
}

/// Error returned when constructing a [`Ratio`] with a value
/// outside `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("ratio must be in [0.0, 1.0], got {0}")]
pub struct RatioError(f64);

/// Error returned when parsing a [`Ratio`] from a string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RatioParseError {
    /// The string does not end with `%`.
    #[error("expected '%' suffix")]
    MissingSuffix,
    /// The numeric part could not be parsed as a float.
    #[error("invalid number before '%'")]
    InvalidNumber,
    /// The parsed percentage is outside `[0, 100]`.
    #[error("{0}")]
    OutOfRange(#[from] RatioError),
}
