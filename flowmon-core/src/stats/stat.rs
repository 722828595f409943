use crate::time::Timed;
use std::{fmt, time::Instant};

/// How much a statistic can be trusted.
///
/// `Safe` values come from measurements the switches cannot tamper with
/// (secure probing, trajectory sampling, configuration). `Unsafe` values are
/// estimations or reports that are taken at face value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatKind {
    Safe,
    Unsafe,
}

/// A possibly absent statistic value, when it was last updated and how
/// much it can be trusted.
///
/// An absent value is always [`StatKind::Unsafe`]. Two statistics are equal
/// if they hold the same value and kind, whatever their timestamps.
///
/// ```
/// # use flowmon_core::stats::{Stat, StatKind};
/// # use std::time::Instant;
/// let now = Instant::now();
/// let a = Stat::new(Some(2.0), Some(now), StatKind::Safe);
/// let b = Stat::new(Some(3.0), Some(now), StatKind::Unsafe);
///
/// let sum = a.combine(b, |a, b| Some(a + b));
/// assert_eq!(sum.value(), Some(5.0));
/// assert_eq!(sum.kind(), StatKind::Unsafe);
///
/// let absent: Stat<f64> = Stat::new(None, Some(now), StatKind::Safe);
/// assert_eq!(absent.kind(), StatKind::Unsafe);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Stat<V> {
    value: Option<V>,
    timestamp: Option<Instant>,
    kind: StatKind,
}

impl<V> Stat<V> {
    pub const fn absent() -> Self {
        Self {
            value: None,
            timestamp: None,
            kind: StatKind::Unsafe,
        }
    }

    pub fn new(value: Option<V>, timestamp: Option<Instant>, kind: StatKind) -> Self {
        let kind = if value.is_some() {
            kind
        } else {
            StatKind::Unsafe
        };
        Self {
            value,
            timestamp,
            kind,
        }
    }

    pub fn of_timed(timed: Timed<Option<V>>, kind: StatKind) -> Self {
        Self::new(timed.value, Some(timed.timestamp), kind)
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    #[inline]
    pub fn is_safe(&self) -> bool {
        self.kind == StatKind::Safe
    }

    #[inline]
    pub fn kind(&self) -> StatKind {
        self.kind
    }

    #[inline]
    pub fn timestamp(&self) -> Option<Instant> {
        self.timestamp
    }

    pub fn as_ref(&self) -> Option<&V> {
        self.value.as_ref()
    }

    #[must_use = "function returns the modified stat"]
    pub fn with_kind(self, kind: StatKind) -> Self {
        Self::new(self.value, self.timestamp, kind)
    }

    /// `self` if present, `other` otherwise
    #[must_use = "function returns the selected stat"]
    pub fn or(self, other: Self) -> Self {
        if self.is_present() { self } else { other }
    }

    pub fn map<U, F>(self, f: F) -> Stat<U>
    where
        F: FnOnce(V) -> Option<U>,
    {
        Stat::new(self.value.and_then(f), self.timestamp, self.kind)
    }

    /// combine two statistics into one.
    ///
    /// The result is safe only if both are safe, its timestamp is the most
    /// recent of the two and its value is absent if either value is absent.
    pub fn combine<U, W, F>(self, other: Stat<U>, f: F) -> Stat<W>
    where
        F: FnOnce(V, U) -> Option<W>,
    {
        let kind = if self.is_safe() && other.is_safe() {
            StatKind::Safe
        } else {
            StatKind::Unsafe
        };
        let timestamp = self.timestamp.max(other.timestamp);
        let value = match (self.value, other.value) {
            (Some(a), Some(b)) => f(a, b),
            _ => None,
        };
        Stat::new(value, timestamp, kind)
    }
}

impl<V: Copy> Stat<V> {
    #[inline]
    pub fn value(&self) -> Option<V> {
        self.value
    }
}

impl<V> Default for Stat<V> {
    fn default() -> Self {
        Self::absent()
    }
}

impl<V: PartialEq> PartialEq for Stat<V> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.kind == other.kind
    }
}

impl<V: fmt::Display> fmt::Display for Stat<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{value} ({:?})", self.kind),
            None => f.write_str("absent"),
        }
    }
}
