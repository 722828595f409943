use logos::{Lexer, Logos};
use rand_core::Rng;
use std::{fmt, str::FromStr, time};
use thiserror::Error;

/// A value along with the instant it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timed<T> {
    pub value: T,
    pub timestamp: time::Instant,
}

impl<T> Timed<T> {
    pub fn new(value: T, timestamp: time::Instant) -> Self {
        Self { value, timestamp }
    }

    /// timestamp the value with the current instant
    pub fn now(value: T) -> Self {
        Self::new(value, time::Instant::now())
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Timed<U> {
        Timed::new(f(self.value), self.timestamp)
    }
}

/// A [`std::time::Duration`] that can be parsed from and printed to a
/// human readable form.
///
/// The accepted units are `ns`, `us` (or `μs`), `ms`, `s` and `m`. Several
/// components can be chained and are summed up.
///
/// ```
/// # use flowmon_core::time::HumanDuration;
/// # use std::time::Duration;
/// let duration: HumanDuration = "1s 500ms".parse().unwrap();
/// assert_eq!(duration.into_duration(), Duration::from_millis(1_500));
/// assert_eq!(duration.to_string(), "1.5s");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HumanDuration(time::Duration);

/// Error returned when parsing a [`HumanDuration`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("unexpected input in `{input}'")]
    Lexer { input: String },
    #[error("expecting duration to start with a number, cannot parse `{input}'")]
    ExpectedNumber { input: String },
    #[error("expecting a measure after the number in `{input}'")]
    ExpectedMeasure { input: String },
    #[error("number too large in `{input}'")]
    Overflow { input: String },
}

impl HumanDuration {
    pub const fn new(duration: time::Duration) -> Self {
        Self(duration)
    }

    #[inline]
    pub fn into_duration(self) -> time::Duration {
        self.0
    }
}

impl From<time::Duration> for HumanDuration {
    fn from(value: time::Duration) -> Self {
        Self(value)
    }
}

impl From<HumanDuration> for time::Duration {
    fn from(value: HumanDuration) -> Self {
        value.0
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <time::Duration as fmt::Debug>::fmt(&self.0, f)
    }
}

impl FromStr for HumanDuration {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, Token>::new(s);

        let mut total = time::Duration::ZERO;
        let mut components = 0;

        while let Some(next) = lex.next() {
            let number = next.map_err(|()| DurationParseError::Lexer {
                input: s.to_owned(),
            })?;
            if number != Token::Value {
                return Err(DurationParseError::ExpectedNumber {
                    input: s.to_owned(),
                });
            }
            let number: u64 = lex.slice().parse().map_err(|_| DurationParseError::Overflow {
                input: s.to_owned(),
            })?;

            let Some(Ok(measure)) = lex.next() else {
                return Err(DurationParseError::ExpectedMeasure {
                    input: s.to_owned(),
                });
            };
            let duration = match measure {
                Token::NanoSeconds => time::Duration::from_nanos(number),
                Token::MicroSeconds => time::Duration::from_micros(number),
                Token::MilliSeconds => time::Duration::from_millis(number),
                Token::Seconds => time::Duration::from_secs(number),
                Token::Minutes => time::Duration::from_secs(number.saturating_mul(60)),
                Token::Value => {
                    return Err(DurationParseError::ExpectedMeasure {
                        input: s.to_owned(),
                    });
                }
            };
            total = total
                .checked_add(duration)
                .ok_or_else(|| DurationParseError::Overflow {
                    input: s.to_owned(),
                })?;
            components += 1;
        }

        if components == 0 {
            return Err(DurationParseError::Empty);
        }

        Ok(Self(total))
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex("[0-9]+")]
    Value,
}

/// An inclusive range of durations from which the sampling phase length
/// of every round is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationRange {
    min: time::Duration,
    max: time::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "invalid sampling round duration range: minimum value is greater than maximum value ({min:?} > {max:?})"
)]
pub struct DurationRangeError {
    min: time::Duration,
    max: time::Duration,
}

impl DurationRange {
    pub fn new(min: time::Duration, max: time::Duration) -> Result<Self, DurationRangeError> {
        if min > max {
            return Err(DurationRangeError { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> time::Duration {
        self.min
    }

    pub fn max(&self) -> time::Duration {
        self.max
    }

    /// draw a duration uniformly in `[min, max]` with nanosecond granularity.
    ///
    /// ```
    /// # use flowmon_core::time::DurationRange;
    /// # use rand_chacha::ChaChaRng;
    /// # use rand_core::SeedableRng as _;
    /// # use std::time::Duration;
    /// let range = DurationRange::new(Duration::from_secs(1), Duration::from_secs(2)).unwrap();
    /// let mut rng = ChaChaRng::seed_from_u64(7);
    /// let drawn = range.random_duration(&mut rng);
    /// assert!(drawn >= range.min() && drawn <= range.max());
    /// ```
    pub fn random_duration<R: Rng>(&self, rng: &mut R) -> time::Duration {
        let span = (self.max - self.min).as_nanos();
        if span == 0 {
            return self.min;
        }
        let span = u64::try_from(span).unwrap_or(u64::MAX);
        let offset = match span.checked_add(1) {
            Some(bound) => rng.next_u64() % bound,
            None => rng.next_u64(),
        };
        self.min + time::Duration::from_nanos(offset)
    }
}

impl fmt::Display for DurationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            HumanDuration::new(self.min),
            HumanDuration::new(self.max)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaChaRng;
    use rand_core::SeedableRng as _;

    #[test]
    fn logos_lexer() {
        let mut lex = Token::lexer("1ns");

        assert_eq!(lex.next(), Some(Ok(Token::Value)));
        assert_eq!(lex.span(), 0..1);
        assert_eq!(lex.slice(), "1");

        assert_eq!(lex.next(), Some(Ok(Token::NanoSeconds)));
        assert_eq!(lex.span(), 1..3);
        assert_eq!(lex.slice(), "ns");
    }

    #[test]
    fn parse() {
        let HumanDuration(duration) = "123ms".parse().unwrap();
        assert_eq!(duration.as_millis(), 123);

        let HumanDuration(duration) = "1s 2000ms 3000000us".parse().unwrap();
        assert_eq!(duration.as_secs(), 6);

        let HumanDuration(duration) = "2m".parse().unwrap();
        assert_eq!(duration.as_secs(), 120);
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<HumanDuration>(), Err(DurationParseError::Empty));
        assert!(matches!(
            "500".parse::<HumanDuration>(),
            Err(DurationParseError::ExpectedMeasure { .. })
        ));
        assert!(matches!(
            "ms".parse::<HumanDuration>(),
            Err(DurationParseError::ExpectedNumber { .. })
        ));
        assert!(matches!(
            "1h".parse::<HumanDuration>(),
            Err(DurationParseError::Lexer { .. })
        ));
    }

    #[test]
    fn display() {
        assert_eq!(
            HumanDuration::new(time::Duration::from_millis(500)).to_string(),
            "500ms"
        );
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let error =
            DurationRange::new(time::Duration::from_secs(2), time::Duration::from_secs(1))
                .unwrap_err();
        assert!(
            error
                .to_string()
                .starts_with("invalid sampling round duration range")
        );
    }

    #[test]
    fn range_draws_within_bounds() {
        let range =
            DurationRange::new(time::Duration::from_secs(1), time::Duration::from_secs(2))
                .unwrap();
        let mut rng = ChaChaRng::seed_from_u64(42);

        for _ in 0..1_000 {
            let drawn = range.random_duration(&mut rng);
            assert!(drawn >= range.min(), "{drawn:?} below the minimum");
            assert!(drawn <= range.max(), "{drawn:?} above the maximum");
        }
    }

    #[test]
    fn degenerate_range() {
        let one = time::Duration::from_millis(250);
        let range = DurationRange::new(one, one).unwrap();
        let mut rng = ChaChaRng::seed_from_u64(42);
        assert_eq!(range.random_duration(&mut rng), one);
    }
}
