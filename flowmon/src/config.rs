use flowmon_core::{
    defaults::{
        DEFAULT_MAX_SAMPLING_ROUND_DURATION, DEFAULT_MAX_SIMULTANEOUS_SAMPLINGS,
        DEFAULT_MIN_SAMPLING_ROUND_DURATION, DEFAULT_POST_SAMPLING_EXCESS_DURATION,
        DEFAULT_PRE_SAMPLING_EXCESS_DURATION,
    },
    flow::{Flow, FlowParseError},
    time::{DurationParseError, DurationRange, DurationRangeError, HumanDuration},
};
use log::warn;
use std::{collections::HashMap, num::NonZeroUsize, time::Duration};
use thiserror::Error;

pub const MIN_SAMPLING_ROUND_DURATION_KEY: &str = "min_sampling_round_duration";
pub const MAX_SAMPLING_ROUND_DURATION_KEY: &str = "max_sampling_round_duration";
pub const PRE_SAMPLING_EXCESS_DURATION_KEY: &str = "pre_sampling_excess_duration";
pub const POST_SAMPLING_EXCESS_DURATION_KEY: &str = "post_sampling_excess_duration";
pub const MAX_SIMULTANEOUS_SAMPLINGS_KEY: &str = "max_simultaneous_samplings";
pub const SECURE_PROBE_BASE_FLOW_KEY: &str = "secure_probe_base_flow";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be a positive duration")]
    NonPositiveDuration { key: &'static str },
    #[error(transparent)]
    InvalidRange(#[from] DurationRangeError),
    #[error("{MAX_SIMULTANEOUS_SAMPLINGS_KEY} must be positive")]
    NoSimultaneousSamplings,
    #[error("invalid value for {key}")]
    InvalidDuration {
        key: &'static str,
        #[source]
        source: DurationParseError,
    },
    #[error("invalid value for {key}: `{value}' is not a number")]
    InvalidNumber { key: &'static str, value: String },
    #[error("invalid value for {key}")]
    InvalidFlow {
        key: &'static str,
        #[source]
        source: FlowParseError,
    },
}

/// Timing and capacity of the sampling rounds.
///
/// ```
/// # use flowmon::SamplingConfig;
/// # use std::{collections::HashMap, time::Duration};
/// let params = HashMap::from([
///     ("max_sampling_round_duration".to_owned(), "3s".to_owned()),
///     ("post_sampling_excess_duration".to_owned(), "1s 500ms".to_owned()),
/// ]);
/// let config = SamplingConfig::from_params(&params).unwrap();
/// assert_eq!(config.max_sampling_round_duration(), Duration::from_secs(3));
/// assert_eq!(config.post_sampling_excess_duration(), Duration::from_millis(1_500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingConfig {
    min_sampling_round_duration: Duration,
    max_sampling_round_duration: Duration,
    pre_sampling_excess_duration: Duration,
    post_sampling_excess_duration: Duration,
    max_simultaneous_samplings: usize,
    secure_probe_base_flow: Option<Flow>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_sampling_round_duration: DEFAULT_MIN_SAMPLING_ROUND_DURATION,
            max_sampling_round_duration: DEFAULT_MAX_SAMPLING_ROUND_DURATION,
            pre_sampling_excess_duration: DEFAULT_PRE_SAMPLING_EXCESS_DURATION,
            post_sampling_excess_duration: DEFAULT_POST_SAMPLING_EXCESS_DURATION,
            max_simultaneous_samplings: DEFAULT_MAX_SIMULTANEOUS_SAMPLINGS,
            secure_probe_base_flow: None,
        }
    }
}

impl SamplingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from key/value pairs, every missing key keeps
    /// its default value.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in params {
            match key.as_str() {
                MIN_SAMPLING_ROUND_DURATION_KEY => {
                    config.min_sampling_round_duration =
                        parse_duration(MIN_SAMPLING_ROUND_DURATION_KEY, value)?
                }
                MAX_SAMPLING_ROUND_DURATION_KEY => {
                    config.max_sampling_round_duration =
                        parse_duration(MAX_SAMPLING_ROUND_DURATION_KEY, value)?
                }
                PRE_SAMPLING_EXCESS_DURATION_KEY => {
                    config.pre_sampling_excess_duration =
                        parse_duration(PRE_SAMPLING_EXCESS_DURATION_KEY, value)?
                }
                POST_SAMPLING_EXCESS_DURATION_KEY => {
                    config.post_sampling_excess_duration =
                        parse_duration(POST_SAMPLING_EXCESS_DURATION_KEY, value)?
                }
                MAX_SIMULTANEOUS_SAMPLINGS_KEY => {
                    config.max_simultaneous_samplings =
                        value
                            .trim()
                            .parse()
                            .map_err(|_| ConfigError::InvalidNumber {
                                key: MAX_SIMULTANEOUS_SAMPLINGS_KEY,
                                value: value.clone(),
                            })?
                }
                SECURE_PROBE_BASE_FLOW_KEY => {
                    let flow = value.parse().map_err(|source| ConfigError::InvalidFlow {
                        key: SECURE_PROBE_BASE_FLOW_KEY,
                        source,
                    })?;
                    config.secure_probe_base_flow = Some(flow);
                }
                unknown => warn!("Ignoring unknown sampling configuration key `{unknown}'"),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// bounds of the randomly drawn sampling phase of every round
    pub fn set_sampling_round_duration(mut self, min: Duration, max: Duration) -> Self {
        self.min_sampling_round_duration = min;
        self.max_sampling_round_duration = max;
        self
    }

    pub fn set_pre_sampling_excess_duration(mut self, duration: Duration) -> Self {
        self.pre_sampling_excess_duration = duration;
        self
    }

    pub fn set_post_sampling_excess_duration(mut self, duration: Duration) -> Self {
        self.post_sampling_excess_duration = duration;
        self
    }

    pub fn set_max_simultaneous_samplings(mut self, max: usize) -> Self {
        self.max_simultaneous_samplings = max;
        self
    }

    /// flow of the secure probe packets, no flow containing it can be
    /// sampled
    pub fn set_secure_probe_base_flow(mut self, flow: Flow) -> Self {
        self.secure_probe_base_flow = Some(flow);
        self
    }

    /// Check every value, returns the range of the sampling round durations.
    pub fn validate(&self) -> Result<DurationRange, ConfigError> {
        let durations = [
            (
                MIN_SAMPLING_ROUND_DURATION_KEY,
                self.min_sampling_round_duration,
            ),
            (
                MAX_SAMPLING_ROUND_DURATION_KEY,
                self.max_sampling_round_duration,
            ),
            (
                PRE_SAMPLING_EXCESS_DURATION_KEY,
                self.pre_sampling_excess_duration,
            ),
            (
                POST_SAMPLING_EXCESS_DURATION_KEY,
                self.post_sampling_excess_duration,
            ),
        ];
        if let Some(&(key, _)) = durations.iter().find(|(_, duration)| duration.is_zero()) {
            return Err(ConfigError::NonPositiveDuration { key });
        }
        if self.max_simultaneous_samplings == 0 {
            return Err(ConfigError::NoSimultaneousSamplings);
        }
        Ok(DurationRange::new(
            self.min_sampling_round_duration,
            self.max_sampling_round_duration,
        )?)
    }

    pub fn min_sampling_round_duration(&self) -> Duration {
        self.min_sampling_round_duration
    }

    pub fn max_sampling_round_duration(&self) -> Duration {
        self.max_sampling_round_duration
    }

    pub fn pre_sampling_excess_duration(&self) -> Duration {
        self.pre_sampling_excess_duration
    }

    pub fn post_sampling_excess_duration(&self) -> Duration {
        self.post_sampling_excess_duration
    }

    /// `None` if the configuration was not validated
    pub fn max_simultaneous_samplings(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_simultaneous_samplings)
    }

    pub fn secure_probe_base_flow(&self) -> Option<&Flow> {
        self.secure_probe_base_flow.as_ref()
    }
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<HumanDuration>()
        .map(HumanDuration::into_duration)
        .map_err(|source| ConfigError::InvalidDuration { key, source })
}
