use std::time::Duration;

/// Default relative threshold under which a new value does not replace the
/// current value of a [`Hysteresible`].
///
/// ```
/// # use flowmon_core::defaults::*;
/// assert_eq!(DEFAULT_THRESHOLD_FACTOR, 0.05);
/// ```
///
/// [`Hysteresible`]: crate::measure::Hysteresible
pub const DEFAULT_THRESHOLD_FACTOR: f64 = 0.05;

/// Default number of samples kept by a [`SummaryWindow`].
///
/// [`SummaryWindow`]: crate::measure::SummaryWindow
pub const DEFAULT_WINDOW_SIZE: usize = 3;

/// Default lower bound of the random sampling phase duration.
pub const DEFAULT_MIN_SAMPLING_ROUND_DURATION: Duration = Duration::from_secs(1);

/// Default upper bound of the random sampling phase duration.
pub const DEFAULT_MAX_SAMPLING_ROUND_DURATION: Duration = Duration::from_secs(2);

/// Default wait between the flow installation and the first tag update.
///
/// This gives the switches time to finish programming the sampling
/// entries.
pub const DEFAULT_PRE_SAMPLING_EXCESS_DURATION: Duration = Duration::from_secs(1);

/// Default wait after the second tag update, so that the packets tagged
/// with the first tag can finish traversing the links.
pub const DEFAULT_POST_SAMPLING_EXCESS_DURATION: Duration = Duration::from_millis(500);

/// Default capacity of every flowed-link aggregate.
pub const DEFAULT_MAX_SIMULTANEOUS_SAMPLINGS: usize = 1;

/// How long the scheduler sleeps when there is nothing to sample.
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// The first VLAN id of the sampling tag pool.
pub const FIRST_SAMPLING_VLAN_TAG: u16 = 4094 - 7;

/// The last VLAN id of the sampling tag pool.
pub const LAST_SAMPLING_VLAN_TAG: u16 = 4094;
