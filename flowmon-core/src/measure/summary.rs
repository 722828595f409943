use super::Measure;
use crate::defaults::DEFAULT_WINDOW_SIZE;
use std::{collections::VecDeque, fmt, marker::PhantomData};

/// A statistical summary of the values of a [`SummaryWindow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary<M> {
    pub latest: M,
    pub mean: M,
    pub std_dev: M,
}

impl<M: Measure> Summary<M> {
    /// a summary of a single value, with no deviation.
    pub fn single(value: M) -> Self {
        Self {
            latest: value,
            mean: value,
            std_dev: M::from_raw(0.0).unwrap_or(value),
        }
    }

    pub fn with_mean(self, mean: M) -> Self {
        Self { mean, ..self }
    }
}

impl<M: fmt::Display> fmt::Display for Summary<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{latest: {}, mean: {}, std_dev: {}}}",
            self.latest, self.mean, self.std_dev
        )
    }
}

/// Keeps the most recent values of a measure, up to a fixed size.
///
/// ```
/// # use flowmon_core::measure::{Latency, SummaryWindow};
/// # use std::time::Duration;
/// let mut window = SummaryWindow::<Latency>::new(2);
/// assert!(window.summary().is_none());
///
/// window.push(Latency::from_duration(Duration::from_millis(10)));
/// window.push(Latency::from_duration(Duration::from_millis(20)));
/// window.push(Latency::from_duration(Duration::from_millis(30)));
///
/// let summary = window.summary().unwrap();
/// assert_eq!(summary.latest.into_duration(), Duration::from_millis(30));
/// assert_eq!(summary.mean.into_duration(), Duration::from_millis(25));
/// ```
#[derive(Debug, Clone)]
pub struct SummaryWindow<M> {
    values: VecDeque<f64>,
    capacity: usize,
    _measure: PhantomData<M>,
}

impl<M: Measure> SummaryWindow<M> {
    /// a window of `capacity` values. A capacity of `0` is raised to `1`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            _measure: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: M) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value.into_raw());
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn summary(&self) -> Option<Summary<M>> {
        let latest = *self.values.back()?;
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let std_dev = if self.values.len() < 2 {
            0.0
        } else {
            let sq = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (sq / (n - 1.0)).sqrt()
        };

        Some(Summary {
            latest: M::from_raw(latest)?,
            mean: M::from_raw(mean)?,
            std_dev: M::from_raw(std_dev)?,
        })
    }
}

impl<M: Measure> Default for SummaryWindow<M> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
