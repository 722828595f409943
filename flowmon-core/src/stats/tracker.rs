use super::{Stat, StatKind};
use crate::{
    defaults::DEFAULT_WINDOW_SIZE,
    measure::{Hysteresible, Measure, Summary, SummaryWindow},
};
use std::{marker::PhantomData, time::Instant};

/// Tracks a windowed summary of a measure, smoothing its mean with a
/// [`Hysteresible`].
#[derive(Debug, Clone)]
pub struct SummaryTracker<M> {
    window: SummaryWindow<M>,
    mean: Hysteresible,
    timestamp: Option<Instant>,
}

impl<M: Measure> SummaryTracker<M> {
    pub fn new(window_size: usize, mean: Hysteresible) -> Self {
        Self {
            window: SummaryWindow::new(window_size),
            mean,
            timestamp: None,
        }
    }

    pub fn collect(&mut self, value: M, timestamp: Instant) {
        self.window.push(value);
        self.refresh(timestamp);
    }

    /// collect a batch of values measured at the same time.
    ///
    /// Nothing changes, including the timestamp, if the batch is empty.
    pub fn collect_all<I>(&mut self, values: I, timestamp: Instant)
    where
        I: IntoIterator<Item = M>,
    {
        let mut pushed = false;
        for value in values {
            self.window.push(value);
            pushed = true;
        }
        if pushed {
            self.refresh(timestamp);
        }
    }

    /// forget the collected values, the statistic becomes absent as of
    /// `timestamp`.
    pub fn reset(&mut self, timestamp: Instant) {
        self.window.clear();
        self.refresh(timestamp);
    }

    /// forget everything, including when the statistic was last updated
    pub fn clear(&mut self) {
        self.window.clear();
        self.mean.reset();
        self.timestamp = None;
    }

    fn refresh(&mut self, timestamp: Instant) {
        let mean = self
            .window
            .summary()
            .map(|summary| summary.mean.into_raw())
            .unwrap_or(f64::NAN);
        self.mean.update(mean);
        self.timestamp = Some(timestamp);
    }

    pub fn stat(&self, kind: StatKind) -> Stat<Summary<M>> {
        let summary = self.window.summary().map(|summary| {
            match M::from_raw(self.mean.value()) {
                Some(mean) => summary.with_mean(mean),
                None => summary,
            }
        });
        Stat::new(summary, self.timestamp, kind)
    }
}

impl<M: Measure> Default for SummaryTracker<M> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, Hysteresible::default())
    }
}

/// Tracks the latest value of a rate, smoothed with a [`Hysteresible`].
#[derive(Debug, Clone)]
pub struct RateTracker<M> {
    value: Hysteresible,
    timestamp: Option<Instant>,
    _measure: PhantomData<M>,
}

impl<M: Measure> RateTracker<M> {
    pub fn new(value: Hysteresible) -> Self {
        Self {
            value,
            timestamp: None,
            _measure: PhantomData,
        }
    }

    /// a tracker that keeps every new value
    pub fn exact() -> Self {
        Self::new(Hysteresible::new(0.0).unwrap_or_default())
    }

    pub fn set(&mut self, value: Option<M>, timestamp: Instant) {
        self.value.update(value.map(M::into_raw).unwrap_or(f64::NAN));
        self.timestamp = Some(timestamp);
    }

    pub fn clear(&mut self) {
        self.value.reset();
        self.timestamp = None;
    }

    pub fn stat(&self, kind: StatKind) -> Stat<M> {
        Stat::new(M::from_raw(self.value.value()), self.timestamp, kind)
    }
}

impl<M: Measure> Default for RateTracker<M> {
    fn default() -> Self {
        Self::new(Hysteresible::default())
    }
}
