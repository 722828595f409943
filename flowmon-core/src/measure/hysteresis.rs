use crate::defaults::DEFAULT_THRESHOLD_FACTOR;
use thiserror::Error;

/// A value that is only replaced when the new value differs from the
/// current one by more than a relative threshold.
///
/// The threshold is `old * factor` on each side of the current value.
/// NaN is used as the "no value" marker: it always gives way to a number
/// and a number always gives way to NaN.
///
/// ```
/// # use flowmon_core::measure::Hysteresible;
/// let mut value = Hysteresible::default();
/// assert!(value.value().is_nan());
///
/// assert!(value.update(100.0));
/// // within 5% of 100: ignored
/// assert!(!value.update(104.0));
/// assert_eq!(value.value(), 100.0);
/// // outside of the threshold
/// assert!(value.update(106.0));
/// assert_eq!(value.value(), 106.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresible {
    factor: f64,
    value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("hysteresis threshold factor must be finite and non-negative, got {0}")]
pub struct HysteresisError(f64);

impl Hysteresible {
    pub fn new(factor: f64) -> Result<Self, HysteresisError> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(HysteresisError(factor));
        }

        Ok(Self {
            factor,
            value: f64::NAN,
        })
    }

    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// feed a new value, returns `true` if the current value was replaced.
    pub fn update(&mut self, new: f64) -> bool {
        let replace = should_replace(self.value, new, self.factor);
        if replace {
            self.value = new;
        }
        replace
    }

    pub fn reset(&mut self) {
        self.value = f64::NAN;
    }
}

impl Default for Hysteresible {
    fn default() -> Self {
        Self {
            factor: DEFAULT_THRESHOLD_FACTOR,
            value: f64::NAN,
        }
    }
}

fn should_replace(old: f64, new: f64, factor: f64) -> bool {
    if old.is_nan() || new.is_nan() {
        return !(old.is_nan() && new.is_nan());
    }
    if old.is_infinite() || new.is_infinite() {
        return old != new;
    }

    let lower = old - old * factor;
    let upper = old + old * factor;
    new < lower || upper < new
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_factors() {
        assert!(Hysteresible::new(-0.1).is_err());
        assert!(Hysteresible::new(f64::NAN).is_err());
        assert!(Hysteresible::new(f64::INFINITY).is_err());
        assert!(Hysteresible::new(0.0).is_ok());
    }

    #[test]
    fn negative_values_are_always_replaced() {
        // the thresholds are inverted below zero
        let mut value = Hysteresible::default();
        assert!(value.update(-100.0));
        assert!(value.update(-100.0));
        assert!(value.update(-101.0));
        assert_eq!(value.value(), -101.0);

        assert!(value.update(0.0));
        assert!(!value.update(0.0));
    }

    #[test]
    fn nan_rules() {
        let mut value = Hysteresible::default();

        assert!(!value.update(f64::NAN), "NaN does not replace NaN");
        assert!(value.update(1.0));
        assert!(value.update(f64::NAN));
        assert!(value.value().is_nan());
    }

    #[test]
    fn infinity_rules() {
        let mut value = Hysteresible::default();
        value.update(1.0);

        assert!(value.update(f64::INFINITY));
        assert!(!value.update(f64::INFINITY));
        assert!(value.update(f64::NEG_INFINITY));
        assert!(value.update(5.0));
    }

    #[test]
    fn threshold_is_relative_to_current_value() {
        let mut value = Hysteresible::new(0.1).unwrap();
        value.update(200.0);

        assert!(!value.update(180.0));
        assert!(!value.update(220.0));
        assert!(value.update(179.0));
        assert_eq!(value.value(), 179.0);
    }

    #[test]
    fn zero_factor_replaces_on_any_change() {
        let mut value = Hysteresible::new(0.0).unwrap();
        value.update(1.0);
        assert!(!value.update(1.0));
        assert!(value.update(1.000_001));
    }

    #[test]
    fn reset() {
        let mut value = Hysteresible::default();
        value.update(3.0);
        value.reset();
        assert!(value.value().is_nan());
    }
}
