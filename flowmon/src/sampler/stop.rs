use std::{
    sync::{Condvar, Mutex, PoisonError, atomic::AtomicBool},
    time::{Duration, Instant},
};

/// The stop signal of the round loop. Sleeping on it returns as soon as
/// the signal is set.
#[derive(Debug)]
pub(crate) struct Stop {
    stopped: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// use total ordering for the atomic operations to prevent
/// the operations to be reordered by the compiler or the CPU.
const ORDERING: std::sync::atomic::Ordering = std::sync::atomic::Ordering::SeqCst;

/// The Atomic ordering used for `load` like operations
const FETCH_ORDERING: std::sync::atomic::Ordering = ORDERING;

/// The Atomic odering used for `store` like operations
const STORE_ORDERING: std::sync::atomic::Ordering = ORDERING;

impl Stop {
    pub(crate) fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> bool {
        self.stopped.load(FETCH_ORDERING)
    }

    /// set the stop signal and wake up the sleepers
    pub(crate) fn toggle(&self) {
        self.stopped.store(true, STORE_ORDERING);
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_all();
    }

    /// Sleep for `duration` unless the signal is set first.
    ///
    /// Returns `true` if the signal is set.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.get() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = self
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        self.get()
    }
}

impl Default for Stop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    // allow bool assert comparison because we want to highlight
    // what we are actually expecting to have
    #[allow(clippy::bool_assert_comparison)]
    #[test]
    fn default() {
        assert_eq!(Stop::new().get(), false);
        assert_eq!(Stop::default().get(), false);
    }

    #[allow(clippy::bool_assert_comparison)]
    #[test]
    fn toggle() {
        let stop = Stop::new();

        assert_eq!(stop.get(), false);
        stop.toggle();
        assert_eq!(stop.get(), true);
        stop.toggle();
        assert_eq!(stop.get(), true);
    }

    #[test]
    fn sleep_runs_to_completion() {
        let stop = Stop::new();
        let start = Instant::now();
        assert!(!stop.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn toggle_interrupts_sleep() {
        let stop = Arc::new(Stop::new());
        let sleeper = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let start = Instant::now();
                let stopped = stop.sleep(Duration::from_secs(30));
                (stopped, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        stop.toggle();

        let (stopped, elapsed) = sleeper.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(30));
    }
}
