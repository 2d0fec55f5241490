//! Time abstraction for the scheduler tick and the background worker.
//!
//! Every component takes "now" as an argument or through a `TimeSource`, so
//! interval and timeout behavior is testable with `MockTime`.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Platform-agnostic monotonic time source.
///
/// # Example
///
/// ```
/// use pico_trail_gcs::core::traits::{MockTime, TimeSource};
///
/// fn tick_due<T: TimeSource>(time: &T, last_us: u64) -> bool {
///     time.elapsed_since(last_us) >= 20_000 // 50Hz
/// }
///
/// let time = MockTime::new();
/// time.advance(25_000);
/// assert!(tick_due(&time, 0));
/// ```
pub trait TimeSource: Clone + Send + Sync {
    /// Returns current time in milliseconds since system start.
    fn now_ms(&self) -> u64;

    /// Returns current time in microseconds since system start.
    fn now_us(&self) -> u64;

    /// Returns elapsed time in microseconds since a reference point.
    ///
    /// Uses saturating subtraction to handle potential overflow.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

/// Monotonic time source backed by `std::time::Instant`.
///
/// Time zero is the moment the `StdTime` was created; clones share the epoch.
#[derive(Clone, Copy, Debug)]
pub struct StdTime {
    epoch: Instant,
}

impl StdTime {
    /// Creates a time source whose zero is "now".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StdTime {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}

/// Mock time source for testing with controllable time advancement.
///
/// Clones share the same clock, so a test can hand one clone to a worker
/// thread and advance time from the test body.
///
/// # Example
///
/// ```
/// use pico_trail_gcs::core::traits::{MockTime, TimeSource};
///
/// let time = MockTime::new();
/// assert_eq!(time.now_us(), 0);
///
/// time.advance(1000); // Advance 1ms
/// assert_eq!(time.now_us(), 1000);
/// assert_eq!(time.now_ms(), 1);
/// ```
#[derive(Clone, Default, Debug)]
pub struct MockTime {
    current_us: Arc<AtomicU64>,
}

impl MockTime {
    /// Creates a new `MockTime` starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `MockTime` starting at the specified time.
    pub fn with_initial(us: u64) -> Self {
        Self {
            current_us: Arc::new(AtomicU64::new(us)),
        }
    }

    /// Sets the current time to an absolute value.
    pub fn set(&self, us: u64) {
        self.current_us.store(us, Ordering::SeqCst);
    }

    /// Sets the current time in milliseconds.
    pub fn set_ms(&self, ms: u64) {
        self.set(ms * 1000);
    }

    /// Advances the current time by the specified amount.
    pub fn advance(&self, us: u64) {
        self.current_us.fetch_add(us, Ordering::SeqCst);
    }

    /// Advances the current time by whole milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(ms * 1000);
    }
}

impl TimeSource for MockTime {
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }

    fn now_us(&self) -> u64 {
        self.current_us.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_time_initial_value() {
        let time = MockTime::new();
        assert_eq!(time.now_us(), 0);
        assert_eq!(time.now_ms(), 0);
    }

    #[test]
    fn mock_time_with_initial() {
        let time = MockTime::with_initial(5_000_000);
        assert_eq!(time.now_ms(), 5000);
    }

    #[test]
    fn mock_time_clones_share_clock() {
        let time = MockTime::new();
        let other = time.clone();
        time.advance_ms(250);
        assert_eq!(other.now_ms(), 250);

        other.set_ms(1000);
        assert_eq!(time.now_us(), 1_000_000);
    }

    #[test]
    fn mock_time_elapsed_since_saturates() {
        let time = MockTime::new();
        time.set(1_000);
        assert_eq!(time.elapsed_since(300), 700);
        assert_eq!(time.elapsed_since(5_000), 0);
    }

    #[test]
    fn mock_time_ms_conversion() {
        let time = MockTime::new();
        time.set(1_999);
        assert_eq!(time.now_ms(), 1);

        time.set(2_000);
        assert_eq!(time.now_ms(), 2);
    }

    #[test]
    fn std_time_is_monotonic() {
        let time = StdTime::new();
        let a = time.now_us();
        let b = time.now_us();
        assert!(b >= a);
    }
}
