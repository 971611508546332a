//! Time sources for the measurement pipeline.
//!
//! All engine timings are taken from a [Clock] passed in by the caller, never from global state,
//! so tests can substitute a [MockClock] and advance it deterministically.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A source of monotonic nanosecond readings and wall-clock instants.
///
/// The monotonic reading is only meaningful relative to other readings from the same clock
/// instance; use [Clock::elapsed_between] to turn a pair of readings into a [Duration].
pub trait Clock: Send + Sync {
    /// Returns the current monotonic reading, in nanoseconds.
    fn monotonic_nanos(&self) -> u64;

    /// Returns the current wall-clock instant.
    fn wall_now(&self) -> DateTime<Utc>;

    /// Returns the elapsed duration between two monotonic readings taken from this clock.
    /// An inverted pair yields the zero duration.
    fn elapsed_between(&self, start_nanos: u64, end_nanos: u64) -> Duration {
        Duration::from_nanos(end_nanos.saturating_sub(start_nanos))
    }
}

/// The [Clock] implementation backed by the operating system.
pub struct SystemClock {
    /// Monotonic readings are offsets from this instant, captured at construction.
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A [Clock] whose readings only move when test code advances them.
pub struct MockClock {
    nanos: AtomicU64,
    wall: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Constructs a `MockClock` reading zero nanoseconds at the current wall-clock instant.
    pub fn new() -> MockClock {
        MockClock::starting_at(Utc::now())
    }

    /// Constructs a `MockClock` reading zero nanoseconds at the specified wall-clock instant.
    pub fn starting_at(wall: DateTime<Utc>) -> MockClock {
        MockClock {
            nanos: AtomicU64::new(0),
            wall: Mutex::new(wall),
        }
    }

    /// Advances both the monotonic reading and the wall-clock instant by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos.fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
        let mut wall = self.wall.lock().expect("mock clock wall lock");
        *wall = *wall + chrono::Duration::from_std(delta).expect("mock clock advance overflow");
    }
}

impl Default for MockClock {
    fn default() -> Self {
        MockClock::new()
    }
}

impl Clock for MockClock {
    fn monotonic_nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }

    fn wall_now(&self) -> DateTime<Utc> {
        *self.wall.lock().expect("mock clock wall lock")
    }
}

/// A started timing that remembers its start reading.
///
/// The first call to [TimingContext::stop] fixes the elapsed duration; later calls return that
/// same duration even if the clock has advanced since.
pub struct TimingContext {
    clock: Arc<dyn Clock>,
    start_nanos: u64,
    stopped: Option<Duration>,
}

impl TimingContext {
    /// Starts a new timing against the specified clock.
    pub fn start(clock: Arc<dyn Clock>) -> TimingContext {
        let start_nanos = clock.monotonic_nanos();
        TimingContext {
            clock,
            start_nanos,
            stopped: None,
        }
    }

    /// Returns the monotonic reading this timing was started at.
    pub fn start_nanos(&self) -> u64 {
        self.start_nanos
    }

    /// Stops the timing and returns the elapsed duration. Idempotent.
    pub fn stop(&mut self) -> Duration {
        if self.stopped.is_none() {
            let end_nanos = self.clock.monotonic_nanos();
            self.stopped = Some(self.clock.elapsed_between(self.start_nanos, end_nanos));
        }
        self.stopped.expect("just set")
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, MockClock, SystemClock, TimingContext};
    use std::sync::Arc;
    use std::time::Duration;

    /// Verifies that the system clock's monotonic reading moves forward.
    #[test]
    fn system_clock_advances() {
        let clock = SystemClock::new();
        let first = clock.monotonic_nanos();
        let second = clock.monotonic_nanos();
        assert!(second >= first);
    }

    /// Verifies that mock readings only move when advanced.
    #[test]
    fn mock_clock_advances_on_demand() {
        let clock = MockClock::new();
        assert_eq!(0, clock.monotonic_nanos());

        let before = clock.wall_now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(250_000_000, clock.monotonic_nanos());
        assert_eq!(
            chrono::Duration::milliseconds(250),
            clock.wall_now() - before
        );
    }

    /// Verifies that an inverted reading pair yields zero rather than wrapping.
    #[test]
    fn elapsed_between_saturates() {
        let clock = MockClock::new();
        assert_eq!(Duration::ZERO, clock.elapsed_between(500, 100));
    }

    /// Verifies that `stop()` is idempotent: the second call returns the first call's duration
    /// even though the clock has advanced in between.
    #[test]
    fn timing_context_stop_is_idempotent() {
        let clock = Arc::new(MockClock::new());
        let mut timing = TimingContext::start(clock.clone());

        clock.advance(Duration::from_micros(10));
        let first = timing.stop();
        assert_eq!(Duration::from_micros(10), first);

        clock.advance(Duration::from_micros(90));
        let second = timing.stop();
        assert_eq!(first, second);
    }
}
