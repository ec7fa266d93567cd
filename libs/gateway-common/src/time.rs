//! Time sources
//!
//! Telemetry timestamps are microseconds since the Unix epoch. Components take
//! a `TimeProvider` so tests can pin the clock.

use chrono::Utc;

/// Time provider trait for generating timestamps
pub trait TimeProvider: Send + Sync + 'static {
    /// Current timestamp in microseconds since Unix epoch
    fn now_micros(&self) -> u64;

    /// Current timestamp in milliseconds since Unix epoch
    fn now_millis(&self) -> u64 {
        self.now_micros() / 1_000
    }
}

/// Wall-clock time provider
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_micros(&self) -> u64 {
        current_timestamp_micros()
    }
}

/// Fixed time provider for testing
///
/// Returns a predetermined timestamp, useful for deterministic tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedTimeProvider {
    timestamp_us: u64,
}

impl FixedTimeProvider {
    pub fn new(timestamp_us: u64) -> Self {
        Self { timestamp_us }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now_micros(&self) -> u64 {
        self.timestamp_us
    }
}

/// Current wall-clock time in microseconds; clamps to 0 for pre-epoch clocks
pub fn current_timestamp_micros() -> u64 {
    Utc::now().timestamp_micros().max(0) as u64
}
