use std::time::{Duration, Instant};

/// Minimum time between two published throughput samples.
const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Turns monotone processed-byte counts into a published throughput.
///
/// [`record`](Self::record) is fed the cumulative processed amount on every
/// byte-count update; it answers with a bytes/second figure only when at
/// least one sampling window has elapsed since the last published sample,
/// then re-anchors the window. Recording an amount of 0 marks the start of
/// the transfer: it resets the clock without publishing anything.
#[derive(Debug)]
pub struct SpeedMeter {
    anchor: Instant,
    last_amount: u64,
}

impl SpeedMeter {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            last_amount: 0,
        }
    }

    /// Re-anchors the meter at `amount` processed bytes, without publishing.
    ///
    /// Used when a resume places the starting amount above zero, so the
    /// first window does not count the resumed bytes as fresh throughput.
    pub fn rebase(&mut self, amount: u64) {
        self.anchor = Instant::now();
        self.last_amount = amount;
    }

    /// Records the cumulative processed amount.
    ///
    /// Returns `Some(bytes_per_second)` when a full sampling window has
    /// elapsed, `None` otherwise.
    pub fn record(&mut self, amount: u64) -> Option<u64> {
        if amount == 0 {
            // Transfer start marker: reset the clock.
            self.rebase(0);
            return None;
        }

        let elapsed = self.anchor.elapsed();
        if elapsed < SAMPLE_WINDOW {
            return None;
        }

        let delta = amount.saturating_sub(self.last_amount);
        let speed = (delta as f64 / elapsed.as_secs_f64()) as u64;
        self.anchor = Instant::now();
        self.last_amount = amount;
        Some(speed)
    }
}

impl Default for SpeedMeter {
    fn default() -> Self {
        Self::new()
    }
}
