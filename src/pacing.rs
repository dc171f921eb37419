//! Fixed-frequency loop pacing.
//!
//! After a step, sleep for `max(0, period - elapsed)`.  This is soft
//! real-time: an overrun is counted and logged at debug level, never
//! escalated.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::app::ports::Clock;

pub struct LoopPacer {
    clock: Box<dyn Clock>,
    delay: Box<dyn DelayNs>,
    period: Duration,
    overruns: u64,
}

impl LoopPacer {
    pub fn new(clock: Box<dyn Clock>, delay: Box<dyn DelayNs>, period: Duration) -> Self {
        Self {
            clock,
            delay,
            period,
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Deadlines missed so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Sleep out the rest of the period that began at `start`.
    ///
    /// Returns the time slept.
    pub fn pace(&mut self, start: Duration) -> Duration {
        let elapsed = self.clock.now().saturating_sub(start);
        debug!(
            "Time to process training loop: {:.4}/{:.4} secs",
            elapsed.as_secs_f64(),
            self.period.as_secs_f64()
        );
        let Some(remaining) = self.period.checked_sub(elapsed).filter(|d| !d.is_zero()) else {
            self.overruns += 1;
            return Duration::ZERO;
        };
        let micros = u32::try_from(remaining.as_micros()).unwrap_or(u32::MAX);
        self.delay.delay_us(micros);
        remaining
    }
}
