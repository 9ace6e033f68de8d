//! Timekeeping glue between embassy-time and the core.

use embassy_time::{Instant, Timer};
use touch_core::Deadline;

/// [`Deadline`] backed by the embassy time driver.
#[derive(Clone, Copy, Default)]
pub struct EmbassyDeadline;

impl Deadline for EmbassyDeadline {
    async fn after_micros(&self, micros: u32) {
        Timer::after_micros(u64::from(micros)).await;
    }
}

/// Milliseconds since boot, the clock the config store runs on.
#[inline]
#[must_use]
pub fn now_ms() -> u64 {
    Instant::now().as_millis()
}
