//! Per-key touch counters for diagnostics.

use crate::keys::{LogicalKey, TouchFrame, KEY_COUNT};

/// Counts rising edges (untouched to touched) per logical key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchStatistics {
    counts: [u32; KEY_COUNT],
}

impl TouchStatistics {
    pub const fn new() -> Self {
        Self {
            counts: [0; KEY_COUNT],
        }
    }

    /// Count every key set in `rising`.
    pub fn record(&mut self, rising: TouchFrame) {
        for key in rising.keys() {
            if let Some(i) = key.index() {
                self.counts[i] = self.counts[i].saturating_add(1);
            }
        }
    }

    /// Touches counted for `key`; zero for the sentinel.
    #[must_use]
    pub fn count(&self, key: LogicalKey) -> u32 {
        key.index().map_or(0, |i| self.counts[i])
    }

    #[must_use]
    pub fn counts(&self) -> &[u32; KEY_COUNT] {
        &self.counts
    }

    pub fn reset(&mut self) {
        self.counts = [0; KEY_COUNT];
    }
}

impl Default for TouchStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reset() {
        let a1 = LogicalKey::from_raw(0);
        let e8 = LogicalKey::from_raw(33);
        let mut frame = TouchFrame::EMPTY;
        frame.set(a1);
        frame.set(e8);

        let mut stats = TouchStatistics::new();
        stats.record(frame);
        stats.record(TouchFrame::EMPTY);
        stats.record(frame);
        assert_eq!(stats.count(a1), 2);
        assert_eq!(stats.count(e8), 2);
        assert_eq!(stats.count(LogicalKey::from_raw(1)), 0);
        assert_eq!(stats.count(LogicalKey::NONE), 0);

        stats.reset();
        assert_eq!(stats.counts(), &[0; KEY_COUNT]);
    }
}
