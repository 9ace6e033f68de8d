//! All chips on the bus, merged into one logical frame per cycle.

use embedded_hal_async::i2c::I2c;

use crate::board::{CHANNEL_COUNT, CHIP_COUNT, ELECTRODES_PER_CHIP};
use crate::chip::Mpr121;
use crate::deadline::Deadline;
use crate::keymap::KeyMap;
use crate::keys::{LogicalKey, TouchFrame, KEY_COUNT};
use crate::stats::TouchStatistics;

/// Owns every chip driver and the frame of the last cycle.
///
/// A chip that fails a poll contributes no touches for that cycle only; the
/// next cycle polls it again unconditionally.
pub struct SensorArray<I, D> {
    chips: [Mpr121<I, D>; CHIP_COUNT],
    frame: TouchFrame,
}

impl<I: I2c, D: Deadline> SensorArray<I, D> {
    pub fn new(chips: [Mpr121<I, D>; CHIP_COUNT]) -> Self {
        Self {
            chips,
            frame: TouchFrame::EMPTY,
        }
    }

    /// Initialize every chip. Returns how many came up.
    pub async fn initialize(&mut self) -> usize {
        let mut ready = 0;
        for chip in &mut self.chips {
            match chip.initialize().await {
                Ok(()) => ready += 1,
                Err(e) => warn!("chip {:x} init failed: {:?}", chip.address(), e),
            }
        }
        ready
    }

    /// Poll every chip, remap through `map`, and count rising edges.
    ///
    /// The returned frame replaces the previous one as a whole.
    pub async fn sample(&mut self, map: &KeyMap, stats: &mut TouchStatistics) -> TouchFrame {
        let mut frame = TouchFrame::EMPTY;
        for (index, chip) in self.chips.iter_mut().enumerate() {
            let Ok(bits) = chip.read_touched_bitmap().await else {
                continue;
            };
            for electrode in 0..ELECTRODES_PER_CHIP {
                if bits & (1 << electrode) != 0 {
                    frame.set(map.key_of(index * ELECTRODES_PER_CHIP + electrode));
                }
            }
        }
        stats.record(frame.rising_since(self.frame));
        self.frame = frame;
        frame
    }

    /// Filtered samples of every electrode, by physical channel.
    ///
    /// A chip that fails the read reports zeros and is marked unhealthy.
    pub async fn raw(&mut self) -> [u16; CHANNEL_COUNT] {
        let mut readout = [0u16; CHANNEL_COUNT];
        for (chip, row) in self
            .chips
            .iter_mut()
            .zip(readout.chunks_exact_mut(ELECTRODES_PER_CHIP))
        {
            if let Ok(samples) = chip.read_raw_samples(ELECTRODES_PER_CHIP).await {
                row.copy_from_slice(samples);
            }
        }
        readout
    }

    /// Frame of the last [`sample`](Self::sample).
    #[inline]
    #[must_use]
    pub fn frame(&self) -> TouchFrame {
        self.frame
    }

    #[inline]
    #[must_use]
    pub fn touched(&self, key: LogicalKey) -> bool {
        self.frame.touched(key)
    }

    /// Health flag of every chip, as of its last transfer.
    #[must_use]
    pub fn health(&self) -> [bool; CHIP_COUNT] {
        let mut health = [false; CHIP_COUNT];
        for (flag, chip) in health.iter_mut().zip(&self.chips) {
            *flag = chip.is_healthy();
        }
        health
    }

    #[inline]
    #[must_use]
    pub fn chips(&self) -> &[Mpr121<I, D>; CHIP_COUNT] {
        &self.chips
    }

    #[inline]
    pub fn chips_mut(&mut self) -> &mut [Mpr121<I, D>; CHIP_COUNT] {
        &mut self.chips
    }
}

/// Re-index per-channel samples by logical key.
///
/// Keys without a channel read zero.
#[must_use]
pub fn zones_from_raw(raw: &[u16; CHANNEL_COUNT], map: &KeyMap) -> [u16; KEY_COUNT] {
    let mut zones = [0u16; KEY_COUNT];
    for (channel, &sample) in raw.iter().enumerate() {
        if let Some(i) = map.key_of(channel).index() {
            zones[i] = sample;
        }
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{block_on, ImmediateDeadline, SimBus, SimHandle};

    const ADDRS: [u8; CHIP_COUNT] = [0x5A, 0x5B, 0x5C];

    fn key(name: &str) -> LogicalKey {
        LogicalKey::from_name(name).unwrap()
    }

    fn array(bus: &SimBus) -> SensorArray<SimHandle, ImmediateDeadline> {
        SensorArray::new(ADDRS.map(|a| Mpr121::new(bus.handle(), ImmediateDeadline, a)))
    }

    #[test]
    fn test_touch_on_second_chip_lands_on_mapped_key() {
        let bus = SimBus::with_chips(&ADDRS);
        let mut array = array(&bus);
        assert_eq!(block_on(array.initialize()), CHIP_COUNT);

        let mut map = KeyMap::hardware_default();
        map.set(12, key("B3")).unwrap();
        let mut stats = TouchStatistics::new();

        bus.set_touched(0x5B, 0x0001);
        let frame = block_on(array.sample(&map, &mut stats));
        assert!(array.touched(key("B3")));
        assert_eq!(frame.keys().count(), 1);
        for other in LogicalKey::all().filter(|&k| k != key("B3")) {
            assert!(!frame.touched(other));
        }
        assert_eq!(stats.count(key("B3")), 1);

        // Held: no further edges.
        block_on(array.sample(&map, &mut stats));
        block_on(array.sample(&map, &mut stats));
        assert_eq!(stats.count(key("B3")), 1);

        // Released and touched again.
        bus.set_touched(0x5B, 0);
        block_on(array.sample(&map, &mut stats));
        assert!(!array.touched(key("B3")));
        bus.set_touched(0x5B, 0x0001);
        block_on(array.sample(&map, &mut stats));
        assert_eq!(stats.count(key("B3")), 2);
    }

    #[test]
    fn test_unmapped_electrode_is_ignored() {
        let bus = SimBus::with_chips(&ADDRS);
        let mut array = array(&bus);
        let mut stats = TouchStatistics::new();
        bus.set_touched(0x5C, 1 << 11);
        let frame = block_on(array.sample(&KeyMap::hardware_default(), &mut stats));
        assert!(frame.is_empty());
    }

    #[test]
    fn test_failed_chip_contributes_nothing_for_one_cycle() {
        let bus = SimBus::with_chips(&ADDRS);
        let mut array = array(&bus);
        let map = KeyMap::hardware_default();
        let mut stats = TouchStatistics::new();

        bus.set_touched(0x5A, 0b11);
        bus.set_touched(0x5C, 0b1);
        bus.set_stalled(0x5A, true);
        let frame = block_on(array.sample(&map, &mut stats));
        assert_eq!(array.health(), [false, true, true]);
        assert_eq!(frame.keys().collect::<heapless::Vec<_, 4>>().as_slice(), &[key("D7")]);

        bus.set_stalled(0x5A, false);
        let frame = block_on(array.sample(&map, &mut stats));
        assert_eq!(array.health(), [true, true, true]);
        assert!(frame.touched(key("A1")));
        assert!(frame.touched(key("A2")));
    }

    #[test]
    fn test_all_chips_down_means_no_touches() {
        let bus = SimBus::with_chips(&[]);
        let mut array = array(&bus);
        let mut stats = TouchStatistics::new();
        assert_eq!(block_on(array.initialize()), 0);
        let frame = block_on(array.sample(&KeyMap::hardware_default(), &mut stats));
        assert!(frame.is_empty());
        assert_eq!(array.health(), [false; CHIP_COUNT]);
    }

    #[test]
    fn test_raw_readout_and_zones() {
        let bus = SimBus::with_chips(&[0x5A, 0x5B]);
        let mut array = array(&bus);
        bus.set_raw(0x5A, 2, 300);
        bus.set_raw(0x5B, 0, 512);

        let raw = block_on(array.raw());
        assert_eq!(raw[2], 300);
        assert_eq!(raw[12], 512);
        assert_eq!(array.health(), [true, true, false]);

        let mut map = KeyMap::hardware_default();
        map.set(12, key("B3")).unwrap();
        let zones = zones_from_raw(&raw, &map);
        assert_eq!(zones[key("A3").id() as usize], 300);
        assert_eq!(zones[key("B3").id() as usize], 512);
        assert_eq!(zones[key("B5").id() as usize], 0);
    }
}
