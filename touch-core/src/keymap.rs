//! Physical channel to logical key table.

use crate::board::{CHANNEL_COUNT, ELECTRODES_PER_CHIP};
use crate::keys::{LogicalKey, KEY_COUNT};
use crate::store::{ConfigModule, Verdict};

/// A loaded table must reach at least this share of the defined keys.
///
/// Anything below is taken to be corrupt flash rather than a user's choice.
pub const MIN_COVERAGE_PERCENT: usize = 30;

/// Error type for table edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MapError {
    /// No such physical channel.
    ChannelOutOfRange,
}

/// Maps every physical channel (`chip * 12 + electrode`) to a logical key.
///
/// The table is kept injective: assigning a key to a channel disconnects
/// whichever channel held that key before.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyMap {
    table: [LogicalKey; CHANNEL_COUNT],
}

impl KeyMap {
    /// Wiring of the stock board: channel `n` drives key `n`, the spare
    /// electrodes of the last chip are unconnected.
    #[must_use]
    pub fn hardware_default() -> Self {
        let mut table = [LogicalKey::NONE; CHANNEL_COUNT];
        for (channel, slot) in table.iter_mut().enumerate().take(KEY_COUNT) {
            *slot = LogicalKey::from_raw(channel as u8);
        }
        Self { table }
    }

    /// Key driven by `channel`; the sentinel for out-of-range channels.
    #[inline]
    #[must_use]
    pub fn key_of(&self, channel: usize) -> LogicalKey {
        self.table.get(channel).copied().unwrap_or(LogicalKey::NONE)
    }

    /// Channel driving `key`, if any.
    #[must_use]
    pub fn channel_of(&self, key: LogicalKey) -> Option<usize> {
        if !key.is_connected() {
            return None;
        }
        self.table.iter().position(|&k| k == key)
    }

    /// Chip whose electrodes drive `key`, if any.
    #[must_use]
    pub fn chip_of(&self, key: LogicalKey) -> Option<usize> {
        self.channel_of(key).map(|channel| channel / ELECTRODES_PER_CHIP)
    }

    /// Point `channel` at `key`, or disconnect it with [`LogicalKey::NONE`].
    pub fn set(&mut self, channel: usize, key: LogicalKey) -> Result<(), MapError> {
        if channel >= CHANNEL_COUNT {
            return Err(MapError::ChannelOutOfRange);
        }
        if let Some(previous) = self.channel_of(key) {
            self.table[previous] = LogicalKey::NONE;
        }
        self.table[channel] = key;
        Ok(())
    }

    /// Number of distinct keys reachable from some channel.
    #[must_use]
    pub fn coverage(&self) -> usize {
        self.table.iter().filter(|k| k.is_connected()).count()
    }

    /// Enough keys are mapped for the table to be plausible.
    #[must_use]
    pub fn is_plausible(&self) -> bool {
        self.coverage() * 100 >= MIN_COVERAGE_PERCENT * KEY_COUNT
    }

    /// Row of keys for one chip's electrodes.
    #[must_use]
    pub fn chip_keys(&self, chip: usize) -> [LogicalKey; ELECTRODES_PER_CHIP] {
        let mut keys = [LogicalKey::NONE; ELECTRODES_PER_CHIP];
        let start = chip * ELECTRODES_PER_CHIP;
        if let Some(row) = self.table.get(start..start + ELECTRODES_PER_CHIP) {
            keys.copy_from_slice(row);
        }
        keys
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::hardware_default()
    }
}

impl ConfigModule for KeyMap {
    const SIZE: usize = CHANNEL_COUNT;

    fn defaults() -> Self {
        Self::hardware_default()
    }

    fn encode(&self, buf: &mut [u8]) {
        for (byte, key) in buf.iter_mut().zip(&self.table) {
            *byte = key.id();
        }
    }

    /// Unknown ids become unconnected and duplicates keep their first
    /// channel; either is repaired in place. A table failing the coverage
    /// check is rejected outright.
    fn decode(buf: &[u8]) -> (Self, Verdict) {
        let mut map = Self {
            table: [LogicalKey::NONE; CHANNEL_COUNT],
        };
        let mut verdict = Verdict::Valid;
        for (channel, &raw) in buf.iter().enumerate().take(CHANNEL_COUNT) {
            let key = LogicalKey::from_raw(raw);
            if key.id() != raw || (key.is_connected() && map.channel_of(key).is_some()) {
                verdict = Verdict::Migrated;
                continue;
            }
            map.table[channel] = key;
        }
        if !map.is_plausible() {
            return (Self::hardware_default(), Verdict::Invalid);
        }
        (map, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> LogicalKey {
        LogicalKey::from_name(name).unwrap()
    }

    #[test]
    fn test_default_covers_every_key() {
        let map = KeyMap::hardware_default();
        assert_eq!(map.coverage(), KEY_COUNT);
        assert_eq!(map.key_of(0), key("A1"));
        assert_eq!(map.key_of(33), key("E8"));
        assert_eq!(map.key_of(34), LogicalKey::NONE);
        assert_eq!(map.key_of(99), LogicalKey::NONE);
        assert_eq!(map.channel_of(key("B3")), Some(10));
        assert_eq!(map.chip_of(key("C1")), Some(1));
        assert_eq!(map.channel_of(LogicalKey::NONE), None);
    }

    #[test]
    fn test_set_keeps_table_injective() {
        let mut map = KeyMap::hardware_default();
        map.set(12, key("B3")).unwrap();
        assert_eq!(map.key_of(12), key("B3"));
        assert_eq!(map.key_of(10), LogicalKey::NONE);
        assert_eq!(map.channel_of(key("B3")), Some(12));
        assert_eq!(map.table.iter().filter(|&&k| k == key("B3")).count(), 1);
    }

    #[test]
    fn test_set_rejects_out_of_range() {
        let mut map = KeyMap::hardware_default();
        assert_eq!(map.set(CHANNEL_COUNT, key("A1")), Err(MapError::ChannelOutOfRange));
        assert_eq!(map.set(0, LogicalKey::from_raw(40)), Ok(()));
        assert_eq!(map.key_of(0), LogicalKey::NONE);
    }

    #[test]
    fn test_chip_keys_row() {
        let map = KeyMap::hardware_default();
        let row = map.chip_keys(2);
        assert_eq!(row[0], key("D7"));
        assert_eq!(row[9], key("E8"));
        assert_eq!(row[10], LogicalKey::NONE);
        assert_eq!(map.chip_keys(5), [LogicalKey::NONE; 12]);
    }

    #[test]
    fn test_decode_round_trip() {
        let mut map = KeyMap::hardware_default();
        map.set(35, key("A1")).unwrap();
        let mut buf = [0u8; KeyMap::SIZE];
        map.encode(&mut buf);
        assert_eq!(KeyMap::decode(&buf), (map, Verdict::Valid));
    }

    #[test]
    fn test_decode_rejects_sparse_table() {
        let mut buf = [0xFFu8; KeyMap::SIZE];
        for (channel, byte) in buf.iter_mut().enumerate().take(10) {
            *byte = channel as u8;
        }
        // 10 of 34 keys is below 30%.
        let (map, verdict) = KeyMap::decode(&buf);
        assert_eq!(verdict, Verdict::Invalid);
        assert_eq!(map, KeyMap::hardware_default());

        buf[10] = 10;
        assert_eq!(KeyMap::decode(&buf).1, Verdict::Valid);
    }

    #[test]
    fn test_decode_rejects_zeroed_table() {
        let (_, verdict) = KeyMap::decode(&[0u8; KeyMap::SIZE]);
        assert_eq!(verdict, Verdict::Invalid);
    }

    #[test]
    fn test_decode_repairs_duplicates_and_garbage() {
        let mut buf = [0u8; KeyMap::SIZE];
        KeyMap::hardware_default().encode(&mut buf);
        buf[34] = 3;
        buf[35] = 77;
        let (map, verdict) = KeyMap::decode(&buf);
        assert_eq!(verdict, Verdict::Migrated);
        assert_eq!(map.key_of(3), key("A4"));
        assert_eq!(map.key_of(34), LogicalKey::NONE);
        assert_eq!(map.key_of(35), LogicalKey::NONE);
    }
}
