//! User-facing calibration and its fan-out to the chips.
//!
//! [`SenseSettings`] is what the user tunes: a global sensitivity offset,
//! one offset per logical key, debounce counts and the chip's pre-filter.
//! [`apply`] translates it into per-chip register writes, routing each
//! key's offset to whichever electrode the [`KeyMap`] wires it to.

use embedded_hal_async::i2c::I2c;

use crate::board::{CHIP_COUNT, ELECTRODES_PER_CHIP};
use crate::chip::{ChipError, Mpr121};
use crate::deadline::Deadline;
use crate::keymap::KeyMap;
use crate::keys::{LogicalKey, KEY_COUNT};
use crate::store::{ConfigModule, Verdict};

/// Most sensitive offset.
pub const OFFSET_MAX: i8 = 9;
/// Least sensitive offset.
pub const OFFSET_MIN: i8 = -9;
/// Largest debounce count.
pub const DEBOUNCE_MAX: u8 = 7;
/// Largest first/second filter iteration code.
pub const FILTER_ITERATIONS_MAX: u8 = 3;
/// Largest sample interval code.
pub const FILTER_INTERVAL_MAX: u8 = 7;

/// Consecutive samples required before a touch or release is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Debounce {
    pub touch: u8,
    pub release: u8,
}

impl Debounce {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.touch <= DEBOUNCE_MAX && self.release <= DEBOUNCE_MAX
    }
}

/// Pre-filter codes as the chip takes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Filter {
    /// First filter iterations (6, 10, 18 or 34 samples).
    pub first: u8,
    /// Second filter iterations (4, 6, 10 or 18 samples).
    pub second: u8,
    /// Sample interval, `1 << interval` ms.
    pub interval: u8,
}

impl Filter {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.first <= FILTER_ITERATIONS_MAX
            && self.second <= FILTER_ITERATIONS_MAX
            && self.interval <= FILTER_INTERVAL_MAX
    }

    /// Packed as `first << 6 | second << 4 | interval`.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.first << 6 | (self.second & 0x03) << 4 | (self.interval & 0x07)
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            first: byte >> 6,
            second: (byte >> 4) & 0x03,
            interval: byte & 0x0F,
        }
    }
}

impl Default for Filter {
    /// Matches the chip's power-on configuration.
    fn default() -> Self {
        Self {
            first: 0,
            second: 1,
            interval: 0,
        }
    }
}

/// Everything the user can tune about touch detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenseSettings {
    /// Offset added to every key.
    pub global: i8,
    /// Per-key offset, indexed by logical key id.
    pub keys: [i8; KEY_COUNT],
    pub debounce: Debounce,
    pub filter: Filter,
}

impl SenseSettings {
    /// Offset of one key; zero for the sentinel.
    #[must_use]
    pub fn offset(&self, key: LogicalKey) -> i8 {
        key.index().map_or(0, |i| self.keys[i])
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        let in_range = |o: &i8| (OFFSET_MIN..=OFFSET_MAX).contains(o);
        in_range(&self.global)
            && self.keys.iter().all(in_range)
            && self.debounce.is_valid()
            && self.filter.is_valid()
    }

    /// Per-electrode offsets for each chip, following `map`.
    ///
    /// Unconnected electrodes get zero.
    #[must_use]
    pub fn partition(&self, map: &KeyMap) -> [[i8; ELECTRODES_PER_CHIP]; CHIP_COUNT] {
        let mut rows = [[0i8; ELECTRODES_PER_CHIP]; CHIP_COUNT];
        for (chip, row) in rows.iter_mut().enumerate() {
            for (offset, key) in row.iter_mut().zip(map.chip_keys(chip)) {
                *offset = self.offset(key);
            }
        }
        rows
    }
}

impl Default for SenseSettings {
    fn default() -> Self {
        Self {
            global: 0,
            keys: [0; KEY_COUNT],
            debounce: Debounce::default(),
            filter: Filter::default(),
        }
    }
}

impl ConfigModule for SenseSettings {
    // global, keys, debounce touch/release, packed filter
    const SIZE: usize = 1 + KEY_COUNT + 2 + 1;

    fn defaults() -> Self {
        Self::default()
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.global as u8;
        for (byte, &offset) in buf[1..=KEY_COUNT].iter_mut().zip(&self.keys) {
            *byte = offset as u8;
        }
        buf[KEY_COUNT + 1] = self.debounce.touch;
        buf[KEY_COUNT + 2] = self.debounce.release;
        buf[KEY_COUNT + 3] = self.filter.to_byte();
    }

    fn decode(buf: &[u8]) -> (Self, Verdict) {
        let mut settings = Self {
            global: buf[0] as i8,
            keys: [0; KEY_COUNT],
            debounce: Debounce {
                touch: buf[KEY_COUNT + 1],
                release: buf[KEY_COUNT + 2],
            },
            filter: Filter::from_byte(buf[KEY_COUNT + 3]),
        };
        for (offset, &byte) in settings.keys.iter_mut().zip(&buf[1..=KEY_COUNT]) {
            *offset = byte as i8;
        }
        if settings.is_valid() {
            (settings, Verdict::Valid)
        } else {
            (Self::default(), Verdict::Invalid)
        }
    }
}

/// Program every chip from `settings`.
///
/// All chips are attempted even if one fails; the first error is returned.
pub async fn apply<I, D>(
    chips: &mut [Mpr121<I, D>],
    map: &KeyMap,
    settings: &SenseSettings,
) -> Result<(), ChipError>
where
    I: I2c,
    D: Deadline,
{
    let rows = settings.partition(map);
    let mut first_error = None;
    for (chip, offsets) in chips.iter_mut().zip(&rows) {
        let result = apply_chip(chip, settings, offsets).await;
        if let Err(e) = result {
            warn!("calibrating chip {:x} failed: {:?}", chip.address(), e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn apply_chip<I: I2c, D: Deadline>(
    chip: &mut Mpr121<I, D>,
    settings: &SenseSettings,
    offsets: &[i8; ELECTRODES_PER_CHIP],
) -> Result<(), ChipError> {
    let Debounce { touch, release } = settings.debounce;
    chip.apply_debounce(touch, release).await?;
    chip.apply_sensitivity(settings.global, offsets).await?;
    let Filter {
        first,
        second,
        interval,
    } = settings.filter;
    chip.apply_filter_config(first, second, interval).await
}
