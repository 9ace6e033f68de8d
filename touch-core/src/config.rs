//! Config modules owned by collaborators outside the touch pipeline.
//!
//! They share the store with calibration and the key map but are only read
//! by the lighting and HID output layers.

use crate::store::{ConfigModule, Verdict};

/// An RGB color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale by `level / 255`.
    #[must_use]
    pub const fn dimmed(self, level: u8) -> Self {
        const fn scale(c: u8, level: u8) -> u8 {
            ((c as u16 * level as u16) / 255) as u8
        }
        Self {
            r: scale(self.r, level),
            g: scale(self.g, level),
            b: scale(self.b, level),
        }
    }
}

/// Key colors and the brightness limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LightingConfig {
    pub key_on: Rgb,
    pub key_off: Rgb,
    /// Brightness limit, 1..=255.
    pub level: u8,
}

impl LightingConfig {
    pub const DEFAULT_LEVEL: u8 = 128;

    /// Color of a key in the given state, brightness applied.
    #[must_use]
    pub fn color(&self, touched: bool) -> Rgb {
        let base = if touched { self.key_on } else { self.key_off };
        base.dimmed(self.level)
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            key_on: Rgb::new(40, 40, 40),
            key_off: Rgb::new(0, 0, 0),
            level: Self::DEFAULT_LEVEL,
        }
    }
}

impl ConfigModule for LightingConfig {
    const SIZE: usize = 7;

    fn defaults() -> Self {
        Self::default()
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..3].copy_from_slice(&[self.key_on.r, self.key_on.g, self.key_on.b]);
        buf[3..6].copy_from_slice(&[self.key_off.r, self.key_off.g, self.key_off.b]);
        buf[6] = self.level;
    }

    /// A zero brightness limit would leave the controller dark with no way
    /// to tell why; it is put back to the default.
    fn decode(buf: &[u8]) -> (Self, Verdict) {
        let mut config = Self {
            key_on: Rgb::new(buf[0], buf[1], buf[2]),
            key_off: Rgb::new(buf[3], buf[4], buf[5]),
            level: buf[6],
        };
        if config.level == 0 {
            config.level = Self::DEFAULT_LEVEL;
            return (config, Verdict::Migrated);
        }
        (config, Verdict::Valid)
    }
}

/// Whether the HID joystick reports touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HidConfig {
    pub joystick: bool,
}

impl Default for HidConfig {
    fn default() -> Self {
        Self { joystick: true }
    }
}

impl ConfigModule for HidConfig {
    const SIZE: usize = 1;

    fn defaults() -> Self {
        Self::default()
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = u8::from(self.joystick);
    }

    /// A flag other than 0/1 falls back to the default.
    fn decode(buf: &[u8]) -> (Self, Verdict) {
        match buf[0] {
            0 => (Self { joystick: false }, Verdict::Valid),
            1 => (Self { joystick: true }, Verdict::Valid),
            _ => (Self::default(), Verdict::Migrated),
        }
    }
}
