//! Answers to the read-back commands.
//!
//! A [`Reply`] carries values, not text. Its [`Display`](fmt::Display) impl
//! renders the console form, one item per line, key tables laid out by zone:
//!
//! ```text
//! A |     0|    12|     3|     0|     0|     0|     0|     0|
//! B |     0|     0|     0|     0|     0|     0|     0|     0|
//! C |     1|     0|
//! ...
//! ```

use core::fmt;

use crate::board::{CHIP_BASE_ADDRESS, CHIP_COUNT};
use crate::calibration::SenseSettings;
use crate::config::{HidConfig, LightingConfig, Rgb};
use crate::keys::{LogicalKey, KEY_COUNT};

/// Current configuration and chip health, as shown by `display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub sense: SenseSettings,
    pub lighting: LightingConfig,
    pub hid: HidConfig,
    pub chips: [bool; CHIP_COUNT],
}

/// Result of a successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// The change was applied; nothing to show.
    Done,
    Settings(Settings),
    /// Touch counters by logical key.
    Counts([u32; KEY_COUNT]),
    /// Filtered samples by logical key.
    Raw([u16; KEY_COUNT]),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Done => Ok(()),
            Reply::Settings(settings) => fmt::Display::fmt(settings, f),
            Reply::Counts(counts) => {
                writeln!(f, "touch counts:")?;
                write_zones(f, counts, 6)
            }
            Reply::Raw(raw) => {
                writeln!(f, "raw readings:")?;
                write_zones(f, raw, 6)
            }
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sense = &self.sense;
        writeln!(
            f,
            "sense: global {}, debounce {}/{}, filter {}/{}/{}",
            sense.global,
            sense.debounce.touch,
            sense.debounce.release,
            sense.filter.first,
            sense.filter.second,
            sense.filter.interval,
        )?;
        write_zones(f, &sense.keys, 3)?;

        let lighting = &self.lighting;
        writeln!(
            f,
            "lighting: on {}, off {}, level {}",
            Hex(lighting.key_on),
            Hex(lighting.key_off),
            lighting.level,
        )?;
        writeln!(
            f,
            "hid: joystick {}",
            if self.hid.joystick { "on" } else { "off" }
        )?;

        write!(f, "chips:")?;
        for (n, healthy) in self.chips.iter().enumerate() {
            let address = CHIP_BASE_ADDRESS + n as u8;
            write!(f, " {:#04x} {}", address, if *healthy { "ok" } else { "down" })?;
        }
        writeln!(f)
    }
}

struct Hex(Rgb);

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0.r, self.0.g, self.0.b)
    }
}

/// One row per zone letter, each value right-aligned in `width` columns.
fn write_zones<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    values: &[T; KEY_COUNT],
    width: usize,
) -> fmt::Result {
    let mut zone = None;
    for (key, value) in LogicalKey::all().zip(values) {
        let [letter, _] = key.name();
        if zone != Some(letter) {
            if zone.is_some() {
                writeln!(f)?;
            }
            write!(f, "{} |", char::from(letter))?;
            zone = Some(letter);
        }
        write!(f, "{value:>width$}|")?;
    }
    writeln!(f)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_done_renders_nothing() {
        assert_eq!(Reply::Done.to_string(), "");
    }

    #[test]
    fn test_counts_laid_out_by_zone() {
        let mut counts = [0u32; KEY_COUNT];
        counts[1] = 12;
        counts[17] = 345_678;
        let text = Reply::Counts(counts).to_string();
        let lines: std::vec::Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "touch counts:");
        assert_eq!(
            lines[1],
            "A |     0|    12|     0|     0|     0|     0|     0|     0|"
        );
        assert_eq!(lines[3], "C |     0|345678|");
        assert!(lines[5].starts_with("E |"));
    }

    #[test]
    fn test_settings_show_every_section() {
        let mut sense = SenseSettings::default();
        sense.global = -2;
        sense.keys[0] = 4;
        let settings = Settings {
            sense,
            lighting: LightingConfig {
                key_on: Rgb::new(0xFF, 0x10, 0),
                key_off: Rgb::new(0, 0, 0),
                level: 200,
            },
            hid: HidConfig { joystick: false },
            chips: [true, false, true],
        };
        let text = settings.to_string();
        assert!(text.starts_with("sense: global -2, "));
        assert!(text.contains("A |  4|  0|"));
        assert!(text.contains("lighting: on #FF1000, off #000000, level 200\n"));
        assert!(text.contains("hid: joystick off\n"));
        assert!(text.ends_with("chips: 0x5a ok 0x5b down 0x5c ok\n"));
    }
}
