//! Validated configuration commands and queries.
//!
//! The command line itself lives outside the core; it hands over text lines
//! such as:
//!
//! ```text
//! sense +            global sensitivity up
//! sense A3 -         one key down
//! sense * 0          every key back to zero
//! filter 1 2 [4]     first, second iterations and optional interval
//! debounce 2 [3]     touch and optional release count
//! remap 12 B3        physical channel 12 drives key B3 (XX disconnects)
//! remap reset        stock wiring
//! level 200          LED brightness limit, 1..=255
//! hid joy|off        joystick reporting on or off
//! stat reset         clear touch counters
//! save               save now
//! factory            factory reset
//! display            show the settings and chip health
//! stat               show the touch counters
//! raw                show the filtered samples by key
//! ```
//!
//! Every value is range-checked here, so a [`Command`] that reaches the
//! [`DeviceContext`](crate::DeviceContext) is always applicable.

use crate::board::CHANNEL_COUNT;
use crate::calibration::{
    DEBOUNCE_MAX, FILTER_INTERVAL_MAX, FILTER_ITERATIONS_MAX, OFFSET_MAX, OFFSET_MIN,
};
use crate::chip::ChipError;
use crate::keys::LogicalKey;

/// Error type for command parsing and execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Unknown command word or malformed arguments.
    Parse,
    /// Not a key name.
    UnknownKey,
    /// A value outside its allowed range.
    OutOfRange,
    /// The chips could not be reprogrammed; the change is kept and saved.
    Chip(ChipError),
}

/// Which offsets a sensitivity change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SenseTarget {
    /// The global offset.
    Global,
    /// Every per-key offset.
    AllKeys,
    /// One key's offset.
    Key(LogicalKey),
}

/// A sensitivity step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SenseOp {
    Increment,
    Decrement,
    Reset,
}

impl SenseOp {
    /// Apply to an offset, staying within the offset range.
    #[must_use]
    pub fn apply(self, offset: i8) -> i8 {
        match self {
            SenseOp::Increment => offset.saturating_add(1).min(OFFSET_MAX),
            SenseOp::Decrement => offset.saturating_sub(1).max(OFFSET_MIN),
            SenseOp::Reset => 0,
        }
    }

    fn parse(arg: &str) -> Result<Self, CommandError> {
        match arg {
            "+" => Ok(SenseOp::Increment),
            "-" => Ok(SenseOp::Decrement),
            "0" => Ok(SenseOp::Reset),
            _ => Err(CommandError::Parse),
        }
    }
}

/// One configuration change or action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub enum Command {
    Sense {
        target: SenseTarget,
        op: SenseOp,
    },
    /// `None` keeps the current interval.
    Filter {
        first: u8,
        second: u8,
        interval: Option<u8>,
    },
    /// `None` keeps the current release count.
    Debounce {
        touch: u8,
        release: Option<u8>,
    },
    Remap {
        channel: usize,
        key: LogicalKey,
    },
    ResetMap,
    /// LED brightness limit, never zero.
    Level(u8),
    Hid {
        joystick: bool,
    },
    ResetStats,
    Save,
    FactoryReset,
    Display,
    Stat,
    Raw,
}

impl Command {
    /// Parse and validate one command line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_ascii_whitespace();
        let word = words.next().ok_or(CommandError::Parse)?;
        let verb = VERBS
            .iter()
            .find(|verb| verb.eq_ignore_ascii_case(word))
            .ok_or(CommandError::Parse)?;
        let mut args: heapless::Vec<&str, 3> = heapless::Vec::new();
        for word in words {
            args.push(word).map_err(|_| CommandError::Parse)?;
        }

        match (*verb, args.as_slice()) {
            ("sense", [op]) => Ok(Command::Sense {
                target: SenseTarget::Global,
                op: SenseOp::parse(op)?,
            }),
            ("sense", [target, op]) => {
                let target = match *target {
                    "*" => SenseTarget::AllKeys,
                    name => SenseTarget::Key(parse_key(name)?),
                };
                if target == SenseTarget::Key(LogicalKey::NONE) {
                    return Err(CommandError::UnknownKey);
                }
                Ok(Command::Sense {
                    target,
                    op: SenseOp::parse(op)?,
                })
            }
            ("filter", [first, second, rest @ ..]) if rest.len() <= 1 => {
                Ok(Command::Filter {
                    first: parse_bounded(first, FILTER_ITERATIONS_MAX)?,
                    second: parse_bounded(second, FILTER_ITERATIONS_MAX)?,
                    interval: match rest {
                        [interval] => Some(parse_bounded(interval, FILTER_INTERVAL_MAX)?),
                        _ => None,
                    },
                })
            }
            ("debounce", [touch, rest @ ..]) if rest.len() <= 1 => Ok(Command::Debounce {
                touch: parse_bounded(touch, DEBOUNCE_MAX)?,
                release: match rest {
                    [release] => Some(parse_bounded(release, DEBOUNCE_MAX)?),
                    _ => None,
                },
            }),
            ("remap", ["reset"]) => Ok(Command::ResetMap),
            ("remap", [channel, key]) => {
                let channel: usize = channel.parse().map_err(|_| CommandError::Parse)?;
                if channel >= CHANNEL_COUNT {
                    return Err(CommandError::OutOfRange);
                }
                Ok(Command::Remap {
                    channel,
                    key: parse_key(key)?,
                })
            }
            ("level", [level]) => {
                let level: u8 = level.parse().map_err(|_| CommandError::Parse)?;
                if level == 0 {
                    return Err(CommandError::OutOfRange);
                }
                Ok(Command::Level(level))
            }
            ("hid", [mode]) if mode.eq_ignore_ascii_case("joy") => {
                Ok(Command::Hid { joystick: true })
            }
            ("hid", [mode]) if mode.eq_ignore_ascii_case("off") => {
                Ok(Command::Hid { joystick: false })
            }
            ("stat", ["reset"]) => Ok(Command::ResetStats),
            ("stat", []) => Ok(Command::Stat),
            ("display", []) => Ok(Command::Display),
            ("raw", []) => Ok(Command::Raw),
            ("save", []) => Ok(Command::Save),
            ("factory", []) => Ok(Command::FactoryReset),
            _ => Err(CommandError::Parse),
        }
    }
}

const VERBS: [&str; 11] = [
    "sense", "filter", "debounce", "remap", "level", "hid", "stat", "save", "factory", "display",
    "raw",
];

fn parse_key(name: &str) -> Result<LogicalKey, CommandError> {
    LogicalKey::from_name(name).ok_or(CommandError::UnknownKey)
}

fn parse_bounded(arg: &str, max: u8) -> Result<u8, CommandError> {
    let value: u8 = arg.parse().map_err(|_| CommandError::Parse)?;
    if value > max {
        return Err(CommandError::OutOfRange);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> LogicalKey {
        LogicalKey::from_name(name).unwrap()
    }

    #[test]
    fn test_parse_sense_targets() {
        assert_eq!(
            Command::parse("sense +"),
            Ok(Command::Sense {
                target: SenseTarget::Global,
                op: SenseOp::Increment
            })
        );
        assert_eq!(
            Command::parse("sense a3 -"),
            Ok(Command::Sense {
                target: SenseTarget::Key(key("A3")),
                op: SenseOp::Decrement
            })
        );
        assert_eq!(
            Command::parse("  SENSE  *  0 "),
            Ok(Command::Sense {
                target: SenseTarget::AllKeys,
                op: SenseOp::Reset
            })
        );
    }

    #[test]
    fn test_parse_sense_rejects_bad_input() {
        assert_eq!(Command::parse("sense C3 +"), Err(CommandError::UnknownKey));
        assert_eq!(Command::parse("sense XX +"), Err(CommandError::UnknownKey));
        assert_eq!(Command::parse("sense A1 ++"), Err(CommandError::Parse));
        assert_eq!(Command::parse("sense"), Err(CommandError::Parse));
    }

    #[test]
    fn test_parse_filter_and_debounce() {
        assert_eq!(
            Command::parse("filter 1 2"),
            Ok(Command::Filter {
                first: 1,
                second: 2,
                interval: None
            })
        );
        assert_eq!(
            Command::parse("filter 3 0 7"),
            Ok(Command::Filter {
                first: 3,
                second: 0,
                interval: Some(7)
            })
        );
        assert_eq!(Command::parse("filter 4 0"), Err(CommandError::OutOfRange));
        assert_eq!(Command::parse("filter 1 1 8"), Err(CommandError::OutOfRange));
        assert_eq!(Command::parse("filter 1 1 1 1"), Err(CommandError::Parse));

        assert_eq!(
            Command::parse("debounce 2"),
            Ok(Command::Debounce {
                touch: 2,
                release: None
            })
        );
        assert_eq!(
            Command::parse("debounce 2 7"),
            Ok(Command::Debounce {
                touch: 2,
                release: Some(7)
            })
        );
        assert_eq!(Command::parse("debounce 8"), Err(CommandError::OutOfRange));
        assert_eq!(Command::parse("debounce -1"), Err(CommandError::Parse));
    }

    #[test]
    fn test_parse_remap() {
        assert_eq!(
            Command::parse("remap 12 B3"),
            Ok(Command::Remap {
                channel: 12,
                key: key("B3")
            })
        );
        assert_eq!(
            Command::parse("remap 35 xx"),
            Ok(Command::Remap {
                channel: 35,
                key: LogicalKey::NONE
            })
        );
        assert_eq!(Command::parse("remap 36 A1"), Err(CommandError::OutOfRange));
        assert_eq!(Command::parse("remap 1 Z9"), Err(CommandError::UnknownKey));
        assert_eq!(Command::parse("remap reset"), Ok(Command::ResetMap));
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(Command::parse("save"), Ok(Command::Save));
        assert_eq!(Command::parse("factory"), Ok(Command::FactoryReset));
        assert_eq!(Command::parse("stat reset"), Ok(Command::ResetStats));
        assert_eq!(Command::parse("save now"), Err(CommandError::Parse));
        assert_eq!(Command::parse("reboot"), Err(CommandError::Parse));
        assert_eq!(Command::parse("averyveryverylongword"), Err(CommandError::Parse));
        assert_eq!(Command::parse(""), Err(CommandError::Parse));
    }

    #[test]
    fn test_parse_level_and_hid() {
        assert_eq!(Command::parse("level 200"), Ok(Command::Level(200)));
        assert_eq!(Command::parse("level 255"), Ok(Command::Level(255)));
        assert_eq!(Command::parse("level 0"), Err(CommandError::OutOfRange));
        assert_eq!(Command::parse("level 256"), Err(CommandError::Parse));
        assert_eq!(Command::parse("level"), Err(CommandError::Parse));

        assert_eq!(Command::parse("hid joy"), Ok(Command::Hid { joystick: true }));
        assert_eq!(Command::parse("HID Off"), Ok(Command::Hid { joystick: false }));
        assert_eq!(Command::parse("hid key1"), Err(CommandError::Parse));
        assert_eq!(Command::parse("hid"), Err(CommandError::Parse));
    }

    #[test]
    fn test_parse_queries() {
        assert_eq!(Command::parse("display"), Ok(Command::Display));
        assert_eq!(Command::parse("stat"), Ok(Command::Stat));
        assert_eq!(Command::parse("raw"), Ok(Command::Raw));
        assert_eq!(Command::parse("raw A1"), Err(CommandError::Parse));
        assert_eq!(Command::parse("display sense"), Err(CommandError::Parse));
    }

    #[test]
    fn test_sense_op_stays_in_range() {
        assert_eq!(SenseOp::Increment.apply(9), 9);
        assert_eq!(SenseOp::Increment.apply(-9), -8);
        assert_eq!(SenseOp::Decrement.apply(-9), -9);
        assert_eq!(SenseOp::Reset.apply(5), 0);
    }
}
