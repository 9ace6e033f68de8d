//! Platform-agnostic core of a capacitive-touch rhythm-game controller.
//!
//! This crate holds everything that does not touch a peripheral directly, so
//! it can run in the firmware and on the host under test.
//!
//! # Overview
//!
//! - [`chip`]: MPR121 register protocol over an async I2C bus ([`Mpr121`])
//! - [`array`]: polls every chip and merges the result ([`SensorArray`])
//! - [`keymap`]: physical channel to logical key table ([`KeyMap`])
//! - [`calibration`]: user-facing sensitivity, debounce and filter settings
//!   and their fan-out to the chips ([`SenseSettings`])
//! - [`stats`]: per-key rising-edge counters ([`TouchStatistics`])
//! - [`store`]: wear-leveling configuration store ([`ConfigStore`])
//! - [`lock`]: the lock shared by the sampling and flash contexts ([`IoLock`])
//! - [`command`]: validated configuration commands ([`Command`])
//! - [`report`]: answers to the read-back commands ([`Reply`])
//! - [`context`]: the device context tying it all together ([`DeviceContext`])
//!
//! # Features
//!
//! - **`defmt`**: derive `defmt::Format` and log through `defmt`
//! - **`log`**: log through the `log` crate
//! - **`std`**: enable std (host testing)
//!
//! # No-std Support
//!
//! The crate is `#![no_std]` and allocation-free.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// This must go first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod array;
pub mod board;
pub mod calibration;
pub mod chip;
pub mod command;
pub mod config;
pub mod context;
pub mod deadline;
pub mod keymap;
pub mod keys;
pub mod lock;
pub mod output;
pub mod report;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testutil;

pub use array::{zones_from_raw, SensorArray};
pub use calibration::{Debounce, Filter, SenseSettings};
pub use chip::{BusFault, ChipError, ChipState, Mpr121};
pub use command::{Command, CommandError, SenseOp, SenseTarget};
pub use config::{HidConfig, LightingConfig, Rgb};
pub use context::DeviceContext;
pub use deadline::{Deadline, Elapsed};
pub use keymap::{KeyMap, MapError};
pub use keys::{LogicalKey, TouchFrame, KEY_COUNT};
pub use lock::IoLock;
pub use output::{OutputError, TouchSink};
pub use report::{Reply, Settings};
pub use stats::TouchStatistics;
pub use store::{
    ConfigFlash, ConfigModule, ConfigStore, PageWriter, SaveRequest, Slot, StoreError, Verdict,
    WriteOutcome,
};
