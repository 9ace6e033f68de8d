//! Capacitive-touch rhythm-game controller firmware for RP2040.
//!
//! Three MPR121 touch chips on one I2C bus feed 34 logical keys, reported
//! to the host as a USB HID joystick and mirrored on a WS2812 key strip.
//! Settings are changed from a USB serial console and persist in the last
//! sector of the on-board flash.
//!
//! # Hardware Configuration
//!
//! | Function | GPIO | Description |
//! |----------|------|-------------|
//! | I2C0 SDA | 16   | MPR121 bus data (chips at 0x5A, 0x5B, 0x5C) |
//! | I2C0 SCL | 17   | MPR121 bus clock, 400 kHz |
//! | LED DIN  | 13   | WS2812 key strip, one LED per key |
//!
//! # Architecture
//!
//! Two executors, one per core:
//!
//! - **Core 1** runs the 1 kHz sampling loop. It owns the
//!   [`DeviceContext`](touch_core::DeviceContext): chips, configuration,
//!   counters. Each cycle it publishes a [`Snapshot`], hands due saves to
//!   core 0 and applies queued console commands.
//! - **Core 0** runs USB (HID joystick and CDC console), the key lighting
//!   and the flash writer. embassy-rp only programs flash from core 0.
//!
//! # Modules
//!
//! - [`usb_output`]: USB HID joystick ([`UsbHidOutput`], [`TouchReport`])
//! - [`console`]: line-based command console over CDC ACM ([`Console`])
//! - [`flash`]: the config sector ([`SectorFlash`])
//! - [`lighting`]: key colors for the LED strip
//! - [`time`]: embassy-time backed [`EmbassyDeadline`]
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)

#![no_std]

use defmt::Format;
use touch_core::{HidConfig, LightingConfig, TouchFrame};

pub mod console;
pub mod flash;
pub mod lighting;
pub mod time;
pub mod usb_output;

pub use console::{Console, ConsoleError};
pub use flash::SectorFlash;
pub use time::{now_ms, EmbassyDeadline};
pub use usb_output::{configure_usb_hid, TouchReport, UsbHidOutput};

/// What the sampling loop publishes every cycle for the output tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct Snapshot {
    pub frame: TouchFrame,
    pub lighting: LightingConfig,
    pub hid: HidConfig,
}
