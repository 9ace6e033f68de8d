//! USB HID joystick output: one button per logical key.

use defmt::Format;
use embassy_usb::class::hid::{HidWriter, State};
use embassy_usb::Builder;
use touch_core::{OutputError, TouchFrame, TouchSink, KEY_COUNT};

type UsbDriver<'d> = embassy_rp::usb::Driver<'d, embassy_rp::peripherals::USB>;

/// Size of the report in bytes.
pub const REPORT_SIZE: usize = KEY_COUNT.div_ceil(8);

/// USB HID joystick report.
///
/// Button `n + 1` is logical key `n`; the top six bits are padding.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Format)]
pub struct TouchReport {
    pub buttons: [u8; REPORT_SIZE],
}

impl TouchReport {
    /// No key touched.
    #[must_use]
    pub const fn released() -> Self {
        Self {
            buttons: [0; REPORT_SIZE],
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> [u8; REPORT_SIZE] {
        self.buttons
    }
}

impl From<TouchFrame> for TouchReport {
    fn from(frame: TouchFrame) -> Self {
        let mut buttons = [0u8; REPORT_SIZE];
        buttons.copy_from_slice(&frame.raw().to_le_bytes()[..REPORT_SIZE]);
        Self { buttons }
    }
}

/// Joystick with 34 buttons, padded to a whole number of bytes.
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x04, // Usage (Joystick)
    0xA1, 0x01, // Collection (Application)
    //
    // --- Buttons (one per key) ---
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (Button 1)
    0x29, 0x22, //   Usage Maximum (Button 34)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x95, 0x22, //   Report Count (34)
    0x75, 0x01, //   Report Size (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Padding ---
    0x95, 0x01, //   Report Count (1)
    0x75, 0x06, //   Report Size (6)
    0x81, 0x03, //   Input (Constant, Variable, Absolute)
    //
    0xC0, // End Collection
];

/// USB HID touch output.
///
/// Reports are only sent when the frame changes, and the joystick can be
/// turned off at runtime; turning it off releases every button once.
pub struct UsbHidOutput<'d> {
    writer: HidWriter<'d, UsbDriver<'d>, REPORT_SIZE>,
    ready: bool,
    enabled: bool,
    last: Option<TouchReport>,
}

impl<'d> UsbHidOutput<'d> {
    pub fn new(writer: HidWriter<'d, UsbDriver<'d>, REPORT_SIZE>) -> Self {
        Self {
            writer,
            ready: false,
            enabled: true,
            last: None,
        }
    }

    /// Wait until the device is ready (USB enumerated).
    pub async fn wait_ready(&mut self) {
        self.writer.ready().await;
        self.ready = true;
    }

    /// Enable or disable the joystick interface.
    pub async fn set_enabled(&mut self, enabled: bool) -> Result<(), OutputError> {
        if self.enabled == enabled {
            return Ok(());
        }
        if !enabled {
            self.write(TouchReport::released()).await?;
        }
        self.enabled = enabled;
        Ok(())
    }

    async fn write(&mut self, report: TouchReport) -> Result<(), OutputError> {
        if self.last == Some(report) {
            return Ok(());
        }
        self.writer
            .write(&report.as_bytes())
            .await
            .map_err(|_| OutputError::Io)?;
        self.last = Some(report);
        Ok(())
    }
}

impl TouchSink for UsbHidOutput<'_> {
    async fn send(&mut self, frame: TouchFrame) -> Result<(), OutputError> {
        if !self.ready {
            return Err(OutputError::NotReady);
        }
        if !self.enabled {
            return Ok(());
        }
        self.write(TouchReport::from(frame)).await
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Add the joystick interface to the USB builder.
pub fn configure_usb_hid<'d>(
    builder: &mut Builder<'d, UsbDriver<'d>>,
    state: &'d mut State<'d>,
) -> HidWriter<'d, UsbDriver<'d>, REPORT_SIZE> {
    let config = embassy_usb::class::hid::Config {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: 1,
        max_packet_size: 8,
        hid_subclass: embassy_usb::class::hid::HidSubclass::No,
        hid_boot_protocol: embassy_usb::class::hid::HidBootProtocol::None,
    };

    HidWriter::new(builder, state, config)
}
