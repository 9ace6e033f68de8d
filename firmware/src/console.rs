//! Line-based configuration console over USB CDC ACM.
//!
//! Each line is one command (see [`touch_core::command`]). Every line is
//! answered with `ok` or `error: <reason>`; queries print their values
//! first.

use core::fmt::{self, Write as _};

use defmt::{warn, Format};
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::driver::EndpointError;
use heapless::{String, Vec};
use touch_core::{Command, CommandError, Reply};

type UsbDriver<'d> = embassy_rp::usb::Driver<'d, embassy_rp::peripherals::USB>;

/// Longest accepted command line, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 64;

/// Full-speed bulk packet size.
pub const PACKET_SIZE: usize = 64;

/// Room for the longest answer, the touch counter table.
const REPLY_CAPACITY: usize = 512;

/// Error type for console input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum ConsoleError {
    /// The host closed the port.
    Disconnected,
    /// Line longer than [`MAX_LINE_LENGTH`]; it was discarded.
    LineTooLong,
    /// The line was not a valid command, or the command failed.
    Command(CommandError),
    /// The sampling loop is not running yet.
    NotReady,
}

impl From<EndpointError> for ConsoleError {
    fn from(_: EndpointError) -> Self {
        ConsoleError::Disconnected
    }
}

impl From<CommandError> for ConsoleError {
    fn from(e: CommandError) -> Self {
        ConsoleError::Command(e)
    }
}

pub struct Console<'d> {
    class: CdcAcmClass<'d, UsbDriver<'d>>,
    line: Vec<u8, MAX_LINE_LENGTH>,
    packet: [u8; PACKET_SIZE],
    pos: usize,
    len: usize,
}

impl<'d> Console<'d> {
    #[must_use]
    pub fn new(class: CdcAcmClass<'d, UsbDriver<'d>>) -> Self {
        Self {
            class,
            line: Vec::new(),
            packet: [0; PACKET_SIZE],
            pos: 0,
            len: 0,
        }
    }

    /// Wait until a terminal opens the port.
    pub async fn wait_connection(&mut self) {
        self.class.wait_connection().await;
        self.pos = 0;
        self.len = 0;
        self.line.clear();
    }

    /// Read and parse the next non-empty line.
    pub async fn receive(&mut self) -> Result<Command, ConsoleError> {
        loop {
            self.read_line().await?;
            let Ok(text) = core::str::from_utf8(&self.line) else {
                return Err(CommandError::Parse.into());
            };
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Command::parse(text)?);
        }
    }

    /// Answer the last line.
    pub async fn reply(&mut self, result: Result<Reply, ConsoleError>) -> Result<(), ConsoleError> {
        let mut text: String<REPLY_CAPACITY> = String::new();
        let mut out = Crlf(&mut text);
        let written = match result {
            Ok(reply) => writeln!(out, "{reply}ok"),
            Err(ConsoleError::Disconnected) => return Err(ConsoleError::Disconnected),
            Err(e) => writeln!(out, "error: {}", reason(e)),
        };
        if written.is_err() {
            warn!("console reply truncated");
        }

        for chunk in text.as_bytes().chunks(PACKET_SIZE) {
            self.class.write_packet(chunk).await?;
        }
        // A full last packet leaves the transfer open until a short one.
        if text.len() % PACKET_SIZE == 0 {
            self.class.write_packet(&[]).await?;
        }
        Ok(())
    }

    async fn next_byte(&mut self) -> Result<u8, ConsoleError> {
        // Zero-length packets carry nothing; keep reading.
        while self.pos == self.len {
            self.len = self.class.read_packet(&mut self.packet).await?;
            self.pos = 0;
        }
        let byte = self.packet[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Read bytes until a line terminator.
    ///
    /// If a line exceeds the buffer capacity, the rest of the line is
    /// discarded so the next line parses cleanly.
    async fn read_line(&mut self) -> Result<(), ConsoleError> {
        self.line.clear();
        loop {
            let byte = self.next_byte().await?;
            if byte == b'\n' || byte == b'\r' {
                return Ok(());
            }
            if self.line.push(byte).is_err() {
                loop {
                    let byte = self.next_byte().await?;
                    if byte == b'\n' || byte == b'\r' {
                        break;
                    }
                }
                return Err(ConsoleError::LineTooLong);
            }
        }
    }
}

fn reason(e: ConsoleError) -> &'static str {
    match e {
        ConsoleError::Disconnected => "disconnected",
        ConsoleError::LineTooLong => "line too long",
        ConsoleError::NotReady => "not ready",
        ConsoleError::Command(CommandError::Parse) => "syntax",
        ConsoleError::Command(CommandError::UnknownKey) => "unknown key",
        ConsoleError::Command(CommandError::OutOfRange) => "out of range",
        ConsoleError::Command(CommandError::Chip(_)) => "chip not responding",
    }
}

/// Writes into a reply buffer, turning `\n` into `\r\n`.
struct Crlf<'a>(&'a mut String<REPLY_CAPACITY>);

impl fmt::Write for Crlf<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for (i, part) in s.split('\n').enumerate() {
            if i > 0 {
                self.0.push_str("\r\n").map_err(|_| fmt::Error)?;
            }
            self.0.push_str(part).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
