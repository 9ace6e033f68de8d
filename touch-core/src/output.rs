//! Output sink trait and error types.

use core::future::Future;

use crate::keys::TouchFrame;

/// Error type for output operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputError {
    /// USB/communication I/O error.
    Io,
    /// Device not ready (e.g., USB not enumerated).
    NotReady,
}

/// Async trait for the layer that reports touches to the host.
///
/// # `no_std` Compatibility
///
/// All implementations must be `#![no_std]` compatible with no heap allocation.
pub trait TouchSink {
    /// Send one cycle's touch frame.
    ///
    /// May block until the previous report has been sent.
    fn send(&mut self, frame: TouchFrame) -> impl Future<Output = Result<(), OutputError>>;

    /// Check if the output is ready to accept data.
    fn is_ready(&self) -> bool;
}
