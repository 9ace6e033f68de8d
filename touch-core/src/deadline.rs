//! Bounded waiting.
//!
//! The core has no clock of its own. Anything that must not block forever
//! (bus transfers, lock acquisition) races against a [`Deadline`] supplied by
//! the platform.

use core::future::Future;
use embassy_futures::select::{select, Either};

/// Source of timeout futures.
pub trait Deadline {
    /// A future that completes once `micros` have elapsed.
    fn after_micros(&self, micros: u32) -> impl Future<Output = ()>;
}

/// Returned when the deadline elapsed before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Elapsed;

/// Run `fut`, giving up after `micros`.
///
/// The operation is polled before the deadline, so an operation that is
/// already complete always wins.
pub async fn bounded<D, F>(deadline: &D, micros: u32, fut: F) -> Result<F::Output, Elapsed>
where
    D: Deadline,
    F: Future,
{
    match select(fut, deadline.after_micros(micros)).await {
        Either::First(output) => Ok(output),
        Either::Second(()) => Err(Elapsed),
    }
}
