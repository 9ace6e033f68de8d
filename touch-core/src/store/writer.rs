//! The flash side of the store: raw page access and the locked write path.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::board::{LOCK_TIMEOUT_US, PAGE_SIZE, SETTLE_US};
use crate::deadline::Deadline;
use crate::lock::IoLock;

use super::SaveRequest;

/// One reserved erase-sector, addressed in pages.
///
/// Erase sets every byte of the sector to `0xFF`; program can only clear bits.
pub trait ConfigFlash {
    type Error: core::fmt::Debug;

    /// Read page `index` of the sector.
    fn read_page(&mut self, index: usize, buf: &mut [u8; PAGE_SIZE]) -> Result<(), Self::Error>;

    /// Erase the whole sector.
    fn erase_sector(&mut self) -> Result<(), Self::Error>;

    /// Program page `index`, which must be erased.
    fn program_page(&mut self, index: usize, data: &[u8; PAGE_SIZE]) -> Result<(), Self::Error>;
}

/// What happened to a [`SaveRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOutcome {
    /// The page is durable.
    Written,
    /// The I/O lock was busy; nothing was touched.
    Deferred,
    /// Erase or program failed; the target page may hold garbage.
    Failed,
}

/// Executes save requests against the flash while holding the I/O lock.
///
/// Lives on whichever context owns flash programming. Once a write has
/// started it runs to completion.
pub struct PageWriter<F> {
    flash: F,
}

impl<F: ConfigFlash> PageWriter<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Erase (if requested) and program one page.
    ///
    /// Gives up with [`WriteOutcome::Deferred`] if the lock is not acquired
    /// within the lock timeout. After acquiring it, pauses for the settle
    /// time so bus transfers already in flight on the other context drain.
    pub async fn write<M: RawMutex, D: Deadline>(
        &mut self,
        request: &SaveRequest,
        lock: &IoLock<M>,
        deadline: &D,
    ) -> WriteOutcome {
        let Ok(_guard) = lock.acquire(deadline, LOCK_TIMEOUT_US).await else {
            warn!("flash lock busy, save of page {} deferred", request.page);
            return WriteOutcome::Deferred;
        };
        deadline.after_micros(SETTLE_US).await;

        if request.erase {
            if self.flash.erase_sector().is_err() {
                error!("config sector erase failed");
                return WriteOutcome::Failed;
            }
            info!("config sector erased");
        }
        match self.flash.program_page(request.page, &request.image) {
            Ok(()) => {
                info!("config page {} programmed", request.page);
                WriteOutcome::Written
            }
            Err(_) => {
                error!("programming config page {} failed", request.page);
                WriteOutcome::Failed
            }
        }
    }
}
