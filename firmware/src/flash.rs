//! The reserved config sector in the on-board QSPI flash.
//!
//! The last erase-sector of the flash holds the config ring. embassy-rp only
//! programs flash from core 0, and pauses core 1 for the duration.

use embassy_rp::flash::{Blocking, Error, Flash};
use embassy_rp::peripherals::FLASH;
use touch_core::board::{PAGE_SIZE, SECTOR_SIZE};
use touch_core::ConfigFlash;

/// Size of the Pico's flash chip.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Offset of the config sector from the start of flash.
pub const CONFIG_OFFSET: u32 = (FLASH_SIZE - SECTOR_SIZE) as u32;

/// [`ConfigFlash`] over the last sector of the on-board flash.
pub struct SectorFlash<'d> {
    flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>,
}

impl<'d> SectorFlash<'d> {
    pub fn new(flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>) -> Self {
        Self { flash }
    }

    fn page_offset(index: usize) -> u32 {
        CONFIG_OFFSET + (index * PAGE_SIZE) as u32
    }
}

impl ConfigFlash for SectorFlash<'_> {
    type Error = Error;

    fn read_page(&mut self, index: usize, buf: &mut [u8; PAGE_SIZE]) -> Result<(), Error> {
        self.flash.blocking_read(Self::page_offset(index), buf)
    }

    fn erase_sector(&mut self) -> Result<(), Error> {
        self.flash
            .blocking_erase(CONFIG_OFFSET, CONFIG_OFFSET + SECTOR_SIZE as u32)
    }

    fn program_page(&mut self, index: usize, data: &[u8; PAGE_SIZE]) -> Result<(), Error> {
        self.flash.blocking_write(Self::page_offset(index), data)
    }
}
