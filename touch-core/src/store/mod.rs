//! Wear-leveling configuration store.
//!
//! The whole configuration is one blob: every registered module's bytes,
//! concatenated in registration order. It lives in one reserved erase-sector
//! split into [`PAGE_COUNT`] pages of [`PAGE_SIZE`] bytes. A page is a 4-byte
//! little-endian magic followed by the blob.
//!
//! Pages form a ring written strictly forward: each save programs the page
//! after the live one, and the sector is erased only when the rotation wraps
//! back to page 0. On load, the live page is the last one of the contiguous
//! run of valid pages starting at page 0.
//!
//! Saving is split in two so the flash step can run on another context:
//! [`ConfigStore::tick`] decides whether a save is due and hands out a
//! [`SaveRequest`]; a [`PageWriter`] performs it under the I/O lock; the
//! result goes back through [`ConfigStore::complete`].

mod module;
mod writer;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::board::{PAGE_COUNT, PAGE_SIZE, SAVE_DELAY_MS};
use crate::deadline::Deadline;
use crate::lock::IoLock;

pub use module::{ConfigModule, Slot, Verdict};
pub use writer::{ConfigFlash, PageWriter, WriteOutcome};

use module::{validate_region, Region};

/// Bytes of magic at the start of each page.
pub const MAGIC_SIZE: usize = 4;

/// Bytes available to modules.
pub const PAYLOAD_SIZE: usize = PAGE_SIZE - MAGIC_SIZE;

/// Maximum number of registered modules.
pub const MAX_MODULES: usize = 8;

/// Error type for module registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// [`MAX_MODULES`] already registered.
    TooManyModules,
    /// The module does not fit in the remaining payload.
    OutOfSpace,
    /// Modules must be registered before [`ConfigStore::load`].
    AlreadyLoaded,
}

/// A page image ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Target page index.
    pub page: usize,
    /// Erase the sector before programming.
    pub erase: bool,
    /// Magic followed by the payload.
    pub image: [u8; PAGE_SIZE],
}

struct InFlight {
    page: usize,
    payload: [u8; PAYLOAD_SIZE],
}

/// In-memory side of the store.
pub struct ConfigStore {
    magic: u32,
    regions: Vec<Region, MAX_MODULES>,
    used: usize,
    loaded: bool,
    defaults: [u8; PAYLOAD_SIZE],
    current: [u8; PAYLOAD_SIZE],
    /// Copy of the live page's payload.
    written: [u8; PAYLOAD_SIZE],
    live_page: Option<usize>,
    /// The page after the live one is not blank; restart the ring at page 0.
    erase_pending: bool,
    save_due: Option<u64>,
    in_flight: Option<InFlight>,
}

impl ConfigStore {
    pub fn new(magic: u32) -> Self {
        Self {
            magic,
            regions: Vec::new(),
            used: 0,
            loaded: false,
            defaults: [0; PAYLOAD_SIZE],
            current: [0; PAYLOAD_SIZE],
            written: [0; PAYLOAD_SIZE],
            live_page: None,
            erase_pending: false,
            save_due: None,
            in_flight: None,
        }
    }

    /// Reserve the next `M::SIZE` bytes of the blob for `M`.
    ///
    /// Offsets depend on call order, so every boot must register the same
    /// modules in the same order. The module's defaults are installed
    /// immediately; its validator runs on [`load`](Self::load).
    pub fn allocate<M: ConfigModule>(&mut self) -> Result<Slot<M>, StoreError> {
        if self.loaded {
            return Err(StoreError::AlreadyLoaded);
        }
        let offset = self.used;
        let end = offset + M::SIZE;
        if end > PAYLOAD_SIZE {
            return Err(StoreError::OutOfSpace);
        }
        self.regions
            .push(Region {
                offset,
                size: M::SIZE,
                validate: validate_region::<M>,
            })
            .map_err(|_| StoreError::TooManyModules)?;
        self.used = end;

        let slot = Slot::new(offset);
        M::defaults().encode(&mut self.defaults[slot.range()]);
        self.current[slot.range()].copy_from_slice(&self.defaults[slot.range()]);
        Ok(slot)
    }

    /// Find the live page and validate every module.
    ///
    /// With no valid page the defaults stay installed and an immediate save
    /// is scheduled. A module failing validation is repaired or reset on its
    /// own, and the record is re-persisted immediately.
    pub fn load<F: ConfigFlash>(&mut self, flash: &mut F, now_ms: u64) -> Option<usize> {
        let mut page = [0u8; PAGE_SIZE];
        for index in 0..PAGE_COUNT {
            if flash.read_page(index, &mut page).is_err() {
                warn!("config page {} unreadable", index);
                break;
            }
            if !self.has_magic(&page) {
                break;
            }
            self.live_page = Some(index);
            self.written.copy_from_slice(&page[MAGIC_SIZE..]);
        }

        let next = self.next_page();
        if next != 0 || self.live_page.is_none() {
            let blank = flash.read_page(next, &mut page).is_ok() && page.iter().all(|&b| b == 0xFF);
            self.erase_pending = !blank;
        }
        self.loaded = true;

        match self.live_page {
            Some(index) => {
                self.current = self.written;
                info!("config page {} loaded", index);
            }
            None => {
                info!("no config page found, defaults installed");
                self.current = self.defaults;
                self.mark_dirty(now_ms, true);
            }
        }

        let mut repaired = false;
        for region in &self.regions {
            match (region.validate)(&mut self.current[region.range()]) {
                Verdict::Valid => {}
                Verdict::Migrated => {
                    warn!("config module at {} repaired", region.offset);
                    repaired = true;
                }
                Verdict::Invalid => {
                    warn!("config module at {} reset to defaults", region.offset);
                    repaired = true;
                }
            }
        }
        if repaired {
            self.mark_dirty(now_ms, true);
        }
        self.live_page
    }

    /// Decode a module from the in-memory blob.
    #[must_use]
    pub fn read<M: ConfigModule>(&self, slot: Slot<M>) -> M {
        M::decode(&self.current[slot.range()]).0
    }

    /// Encode a module into the in-memory blob without scheduling a save.
    pub fn write<M: ConfigModule>(&mut self, slot: Slot<M>, value: &M) {
        value.encode(&mut self.current[slot.range()]);
    }

    /// Encode a module and schedule a save.
    pub fn update<M: ConfigModule>(&mut self, slot: Slot<M>, value: &M, now_ms: u64, immediate: bool) {
        self.write(slot, value);
        self.mark_dirty(now_ms, immediate);
    }

    /// Replace the whole blob with the registered defaults and save at once.
    pub fn factory_reset(&mut self, now_ms: u64) {
        self.current = self.defaults;
        self.mark_dirty(now_ms, true);
    }

    /// Schedule a save.
    ///
    /// Restarts the debounce timer; `immediate` makes the save due now. A
    /// save that is already due is never pushed back.
    pub fn mark_dirty(&mut self, now_ms: u64, immediate: bool) {
        if self.save_due.is_none() {
            debug!("config save requested");
        }
        let due = if immediate {
            now_ms
        } else {
            now_ms + SAVE_DELAY_MS
        };
        self.save_due = Some(match self.save_due {
            Some(pending) if pending <= now_ms => pending,
            _ => due,
        });
    }

    /// Called once per cycle. Returns a page to write once the debounce timer
    /// has expired and the blob differs from the live page.
    ///
    /// Returns `None` while a previous request is still outstanding.
    pub fn tick(&mut self, now_ms: u64) -> Option<SaveRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        match self.save_due {
            Some(due) if now_ms >= due => self.save_due = None,
            _ => return None,
        }
        if self.live_page.is_some() && self.current == self.written {
            debug!("config unchanged, save skipped");
            return None;
        }

        let (page, erase) = if self.erase_pending {
            (0, true)
        } else {
            let next = self.next_page();
            (next, next == 0 && self.live_page.is_some())
        };
        let mut image = [0u8; PAGE_SIZE];
        image[..MAGIC_SIZE].copy_from_slice(&self.magic.to_le_bytes());
        image[MAGIC_SIZE..].copy_from_slice(&self.current);
        self.in_flight = Some(InFlight {
            page,
            payload: self.current,
        });
        Some(SaveRequest { page, erase, image })
    }

    /// Report the result of the outstanding [`SaveRequest`].
    ///
    /// A deferred or failed write is retried on the next debounce expiry.
    /// After a failure the ring restarts at page 0 with an erase.
    pub fn complete(&mut self, outcome: WriteOutcome, now_ms: u64) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        match outcome {
            WriteOutcome::Written => {
                self.written = flight.payload;
                self.live_page = Some(flight.page);
                self.erase_pending = false;
            }
            WriteOutcome::Deferred | WriteOutcome::Failed => {
                if outcome == WriteOutcome::Failed {
                    self.erase_pending = true;
                }
                if self.save_due.is_none() {
                    self.save_due = Some(now_ms + SAVE_DELAY_MS);
                }
            }
        }
    }

    /// Run [`tick`](Self::tick), the write and [`complete`](Self::complete)
    /// in one go, for when the caller also owns the flash.
    pub async fn flush<F, M, D>(
        &mut self,
        now_ms: u64,
        writer: &mut PageWriter<F>,
        lock: &IoLock<M>,
        deadline: &D,
    ) -> Option<WriteOutcome>
    where
        F: ConfigFlash,
        M: RawMutex,
        D: Deadline,
    {
        let request = self.tick(now_ms)?;
        let outcome = writer.write(&request, lock, deadline).await;
        self.complete(outcome, now_ms);
        Some(outcome)
    }

    /// Index of the live page, if any page has been loaded or written.
    #[inline]
    #[must_use]
    pub fn live_page(&self) -> Option<usize> {
        self.live_page
    }

    /// A save is scheduled or outstanding.
    #[inline]
    #[must_use]
    pub fn save_pending(&self) -> bool {
        self.save_due.is_some() || self.in_flight.is_some()
    }

    /// The in-memory blob differs from the live page.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.live_page.is_none() || self.current != self.written
    }

    #[inline]
    #[must_use]
    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// The in-memory payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.current
    }

    fn has_magic(&self, page: &[u8; PAGE_SIZE]) -> bool {
        page[..MAGIC_SIZE] == self.magic.to_le_bytes()
    }

    fn next_page(&self) -> usize {
        self.live_page.map_or(0, |page| (page + 1) % PAGE_COUNT)
    }
}
