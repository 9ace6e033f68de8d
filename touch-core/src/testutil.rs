//! Host-side doubles for the bus, the flash and the clock.

extern crate std;

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::board::{PAGE_COUNT, PAGE_SIZE};
use crate::chip::regs;
use crate::deadline::Deadline;
use crate::store::ConfigFlash;

/// Run a future to completion on a noop waker.
///
/// Panics if the future returns `Pending`: every double here either completes
/// immediately or races an [`ImmediateDeadline`].
pub fn block_on<F: Future>(mut f: F) -> F::Output {
    fn noop_raw_waker() -> RawWaker {
        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            noop_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(core::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
    let mut cx = Context::from_waker(&waker);

    // SAFETY: We don't move f after pinning
    let mut f = unsafe { Pin::new_unchecked(&mut f) };

    match f.as_mut().poll(&mut cx) {
        Poll::Ready(result) => result,
        Poll::Pending => panic!("Mock future returned Pending unexpectedly"),
    }
}

/// A deadline that has always already elapsed.
///
/// Operations are polled first, so anything that completes immediately still
/// succeeds; only a stalled operation loses the race.
#[derive(Clone, Copy, Default)]
pub struct ImmediateDeadline;

impl Deadline for ImmediateDeadline {
    fn after_micros(&self, _micros: u32) -> impl Future<Output = ()> {
        core::future::ready(())
    }
}

/// Register file of one simulated MPR121.
struct SimChip {
    regs: [u8; 256],
    pointer: u8,
    stalled: bool,
    writes_while_running: usize,
}

impl SimChip {
    fn new() -> Self {
        let mut chip = Self {
            regs: [0; 256],
            pointer: 0,
            stalled: false,
            writes_while_running: 0,
        };
        chip.reset();
        chip
    }

    fn reset(&mut self) {
        let touch_and_raw = self.regs[..0x2B].to_vec();
        self.regs = [0; 256];
        // Status and data registers are driven by the sensor, not by reset.
        self.regs[..0x2B].copy_from_slice(&touch_and_raw);
        self.regs[regs::AFE_CONFIG as usize] = 0x10;
        self.regs[regs::FILTER_CONFIG as usize] = 0x24;
    }

    fn running(&self) -> bool {
        self.regs[regs::ELECTRODE_CONFIG as usize] & 0x3F != 0
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&reg, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = reg;
        for &value in data {
            let reg = self.pointer;
            if reg == regs::SOFT_RESET && value == regs::SOFT_RESET_MAGIC {
                self.reset();
            } else if (0x2B..=0x7F).contains(&reg) {
                if reg != regs::ELECTRODE_CONFIG && self.running() {
                    self.writes_while_running += 1;
                }
                self.regs[reg as usize] = value;
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte = self.regs[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

/// Error returned by [`SimHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl embedded_hal_async::i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

/// Simulated I2C bus with any number of MPR121s on it.
#[derive(Clone)]
pub struct SimBus {
    chips: Rc<RefCell<BTreeMap<u8, SimChip>>>,
}

impl SimBus {
    pub fn with_chips(addresses: &[u8]) -> Self {
        let chips = addresses.iter().map(|&a| (a, SimChip::new())).collect();
        Self {
            chips: Rc::new(RefCell::new(chips)),
        }
    }

    /// A bus handle for one driver.
    pub fn handle(&self) -> SimHandle {
        SimHandle { bus: self.clone() }
    }

    pub fn reg(&self, address: u8, reg: u8) -> u8 {
        self.chips.borrow()[&address].regs[reg as usize]
    }

    pub fn set_touched(&self, address: u8, bits: u16) {
        let mut chips = self.chips.borrow_mut();
        let chip = chips.get_mut(&address).unwrap();
        chip.regs[0..2].copy_from_slice(&bits.to_le_bytes());
    }

    pub fn set_raw(&self, address: u8, electrode: usize, value: u16) {
        let mut chips = self.chips.borrow_mut();
        let chip = chips.get_mut(&address).unwrap();
        let at = regs::FILTERED_DATA as usize + electrode * 2;
        chip.regs[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn set_stalled(&self, address: u8, stalled: bool) {
        self.chips.borrow_mut().get_mut(&address).unwrap().stalled = stalled;
    }

    pub fn writes_while_running(&self, address: u8) -> usize {
        self.chips.borrow()[&address].writes_while_running
    }
}

/// One driver's view of a [`SimBus`].
pub struct SimHandle {
    bus: SimBus,
}

impl ErrorType for SimHandle {
    type Error = SimError;
}

impl I2c for SimHandle {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let stalled = match self.bus.chips.borrow().get(&address) {
            Some(chip) => chip.stalled,
            None => return Err(SimError),
        };
        if stalled {
            core::future::pending::<()>().await;
        }

        let mut chips = self.bus.chips.borrow_mut();
        let chip = chips.get_mut(&address).ok_or(SimError)?;
        for op in operations {
            match op {
                Operation::Write(bytes) => chip.write(bytes),
                Operation::Read(buf) => chip.read(buf),
            }
        }
        Ok(())
    }
}

/// Flash fault injected by [`MemFlash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemFlashError;

/// In-memory NOR sector: erase sets bytes to `0xFF`, program can only clear bits.
#[derive(Clone)]
pub struct MemFlash {
    pub pages: Vec<[u8; PAGE_SIZE]>,
    pub erases: usize,
    pub programs: usize,
    pub fail_program: bool,
}

impl MemFlash {
    pub fn erased() -> Self {
        Self {
            pages: std::vec![[0xFF; PAGE_SIZE]; PAGE_COUNT],
            erases: 0,
            programs: 0,
            fail_program: false,
        }
    }

    /// Same contents, fresh counters: what the next boot sees.
    pub fn power_cycle(&self) -> Self {
        Self {
            pages: self.pages.clone(),
            erases: 0,
            programs: 0,
            fail_program: false,
        }
    }
}

impl ConfigFlash for MemFlash {
    type Error = MemFlashError;

    fn read_page(&mut self, index: usize, buf: &mut [u8; PAGE_SIZE]) -> Result<(), Self::Error> {
        *buf = *self.pages.get(index).ok_or(MemFlashError)?;
        Ok(())
    }

    fn erase_sector(&mut self) -> Result<(), Self::Error> {
        for page in &mut self.pages {
            *page = [0xFF; PAGE_SIZE];
        }
        self.erases += 1;
        Ok(())
    }

    fn program_page(&mut self, index: usize, data: &[u8; PAGE_SIZE]) -> Result<(), Self::Error> {
        if self.fail_program {
            return Err(MemFlashError);
        }
        let page = self.pages.get_mut(index).ok_or(MemFlashError)?;
        for (cell, &byte) in page.iter_mut().zip(data) {
            *cell &= byte;
        }
        self.programs += 1;
        Ok(())
    }
}
