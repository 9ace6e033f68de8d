//! MPR121 capacitive touch chip driver.
//!
//! One [`Mpr121`] drives one chip on a shared I2C bus. Every transaction is
//! bounded by a [`Deadline`]; a failed or late transfer clears the chip's
//! health flag and returns an error. There is no retry loop here: the
//! sampling cadence re-polls on the next cycle.
//!
//! Most configuration registers are only writable while sensing is stopped.
//! [`Mpr121::with_paused`] brackets such writes, restoring the electrode
//! configuration on every exit path.

pub mod regs;

use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::i2c::I2c;

use crate::board::{BUS_DEADLINE_US, ELECTRODES_PER_CHIP};
use crate::deadline::{bounded, Deadline, Elapsed};

/// Lowest threshold the driver will program.
pub const THRESHOLD_MIN: i16 = 1;

/// Highest threshold the driver will program.
pub const THRESHOLD_MAX: i16 = 0xFF;

/// Bus-level failure reason, reduced from [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusFault {
    /// Chip did not acknowledge.
    Nack,
    /// Lost arbitration to another master.
    Arbitration,
    /// Bus error or overrun.
    Bus,
    /// Anything else the HAL reports.
    Other,
}

impl From<ErrorKind> for BusFault {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NoAcknowledge(_) => BusFault::Nack,
            ErrorKind::ArbitrationLoss => BusFault::Arbitration,
            ErrorKind::Bus | ErrorKind::Overrun => BusFault::Bus,
            _ => BusFault::Other,
        }
    }
}

/// Error type for chip operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipError {
    /// The transfer did not finish before its deadline.
    Timeout,
    /// The bus reported a fault.
    Bus(BusFault),
}

/// Last known state of one chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipState {
    /// 7-bit I2C address.
    pub address: u8,
    /// Last 12-bit touched bitmap.
    pub touched: u16,
    /// Last filtered sample per electrode (10-bit).
    pub raw: [u16; ELECTRODES_PER_CHIP],
    /// Outcome of the most recent transfer.
    pub healthy: bool,
}

impl ChipState {
    const fn new(address: u8) -> Self {
        Self {
            address,
            touched: 0,
            raw: [0; ELECTRODES_PER_CHIP],
            healthy: false,
        }
    }
}

/// Per-electrode touch/release threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Thresholds {
    pub touch: u8,
    pub release: u8,
}

impl Thresholds {
    /// Thresholds for a combined sensitivity offset.
    ///
    /// A larger offset lowers both thresholds; release moves by half as much,
    /// keeping hysteresis.
    #[must_use]
    pub fn for_offset(global: i8, key: i8) -> Self {
        let delta = i16::from(global) + i16::from(key);
        Self {
            touch: clamp_threshold(regs::TOUCH_THRESHOLD_BASE - delta),
            release: clamp_threshold(regs::RELEASE_THRESHOLD_BASE - delta / 2),
        }
    }
}

fn clamp_threshold(value: i16) -> u8 {
    value.clamp(THRESHOLD_MIN, THRESHOLD_MAX) as u8
}

/// Deadline for a transfer of `bytes` data bytes.
fn deadline_for(bytes: usize) -> u32 {
    BUS_DEADLINE_US.max(BUS_DEADLINE_US.saturating_mul(bytes as u32) / 2)
}

/// Driver for one MPR121 on a shared bus.
pub struct Mpr121<I, D> {
    i2c: I,
    deadline: D,
    state: ChipState,
}

impl<I: I2c, D: Deadline> Mpr121<I, D> {
    /// Create a driver for the chip at `address`. No bus traffic happens until
    /// [`initialize`](Self::initialize).
    pub fn new(i2c: I, deadline: D, address: u8) -> Self {
        Self {
            i2c,
            deadline,
            state: ChipState::new(address),
        }
    }

    #[inline]
    #[must_use]
    pub fn address(&self) -> u8 {
        self.state.address
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> &ChipState {
        &self.state
    }

    #[inline]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state.healthy
    }

    /// Reset the chip and bring it into active sensing.
    ///
    /// Enabling the electrodes is the last write: it leaves configuration mode
    /// and write-protects most of what came before it.
    pub async fn initialize(&mut self) -> Result<(), ChipError> {
        self.write_reg(regs::SOFT_RESET, regs::SOFT_RESET_MAGIC).await?;
        for (reg, value) in regs::INIT_SEQUENCE {
            self.write_reg(reg, value).await?;
        }
        let defaults = [Thresholds::for_offset(0, 0); ELECTRODES_PER_CHIP];
        self.write_thresholds(&defaults).await?;
        self.write_reg(regs::ELECTRODE_CONFIG, regs::ECR_RUN_ALL).await
    }

    /// Read the 12-bit touched bitmap.
    pub async fn read_touched_bitmap(&mut self) -> Result<u16, ChipError> {
        let mut buf = [0u8; 2];
        self.read_many(regs::TOUCH_STATUS, &mut buf).await?;
        let touched = u16::from_le_bytes(buf) & 0x0FFF;
        self.state.touched = touched;
        Ok(touched)
    }

    /// Read filtered data for the first `count` electrodes.
    pub async fn read_raw_samples(&mut self, count: usize) -> Result<&[u16], ChipError> {
        let count = count.min(ELECTRODES_PER_CHIP);
        let mut buf = [0u8; ELECTRODES_PER_CHIP * 2];
        self.read_many(regs::FILTERED_DATA, &mut buf[..count * 2])
            .await?;
        for (sample, bytes) in self.state.raw.iter_mut().zip(buf.chunks_exact(2)).take(count) {
            *sample = u16::from_le_bytes([bytes[0], bytes[1]]) & 0x03FF;
        }
        Ok(&self.state.raw[..count])
    }

    /// Set first-filter iterations, second-filter iterations and sample
    /// interval.
    pub async fn apply_filter_config(&mut self, ffi: u8, sfi: u8, esi: u8) -> Result<(), ChipError> {
        self.with_paused(async |chip| {
            let afe = chip.read_reg(regs::AFE_CONFIG).await?;
            chip.write_reg(regs::AFE_CONFIG, (afe & 0x3F) | (ffi & 0x03) << 6)
                .await?;
            let acc = chip.read_reg(regs::AUTOCONFIG_CONTROL_0).await?;
            chip.write_reg(regs::AUTOCONFIG_CONTROL_0, (acc & 0x3F) | (ffi & 0x03) << 6)
                .await?;
            let fcr = chip.read_reg(regs::FILTER_CONFIG).await?;
            chip.write_reg(
                regs::FILTER_CONFIG,
                (fcr & 0xE0) | (sfi & 0x03) << 3 | (esi & 0x07),
            )
            .await
        })
        .await
    }

    /// Program per-electrode thresholds from a global and per-electrode
    /// sensitivity offset.
    pub async fn apply_sensitivity(
        &mut self,
        global: i8,
        offsets: &[i8; ELECTRODES_PER_CHIP],
    ) -> Result<(), ChipError> {
        let mut thresholds = [Thresholds::for_offset(global, 0); ELECTRODES_PER_CHIP];
        for (t, &offset) in thresholds.iter_mut().zip(offsets) {
            *t = Thresholds::for_offset(global, offset);
        }
        self.with_paused(async |chip| chip.write_thresholds(&thresholds).await)
            .await
    }

    /// Set the touch and release debounce counts (0..=7 each).
    pub async fn apply_debounce(&mut self, touch: u8, release: u8) -> Result<(), ChipError> {
        let value = (release & 0x07) << 4 | (touch & 0x07);
        self.with_paused(async |chip| chip.write_reg(regs::DEBOUNCE, value).await)
            .await
    }

    /// Run `f` with sensing stopped, then restore the electrode configuration.
    ///
    /// The saved configuration is written back whether or not `f` succeeds.
    /// An error from `f` takes precedence over an error from the restore.
    pub async fn with_paused<T, F>(&mut self, f: F) -> Result<T, ChipError>
    where
        F: AsyncFnOnce(&mut Self) -> Result<T, ChipError>,
    {
        let ecr = self.read_reg(regs::ELECTRODE_CONFIG).await?;
        if let Err(e) = self
            .write_reg(regs::ELECTRODE_CONFIG, ecr & regs::ECR_CALIBRATION_LOCK)
            .await
        {
            let _ = self.write_reg(regs::ELECTRODE_CONFIG, ecr).await;
            return Err(e);
        }

        let result = f(self).await;
        let resumed = self.write_reg(regs::ELECTRODE_CONFIG, ecr).await;
        let value = result?;
        resumed?;
        Ok(value)
    }

    /// Write touch/release pairs for all electrodes in one auto-increment burst.
    async fn write_thresholds(
        &mut self,
        thresholds: &[Thresholds; ELECTRODES_PER_CHIP],
    ) -> Result<(), ChipError> {
        let mut buf = [0u8; 1 + ELECTRODES_PER_CHIP * 2];
        buf[0] = regs::TOUCH_THRESHOLD;
        for (pair, t) in buf[1..].chunks_exact_mut(2).zip(thresholds) {
            pair[0] = t.touch;
            pair[1] = t.release;
        }
        let address = self.state.address;
        let result = bounded(
            &self.deadline,
            deadline_for(buf.len()),
            self.i2c.write(address, &buf),
        )
        .await;
        self.record(result)
    }

    async fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), ChipError> {
        let address = self.state.address;
        let result = bounded(
            &self.deadline,
            BUS_DEADLINE_US,
            self.i2c.write(address, &[reg, value]),
        )
        .await;
        self.record(result)
    }

    async fn read_reg(&mut self, reg: u8) -> Result<u8, ChipError> {
        let mut buf = [0u8; 1];
        self.read_many(reg, &mut buf).await?;
        Ok(buf[0])
    }

    async fn read_many(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ChipError> {
        let address = self.state.address;
        let micros = deadline_for(buf.len());
        let result = bounded(&self.deadline, micros, self.i2c.write_read(address, &[reg], buf)).await;
        self.record(result)
    }

    /// Fold a bounded transfer result into the health flag.
    fn record<T, E: embedded_hal::i2c::Error>(
        &mut self,
        result: Result<Result<T, E>, Elapsed>,
    ) -> Result<T, ChipError> {
        let result = match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChipError::Bus(BusFault::from(e.kind()))),
            Err(Elapsed) => Err(ChipError::Timeout),
        };
        let healthy = result.is_ok();
        if healthy != self.state.healthy {
            if healthy {
                info!("chip {:x} healthy", self.state.address);
            } else {
                warn!("chip {:x} unhealthy", self.state.address);
            }
        }
        self.state.healthy = healthy;
        result
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::testutil::{block_on, ImmediateDeadline, SimBus};

    const ADDR: u8 = 0x5A;

    fn chip(bus: &SimBus) -> Mpr121<crate::testutil::SimHandle, ImmediateDeadline> {
        Mpr121::new(bus.handle(), ImmediateDeadline, ADDR)
    }

    #[test]
    fn test_initialize_ends_in_run_mode() {
        let bus = SimBus::with_chips(&[ADDR]);
        let mut mpr = chip(&bus);
        block_on(mpr.initialize()).unwrap();

        assert!(mpr.is_healthy());
        assert_eq!(bus.reg(ADDR, regs::ELECTRODE_CONFIG), regs::ECR_RUN_ALL);
        assert_eq!(bus.reg(ADDR, regs::FDL_TOUCHED), 30);
        assert_eq!(bus.reg(ADDR, regs::AUTOCONFIG_USL), 248);
        for e in 0..12u8 {
            assert_eq!(bus.reg(ADDR, regs::TOUCH_THRESHOLD + e * 2), 22);
            assert_eq!(bus.reg(ADDR, regs::TOUCH_THRESHOLD + e * 2 + 1), 15);
        }
        assert_eq!(bus.writes_while_running(ADDR), 0);
    }

    #[test]
    fn test_touched_bitmap_masks_to_12_bits() {
        let bus = SimBus::with_chips(&[ADDR]);
        let mut mpr = chip(&bus);
        bus.set_touched(ADDR, 0xF00F);
        assert_eq!(block_on(mpr.read_touched_bitmap()), Ok(0x000F));
        assert_eq!(mpr.state().touched, 0x000F);
    }

    #[test]
    fn test_raw_samples_are_10_bit() {
        let bus = SimBus::with_chips(&[ADDR]);
        let mut mpr = chip(&bus);
        bus.set_raw(ADDR, 0, 0xFFFF);
        bus.set_raw(ADDR, 3, 517);
        let raw = block_on(mpr.read_raw_samples(4)).unwrap();
        assert_eq!(raw, &[0x03FF, 0, 0, 517]);
    }

    #[test]
    fn test_sensitivity_threshold_readback_over_full_range() {
        let bus = SimBus::with_chips(&[ADDR]);
        let mut mpr = chip(&bus);
        block_on(mpr.initialize()).unwrap();

        for g in -9i8..=9 {
            for o in -9i8..=9 {
                let mut offsets = [0i8; 12];
                offsets[5] = o;
                block_on(mpr.apply_sensitivity(g, &offsets)).unwrap();

                let expected = (22 - i16::from(g) - i16::from(o)).clamp(1, 255) as u8;
                assert_eq!(bus.reg(ADDR, regs::TOUCH_THRESHOLD + 10), expected);
                let untouched = (22 - i16::from(g)).clamp(1, 255) as u8;
                assert_eq!(bus.reg(ADDR, regs::TOUCH_THRESHOLD), untouched);
            }
        }
        assert_eq!(bus.reg(ADDR, regs::ELECTRODE_CONFIG), regs::ECR_RUN_ALL);
        assert_eq!(bus.writes_while_running(ADDR), 0);
    }

    #[test]
    fn test_release_threshold_moves_half_as_far() {
        let t = Thresholds::for_offset(4, 4);
        assert_eq!(t.touch, 14);
        assert_eq!(t.release, 11);
        let t = Thresholds::for_offset(-9, -9);
        assert_eq!(t.touch, 40);
        assert_eq!(t.release, 24);
    }

    #[test]
    fn test_filter_and_debounce_respect_bracket() {
        let bus = SimBus::with_chips(&[ADDR]);
        let mut mpr = chip(&bus);
        block_on(mpr.initialize()).unwrap();

        block_on(mpr.apply_filter_config(2, 1, 3)).unwrap();
        assert_eq!(bus.reg(ADDR, regs::AFE_CONFIG), regs::AFE_DEFAULT | 0x80);
        assert_eq!(bus.reg(ADDR, regs::AUTOCONFIG_CONTROL_0) >> 6, 2);
        assert_eq!(bus.reg(ADDR, regs::FILTER_CONFIG), 0b0010_1000 & 0xE0 | 1 << 3 | 3);

        block_on(mpr.apply_debounce(3, 5)).unwrap();
        assert_eq!(bus.reg(ADDR, regs::DEBOUNCE), 0x53);

        assert_eq!(bus.reg(ADDR, regs::ELECTRODE_CONFIG), regs::ECR_RUN_ALL);
        assert_eq!(bus.writes_while_running(ADDR), 0);
    }

    #[test]
    fn test_bracket_restores_config_after_inner_failure() {
        let bus = SimBus::with_chips(&[ADDR]);
        let mut mpr = chip(&bus);
        block_on(mpr.initialize()).unwrap();

        let result: Result<(), ChipError> =
            block_on(mpr.with_paused(async |_chip| Err(ChipError::Timeout)));
        assert_eq!(result, Err(ChipError::Timeout));
        assert_eq!(bus.reg(ADDR, regs::ELECTRODE_CONFIG), regs::ECR_RUN_ALL);
    }

    #[test]
    fn test_stalled_bus_times_out_and_clears_health() {
        let bus = SimBus::with_chips(&[ADDR]);
        let mut mpr = chip(&bus);
        block_on(mpr.read_touched_bitmap()).unwrap();
        assert!(mpr.is_healthy());

        bus.set_stalled(ADDR, true);
        assert_eq!(block_on(mpr.read_touched_bitmap()), Err(ChipError::Timeout));
        assert!(!mpr.is_healthy());

        bus.set_stalled(ADDR, false);
        assert!(block_on(mpr.read_touched_bitmap()).is_ok());
        assert!(mpr.is_healthy());
    }

    #[test]
    fn test_missing_chip_reports_nack() {
        let bus = SimBus::with_chips(&[]);
        let mut mpr = chip(&bus);
        assert_eq!(
            block_on(mpr.read_touched_bitmap()),
            Err(ChipError::Bus(BusFault::Nack))
        );
        assert!(!mpr.is_healthy());
    }
}
