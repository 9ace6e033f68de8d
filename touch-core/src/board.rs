//! Board-level constants shared by the core and the firmware.

/// Number of MPR121 chips on the bus.
pub const CHIP_COUNT: usize = 3;

/// Electrodes per chip.
pub const ELECTRODES_PER_CHIP: usize = 12;

/// Physical channels across all chips.
pub const CHANNEL_COUNT: usize = CHIP_COUNT * ELECTRODES_PER_CHIP;

/// I2C address of chip 0; chip `n` answers at `BASE_ADDRESS + n`.
pub const CHIP_BASE_ADDRESS: u8 = 0x5A;

/// I2C bus frequency in Hz.
pub const I2C_FREQUENCY: u32 = 400_000;

/// Deadline for a single-register bus transfer, in microseconds.
pub const BUS_DEADLINE_US: u32 = 1_000;

/// Sampling loop rate in Hz.
pub const SAMPLE_RATE_HZ: u64 = 1_000;

/// Flash page size (RP2040 program granularity).
pub const PAGE_SIZE: usize = 256;

/// Flash erase-sector size.
pub const SECTOR_SIZE: usize = 4096;

/// Pages in the reserved sector.
pub const PAGE_COUNT: usize = SECTOR_SIZE / PAGE_SIZE;

/// Magic tag written at the start of every valid page.
pub const DEFAULT_MAGIC: u32 = 0xCAFE_CAFE;

/// Debounce delay between the last config change and the flash write.
pub const SAVE_DELAY_MS: u64 = 5_000;

/// Maximum wait for the shared I/O lock before a save is deferred.
pub const LOCK_TIMEOUT_US: u32 = 100_000;

/// Pause taken after acquiring the lock so in-flight bus traffic can drain.
pub const SETTLE_US: u32 = 10_000;
