//! MPR121 register map and the constants this firmware programs into it.

pub const TOUCH_STATUS: u8 = 0x00;
pub const FILTERED_DATA: u8 = 0x04;

// Baseline filter, rising / falling / touched regimes.
pub const MHD_RISING: u8 = 0x2B;
pub const NHD_RISING: u8 = 0x2C;
pub const NCL_RISING: u8 = 0x2D;
pub const FDL_RISING: u8 = 0x2E;
pub const MHD_FALLING: u8 = 0x2F;
pub const NHD_FALLING: u8 = 0x30;
pub const NCL_FALLING: u8 = 0x31;
pub const FDL_FALLING: u8 = 0x32;
pub const NHD_TOUCHED: u8 = 0x33;
pub const NCL_TOUCHED: u8 = 0x34;
pub const FDL_TOUCHED: u8 = 0x35;

/// First electrode's touch threshold; release follows, then the next electrode.
pub const TOUCH_THRESHOLD: u8 = 0x41;

pub const DEBOUNCE: u8 = 0x5B;
pub const AFE_CONFIG: u8 = 0x5C;
pub const FILTER_CONFIG: u8 = 0x5D;
pub const ELECTRODE_CONFIG: u8 = 0x5E;
pub const AUTOCONFIG_CONTROL_0: u8 = 0x7B;
pub const AUTOCONFIG_USL: u8 = 0x7D;
pub const AUTOCONFIG_LSL: u8 = 0x7E;
pub const AUTOCONFIG_TARGET: u8 = 0x7F;
pub const SOFT_RESET: u8 = 0x80;

/// Value that triggers a soft reset when written to [`SOFT_RESET`].
pub const SOFT_RESET_MAGIC: u8 = 0x63;

/// Calibration-lock bits of the electrode config; everything below them
/// enables sensing.
pub const ECR_CALIBRATION_LOCK: u8 = 0xC0;

/// Baseline tracking enabled, 5 MSB loaded, no electrodes running.
pub const ECR_STOPPED: u8 = 0x80;

/// Baseline tracking enabled, 5 MSB loaded, all 12 electrodes running.
pub const ECR_RUN_ALL: u8 = 0x8C;

/// Default touch threshold before any sensitivity offset.
pub const TOUCH_THRESHOLD_BASE: i16 = 22;

/// Default release threshold before any sensitivity offset.
pub const RELEASE_THRESHOLD_BASE: i16 = 15;

/// AFE: 6 samples first filter, 16 uA global charge current.
pub const AFE_DEFAULT: u8 = 0b0001_0000;

/// Filter: 0.5 us charge time, 4 samples second filter, 16 ms interval.
pub const FILTER_DEFAULT: u8 = 0b0010_1000;

/// Auto-config: 6 samples (matches AFE), load 5 MSB, auto-config + reconfig enabled.
pub const AUTOCONFIG_DEFAULT: u8 = 0b0000_1011;

/// Supply voltage the auto-configuration limits are computed for.
const VDD_MV: u32 = 3300;

/// Upper limit: `(Vdd - 0.1 V) / Vdd * 256`, pushed to the top for maximum
/// sensitivity rather than linearity.
pub const AUTOCONFIG_USL_VALUE: u8 = ((VDD_MV - 100) * 256 / VDD_MV) as u8;

/// Lower limit: 65% of the upper limit.
pub const AUTOCONFIG_LSL_VALUE: u8 = (AUTOCONFIG_USL_VALUE as u32 * 65 / 100) as u8;

/// Target level: 90% of the upper limit.
pub const AUTOCONFIG_TARGET_VALUE: u8 = (AUTOCONFIG_USL_VALUE as u32 * 90 / 100) as u8;

/// Registers written during initialization, in order, between soft reset and
/// electrode enable.
pub const INIT_SEQUENCE: [(u8, u8); 19] = [
    // rising: baseline quick rising
    (MHD_RISING, 1),
    (NHD_RISING, 1),
    (NCL_RISING, 1),
    (FDL_RISING, 1),
    // falling: baseline slow falling
    (MHD_FALLING, 1),
    (NHD_FALLING, 1),
    (NCL_FALLING, 6),
    (FDL_FALLING, 12),
    // touched: baseline very slow falling
    (NHD_TOUCHED, 1),
    (NCL_TOUCHED, 8),
    (FDL_TOUCHED, 30),
    (DEBOUNCE, 0x00),
    (AFE_CONFIG, AFE_DEFAULT),
    (FILTER_CONFIG, FILTER_DEFAULT),
    (ELECTRODE_CONFIG, ECR_STOPPED),
    (AUTOCONFIG_CONTROL_0, AUTOCONFIG_DEFAULT),
    (AUTOCONFIG_USL, AUTOCONFIG_USL_VALUE),
    (AUTOCONFIG_LSL, AUTOCONFIG_LSL_VALUE),
    (AUTOCONFIG_TARGET, AUTOCONFIG_TARGET_VALUE),
];
