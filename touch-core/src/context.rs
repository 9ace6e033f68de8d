//! The device context: every piece of mutable device state in one value.
//!
//! Built once at startup and owned by the sampling loop. Collaborators read
//! through its accessors and change configuration only through
//! [`DeviceContext::execute`] or the validated setters.

use embedded_hal_async::i2c::I2c;

use crate::array::{zones_from_raw, SensorArray};
use crate::board::{CHANNEL_COUNT, CHIP_COUNT};
use crate::calibration::{self, Debounce, Filter, SenseSettings};
use crate::chip::ChipError;
use crate::command::{Command, CommandError, SenseTarget};
use crate::config::{HidConfig, LightingConfig};
use crate::deadline::Deadline;
use crate::keymap::KeyMap;
use crate::keys::{LogicalKey, TouchFrame, KEY_COUNT};
use crate::report::{Reply, Settings};
use crate::stats::TouchStatistics;
use crate::store::{ConfigFlash, ConfigStore, SaveRequest, Slot, StoreError, WriteOutcome};

/// Where each module lives in the config blob. Registration order is the
/// persisted layout.
struct Slots {
    sense: Slot<SenseSettings>,
    map: Slot<KeyMap>,
    lighting: Slot<LightingConfig>,
    hid: Slot<HidConfig>,
}

/// Chips, configuration and counters of one controller.
pub struct DeviceContext<I, D> {
    array: SensorArray<I, D>,
    store: ConfigStore,
    slots: Slots,
    sense: SenseSettings,
    map: KeyMap,
    lighting: LightingConfig,
    hid: HidConfig,
    stats: TouchStatistics,
}

impl<I: I2c, D: Deadline> DeviceContext<I, D> {
    /// Register every config module. No bus or flash traffic yet.
    pub fn new(array: SensorArray<I, D>, magic: u32) -> Result<Self, StoreError> {
        let mut store = ConfigStore::new(magic);
        let slots = Slots {
            sense: store.allocate()?,
            map: store.allocate()?,
            lighting: store.allocate()?,
            hid: store.allocate()?,
        };
        Ok(Self {
            array,
            sense: store.read(slots.sense),
            map: store.read(slots.map),
            lighting: store.read(slots.lighting),
            hid: store.read(slots.hid),
            store,
            slots,
            stats: TouchStatistics::new(),
        })
    }

    /// [`load`](Self::load) followed by [`start`](Self::start).
    pub async fn boot<F: ConfigFlash>(&mut self, flash: &mut F, now_ms: u64) {
        self.load(flash, now_ms);
        self.start().await;
    }

    /// Read the configuration from flash. No bus traffic.
    pub fn load<F: ConfigFlash>(&mut self, flash: &mut F, now_ms: u64) {
        self.store.load(flash, now_ms);
        self.reload();
    }

    /// Bring up the chips and calibrate them from the loaded settings.
    ///
    /// Chip failures are logged and otherwise ignored: a missing chip simply
    /// reports no touches.
    pub async fn start(&mut self) {
        let ready = self.array.initialize().await;
        if ready < CHIP_COUNT {
            warn!("{} of {} touch chips ready", ready, CHIP_COUNT);
        } else {
            info!("all {} touch chips ready", CHIP_COUNT);
        }
        if let Err(e) = self.calibrate().await {
            warn!("initial calibration incomplete: {:?}", e);
        }
    }

    /// Reprogram every chip from the current settings.
    pub async fn calibrate(&mut self) -> Result<(), ChipError> {
        calibration::apply(self.array.chips_mut(), &self.map, &self.sense).await
    }

    /// One sampling cycle.
    pub async fn sample(&mut self) -> TouchFrame {
        self.array.sample(&self.map, &mut self.stats).await
    }

    /// Once per cycle: a page to write, if a save has come due.
    pub fn tick(&mut self, now_ms: u64) -> Option<SaveRequest> {
        self.store.tick(now_ms)
    }

    /// Result of the page write handed out by [`tick`](Self::tick).
    pub fn complete_save(&mut self, outcome: WriteOutcome, now_ms: u64) {
        self.store.complete(outcome, now_ms);
    }

    /// Apply one command.
    ///
    /// Configuration changes are saved after the debounce delay; `save` and
    /// `factory` save immediately. A chip that cannot be reprogrammed does
    /// not undo the change: it is reported and picked up by the next
    /// calibration. Queries answer with the values they read.
    pub async fn execute(&mut self, command: Command, now_ms: u64) -> Result<Reply, CommandError> {
        match command {
            Command::Sense { target, op } => {
                let mut sense = self.sense;
                match target {
                    SenseTarget::Global => sense.global = op.apply(sense.global),
                    SenseTarget::AllKeys => {
                        for offset in &mut sense.keys {
                            *offset = op.apply(*offset);
                        }
                    }
                    SenseTarget::Key(key) => {
                        let i = key.index().ok_or(CommandError::UnknownKey)?;
                        sense.keys[i] = op.apply(sense.keys[i]);
                    }
                }
                self.set_sense(sense, now_ms).await?;
            }
            Command::Filter {
                first,
                second,
                interval,
            } => {
                let mut sense = self.sense;
                sense.filter = Filter {
                    first,
                    second,
                    interval: interval.unwrap_or(sense.filter.interval),
                };
                self.set_sense(sense, now_ms).await?;
            }
            Command::Debounce { touch, release } => {
                let mut sense = self.sense;
                sense.debounce = Debounce {
                    touch,
                    release: release.unwrap_or(sense.debounce.release),
                };
                self.set_sense(sense, now_ms).await?;
            }
            Command::Remap { channel, key } => {
                let mut map = self.map;
                map.set(channel, key).map_err(|_| CommandError::OutOfRange)?;
                self.set_map(map, now_ms).await?;
            }
            Command::ResetMap => self.set_map(KeyMap::hardware_default(), now_ms).await?,
            Command::Level(level) => {
                let lighting = LightingConfig {
                    level,
                    ..self.lighting
                };
                self.set_lighting(lighting, now_ms)?;
            }
            Command::Hid { joystick } => self.set_hid(HidConfig { joystick }, now_ms),
            Command::ResetStats => self.stats.reset(),
            Command::Save => self.store.mark_dirty(now_ms, true),
            Command::FactoryReset => {
                info!("factory reset");
                self.store.factory_reset(now_ms);
                self.reload();
                self.calibrate().await.map_err(CommandError::Chip)?;
            }
            Command::Display => return Ok(Reply::Settings(self.settings())),
            Command::Stat => return Ok(Reply::Counts(*self.stats.counts())),
            Command::Raw => return Ok(Reply::Raw(self.zones().await)),
        }
        Ok(Reply::Done)
    }

    /// Replace the calibration and reprogram the chips.
    pub async fn set_sense(&mut self, sense: SenseSettings, now_ms: u64) -> Result<(), CommandError> {
        if !sense.is_valid() {
            return Err(CommandError::OutOfRange);
        }
        self.sense = sense;
        self.store.update(self.slots.sense, &self.sense, now_ms, false);
        self.calibrate().await.map_err(CommandError::Chip)
    }

    /// Replace the key map. Per-key offsets follow their keys to the new
    /// electrodes.
    pub async fn set_map(&mut self, map: KeyMap, now_ms: u64) -> Result<(), CommandError> {
        self.map = map;
        self.store.update(self.slots.map, &self.map, now_ms, false);
        self.calibrate().await.map_err(CommandError::Chip)
    }

    /// Replace the key colors and brightness. A zero level is refused.
    pub fn set_lighting(&mut self, lighting: LightingConfig, now_ms: u64) -> Result<(), CommandError> {
        if lighting.level == 0 {
            return Err(CommandError::OutOfRange);
        }
        self.lighting = lighting;
        self.store.update(self.slots.lighting, &self.lighting, now_ms, false);
        Ok(())
    }

    /// Turn joystick reporting on or off.
    pub fn set_hid(&mut self, hid: HidConfig, now_ms: u64) {
        self.hid = hid;
        self.store.update(self.slots.hid, &self.hid, now_ms, false);
    }

    /// Filtered samples of every electrode, by physical channel.
    pub async fn raw(&mut self) -> [u16; CHANNEL_COUNT] {
        self.array.raw().await
    }

    /// Filtered samples re-indexed by logical key.
    pub async fn zones(&mut self) -> [u16; KEY_COUNT] {
        let raw = self.array.raw().await;
        zones_from_raw(&raw, &self.map)
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> TouchFrame {
        self.array.frame()
    }

    #[inline]
    #[must_use]
    pub fn touched(&self, key: LogicalKey) -> bool {
        self.array.touched(key)
    }

    #[inline]
    #[must_use]
    pub fn count(&self, key: LogicalKey) -> u32 {
        self.stats.count(key)
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &TouchStatistics {
        &self.stats
    }

    #[must_use]
    pub fn chip_health(&self) -> [bool; CHIP_COUNT] {
        self.array.health()
    }

    /// Everything `display` shows.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            sense: self.sense,
            lighting: self.lighting,
            hid: self.hid,
            chips: self.chip_health(),
        }
    }

    #[inline]
    #[must_use]
    pub fn sense(&self) -> &SenseSettings {
        &self.sense
    }

    #[inline]
    #[must_use]
    pub fn key_map(&self) -> &KeyMap {
        &self.map
    }

    #[inline]
    #[must_use]
    pub fn lighting(&self) -> &LightingConfig {
        &self.lighting
    }

    #[inline]
    #[must_use]
    pub fn hid(&self) -> &HidConfig {
        &self.hid
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    fn reload(&mut self) {
        self.sense = self.store.read(self.slots.sense);
        self.map = self.store.read(self.slots.map);
        self.lighting = self.store.read(self.slots.lighting);
        self.hid = self.store.read(self.slots.hid);
    }
}
