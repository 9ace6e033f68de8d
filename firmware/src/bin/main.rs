#![no_std]
#![no_main]

use defmt::{error, info, warn};
use defmt_rtt as _;
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_executor::Executor;
use embassy_rp::bind_interrupts;
use embassy_rp::dma::InterruptHandler as DmaInterruptHandler;
use embassy_rp::flash::Flash;
use embassy_rp::i2c::{self, I2c, InterruptHandler as I2cInterruptHandler};
use embassy_rp::multicore::{spawn_core1, Stack};
use embassy_rp::peripherals::{DMA_CH0, I2C0, PIO0, USB};
use embassy_rp::pio::{InterruptHandler as PioInterruptHandler, Pio};
use embassy_rp::pio_programs::ws2812::{PioWs2812, PioWs2812Program};
use embassy_rp::usb::{Driver, InterruptHandler as UsbInterruptHandler};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State as CdcState};
use embassy_usb::class::hid::State as HidState;
use embassy_usb::{Builder, Config as UsbConfig};
use portable_atomic::{AtomicBool, Ordering};
use static_cell::StaticCell;
use touch_controller::lighting::{render, LED_COUNT};
use touch_controller::{
    configure_usb_hid, now_ms, Console, ConsoleError, EmbassyDeadline, SectorFlash, Snapshot,
    UsbHidOutput,
};
use touch_core::board::{CHIP_BASE_ADDRESS, DEFAULT_MAGIC, I2C_FREQUENCY, SAMPLE_RATE_HZ};
use touch_core::{
    Command, CommandError, DeviceContext, IoLock, Mpr121, PageWriter, Reply, SaveRequest,
    SensorArray, TouchSink, WriteOutcome,
};

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    I2C0_IRQ => I2cInterruptHandler<I2C0>;
    USBCTRL_IRQ => UsbInterruptHandler<USB>;
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
    DMA_IRQ_0 => DmaInterruptHandler<DMA_CH0>;
});

type TouchI2c = I2c<'static, I2C0, i2c::Async>;
type Controller = DeviceContext<I2cDevice<'static, CriticalSectionRawMutex, TouchI2c>, EmbassyDeadline>;
type KeyLeds = PioWs2812<'static, PIO0, 0, LED_COUNT>;

static mut CORE1_STACK: Stack<16384> = Stack::new();
static EXECUTOR0: StaticCell<Executor> = StaticCell::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

/// The one I2C bus, shared by the three chip drivers.
static I2C_BUS: StaticCell<Mutex<CriticalSectionRawMutex, TouchI2c>> = StaticCell::new();

/// Held by the flash writer around erase/program and by the lighting task
/// around strip updates.
static IO_LOCK: IoLock<CriticalSectionRawMutex> = IoLock::new();

/// Due saves, core 1 to core 0. Never more than one outstanding.
static SAVE_REQUESTS: Signal<CriticalSectionRawMutex, SaveRequest> = Signal::new();
/// Save results, core 0 to core 1.
static SAVE_OUTCOMES: Signal<CriticalSectionRawMutex, WriteOutcome> = Signal::new();

/// Latest cycle for each output task ("latest value wins").
static HID_SNAPSHOTS: Signal<CriticalSectionRawMutex, Snapshot> = Signal::new();
static LED_SNAPSHOTS: Signal<CriticalSectionRawMutex, Snapshot> = Signal::new();

/// Console commands and their results. One command in flight at a time.
static COMMANDS: Channel<CriticalSectionRawMutex, Command, 1> = Channel::new();
static REPLIES: Channel<CriticalSectionRawMutex, Result<Reply, CommandError>, 1> = Channel::new();

/// Set once the sampling loop has started on core 1.
static CORE1_ALIVE: AtomicBool = AtomicBool::new(false);

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

static HID_STATE: StaticCell<HidState> = StaticCell::new();
static CDC_STATE: StaticCell<CdcState> = StaticCell::new();
static WS2812_PROGRAM: StaticCell<PioWs2812Program<'static, PIO0>> = StaticCell::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    info!("touch controller starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Touch chips ---
    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = I2C_FREQUENCY;
    let i2c = I2c::new_async(p.I2C0, p.PIN_17, p.PIN_16, Irqs, i2c_config); // SCL, SDA
    let bus: &'static _ = I2C_BUS.init(Mutex::new(i2c));
    let chips = core::array::from_fn(|n| {
        Mpr121::new(I2cDevice::new(bus), EmbassyDeadline, CHIP_BASE_ADDRESS + n as u8)
    });
    let mut controller = match DeviceContext::new(SensorArray::new(chips), DEFAULT_MAGIC) {
        Ok(controller) => controller,
        Err(e) => defmt::panic!("config modules do not fit: {:?}", e),
    };

    // --- Config flash ---
    // Loaded here, before core 1 exists; from now on only the writer touches it.
    let mut flash = SectorFlash::new(Flash::new_blocking(p.FLASH));
    controller.load(&mut flash, now_ms());
    let writer = PageWriter::new(flash);

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0x1209, 0x0001); // pid.codes test VID/PID
    usb_config.manufacturer = Some("Rust Touch");
    usb_config.product = Some("Touch Controller");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;
    // HID + CDC composite device.
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([0; 256]),
        CONTROL_BUF.init([0; 64]),
    );

    let hid_writer = configure_usb_hid(&mut builder, HID_STATE.init(HidState::new()));
    let cdc = CdcAcmClass::new(&mut builder, CDC_STATE.init(CdcState::new()), 64);
    let usb_device = builder.build();

    let hid_output = UsbHidOutput::new(hid_writer);
    let console = Console::new(cdc);

    // --- Key LEDs ---
    let Pio { mut common, sm0, .. } = Pio::new(p.PIO0, Irqs);
    let program = WS2812_PROGRAM.init(PioWs2812Program::new(&mut common));
    let leds: KeyLeds = PioWs2812::new(&mut common, sm0, p.DMA_CH0, Irqs, p.PIN_13, program);

    // --- Core 1: sampling ---
    spawn_core1(
        p.CORE1,
        unsafe { &mut *core::ptr::addr_of_mut!(CORE1_STACK) },
        move || {
            let executor1 = EXECUTOR1.init(Executor::new());
            executor1.run(|spawner| {
                spawner.spawn(touch_task(controller).unwrap());
            });
        },
    );

    // --- Core 0: USB, lighting, flash ---
    let executor0 = EXECUTOR0.init(Executor::new());
    executor0.run(|spawner| {
        spawner.spawn(usb_task(usb_device).unwrap());
        spawner.spawn(hid_task(hid_output).unwrap());
        spawner.spawn(console_task(console).unwrap());
        spawner.spawn(lighting_task(leds).unwrap());
        spawner.spawn(flash_task(writer).unwrap());
    })
}

/// Sampling loop - polls the chips at a fixed rate and services the store
/// and the console queue between polls.
#[embassy_executor::task]
async fn touch_task(mut controller: Controller) {
    controller.start().await;
    CORE1_ALIVE.store(true, Ordering::Release);
    info!("sampling at {} Hz", SAMPLE_RATE_HZ);

    let mut ticker = Ticker::every(Duration::from_hz(SAMPLE_RATE_HZ));
    loop {
        let frame = controller.sample().await;
        let snapshot = Snapshot {
            frame,
            lighting: *controller.lighting(),
            hid: *controller.hid(),
        };
        HID_SNAPSHOTS.signal(snapshot);
        LED_SNAPSHOTS.signal(snapshot);

        let now = now_ms();
        if let Some(outcome) = SAVE_OUTCOMES.try_take() {
            controller.complete_save(outcome, now);
        }
        if let Some(request) = controller.tick(now) {
            SAVE_REQUESTS.signal(request);
        }
        if let Ok(command) = COMMANDS.try_receive() {
            let result = controller.execute(command, now).await;
            if let Err(e) = result {
                warn!("command {:?} failed: {:?}", command, e);
            }
            if REPLIES.try_send(result).is_err() {
                error!("console reply dropped");
            }
        }

        ticker.next().await;
    }
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Output task - forwards the latest frame to the HID joystick.
#[embassy_executor::task]
async fn hid_task(mut output: UsbHidOutput<'static>) {
    // Wait for USB to be ready
    output.wait_ready().await;
    info!("USB HID ready, reporting touches...");

    loop {
        let snapshot = HID_SNAPSHOTS.wait().await;
        let result = match output.set_enabled(snapshot.hid.joystick).await {
            Ok(()) => output.send(snapshot.frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Output error: {:?}", e);
        }
    }
}

/// Console task - one command per line, answered once core 1 has run it.
#[embassy_executor::task]
async fn console_task(mut console: Console<'static>) {
    loop {
        console.wait_connection().await;
        info!("console connected");
        loop {
            let result = match console.receive().await {
                Ok(command) => run_command(command).await,
                Err(ConsoleError::Disconnected) => break,
                Err(e) => Err(e),
            };
            if console.reply(result).await.is_err() {
                break;
            }
        }
        info!("console disconnected");
    }
}

async fn run_command(command: Command) -> Result<Reply, ConsoleError> {
    if !CORE1_ALIVE.load(Ordering::Acquire) {
        return Err(ConsoleError::NotReady);
    }
    COMMANDS.send(command).await;
    REPLIES.receive().await.map_err(ConsoleError::from)
}

/// Lighting task - best effort; a frame is skipped while flash is busy.
#[embassy_executor::task]
async fn lighting_task(mut leds: KeyLeds) {
    loop {
        let snapshot = LED_SNAPSHOTS.wait().await;
        let colors = render(snapshot.frame, &snapshot.lighting);
        let Some(_guard) = IO_LOCK.try_acquire() else {
            continue;
        };
        leds.write(&colors).await;
    }
}

/// Flash task - executes save requests from core 1.
#[embassy_executor::task]
async fn flash_task(mut writer: PageWriter<SectorFlash<'static>>) {
    loop {
        let request = SAVE_REQUESTS.wait().await;
        let outcome = writer.write(&request, &IO_LOCK, &EmbassyDeadline).await;
        SAVE_OUTCOMES.signal(outcome);
    }
}
