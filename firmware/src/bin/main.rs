#![no_std]
#![no_main]

use defmt::{error, info, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc, Channel as AdcChannel};
use embassy_rp::bind_interrupts;
use embassy_rp::flash::Flash;
use embassy_rp::gpio::{Level, Output, Pull};
use embassy_rp::peripherals::{PIO0, UART0, UART1, USB};
use embassy_rp::pio::Pio;
use embassy_rp::pio_programs::ws2812::{PioWs2812, PioWs2812Program};
use embassy_rp::uart::{Config as UartConfig, Uart};
use embassy_rp::usb::Driver;
use embassy_time::{Instant, Timer};
use embassy_usb::{Builder, Config as UsbConfig};
use expression_controller::link::LINK_BAUDRATE;
use expression_controller::{
    configure_usb_midi, Configuration, Device, FlashStore, FrameChannel, Io, LedDriver, LedFrame,
    LedSignal, LinkInput, LinkOutput, MuxSensors, PacketChannel, QueuedLink, QueuedUsb,
    StepFilter, UsbMidiInput, UsbMidiOutput, DEFAULT_OPTIONS, QUEUE_DEPTH,
};
use expression_core::storage::{self, ConfigStore};
use expression_core::{Rgb, BLOCK_SIZE, PORT_COUNT};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use midi_proto::LinkFrame;
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    UART0_IRQ => embassy_rp::uart::InterruptHandler<UART0>;
    UART1_IRQ => embassy_rp::uart::InterruptHandler<UART1>;
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
    PIO0_IRQ_0 => embassy_rp::pio::InterruptHandler<PIO0>;
});

/// Transport queues between the I/O tasks and the control loop.
static USB_RX: PacketChannel = PacketChannel::new();
static USB_TX: PacketChannel = PacketChannel::new();
static PLUG_RX: FrameChannel = FrameChannel::new();
static PLUG_TX: FrameChannel = FrameChannel::new();
static SOCKET_RX: FrameChannel = FrameChannel::new();
static SOCKET_TX: FrameChannel = FrameChannel::new();

/// Latest LED frame from the control loop.
static LED_FRAME: LedSignal = LedSignal::new();

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// Interval between router statistics log lines.
const STATS_INTERVAL_MS: u64 = 10_000;

type FrameSender = Sender<'static, CriticalSectionRawMutex, LinkFrame, QUEUE_DEPTH>;
type FrameReceiver = Receiver<'static, CriticalSectionRawMutex, LinkFrame, QUEUE_DEPTH>;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Expression controller starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Stored configuration ---
    let mut store = FlashStore::new(Flash::new_blocking(p.FLASH));
    let config = load_configuration(&mut store);

    // --- Link setup ---
    let plug = Uart::new(
        p.UART0,
        p.PIN_0, // TX
        p.PIN_1, // RX
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        link_uart_config(),
    );
    let (plug_tx, plug_rx) = plug.split();

    let socket = Uart::new(
        p.UART1,
        p.PIN_4, // TX
        p.PIN_5, // RX
        Irqs,
        p.DMA_CH2,
        p.DMA_CH3,
        link_uart_config(),
    );
    let (socket_tx, socket_rx) = socket.split();

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0x1209, 0x0001); // pid.codes test VID/PID
    usb_config.manufacturer = Some("Rust Expression");
    usb_config.product = Some("16-Port Expression Controller");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([0; 256]),
        CONTROL_BUF.init([0; 64]),
    );

    let midi_class = configure_usb_midi(&mut builder);
    let usb_device = builder.build();
    let (midi_tx, midi_rx) = midi_class.split();

    // --- LED strip ---
    let Pio {
        mut common, sm0, ..
    } = Pio::new(p.PIO0, Irqs);
    let program = PioWs2812Program::new(&mut common);
    let ws2812 = PioWs2812::new(&mut common, sm0, p.DMA_CH4, p.PIN_16, &program);

    // --- Sensors ---
    let adc = Adc::new_blocking(p.ADC, adc::Config::default());
    let sensors = MuxSensors::new(
        adc,
        AdcChannel::new_pin(p.PIN_26, Pull::None),
        [
            Output::new(p.PIN_10, Level::Low),
            Output::new(p.PIN_11, Level::Low),
            Output::new(p.PIN_12, Level::Low),
            Output::new(p.PIN_13, Level::Low),
        ],
    );

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(usb_rx_task(UsbMidiInput::new(midi_rx)).unwrap());
    spawner.spawn(usb_tx_task(UsbMidiOutput::new(midi_tx)).unwrap());
    spawner.spawn(link_rx_task("plug", LinkInput::new(plug_rx), PLUG_RX.sender()).unwrap());
    spawner.spawn(link_tx_task("plug", LinkOutput::new(plug_tx), PLUG_TX.receiver()).unwrap());
    spawner.spawn(link_rx_task("socket", LinkInput::new(socket_rx), SOCKET_RX.sender()).unwrap());
    spawner.spawn(link_tx_task("socket", LinkOutput::new(socket_tx), SOCKET_TX.receiver()).unwrap());
    spawner.spawn(led_task(LedDriver::new(ws2812)).unwrap());

    info!("Expression controller initialized");

    let mut device: Device<StepFilter> = Device::new(config, DEFAULT_OPTIONS);
    let mut io = Io {
        sensors,
        leds: LedFrame::new(),
        usb: QueuedUsb::new(USB_RX.receiver(), USB_TX.sender()),
        plug: QueuedLink::new(PLUG_RX.receiver(), PLUG_TX.sender()),
        socket: QueuedLink::new(SOCKET_RX.receiver(), SOCKET_TX.sender()),
    };

    let mut frame = [Rgb::OFF; PORT_COUNT];
    let mut next_stats = STATS_INTERVAL_MS;

    loop {
        let now = Instant::now().as_millis();
        device.tick(now, &mut io);

        if io.leds.take_dirty() {
            io.leds.render(&mut frame);
            LED_FRAME.signal(frame);
        }

        if now >= next_stats {
            next_stats = now + STATS_INTERVAL_MS;
            let stats = device.stats();
            info!("stats: {}", stats);
            if stats.router.send_failures > 0 {
                warn!("{} routed packets refused by transports", stats.router.send_failures);
            }
        }

        Timer::after_millis(1).await;
    }
}

fn link_uart_config() -> UartConfig {
    let mut config = UartConfig::default();
    config.baudrate = LINK_BAUDRATE;
    config
}

/// Read the stored configuration, writing factory defaults back when the
/// stored block is unusable.
fn load_configuration(store: &mut FlashStore<'static>) -> Configuration {
    let mut buf = [0u8; BLOCK_SIZE];
    if let Err(e) = store.load(&mut buf) {
        error!("Flash read failed: {:?}", e);
        return Configuration::default();
    }

    match storage::decode(&buf) {
        Ok(config) => {
            info!("Loaded stored configuration");
            config
        }
        Err(e) => {
            warn!("Stored configuration rejected ({}), using defaults", e);
            let config = Configuration::default();
            if let Err(e) = storage::save(store, &config) {
                error!("Flash write failed: {:?}", e);
            }
            config
        }
    }
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

#[embassy_executor::task]
async fn usb_rx_task(mut input: UsbMidiInput<'static>) {
    input.run(USB_RX.sender()).await
}

#[embassy_executor::task]
async fn usb_tx_task(mut output: UsbMidiOutput<'static>) {
    output.run(USB_TX.receiver()).await
}

/// Link receive task - decodes frames into the link's inbound queue.
#[embassy_executor::task(pool_size = 2)]
async fn link_rx_task(name: &'static str, mut input: LinkInput<'static>, queue: FrameSender) {
    loop {
        match input.receive().await {
            Ok(frame) => {
                if queue.try_send(frame).is_err() {
                    warn!("{}: inbound queue full, frame dropped", name);
                }
            }
            Err(e) => warn!("{}: receive error: {:?}", name, e),
        }
    }
}

/// Link transmit task - encodes queued frames onto the wire.
#[embassy_executor::task(pool_size = 2)]
async fn link_tx_task(name: &'static str, mut output: LinkOutput<'static>, queue: FrameReceiver) {
    loop {
        let frame = queue.receive().await;
        if let Err(e) = output.send(&frame).await {
            error!("{}: send error: {:?}", name, e);
        }
    }
}

/// LED task - waits for rendered frames and pushes them to the strip.
#[embassy_executor::task]
async fn led_task(mut leds: LedDriver<'static>) {
    loop {
        let frame = LED_FRAME.wait().await;
        leds.show(&frame).await;
    }
}
