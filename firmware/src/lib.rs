//! 16-port analog-to-MIDI expression controller for RP2040.
//!
//! This crate binds the platform-agnostic [`expression_core::Device`] to the
//! RP2040 peripherals: USB-MIDI, the two daisy-chain UART links, the
//! multiplexed ADC front end, the WS2812 indicator strip and the flash
//! sector holding the configuration block.
//!
//! Every transport runs in its own task and meets the control loop at a
//! bounded [`embassy_sync::channel::Channel`], so the loop only ever calls
//! `try_receive`/`try_send`.
//!
//! # Pins
//!
//! - GPIO 0: Plug TX (UART0)
//! - GPIO 1: Plug RX (UART0)
//! - GPIO 4: Socket TX (UART1)
//! - GPIO 5: Socket RX (UART1)
//! - GPIO 10-13: multiplexer select S0-S3
//! - GPIO 16: WS2812 data (PIO0)
//! - GPIO 26: multiplexer common (ADC0)

#![no_std]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use expression_core::{Rgb, PORT_COUNT};
use midi_proto::{EventPacket, LinkFrame};

// Re-export core types for convenience
pub use expression_core::{
    Configuration, Device, DeviceStats, Io, LedFrame, LedStrip, StepFilter, DEFAULT_OPTIONS,
};

pub mod flash_store;
pub mod leds;
pub mod link;
pub mod sensors;
pub mod usb_midi;

pub use flash_store::FlashStore;
pub use leds::LedDriver;
pub use link::{LinkError, LinkInput, LinkOutput, QueuedLink};
pub use sensors::MuxSensors;
pub use usb_midi::{configure_usb_midi, QueuedUsb, UsbMidiInput, UsbMidiOutput};

/// Depth of every inbound and outbound transport queue.
pub const QUEUE_DEPTH: usize = 32;

pub type PacketChannel = Channel<CriticalSectionRawMutex, EventPacket, QUEUE_DEPTH>;
pub type FrameChannel = Channel<CriticalSectionRawMutex, LinkFrame, QUEUE_DEPTH>;

/// Latest rendered LED frame; older frames are overwritten.
pub type LedSignal = Signal<CriticalSectionRawMutex, [Rgb; PORT_COUNT]>;
