//! Platform-agnostic core of the analog-to-MIDI expression controller.
//!
//! This crate holds everything between the sensors and the wires without
//! any hardware dependencies. It runs in `no_std` firmware and on the host
//! for testing.
//!
//! # Overview
//!
//! - [`config`]: per-port MIDI assignment and input range ([`Configuration`])
//! - [`storage`]: versioned, checksummed persisted block ([`ConfigStore`])
//! - [`filter`]: smoothing and quantization ([`Filter`], [`StepFilter`])
//! - [`pipeline`]: sensor reading, range remap and filtering ([`SamplePipeline`])
//! - [`emitter`]: Control Change emission and the note-to-LED path ([`EventEmitter`])
//! - [`leds`]: LED indicator state ([`LedStrip`], [`LedFrame`])
//! - [`router`]: daisy-chain routing between USB, Plug and Socket ([`LinkRouter`])
//! - [`settings`]: settings document export/import and path writes
//! - [`transport`]: non-blocking transport traits ([`UsbPort`], [`LinkPort`])
//! - [`device`]: the composition root driven by the control loop ([`Device`])
//!
//! # Example
//!
//! ```rust
//! use expression_core::{route_usb, Route};
//! use midi_proto::{EventPacket, LinkAddress, MidiMessage};
//!
//! let message = MidiMessage::ControlChange { channel: 0, controller: 7, value: 100 };
//!
//! // Address 0 is for this device
//! let packet = EventPacket::from_message(LinkAddress::LOCAL, &message);
//! assert_eq!(route_usb(packet), Route::Local(message));
//!
//! // Anything else moves one hop down the chain, out of the Socket
//! let packet = EventPacket::from_message(LinkAddress::from_nibble(2), &message);
//! match route_usb(packet) {
//!     Route::Socket(frame) => assert_eq!(frame.address.get(), 1),
//!     _ => unreachable!(),
//! }
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod config;
pub mod device;
pub mod emitter;
pub mod filter;
pub mod leds;
pub mod pipeline;
pub mod router;
pub mod settings;
pub mod storage;
pub mod transport;

// Re-export main types at crate root
pub use config::{Configuration, InputRange, PortConfig, PORT_COUNT};
pub use device::{Device, DeviceOptions, DeviceStats, Io, DEFAULT_OPTIONS};
pub use emitter::{EventEmitter, MidiSink};
pub use filter::{Filter, StepFilter};
pub use leds::{LedFrame, LedStrip, Rgb};
pub use pipeline::{remap, AnalogSource, SamplePipeline};
pub use router::{route_plug, route_socket, route_usb, DropReason, LinkRouter, Route, RouterStats};
pub use settings::{SettingPath, SettingValue, SettingsDocument, SettingsError, SettingsPatch};
pub use storage::{BlockError, ConfigStore, BLOCK_SIZE};
pub use transport::{LinkPort, TransportError, UsbPort};
