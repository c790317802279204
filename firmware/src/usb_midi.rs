//! USB-MIDI transport.
//!
//! The embassy-usb MIDI class is split into an input and an output half,
//! each driven by its own task. The control loop talks to both through
//! [`QueuedUsb`].

use defmt::{info, warn};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_usb::class::midi::{self, MidiClass};
use embassy_usb::driver::EndpointError;
use embassy_usb::Builder;
use expression_core::{TransportError, UsbPort};
use midi_proto::EventPacket;
use portable_atomic::{AtomicBool, Ordering};

use crate::QUEUE_DEPTH;

/// Jacks per direction; one per chain address.
pub const CABLE_COUNT: u8 = 16;

/// Bulk endpoint packet size.
pub const MAX_PACKET_SIZE: u16 = 64;

type UsbDriver<'d> = Driver<'d, USB>;
type PacketSender = Sender<'static, CriticalSectionRawMutex, EventPacket, QUEUE_DEPTH>;
type PacketReceiver = Receiver<'static, CriticalSectionRawMutex, EventPacket, QUEUE_DEPTH>;

/// Set while a host has the MIDI interface enabled.
pub static USB_CONNECTED: AtomicBool = AtomicBool::new(false);

/// Configure the USB-MIDI class in the USB builder.
pub fn configure_usb_midi<'d>(builder: &mut Builder<'d, UsbDriver<'d>>) -> MidiClass<'d, UsbDriver<'d>> {
    MidiClass::new(builder, CABLE_COUNT, CABLE_COUNT, MAX_PACKET_SIZE)
}

/// Host-to-device half: reads event packets into the inbound queue.
pub struct UsbMidiInput<'d> {
    rx: midi::Receiver<'d, UsbDriver<'d>>,
}

impl<'d> UsbMidiInput<'d> {
    #[must_use]
    pub fn new(rx: midi::Receiver<'d, UsbDriver<'d>>) -> Self {
        Self { rx }
    }

    /// Forward received packets to `queue`, tracking connection state.
    pub async fn run(&mut self, queue: PacketSender) -> ! {
        let mut buf = [0u8; MAX_PACKET_SIZE as usize];

        loop {
            self.rx.wait_connection().await;
            USB_CONNECTED.store(true, Ordering::Release);
            info!("USB MIDI connected");

            loop {
                match self.rx.read_packet(&mut buf).await {
                    Ok(len) => {
                        for chunk in buf[..len].chunks_exact(EventPacket::SIZE) {
                            let packet = EventPacket::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                            if queue.try_send(packet).is_err() {
                                warn!("USB inbound queue full, packet dropped");
                            }
                        }
                    }
                    Err(EndpointError::BufferOverflow) => warn!("USB MIDI read overflow"),
                    Err(EndpointError::Disabled) => break,
                }
            }

            USB_CONNECTED.store(false, Ordering::Release);
            info!("USB MIDI disconnected");
        }
    }
}

/// Device-to-host half: writes queued packets to the host.
pub struct UsbMidiOutput<'d> {
    tx: midi::Sender<'d, UsbDriver<'d>>,
}

impl<'d> UsbMidiOutput<'d> {
    #[must_use]
    pub fn new(tx: midi::Sender<'d, UsbDriver<'d>>) -> Self {
        Self { tx }
    }

    pub async fn run(&mut self, queue: PacketReceiver) -> ! {
        loop {
            self.tx.wait_connection().await;

            loop {
                let packet = queue.receive().await;
                if let Err(e) = self.tx.write_packet(&packet.to_bytes()).await {
                    warn!("USB MIDI write failed: {:?}", e);
                    break;
                }
            }
        }
    }
}

/// Control-loop side of the USB transport.
pub struct QueuedUsb {
    inbound: PacketReceiver,
    outbound: PacketSender,
}

impl QueuedUsb {
    #[must_use]
    pub fn new(inbound: PacketReceiver, outbound: PacketSender) -> Self {
        Self { inbound, outbound }
    }
}

impl UsbPort for QueuedUsb {
    fn try_receive(&mut self) -> Option<EventPacket> {
        self.inbound.try_receive().ok()
    }

    fn try_send(&mut self, packet: EventPacket) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.outbound
            .try_send(packet)
            .map_err(|_| TransportError::Full)
    }

    fn is_connected(&self) -> bool {
        USB_CONNECTED.load(Ordering::Acquire)
    }
}
