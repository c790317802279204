//! Transport traits for USB-MIDI and the two chain links.
//!
//! All operations are non-blocking: the control loop polls with
//! `try_receive` and hands outbound traffic over with `try_send`.

use midi_proto::{EventPacket, LinkFrame};

/// Error type for transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Nobody is listening on the other end (USB not enumerated, link down).
    Disconnected,
    /// Outbound queue is full; the message was not sent.
    Full,
    /// Lower-level I/O error.
    Io,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Full => write!(f, "queue full"),
            Self::Io => write!(f, "i/o error"),
        }
    }
}

/// USB-MIDI endpoint facing the host.
pub trait UsbPort {
    /// Next received packet, if any.
    fn try_receive(&mut self) -> Option<EventPacket>;

    /// Queue a packet for the host.
    fn try_send(&mut self, packet: EventPacket) -> Result<(), TransportError>;

    /// Whether a host has enumerated the device.
    fn is_connected(&self) -> bool;
}

/// One daisy-chain link (Plug or Socket).
pub trait LinkPort {
    /// Next decoded frame, if any.
    fn try_receive(&mut self) -> Option<LinkFrame>;

    /// Queue a frame for transmission.
    fn try_send(&mut self, frame: LinkFrame) -> Result<(), TransportError>;
}
