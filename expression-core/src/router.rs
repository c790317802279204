//! Link router: decides where each inbound packet goes.
//!
//! | Source | Rule |
//! |---|---|
//! | USB | address 0: local. Otherwise decrement and send on the Socket link toward the children. |
//! | Plug | MIDI frames are always local; the parent has already addressed them. |
//! | Socket | address `0xF`: drop. Otherwise increment and send to USB, if connected. |
//!
//! Routing is stateless per packet. [`LinkRouter`] only adds counters.

use midi_proto::{EventPacket, FrameKind, LinkFrame, MidiMessage};

/// Where a packet goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Route {
    /// Addressed to this device.
    Local(MidiMessage),
    /// Send on the Socket link, one hop further from the host.
    Socket(LinkFrame),
    /// Send to the USB host.
    Usb(EventPacket),
    /// Silently discarded.
    Drop(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    /// Not a MIDI frame, reserved code index, or undecodable payload.
    NotMidi,
    /// Carried the reserved address.
    Sentinel,
    /// Chain traffic for the host while no host is connected.
    UsbDisconnected,
}

/// Route a packet received from the USB host.
#[must_use]
pub fn route_usb(packet: EventPacket) -> Route {
    let Some(message) = packet.message() else {
        return Route::Drop(DropReason::NotMidi);
    };

    match packet.address().toward_chain() {
        None => Route::Local(message),
        Some(next) => Route::Socket(LinkFrame::midi(packet.with_address(next))),
    }
}

/// Route a frame received on the Plug link.
#[must_use]
pub fn route_plug(frame: LinkFrame) -> Route {
    if frame.kind != FrameKind::Midi {
        return Route::Drop(DropReason::NotMidi);
    }

    match frame.packet().message() {
        Some(message) => Route::Local(message),
        None => Route::Drop(DropReason::NotMidi),
    }
}

/// Route a frame received on the Socket link.
#[must_use]
pub fn route_socket(frame: LinkFrame, usb_connected: bool) -> Route {
    if frame.kind != FrameKind::Midi {
        return Route::Drop(DropReason::NotMidi);
    }
    let Some(address) = frame.address.toward_host() else {
        return Route::Drop(DropReason::Sentinel);
    };
    if !usb_connected {
        return Route::Drop(DropReason::UsbDisconnected);
    }

    let packet = frame.packet();
    if packet.message().is_none() {
        return Route::Drop(DropReason::NotMidi);
    }
    Route::Usb(packet.with_address(address))
}

/// Routing counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouterStats {
    pub local: u32,
    pub to_socket: u32,
    pub to_usb: u32,
    pub dropped_not_midi: u32,
    pub dropped_sentinel: u32,
    pub dropped_disconnected: u32,
    /// Routed packets the outbound transport refused.
    pub send_failures: u32,
}

impl RouterStats {
    /// Total packets dropped for any reason.
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped_not_midi
            .saturating_add(self.dropped_sentinel)
            .saturating_add(self.dropped_disconnected)
    }

    fn record(&mut self, route: &Route) {
        let counter = match route {
            Route::Local(_) => &mut self.local,
            Route::Socket(_) => &mut self.to_socket,
            Route::Usb(_) => &mut self.to_usb,
            Route::Drop(DropReason::NotMidi) => &mut self.dropped_not_midi,
            Route::Drop(DropReason::Sentinel) => &mut self.dropped_sentinel,
            Route::Drop(DropReason::UsbDisconnected) => &mut self.dropped_disconnected,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Stateless router with counters.
#[derive(Debug, Default)]
pub struct LinkRouter {
    stats: RouterStats,
}

impl LinkRouter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stats: RouterStats {
                local: 0,
                to_socket: 0,
                to_usb: 0,
                dropped_not_midi: 0,
                dropped_sentinel: 0,
                dropped_disconnected: 0,
                send_failures: 0,
            },
        }
    }

    pub fn from_usb(&mut self, packet: EventPacket) -> Route {
        self.tally(route_usb(packet))
    }

    pub fn from_plug(&mut self, frame: LinkFrame) -> Route {
        self.tally(route_plug(frame))
    }

    pub fn from_socket(&mut self, frame: LinkFrame, usb_connected: bool) -> Route {
        self.tally(route_socket(frame, usb_connected))
    }

    /// Count a routed packet the outbound transport refused.
    pub fn record_send_failure(&mut self) {
        self.stats.send_failures = self.stats.send_failures.saturating_add(1);
    }

    #[must_use]
    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    fn tally(&mut self, route: Route) -> Route {
        self.stats.record(&route);
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midi_proto::LinkAddress;

    const CC: MidiMessage = MidiMessage::ControlChange {
        channel: 1,
        controller: 40,
        value: 64,
    };

    fn usb_packet(address: u8) -> EventPacket {
        EventPacket::from_message(LinkAddress::from_nibble(address), &CC)
    }

    fn link_frame(address: u8) -> LinkFrame {
        LinkFrame::midi(usb_packet(address))
    }

    #[test]
    fn test_usb_address_zero_stays_local() {
        assert_eq!(route_usb(usb_packet(0)), Route::Local(CC));
    }

    #[test]
    fn test_usb_address_decrements_toward_socket() {
        for address in 1..=15u8 {
            match route_usb(usb_packet(address)) {
                Route::Socket(frame) => {
                    assert_eq!(frame.address.get(), address - 1);
                    assert_eq!(frame.kind, FrameKind::Midi);
                    assert_eq!(frame.packet().message(), Some(CC));
                }
                other => panic!("unexpected route {other:?}"),
            }
        }
    }

    #[test]
    fn test_usb_reserved_cin_dropped() {
        let packet = EventPacket::from_bytes([0x21, 0xB0, 1, 2]);
        assert_eq!(route_usb(packet), Route::Drop(DropReason::NotMidi));
    }

    #[test]
    fn test_plug_is_always_local() {
        assert_eq!(route_plug(link_frame(0)), Route::Local(CC));
        assert_eq!(route_plug(link_frame(9)), Route::Local(CC));
    }

    #[test]
    fn test_plug_non_midi_dropped() {
        let frame = LinkFrame {
            kind: FrameKind::Management,
            ..link_frame(0)
        };
        assert_eq!(route_plug(frame), Route::Drop(DropReason::NotMidi));
    }

    #[test]
    fn test_socket_increments_toward_usb() {
        for address in 0..15u8 {
            match route_socket(link_frame(address), true) {
                Route::Usb(packet) => {
                    assert_eq!(packet.address().get(), address + 1);
                    assert_eq!(packet.message(), Some(CC));
                }
                other => panic!("unexpected route {other:?}"),
            }
        }
    }

    #[test]
    fn test_socket_sentinel_never_forwarded() {
        assert_eq!(
            route_socket(link_frame(15), true),
            Route::Drop(DropReason::Sentinel)
        );
        assert_eq!(
            route_socket(link_frame(15), false),
            Route::Drop(DropReason::Sentinel)
        );
    }

    #[test]
    fn test_socket_dropped_without_usb() {
        assert_eq!(
            route_socket(link_frame(2), false),
            Route::Drop(DropReason::UsbDisconnected)
        );
    }

    #[test]
    fn test_socket_unknown_kind_dropped() {
        let frame = LinkFrame {
            kind: FrameKind::Unknown(9),
            ..link_frame(1)
        };
        assert_eq!(route_socket(frame, true), Route::Drop(DropReason::NotMidi));
    }

    #[test]
    fn test_router_counts() {
        let mut router = LinkRouter::new();
        let _ = router.from_usb(usb_packet(0));
        let _ = router.from_usb(usb_packet(3));
        let _ = router.from_socket(link_frame(15), true);
        let _ = router.from_socket(link_frame(1), false);
        let _ = router.from_socket(link_frame(1), true);
        router.record_send_failure();

        let stats = router.stats();
        assert_eq!(stats.local, 1);
        assert_eq!(stats.to_socket, 1);
        assert_eq!(stats.to_usb, 1);
        assert_eq!(stats.dropped_sentinel, 1);
        assert_eq!(stats.dropped_disconnected, 1);
        assert_eq!(stats.dropped(), 2);
        assert_eq!(stats.send_failures, 1);
    }
}
