//! Device: the composition root driven by the firmware's control loop.
//!
//! [`Device`] owns the configuration and all runtime session state. The
//! surrounding runtime calls [`Device::tick`] repeatedly with the current
//! time and the I/O collaborators bundled in an [`Io`].

use crate::config::Configuration;
use crate::emitter::{EventEmitter, MidiSink};
use crate::filter::Filter;
use crate::leds::LedStrip;
use crate::pipeline::{AnalogSource, SamplePipeline};
use crate::router::{LinkRouter, Route, RouterStats};
use crate::settings::{self, SettingPath, SettingValue, SettingsDocument, SettingsError, SettingsPatch};
use crate::transport::{LinkPort, TransportError, UsbPort};
use midi_proto::{
    EventPacket, LinkAddress, LinkFrame, MidiMessage, ALL_NOTES_OFF, ALL_SOUND_OFF,
};

/// Timing and mapping parameters of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceOptions {
    /// Interval between sensor sampling passes.
    pub sample_period_ms: u64,
    /// Interval between emission passes.
    pub emit_period_ms: u64,
    /// First note of the 16-note LED window.
    pub note_base: u8,
    /// Controller number that sets the rainbow display intensity.
    pub rainbow_controller: u8,
    /// Upper bound on packets taken from each inbound source per tick.
    pub max_drain: usize,
}

pub const DEFAULT_OPTIONS: DeviceOptions = DeviceOptions {
    sample_period_ms: 10,
    emit_period_ms: 50,
    note_base: 36,
    rainbow_controller: 14,
    max_drain: 8,
};

impl Default for DeviceOptions {
    fn default() -> Self {
        DEFAULT_OPTIONS
    }
}

/// The I/O collaborators a tick works against.
pub struct Io<S, L, U, P, K> {
    pub sensors: S,
    pub leds: L,
    pub usb: U,
    /// Link facing the host side of the chain.
    pub plug: P,
    /// Link facing child devices.
    pub socket: K,
}

/// Device-level counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStats {
    pub router: RouterStats,
    /// Control Change messages sent for sensor ports.
    pub emitted: u32,
    /// Local messages with no handler.
    pub unhandled: u32,
    pub resets: u32,
}

/// Sink for the device's own output: USB when a host is attached, otherwise
/// the Plug link so the parent device forwards it.
struct Outbound<'a, U, P> {
    usb: &'a mut U,
    plug: &'a mut P,
}

impl<U: UsbPort, P: LinkPort> MidiSink for Outbound<'_, U, P> {
    fn send(&mut self, message: &MidiMessage) -> Result<(), TransportError> {
        let packet = EventPacket::from_message(LinkAddress::LOCAL, message);
        if self.usb.is_connected() {
            self.usb.try_send(packet)
        } else {
            self.plug.try_send(LinkFrame::midi(packet))
        }
    }
}

pub struct Device<F> {
    options: DeviceOptions,
    config: Configuration,
    pipeline: SamplePipeline<F>,
    emitter: EventEmitter,
    router: LinkRouter,
    last_sample: Option<u64>,
    last_emit: Option<u64>,
    force_emit: bool,
    rainbow: u8,
    stats: DeviceStats,
}

impl<F: Filter + Default> Device<F> {
    /// Create a device with default filters.
    #[must_use]
    pub fn new(config: Configuration, options: DeviceOptions) -> Self {
        Self::with_pipeline(config, SamplePipeline::new(), options)
    }
}

impl<F: Filter> Device<F> {
    /// Create a device around an existing pipeline.
    #[must_use]
    pub fn with_pipeline(
        config: Configuration,
        pipeline: SamplePipeline<F>,
        options: DeviceOptions,
    ) -> Self {
        Self {
            options,
            config,
            pipeline,
            emitter: EventEmitter::new(options.note_base),
            router: LinkRouter::new(),
            last_sample: None,
            last_emit: None,
            force_emit: false,
            rainbow: 0,
            stats: DeviceStats::default(),
        }
    }

    /// Run one control-loop iteration.
    ///
    /// Order: LED service, USB receive, Plug receive, Socket receive, then
    /// sampling and emission when their periods have elapsed. Never blocks.
    pub fn tick<S, L, U, P, K>(&mut self, now_ms: u64, io: &mut Io<S, L, U, P, K>)
    where
        S: AnalogSource,
        L: LedStrip,
        U: UsbPort,
        P: LinkPort,
        K: LinkPort,
    {
        io.leds.service(now_ms);

        for _ in 0..self.options.max_drain {
            let Some(packet) = io.usb.try_receive() else {
                break;
            };
            let route = self.router.from_usb(packet);
            self.deliver(route, now_ms, io);
        }

        for _ in 0..self.options.max_drain {
            let Some(frame) = io.plug.try_receive() else {
                break;
            };
            let route = self.router.from_plug(frame);
            self.deliver(route, now_ms, io);
        }

        for _ in 0..self.options.max_drain {
            let Some(frame) = io.socket.try_receive() else {
                break;
            };
            let route = self.router.from_socket(frame, io.usb.is_connected());
            self.deliver(route, now_ms, io);
        }

        if elapsed(self.last_sample, now_ms, self.options.sample_period_ms) {
            self.last_sample = Some(now_ms);
            self.pipeline.sample(&self.config, &mut io.sensors);
        }

        if self.force_emit || elapsed(self.last_emit, now_ms, self.options.emit_period_ms) {
            self.last_emit = Some(now_ms);
            let force = core::mem::take(&mut self.force_emit);
            let mut sink = Outbound {
                usb: &mut io.usb,
                plug: &mut io.plug,
            };
            let sent = self
                .emitter
                .emit(&self.config, &self.pipeline, force, &mut sink, &mut io.leds);
            self.stats.emitted = self.stats.emitted.saturating_add(sent as u32);
        }
    }

    /// Reinitialize runtime state: LEDs, filters, emitted-step cache, timers.
    ///
    /// Sampling is due again immediately, so the filters are seeded before any
    /// emission. The next emission pass announces every port.
    pub fn reset<L: LedStrip>(&mut self, now_ms: u64, leds: &mut L) {
        leds.reset();
        self.pipeline.reset();
        self.emitter.clear();
        self.last_sample = None;
        self.last_emit = Some(now_ms);
        self.force_emit = false;
        self.rainbow = 0;
        self.stats.resets = self.stats.resets.saturating_add(1);
    }

    /// Re-send every port's current value at the end of the next tick.
    pub fn request_resend(&mut self) {
        self.force_emit = true;
    }

    fn deliver<S, L, U, P, K>(&mut self, route: Route, now_ms: u64, io: &mut Io<S, L, U, P, K>)
    where
        L: LedStrip,
        U: UsbPort,
        K: LinkPort,
    {
        let result = match route {
            Route::Local(message) => {
                self.dispatch(message, now_ms, &mut io.leds);
                Ok(())
            }
            Route::Socket(frame) => io.socket.try_send(frame),
            Route::Usb(packet) => io.usb.try_send(packet),
            Route::Drop(_) => Ok(()),
        };
        if result.is_err() {
            self.router.record_send_failure();
        }
    }

    fn dispatch<L: LedStrip>(&mut self, message: MidiMessage, now_ms: u64, leds: &mut L) {
        let handled = match message {
            MidiMessage::NoteOn { note, velocity, .. } => {
                self.emitter.handle_note(note, velocity, leds)
            }
            MidiMessage::NoteOff { note, .. } => self.emitter.handle_note(note, 0, leds),
            MidiMessage::ControlChange {
                controller, value, ..
            } if controller == self.options.rainbow_controller => {
                self.rainbow = value;
                leds.set_rainbow(value);
                true
            }
            MidiMessage::ControlChange {
                controller: ALL_SOUND_OFF | ALL_NOTES_OFF,
                ..
            } => {
                self.request_resend();
                true
            }
            MidiMessage::SystemReset => {
                self.reset(now_ms, leds);
                true
            }
            _ => false,
        };

        if !handled {
            self.stats.unhandled = self.stats.unhandled.saturating_add(1);
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn configuration_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    /// Apply a settings patch to the live configuration.
    pub fn import_settings(&mut self, patch: &SettingsPatch) {
        settings::import(&mut self.config, patch);
    }

    #[must_use]
    pub fn export_settings(&self) -> SettingsDocument {
        settings::export(&self.config)
    }

    /// Write one setting by path.
    pub fn apply_setting(&mut self, path: SettingPath, value: SettingValue) -> Result<(), SettingsError> {
        settings::apply(&mut self.config, path, value)
    }

    /// Read one setting back in its user-facing form.
    pub fn setting(&self, path: SettingPath) -> Result<SettingValue, SettingsError> {
        settings::read(&self.config, path)
    }

    #[must_use]
    pub fn pipeline(&self) -> &SamplePipeline<F> {
        &self.pipeline
    }

    #[must_use]
    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    /// Current rainbow display intensity (0 = off).
    #[must_use]
    pub fn rainbow(&self) -> u8 {
        self.rainbow
    }

    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            router: self.router.stats(),
            ..self.stats
        }
    }
}

/// Whether `period` has passed since `last`. Always true before the first run.
fn elapsed(last: Option<u64>, now_ms: u64, period: u64) -> bool {
    last.map_or(true, |last| now_ms.saturating_sub(last) >= period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PORT_COUNT;
    use crate::filter::StepFilter;
    use crate::leds::LedFrame;
    use std::collections::VecDeque;
    use std::vec::Vec;

    struct Knobs {
        level: f32,
        reads: usize,
    }

    impl AnalogSource for Knobs {
        fn read(&mut self, _port: usize) -> f32 {
            self.reads += 1;
            self.level
        }
    }

    #[derive(Default)]
    struct MockUsb {
        inbox: VecDeque<EventPacket>,
        sent: Vec<EventPacket>,
        connected: bool,
    }

    impl UsbPort for MockUsb {
        fn try_receive(&mut self) -> Option<EventPacket> {
            self.inbox.pop_front()
        }

        fn try_send(&mut self, packet: EventPacket) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::Disconnected);
            }
            self.sent.push(packet);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    #[derive(Default)]
    struct MockLink {
        inbox: VecDeque<LinkFrame>,
        sent: Vec<LinkFrame>,
    }

    impl LinkPort for MockLink {
        fn try_receive(&mut self) -> Option<LinkFrame> {
            self.inbox.pop_front()
        }

        fn try_send(&mut self, frame: LinkFrame) -> Result<(), TransportError> {
            self.sent.push(frame);
            Ok(())
        }
    }

    type TestIo = Io<Knobs, LedFrame, MockUsb, MockLink, MockLink>;

    fn io(connected: bool) -> TestIo {
        Io {
            sensors: Knobs {
                level: 0.5,
                reads: 0,
            },
            leds: LedFrame::new(),
            usb: MockUsb {
                connected,
                ..MockUsb::default()
            },
            plug: MockLink::default(),
            socket: MockLink::default(),
        }
    }

    fn device() -> Device<StepFilter> {
        Device::new(Configuration::default(), DEFAULT_OPTIONS)
    }

    fn packet(address: u8, message: MidiMessage) -> EventPacket {
        EventPacket::from_message(LinkAddress::from_nibble(address), &message)
    }

    fn control_changes(packets: &[EventPacket]) -> usize {
        packets
            .iter()
            .filter(|p| matches!(p.message(), Some(MidiMessage::ControlChange { .. })))
            .count()
    }

    const ALL_NOTES_OFF_CC: MidiMessage = MidiMessage::ControlChange {
        channel: 0,
        controller: ALL_NOTES_OFF,
        value: 0,
    };

    #[test]
    fn test_first_tick_announces_every_port_on_usb() {
        let mut device = device();
        let mut io = io(true);

        device.tick(0, &mut io);

        assert_eq!(io.usb.sent.len(), PORT_COUNT);
        assert!(io.usb.sent.iter().all(|p| p.address() == LinkAddress::LOCAL));
        assert!(io.plug.sent.is_empty());
        assert_eq!(device.stats().emitted, PORT_COUNT as u32);
    }

    #[test]
    fn test_own_output_goes_to_plug_without_usb() {
        let mut device = device();
        let mut io = io(false);

        device.tick(0, &mut io);

        assert!(io.usb.sent.is_empty());
        assert_eq!(io.plug.sent.len(), PORT_COUNT);
        assert!(io.plug.sent.iter().all(|f| f.address == LinkAddress::LOCAL));
    }

    #[test]
    fn test_steady_input_is_not_repeated() {
        let mut device = device();
        let mut io = io(true);

        for now in (0..500).step_by(5) {
            device.tick(now, &mut io);
        }
        assert_eq!(io.usb.sent.len(), PORT_COUNT);
    }

    #[test]
    fn test_usb_traffic_routed_by_address() {
        let mut device = device();
        let mut io = io(true);
        device.tick(0, &mut io);
        io.usb.sent.clear();

        let note = MidiMessage::NoteOn {
            channel: 0,
            note: 40,
            velocity: 127,
        };
        io.usb.inbox.push_back(packet(3, note));
        io.usb.inbox.push_back(packet(0, note));
        device.tick(1, &mut io);

        assert_eq!(io.socket.sent.len(), 1);
        assert_eq!(io.socket.sent[0].address.get(), 2);
        assert_eq!(io.socket.sent[0].packet().message(), Some(note));
        assert!(io.plug.sent.is_empty());
        assert!(io.usb.sent.is_empty());
        assert_eq!(io.leds.pixel(4).unwrap().brightness, 255);
    }

    #[test]
    fn test_socket_traffic_forwarded_to_usb() {
        let mut device = device();
        let mut io = io(true);
        device.tick(0, &mut io);
        io.usb.sent.clear();

        let cc = MidiMessage::ControlChange {
            channel: 0,
            controller: 7,
            value: 1,
        };
        io.socket.inbox.push_back(LinkFrame::midi(packet(2, cc)));
        io.socket.inbox.push_back(LinkFrame::midi(packet(15, cc)));
        device.tick(1, &mut io);

        assert_eq!(io.usb.sent, vec![packet(3, cc)]);
        assert_eq!(device.stats().router.to_usb, 1);
        assert_eq!(device.stats().router.dropped_sentinel, 1);
    }

    #[test]
    fn test_socket_traffic_dropped_without_usb() {
        let mut device = device();
        let mut io = io(false);

        let cc = MidiMessage::ControlChange {
            channel: 0,
            controller: 7,
            value: 1,
        };
        io.socket.inbox.push_back(LinkFrame::midi(packet(0, cc)));
        device.tick(0, &mut io);

        assert_eq!(device.stats().router.dropped_disconnected, 1);
        assert!(io.usb.sent.is_empty());
    }

    #[test]
    fn test_plug_traffic_is_local() {
        let mut device = device();
        let mut io = io(true);

        io.plug.inbox.push_back(LinkFrame::midi(packet(
            5,
            MidiMessage::ControlChange {
                channel: 3,
                controller: 14,
                value: 90,
            },
        )));
        device.tick(0, &mut io);

        assert_eq!(device.rainbow(), 90);
        assert_eq!(io.leds.rainbow(), 90);
        assert!(io.plug.sent.is_empty());
    }

    #[test]
    fn test_all_notes_off_resends_every_port() {
        let mut device = device();
        let mut io = io(true);
        device.tick(0, &mut io);
        device.tick(10, &mut io);
        io.usb.sent.clear();

        io.usb.inbox.push_back(packet(0, ALL_NOTES_OFF_CC));
        device.tick(20, &mut io);
        assert_eq!(control_changes(&io.usb.sent), PORT_COUNT);

        io.usb.sent.clear();
        device.tick(30, &mut io);
        device.tick(80, &mut io);
        assert!(io.usb.sent.is_empty());
    }

    #[test]
    fn test_system_reset_reannounces_after_emit_period() {
        let mut device = device();
        let mut io = io(true);
        device.tick(0, &mut io);
        io.leds.set_rainbow(50);
        io.usb.sent.clear();

        io.usb.inbox.push_back(packet(0, MidiMessage::SystemReset));
        device.tick(20, &mut io);
        assert!(io.usb.sent.is_empty());
        assert_eq!(io.leds.rainbow(), 0);
        assert_eq!(device.stats().resets, 1);

        device.tick(30, &mut io);
        device.tick(70, &mut io);
        assert_eq!(io.usb.sent.len(), PORT_COUNT);
    }

    #[test]
    fn test_reset_then_resend_uses_fresh_samples() {
        let mut device = device();
        let mut io = io(true);
        device.tick(0, &mut io);
        io.usb.sent.clear();

        io.usb.inbox.push_back(packet(0, MidiMessage::SystemReset));
        io.usb.inbox.push_back(packet(0, ALL_NOTES_OFF_CC));
        device.tick(5, &mut io);

        assert_eq!(io.usb.sent.len(), PORT_COUNT);
        for (port, sent) in io.usb.sent.iter().enumerate() {
            let step = device.pipeline().step(port).unwrap();
            assert!(step > 0);
            assert!(matches!(
                sent.message(),
                Some(MidiMessage::ControlChange { value, .. }) if value == step
            ));
        }
    }

    #[test]
    fn test_sampling_follows_wall_clock() {
        let mut device = device();
        let mut io = io(true);

        for now in [0, 5, 10, 15, 20] {
            device.tick(now, &mut io);
        }
        assert_eq!(io.sensors.reads, 3 * PORT_COUNT);

        // resume after a long pause: one pass, no catch-up
        device.tick(1_000, &mut io);
        device.tick(1_001, &mut io);
        assert_eq!(io.sensors.reads, 4 * PORT_COUNT);
    }

    #[test]
    fn test_drain_is_bounded_per_tick() {
        let mut device = device();
        let mut io = io(true);
        let cc = MidiMessage::ControlChange {
            channel: 0,
            controller: 7,
            value: 1,
        };
        for _ in 0..20 {
            io.usb.inbox.push_back(packet(1, cc));
        }

        device.tick(0, &mut io);
        assert_eq!(io.socket.sent.len(), DEFAULT_OPTIONS.max_drain);
        assert_eq!(io.usb.inbox.len(), 20 - DEFAULT_OPTIONS.max_drain);
    }

    #[test]
    fn test_unhandled_local_messages_counted() {
        let mut device = device();
        let mut io = io(true);
        io.usb.inbox.push_back(packet(
            0,
            MidiMessage::ControlChange {
                channel: 0,
                controller: 1,
                value: 1,
            },
        ));
        device.tick(0, &mut io);
        assert_eq!(device.stats().unhandled, 1);
        assert_eq!(device.stats().router.local, 1);
    }

    #[test]
    fn test_settings_round_trip_through_device() {
        let mut device = device();
        let path = SettingPath::parse("ports[1]/controller").unwrap();
        device.apply_setting(path, SettingValue::Int(300)).unwrap();
        assert_eq!(device.configuration().port(1).unwrap().controller(), 127);
        assert_eq!(device.export_settings().ports[1].controller, 127);
        assert_eq!(device.setting(path), Ok(SettingValue::Int(127)));

        let mut patch = SettingsPatch::default();
        patch
            .ports
            .push(settings::PortPatch {
                channel: Some(2),
                ..Default::default()
            })
            .unwrap();
        device.import_settings(&patch);
        assert_eq!(device.configuration().port(0).unwrap().channel(), 1);
    }

    /// Carry frames between a parent's Socket and a child's Plug.
    fn connect(parent: &mut TestIo, child: &mut TestIo) {
        child.plug.inbox.extend(parent.socket.sent.drain(..));
        parent.socket.inbox.extend(child.plug.sent.drain(..));
    }

    #[test]
    fn test_two_device_chain_carries_traffic_both_ways() {
        let mut head = device();
        let mut child = device();
        let mut head_io = io(true);
        let mut child_io = io(false);

        head.tick(0, &mut head_io);
        child.tick(0, &mut child_io);
        head_io.usb.sent.clear();

        // host to child: cable 1 is one hop past the head
        let note = MidiMessage::NoteOn {
            channel: 0,
            note: 40,
            velocity: 127,
        };
        head_io.usb.inbox.push_back(packet(1, note));
        head.tick(1, &mut head_io);
        assert!(head_io.plug.sent.is_empty());
        connect(&mut head_io, &mut child_io);
        child.tick(1, &mut child_io);

        let pixel = child_io.leds.pixel(4).unwrap();
        assert_eq!(pixel.brightness, 255);
        assert_eq!(pixel.hue, 254);
        assert_eq!(head_io.leds.pixel(4).unwrap().brightness, 128);

        // child to host: the child's announcements arrive on cable 1
        connect(&mut head_io, &mut child_io);
        head.tick(2, &mut head_io);
        head.tick(3, &mut head_io);
        assert_eq!(head_io.usb.sent.len(), PORT_COUNT);
        assert!(head_io
            .usb
            .sent
            .iter()
            .all(|p| p.address() == LinkAddress::from_nibble(1)));
        assert_eq!(head.stats().router.to_socket, 1);
        assert_eq!(head.stats().router.to_usb, PORT_COUNT as u32);
    }
}
