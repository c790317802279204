//! Event emitter: turns step changes into Control Change messages and LED
//! updates, and drives the note-to-LED display path.

use crate::config::{Configuration, PORT_COUNT};
use crate::filter::Filter;
use crate::leds::LedStrip;
use crate::pipeline::SamplePipeline;
use crate::transport::TransportError;
use midi_proto::MidiMessage;

/// Destination for the device's own MIDI output.
pub trait MidiSink {
    fn send(&mut self, message: &MidiMessage) -> Result<(), TransportError>;
}

/// Tracks the last step sent per port to suppress repeats.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    /// `None` means nothing sent since power-on or reset.
    last_emitted: [Option<u8>; PORT_COUNT],
    note_base: u8,
}

impl EventEmitter {
    /// Create an emitter whose note window starts at `note_base`.
    #[must_use]
    pub const fn new(note_base: u8) -> Self {
        Self {
            last_emitted: [None; PORT_COUNT],
            note_base,
        }
    }

    /// Last step sent for a port.
    #[inline]
    #[must_use]
    pub fn last_emitted(&self, port: usize) -> Option<u8> {
        self.last_emitted.get(port).copied().flatten()
    }

    /// Forget every sent step so the next pass announces all ports.
    pub fn clear(&mut self) {
        self.last_emitted = [None; PORT_COUNT];
    }

    /// Send a Control Change for every port whose step changed, or for every
    /// port when `force` is set. Returns the number of messages sent.
    ///
    /// A port whose message the sink refuses keeps its old cache entry and is
    /// retried on the next pass.
    pub fn emit<F, S, L>(
        &mut self,
        config: &Configuration,
        pipeline: &SamplePipeline<F>,
        force: bool,
        sink: &mut S,
        leds: &mut L,
    ) -> usize
    where
        F: Filter,
        S: MidiSink,
        L: LedStrip,
    {
        let mut sent = 0;

        for (index, port) in config.ports().enumerate() {
            let Some(step) = pipeline.step(index) else {
                continue;
            };
            if !force && self.last_emitted[index] == Some(step) {
                continue;
            }

            leds.set_brightness(index, pipeline.value(index).unwrap_or(0.0));

            let message = MidiMessage::ControlChange {
                channel: port.channel(),
                controller: port.controller(),
                value: step,
            };
            if sink.send(&message).is_ok() {
                self.last_emitted[index] = Some(step);
                sent += 1;
            }
        }

        sent
    }

    /// Port lit by `note`, if it falls inside the chromatic window.
    #[must_use]
    pub fn note_port(&self, note: u8) -> Option<usize> {
        let offset = usize::from(note.checked_sub(self.note_base)?);
        (offset < PORT_COUNT).then_some(offset)
    }

    /// Show a note on its port's LED. Velocity 0 clears the pixel.
    ///
    /// Returns `false` for notes outside the window.
    pub fn handle_note<L: LedStrip>(&self, note: u8, velocity: u8, leds: &mut L) -> bool {
        let Some(port) = self.note_port(note) else {
            return false;
        };

        if velocity == 0 {
            leds.set_brightness(port, 0.0);
        } else {
            let velocity = velocity.min(127);
            leds.set_pixel(port, velocity * 2, f32::from(velocity) / 127.0);
        }
        true
    }
}
