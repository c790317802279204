//! Multiplexed ADC front end.
//!
//! A 16:1 analog multiplexer (CD74HC4067 or similar) feeds ADC0. The four
//! select lines choose the port before each conversion.

use defmt::warn;
use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::{Level, Output};
use embassy_time::{block_for, Duration};
use expression_core::{AnalogSource, PORT_COUNT};

/// Full-scale reading of the 12-bit ADC.
const ADC_MAX: f32 = 4095.0;

/// Multiplexer output settling time after switching.
const SETTLE: Duration = Duration::from_micros(5);

pub struct MuxSensors<'d> {
    adc: Adc<'d, Blocking>,
    input: Channel<'d>,
    select: [Output<'d>; 4],
    /// Last good reading per port, reused when a conversion fails.
    last: [f32; PORT_COUNT],
}

impl<'d> MuxSensors<'d> {
    #[must_use]
    pub fn new(adc: Adc<'d, Blocking>, input: Channel<'d>, select: [Output<'d>; 4]) -> Self {
        Self {
            adc,
            input,
            select,
            last: [0.0; PORT_COUNT],
        }
    }

    fn select(&mut self, port: usize) {
        for (bit, pin) in self.select.iter_mut().enumerate() {
            pin.set_level(Level::from((port >> bit) & 1 == 1));
        }
    }
}

impl AnalogSource for MuxSensors<'_> {
    fn read(&mut self, port: usize) -> f32 {
        let Some(slot) = self.last.get(port).copied() else {
            return 0.0;
        };

        self.select(port);
        block_for(SETTLE);

        match self.adc.blocking_read(&mut self.input) {
            Ok(raw) => {
                let value = f32::from(raw) / ADC_MAX;
                self.last[port] = value;
                value
            }
            Err(e) => {
                warn!("ADC read failed on port {}: {:?}", port, e);
                slot
            }
        }
    }
}
