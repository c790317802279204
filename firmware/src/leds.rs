//! WS2812 indicator strip driven by PIO0, one pixel per port (GPIO 16).

use embassy_rp::peripherals::PIO0;
use embassy_rp::pio_programs::ws2812::PioWs2812;
use expression_core::{Rgb, PORT_COUNT};
use smart_leds::RGB8;

pub struct LedDriver<'d> {
    ws2812: PioWs2812<'d, PIO0, 0, PORT_COUNT>,
}

impl<'d> LedDriver<'d> {
    #[must_use]
    pub fn new(ws2812: PioWs2812<'d, PIO0, 0, PORT_COUNT>) -> Self {
        Self { ws2812 }
    }

    /// Push one rendered frame to the strip.
    pub async fn show(&mut self, frame: &[Rgb; PORT_COUNT]) {
        let pixels = frame.map(|c| RGB8::new(c.r, c.g, c.b));
        self.ws2812.write(&pixels).await;
    }
}
