//! Per-port LED indicator state.
//!
//! [`LedStrip`] is what the core drives. [`LedFrame`] is an in-memory strip
//! that the firmware renders to RGB and pushes to the WS2812 driver.

use crate::config::PORT_COUNT;

/// LED indicator sink, one pixel per port.
pub trait LedStrip {
    /// Advance time-based effects. Called first in every loop iteration.
    fn service(&mut self, now_ms: u64);

    /// Set a port's brightness (`0..=1`) keeping its hue.
    fn set_brightness(&mut self, port: usize, brightness: f32);

    /// Set a port's hue and brightness.
    fn set_pixel(&mut self, port: usize, hue: u8, brightness: f32);

    /// Rainbow display mode: 0 = off, 1..=127 = intensity/speed.
    fn set_rainbow(&mut self, intensity: u8);

    /// Reinitialize the strip to its power-on state.
    fn reset(&mut self);
}

/// 8-bit RGB color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Self = Self { r: 0, g: 0, b: 0 };

    /// Fully saturated color for `hue` (0-255 around the wheel) at `value`.
    #[must_use]
    pub fn from_hue(hue: u8, value: u8) -> Self {
        let region = hue / 43;
        let remainder = u16::from(hue - region * 43) * 6;
        let value16 = u16::from(value);
        let falling = (value16 * (255 - remainder) / 255) as u8;
        let rising = (value16 * remainder / 255) as u8;

        let (r, g, b) = match region {
            0 => (value, rising, 0),
            1 => (falling, value, 0),
            2 => (0, value, rising),
            3 => (0, falling, value),
            4 => (rising, 0, value),
            _ => (value, 0, falling),
        };
        Self { r, g, b }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pixel {
    pub hue: u8,
    pub brightness: u8,
}

/// In-memory strip with a dirty flag for the render side.
#[derive(Clone, Debug)]
pub struct LedFrame {
    pixels: [Pixel; PORT_COUNT],
    rainbow: u8,
    phase: u16,
    last_service: Option<u64>,
    dirty: bool,
}

impl LedFrame {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pixels: core::array::from_fn(|i| Pixel {
                hue: default_hue(i),
                brightness: 0,
            }),
            rainbow: 0,
            phase: 0,
            last_service: None,
            dirty: true,
        }
    }

    #[must_use]
    pub fn pixel(&self, port: usize) -> Option<Pixel> {
        self.pixels.get(port).copied()
    }

    #[must_use]
    pub fn rainbow(&self) -> u8 {
        self.rainbow
    }

    /// Returns whether anything changed since the last call, clearing the flag.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::replace(&mut self.dirty, false)
    }

    /// Render the current state to RGB.
    pub fn render(&self, out: &mut [Rgb; PORT_COUNT]) {
        let offset = (self.phase >> 8) as u8;
        for (i, (pixel, rgb)) in self.pixels.iter().zip(out.iter_mut()).enumerate() {
            *rgb = if self.rainbow > 0 {
                let hue = default_hue(i).wrapping_add(offset);
                let floor = self.rainbow.saturating_mul(2);
                Rgb::from_hue(hue, pixel.brightness.max(floor))
            } else {
                Rgb::from_hue(pixel.hue, pixel.brightness)
            };
        }
    }

    fn pixel_mut(&mut self, port: usize) -> Option<&mut Pixel> {
        self.pixels.get_mut(port)
    }
}

impl Default for LedFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl LedStrip for LedFrame {
    fn service(&mut self, now_ms: u64) {
        let elapsed = self
            .last_service
            .map_or(0, |last| now_ms.saturating_sub(last));
        self.last_service = Some(now_ms);

        if self.rainbow > 0 && elapsed > 0 {
            let advance = elapsed.saturating_mul(u64::from(self.rainbow)) as u16;
            self.phase = self.phase.wrapping_add(advance);
            self.dirty = true;
        }
    }

    fn set_brightness(&mut self, port: usize, brightness: f32) {
        let level = to_level(brightness);
        if let Some(pixel) = self.pixel_mut(port) {
            if pixel.brightness != level {
                pixel.brightness = level;
                self.dirty = true;
            }
        }
    }

    fn set_pixel(&mut self, port: usize, hue: u8, brightness: f32) {
        let next = Pixel {
            hue,
            brightness: to_level(brightness),
        };
        if let Some(pixel) = self.pixel_mut(port) {
            if *pixel != next {
                *pixel = next;
                self.dirty = true;
            }
        }
    }

    fn set_rainbow(&mut self, intensity: u8) {
        let intensity = intensity.min(127);
        if self.rainbow != intensity {
            self.rainbow = intensity;
            self.dirty = true;
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Hue spreading the ports evenly around the color wheel.
fn default_hue(port: usize) -> u8 {
    ((port * 256) / PORT_COUNT) as u8
}

fn to_level(brightness: f32) -> u8 {
    (brightness.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
