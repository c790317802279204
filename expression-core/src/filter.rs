//! Smoothing and quantization of remapped sensor values.
//!
//! The pipeline only depends on the [`Filter`] trait; [`StepFilter`] is the
//! default implementation used by the firmware.

/// Highest step a filter reports (7-bit MIDI value).
pub const STEP_MAX: u8 = 127;

/// Per-port smoothing filter.
///
/// A filter receives every sample, even when the input did not change, since
/// its smoothing state depends on continuous input.
pub trait Filter {
    /// Feed one remapped measurement. Values outside `[0, 1]` are the
    /// filter's responsibility to clamp.
    fn update(&mut self, measurement: f32);

    /// Debounced, quantized step in `0..=STEP_MAX`.
    fn step(&self) -> u8;

    /// Debounced fractional value in `[0, 1]`.
    fn value(&self) -> f32;

    /// Return to the power-on state.
    fn reset(&mut self);
}

/// Exponential smoothing followed by a hysteresis quantizer.
///
/// The step only moves once the smoothed position is more than half a step
/// plus `hysteresis` away from the current step, so a reading sitting on a
/// step boundary does not chatter.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepFilter {
    alpha: f32,
    hysteresis: f32,
    smoothed: f32,
    primed: bool,
    step: u8,
}

impl StepFilter {
    /// Default smoothing factor per sample.
    pub const DEFAULT_ALPHA: f32 = 0.25;

    /// Default hysteresis, in steps.
    pub const DEFAULT_HYSTERESIS: f32 = 0.3;

    #[must_use]
    pub const fn new() -> Self {
        Self::with_params(Self::DEFAULT_ALPHA, Self::DEFAULT_HYSTERESIS)
    }

    /// Create a filter with a custom smoothing factor (`0 < alpha <= 1`) and
    /// hysteresis in steps.
    #[must_use]
    pub const fn with_params(alpha: f32, hysteresis: f32) -> Self {
        Self {
            alpha,
            hysteresis,
            smoothed: 0.0,
            primed: false,
            step: 0,
        }
    }
}

impl Default for StepFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for StepFilter {
    fn update(&mut self, measurement: f32) {
        if measurement.is_nan() {
            return;
        }
        let measurement = measurement.clamp(0.0, 1.0);

        if self.primed {
            self.smoothed += (measurement - self.smoothed) * self.alpha;
        } else {
            // first sample after power-on seeds the average
            self.smoothed = measurement;
            self.primed = true;
        }

        let position = self.smoothed * f32::from(STEP_MAX);
        let distance = position - f32::from(self.step);
        let distance = if distance < 0.0 { -distance } else { distance };

        if distance > 0.5 + self.hysteresis {
            self.step = ((position + 0.5) as u8).min(STEP_MAX);
        }
    }

    fn step(&self) -> u8 {
        self.step
    }

    fn value(&self) -> f32 {
        self.smoothed
    }

    fn reset(&mut self) {
        *self = Self::with_params(self.alpha, self.hysteresis);
    }
}
