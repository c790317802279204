//! Sample pipeline: raw sensor reading -> range remap -> per-port filter.

use crate::config::{Configuration, InputRange, PORT_COUNT};
use crate::filter::Filter;

/// Source of normalised sensor readings (ADC plus multiplexer on hardware).
pub trait AnalogSource {
    /// Read the port's current measurement in `[0, 1]`. Must not block.
    fn read(&mut self, port: usize) -> f32;
}

/// Map a raw measurement through a port's input range.
///
/// Only the lower bound is clamped; values above 1 are left for the filter
/// to clamp to its step range.
#[inline]
#[must_use]
pub fn remap(raw: f32, range: &InputRange) -> f32 {
    let measurement = if range.invert { 1.0 - raw } else { raw };
    let value = (measurement - range.min()).max(0.0);
    value / range.span()
}

/// One filter per port, fed on every sample period.
pub struct SamplePipeline<F> {
    filters: [F; PORT_COUNT],
}

impl<F: Filter + Default> SamplePipeline<F> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: core::array::from_fn(|_| F::default()),
        }
    }
}

impl<F: Filter + Default> Default for SamplePipeline<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Filter> SamplePipeline<F> {
    /// Build a pipeline from pre-configured filters.
    #[must_use]
    pub fn from_filters(filters: [F; PORT_COUNT]) -> Self {
        Self { filters }
    }

    /// Read every port once and feed its filter.
    pub fn sample<S: AnalogSource>(&mut self, config: &Configuration, source: &mut S) {
        for (index, (filter, port)) in self.filters.iter_mut().zip(config.ports()).enumerate() {
            filter.update(remap(source.read(index), &port.range));
        }
    }

    /// Current quantized step of a port.
    #[inline]
    #[must_use]
    pub fn step(&self, port: usize) -> Option<u8> {
        self.filters.get(port).map(Filter::step)
    }

    /// Current fractional value of a port.
    #[inline]
    #[must_use]
    pub fn value(&self, port: usize) -> Option<f32> {
        self.filters.get(port).map(Filter::value)
    }

    #[inline]
    #[must_use]
    pub fn filter(&self, port: usize) -> Option<&F> {
        self.filters.get(port)
    }

    /// Put every filter back into its power-on state.
    pub fn reset(&mut self) {
        self.filters.iter_mut().for_each(Filter::reset);
    }
}
