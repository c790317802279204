//! Per-port configuration: MIDI assignment and input range.
//!
//! Every setter clamps instead of rejecting, and [`InputRange`] keeps
//! `min < max` after every write so the remap never divides by zero.

/// Number of sensor ports on the device.
pub const PORT_COUNT: usize = 16;

/// Highest zero-based MIDI channel.
pub const MAX_CHANNEL: u8 = 15;

/// Highest MIDI controller number.
pub const MAX_CONTROLLER: u8 = 127;

/// Controller assigned to port 0 by default; port `i` gets `base + i`.
pub const DEFAULT_CONTROLLER_BASE: u8 = 32;

/// Smallest gap kept between `min` and `max` (the settings resolution).
pub const MIN_SPAN: f32 = 0.01;

/// Remap bounds and polarity for one port.
///
/// Invariant: `0 <= min < max <= 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputRange {
    /// Flip the raw measurement before remapping.
    pub invert: bool,
    min: f32,
    max: f32,
}

impl InputRange {
    /// The full `[0, 1]` range, not inverted.
    pub const FULL: Self = Self {
        invert: false,
        min: 0.0,
        max: 1.0,
    };

    /// Build a range through the clamping setters.
    #[must_use]
    pub fn new(min: f32, max: f32, invert: bool) -> Self {
        let mut range = Self {
            invert,
            ..Self::FULL
        };
        range.set_min(min);
        range.set_max(max);
        range
    }

    #[inline]
    #[must_use]
    pub fn min(&self) -> f32 {
        self.min
    }

    #[inline]
    #[must_use]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Width of the range; always at least [`MIN_SPAN`].
    #[inline]
    #[must_use]
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Set the lower bound.
    ///
    /// The value is clamped to `[0, 1 - MIN_SPAN]`. If it is not below the
    /// current upper bound, the upper bound goes back to its default of 1.
    /// NaN leaves the range unchanged.
    pub fn set_min(&mut self, value: f32) {
        if value.is_nan() {
            return;
        }
        self.min = value.clamp(0.0, 1.0 - MIN_SPAN);
        if self.min >= self.max {
            self.max = Self::FULL.max;
        }
    }

    /// Set the upper bound.
    ///
    /// The value is clamped to `[MIN_SPAN, 1]`. If it is not above the
    /// current lower bound, the lower bound goes back to its default of 0.
    /// NaN leaves the range unchanged.
    pub fn set_max(&mut self, value: f32) {
        if value.is_nan() {
            return;
        }
        self.max = value.clamp(MIN_SPAN, 1.0);
        if self.min >= self.max {
            self.min = Self::FULL.min;
        }
    }
}

impl Default for InputRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// MIDI assignment and range for one sensor port.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortConfig {
    channel: u8,
    controller: u8,
    pub range: InputRange,
}

impl PortConfig {
    /// Create a port configuration, clamping channel and controller.
    #[must_use]
    pub fn new(channel: u8, controller: u8, range: InputRange) -> Self {
        Self {
            channel: channel.min(MAX_CHANNEL),
            controller: controller.min(MAX_CONTROLLER),
            range,
        }
    }

    /// Factory default for the port at `index`.
    #[must_use]
    pub fn default_for(index: usize) -> Self {
        let controller = DEFAULT_CONTROLLER_BASE.saturating_add(index as u8);
        Self::new(0, controller, InputRange::FULL)
    }

    /// Zero-based MIDI channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    #[inline]
    #[must_use]
    pub fn controller(&self) -> u8 {
        self.controller
    }

    /// Set the zero-based channel, clamped to `0..=15`.
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel.min(MAX_CHANNEL);
    }

    /// Set the controller number, clamped to `0..=127`.
    pub fn set_controller(&mut self, controller: u8) {
        self.controller = controller.min(MAX_CONTROLLER);
    }
}

/// The persisted configuration block: one [`PortConfig`] per port.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Configuration {
    ports: [PortConfig; PORT_COUNT],
}

impl Configuration {
    #[must_use]
    pub fn new(ports: [PortConfig; PORT_COUNT]) -> Self {
        Self { ports }
    }

    /// Configuration of the port at `index`, if it exists.
    #[inline]
    #[must_use]
    pub fn port(&self, index: usize) -> Option<&PortConfig> {
        self.ports.get(index)
    }

    #[inline]
    pub fn port_mut(&mut self, index: usize) -> Option<&mut PortConfig> {
        self.ports.get_mut(index)
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortConfig> {
        self.ports.iter()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            ports: core::array::from_fn(PortConfig::default_for),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_ports() {
        let config = Configuration::default();
        let first = config.port(0).unwrap();
        assert_eq!(first.channel(), 0);
        assert_eq!(first.controller(), 32);
        assert_eq!(first.range, InputRange::FULL);
        assert_eq!(config.port(15).unwrap().controller(), 47);
        assert!(config.port(PORT_COUNT).is_none());
    }

    #[test]
    fn test_channel_and_controller_clamp() {
        let mut port = PortConfig::default_for(0);
        port.set_channel(95);
        assert_eq!(port.channel(), 15);
        port.set_controller(200);
        assert_eq!(port.controller(), 127);
    }

    #[test]
    fn test_set_min_resets_max_when_crossing() {
        let mut range = InputRange::new(0.2, 0.5, false);
        range.set_min(0.7);
        assert_eq!(range.min(), 0.7);
        assert_eq!(range.max(), 1.0);
    }

    #[test]
    fn test_set_max_resets_min_when_crossing() {
        let mut range = InputRange::new(0.4, 0.9, false);
        range.set_max(0.3);
        assert_eq!(range.min(), 0.0);
        assert_eq!(range.max(), 0.3);
    }

    #[test]
    fn test_extreme_writes_keep_span() {
        let mut range = InputRange::FULL;
        range.set_min(1.0);
        assert!(range.min() < range.max());
        range.set_max(0.0);
        assert!(range.min() < range.max());
        assert!(range.span() >= MIN_SPAN - f32::EPSILON);
    }

    #[test]
    fn test_nan_is_ignored() {
        let mut range = InputRange::new(0.1, 0.8, true);
        range.set_min(f32::NAN);
        range.set_max(f32::NAN);
        assert_eq!(range, InputRange::new(0.1, 0.8, true));
    }

    proptest! {
        #[test]
        fn prop_min_below_max_after_any_write(
            writes in proptest::collection::vec((any::<bool>(), -2.0f32..3.0), 0..32)
        ) {
            let mut range = InputRange::FULL;
            for (is_min, value) in writes {
                if is_min {
                    range.set_min(value);
                } else {
                    range.set_max(value);
                }
                prop_assert!(range.min() < range.max());
                prop_assert!(range.min() >= 0.0);
                prop_assert!(range.max() <= 1.0);
            }
        }
    }
}
