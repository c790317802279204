//! Settings I/O: the configuration as a structured document.
//!
//! [`export`] builds a serializable [`SettingsDocument`] for UI rendering,
//! [`import`] applies a partial [`SettingsPatch`], and [`apply`] handles
//! single path-addressed writes such as `ports[3]/range/min`.
//!
//! Channels are 1-based in every user-facing form and zero-based in
//! [`Configuration`]. Out-of-range numbers are clamped, never rejected.

use crate::config::{Configuration, PortConfig, MAX_CHANNEL, MAX_CONTROLLER, PORT_COUNT};
use serde::{Deserialize, Serialize, Serializer};

/// Exported view of the whole configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SettingsDocument {
    pub ports: [PortDocument; PORT_COUNT],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortDocument {
    /// 1-based MIDI channel.
    pub channel: u8,
    pub controller: u8,
    pub range: RangeDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<PortHints>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RangeDocument {
    pub invert: bool,
    #[serde(serialize_with = "two_decimals")]
    pub min: f32,
    #[serde(serialize_with = "two_decimals")]
    pub max: f32,
}

/// Human-readable field descriptions, attached to the first port only.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortHints {
    pub channel: &'static str,
    pub controller: &'static str,
    pub invert: &'static str,
    pub min: &'static str,
    pub max: &'static str,
}

pub const HINTS: PortHints = PortHints {
    channel: "MIDI channel (1-16)",
    controller: "Control Change number (0-127)",
    invert: "Reverse the sensor direction",
    min: "Reading mapped to 0 (0.00-0.99)",
    max: "Reading mapped to 127 (0.01-1.00)",
};

/// Partial update; absent fields keep their current value.
///
/// Entries apply to ports in order; extra ports are not accepted.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub ports: heapless::Vec<PortPatch, PORT_COUNT>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortPatch {
    /// 1-based; clamped to `1..=16`.
    pub channel: Option<i32>,
    pub controller: Option<i32>,
    pub range: Option<RangePatch>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RangePatch {
    pub invert: Option<bool>,
    pub min: Option<f32>,
    pub max: Option<f32>,
}

/// Build the exported document.
#[must_use]
pub fn export(config: &Configuration) -> SettingsDocument {
    let mut ports = config.ports();
    SettingsDocument {
        ports: core::array::from_fn(|index| {
            let port = ports.next().copied().unwrap_or_else(|| PortConfig::default_for(index));
            PortDocument {
                channel: port.channel() + 1,
                controller: port.controller(),
                range: RangeDocument {
                    invert: port.range.invert,
                    min: port.range.min(),
                    max: port.range.max(),
                },
                hints: (index == 0).then_some(HINTS),
            }
        }),
    }
}

/// Apply a partial update to the configuration.
pub fn import(config: &mut Configuration, patch: &SettingsPatch) {
    for (index, update) in patch.ports.iter().enumerate() {
        let Some(port) = config.port_mut(index) else {
            break;
        };

        if let Some(channel) = update.channel {
            port.set_channel(channel_from_user(channel));
        }
        if let Some(controller) = update.controller {
            port.set_controller(controller_from_user(controller));
        }
        if let Some(range) = &update.range {
            if let Some(invert) = range.invert {
                port.range.invert = invert;
            }
            if let Some(min) = range.min {
                port.range.set_min(min);
            }
            if let Some(max) = range.max {
                port.range.set_max(max);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    UnknownPath,
    PortOutOfRange,
    TypeMismatch,
}

impl core::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownPath => write!(f, "unknown setting path"),
            Self::PortOutOfRange => write!(f, "port index out of range"),
            Self::TypeMismatch => write!(f, "wrong value type for setting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingField {
    Channel,
    Controller,
    Invert,
    Min,
    Max,
}

/// A parsed `ports[i]/...` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SettingPath {
    pub port: usize,
    pub field: SettingField,
}

impl SettingPath {
    /// Parse `ports[i]/channel`, `ports[i]/controller` or
    /// `ports[i]/range/{invert,min,max}`.
    pub fn parse(path: &str) -> Result<Self, SettingsError> {
        let rest = path
            .strip_prefix("ports[")
            .ok_or(SettingsError::UnknownPath)?;
        let (index, field) = rest.split_once("]/").ok_or(SettingsError::UnknownPath)?;

        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SettingsError::UnknownPath);
        }
        let port = index
            .parse::<usize>()
            .map_err(|_| SettingsError::PortOutOfRange)?;

        let field = match field {
            "channel" => SettingField::Channel,
            "controller" => SettingField::Controller,
            "range/invert" => SettingField::Invert,
            "range/min" => SettingField::Min,
            "range/max" => SettingField::Max,
            _ => return Err(SettingsError::UnknownPath),
        };

        if port >= PORT_COUNT {
            return Err(SettingsError::PortOutOfRange);
        }
        Ok(Self { port, field })
    }
}

/// Value carried by a path-addressed write.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingValue {
    Int(i32),
    Float(f32),
    Bool(bool),
}

/// Write one setting. Channel values are 1-based.
pub fn apply(
    config: &mut Configuration,
    path: SettingPath,
    value: SettingValue,
) -> Result<(), SettingsError> {
    let port = config
        .port_mut(path.port)
        .ok_or(SettingsError::PortOutOfRange)?;

    match (path.field, value) {
        (SettingField::Channel, SettingValue::Int(channel)) => {
            port.set_channel(channel_from_user(channel));
        }
        (SettingField::Controller, SettingValue::Int(controller)) => {
            port.set_controller(controller_from_user(controller));
        }
        (SettingField::Invert, SettingValue::Bool(invert)) => port.range.invert = invert,
        (SettingField::Min, value) => port.range.set_min(as_float(value)?),
        (SettingField::Max, value) => port.range.set_max(as_float(value)?),
        _ => return Err(SettingsError::TypeMismatch),
    }
    Ok(())
}

/// Read one setting back in its user-facing form.
pub fn read(config: &Configuration, path: SettingPath) -> Result<SettingValue, SettingsError> {
    let port = config.port(path.port).ok_or(SettingsError::PortOutOfRange)?;
    Ok(match path.field {
        SettingField::Channel => SettingValue::Int(i32::from(port.channel()) + 1),
        SettingField::Controller => SettingValue::Int(i32::from(port.controller())),
        SettingField::Invert => SettingValue::Bool(port.range.invert),
        SettingField::Min => SettingValue::Float(port.range.min()),
        SettingField::Max => SettingValue::Float(port.range.max()),
    })
}

fn as_float(value: SettingValue) -> Result<f32, SettingsError> {
    match value {
        SettingValue::Float(v) => Ok(v),
        SettingValue::Int(v) => Ok(v as f32),
        SettingValue::Bool(_) => Err(SettingsError::TypeMismatch),
    }
}

/// 1-based user channel to the stored zero-based channel.
fn channel_from_user(channel: i32) -> u8 {
    (channel.clamp(1, i32::from(MAX_CHANNEL) + 1) - 1) as u8
}

fn controller_from_user(controller: i32) -> u8 {
    controller.clamp(0, i32::from(MAX_CONTROLLER)) as u8
}

fn two_decimals<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    let hundredths = (value.clamp(0.0, 1.0) * 100.0 + 0.5) as u32;
    serializer.serialize_f64(f64::from(hundredths) / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputRange;

    fn patch_from(json: &str) -> SettingsPatch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_export_uses_one_based_channel() {
        let mut config = Configuration::default();
        config.port_mut(1).unwrap().set_channel(9);

        let doc = export(&config);
        assert_eq!(doc.ports[0].channel, 1);
        assert_eq!(doc.ports[1].channel, 10);
        assert_eq!(doc.ports[1].controller, 33);
    }

    #[test]
    fn test_export_hints_only_on_first_port() {
        let json = serde_json::to_value(export(&Configuration::default())).unwrap();
        let ports = json["ports"].as_array().unwrap();
        assert_eq!(ports.len(), PORT_COUNT);
        assert!(ports[0].get("hints").is_some());
        assert!(ports[1..].iter().all(|port| port.get("hints").is_none()));
    }

    #[test]
    fn test_export_rounds_to_two_decimals() {
        let mut config = Configuration::default();
        config.port_mut(0).unwrap().range = InputRange::new(0.254_9, 0.7, true);

        let json = serde_json::to_string(&export(&config)).unwrap();
        assert!(json.contains(r#""range":{"invert":true,"min":0.25,"max":0.7}"#));
    }

    #[test]
    fn test_import_clamps_channel() {
        let mut config = Configuration::default();
        import(
            &mut config,
            &patch_from(r#"{"ports":[{"channel":0},{"channel":17},{"channel":-4},{"channel":16}]}"#),
        );
        assert_eq!(config.port(0).unwrap().channel(), 0);
        assert_eq!(config.port(1).unwrap().channel(), 15);
        assert_eq!(config.port(2).unwrap().channel(), 0);
        assert_eq!(config.port(3).unwrap().channel(), 15);
    }

    #[test]
    fn test_import_clamps_controller() {
        let mut config = Configuration::default();
        import(
            &mut config,
            &patch_from(r#"{"ports":[{"controller":200},{"controller":-1}]}"#),
        );
        assert_eq!(config.port(0).unwrap().controller(), 127);
        assert_eq!(config.port(1).unwrap().controller(), 0);
    }

    #[test]
    fn test_import_leaves_absent_fields() {
        let mut config = Configuration::default();
        config.port_mut(0).unwrap().range = InputRange::new(0.1, 0.9, false);

        import(
            &mut config,
            &patch_from(r#"{"ports":[{"range":{"invert":true}},{}]}"#),
        );

        let port = config.port(0).unwrap();
        assert!(port.range.invert);
        assert_eq!(port.range.min(), 0.1);
        assert_eq!(port.range.max(), 0.9);
        assert_eq!(port.controller(), 32);
        assert_eq!(config.port(1), Some(&PortConfig::default_for(1)));
    }

    #[test]
    fn test_import_min_above_max_resets_max() {
        let mut config = Configuration::default();
        config.port_mut(0).unwrap().range = InputRange::new(0.0, 0.5, false);

        import(&mut config, &patch_from(r#"{"ports":[{"range":{"min":0.8}}]}"#));

        let range = config.port(0).unwrap().range;
        assert_eq!(range.min(), 0.8);
        assert_eq!(range.max(), 1.0);
    }

    #[test]
    fn test_exported_document_imports_back() {
        let mut source = Configuration::default();
        source.port_mut(4).unwrap().set_channel(3);
        source.port_mut(4).unwrap().range = InputRange::new(0.25, 0.75, true);

        let json = serde_json::to_string(&export(&source)).unwrap();
        let mut target = Configuration::default();
        import(&mut target, &patch_from(&json));
        assert_eq!(target, source);
    }

    #[test]
    fn test_too_many_ports_rejected() {
        let json = format!("{{\"ports\":[{}{{}}]}}", "{},".repeat(PORT_COUNT));
        assert!(serde_json::from_str::<SettingsPatch>(&json).is_err());
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(
            SettingPath::parse("ports[3]/range/min"),
            Ok(SettingPath {
                port: 3,
                field: SettingField::Min
            })
        );
        assert_eq!(
            SettingPath::parse("ports[15]/channel").map(|p| p.field),
            Ok(SettingField::Channel)
        );
        assert_eq!(
            SettingPath::parse("ports[16]/channel"),
            Err(SettingsError::PortOutOfRange)
        );
        assert_eq!(
            SettingPath::parse("ports[x]/channel"),
            Err(SettingsError::UnknownPath)
        );
        assert_eq!(
            SettingPath::parse("ports[0]/range/middle"),
            Err(SettingsError::UnknownPath)
        );
        assert_eq!(SettingPath::parse("port/0"), Err(SettingsError::UnknownPath));
    }

    #[test]
    fn test_apply_and_read() {
        let mut config = Configuration::default();
        let channel = SettingPath::parse("ports[2]/channel").unwrap();
        let max = SettingPath::parse("ports[2]/range/max").unwrap();

        apply(&mut config, channel, SettingValue::Int(17)).unwrap();
        assert_eq!(read(&config, channel), Ok(SettingValue::Int(16)));
        assert_eq!(config.port(2).unwrap().channel(), 15);

        apply(&mut config, max, SettingValue::Int(0)).unwrap();
        assert_eq!(read(&config, max), Ok(SettingValue::Float(0.01)));

        assert_eq!(
            apply(&mut config, channel, SettingValue::Bool(true)),
            Err(SettingsError::TypeMismatch)
        );
        assert_eq!(
            apply(&mut config, max, SettingValue::Bool(true)),
            Err(SettingsError::TypeMismatch)
        );
    }
}
