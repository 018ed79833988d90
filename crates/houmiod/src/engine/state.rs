use serde::Deserialize;
use serde::Serialize;

use super::message::LightFields;

/// Kind of a light, fixed when the roster is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LightKind {
    /// On/off only.
    Binary,
    /// On/off plus brightness.
    Dimmable,
}

impl<'de> Deserialize<'de> for LightKind {
    /// The service only distinguishes `"binary"`; every other type is dimmable.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let kind = String::deserialize(deserializer)?;
        Ok(if kind == "binary" {
            LightKind::Binary
        } else {
            LightKind::Dimmable
        })
    }
}

/// Capability flags reported to the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    Flash,
    Brightness,
    Transition,
}

impl LightKind {
    pub fn supported_features(self) -> &'static [Feature] {
        match self {
            LightKind::Binary => &[Feature::Flash],
            LightKind::Dimmable => &[Feature::Brightness, Feature::Transition],
        }
    }
}

/// Last-known state of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LightState {
    /// Whether the light is on or off.
    pub on: bool,

    /// Brightness level (0-255). Only meaningful for dimmable lights.
    pub brightness: u8,
}

impl LightState {
    /// Apply a partial update. Absent fields are left unchanged.
    pub fn apply(&mut self, fields: &LightFields) {
        if let Some(on) = fields.on {
            self.on = on;
        }
        if let Some(brightness) = fields.brightness {
            self.brightness = brightness;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_partial_update_keeps_absent_fields() {
        let mut state = LightState {
            on: true,
            brightness: 120,
        };

        state.apply(&LightFields {
            on: None,
            brightness: Some(40),
        });
        assert_eq!(
            state,
            LightState {
                on: true,
                brightness: 40
            }
        );

        state.apply(&LightFields {
            on: Some(false),
            brightness: None,
        });
        assert_eq!(
            state,
            LightState {
                on: false,
                brightness: 40
            }
        );
    }

    #[test]
    fn test_kind_from_roster_type() {
        let binary: LightKind = serde_json::from_str(r#""binary""#).unwrap();
        let dimmable: LightKind = serde_json::from_str(r#""dimmable""#).unwrap();
        let other: LightKind = serde_json::from_str(r#""rgb""#).unwrap();

        assert_eq!(binary, LightKind::Binary);
        assert_eq!(dimmable, LightKind::Dimmable);
        assert_eq!(other, LightKind::Dimmable);
    }

    #[test]
    fn test_supported_features() {
        assert_eq!(LightKind::Binary.supported_features(), &[Feature::Flash]);
        assert_eq!(
            LightKind::Dimmable.supported_features(),
            &[Feature::Brightness, Feature::Transition]
        );
        assert_eq!(Feature::Transition.to_string(), "transition");
    }
}
