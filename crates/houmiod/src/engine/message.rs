//! Typed envelopes flowing through the engine.
//!
//! Envelopes are split by direction:
//! - `LightCommand`: outbound, from the light API and transitions to the connection manager
//! - `LightStatus`: inbound, from the connection manager to the status dispatcher
//!
//! Both carry the same partial `LightFields`, where an absent field means "unchanged".

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

/// Partial update of a light's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LightFields {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_on_flag"
    )]
    pub on: Option<bool>,

    #[serde(
        rename = "bri",
        alias = "brightness",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_brightness"
    )]
    pub brightness: Option<u8>,
}

impl LightFields {
    pub fn is_empty(&self) -> bool {
        self.on.is_none() && self.brightness.is_none()
    }
}

/// Outbound command for a single light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightCommand {
    #[serde(rename = "_id")]
    pub light_id: String,

    #[serde(flatten)]
    pub fields: LightFields,
}

/// Inbound status for a single light, as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LightStatus {
    #[serde(rename = "_id")]
    pub light_id: String,

    #[serde(flatten)]
    pub fields: LightFields,
}

/// Command queue: many producers, consumed by the connection manager's send loop.
pub type CommandSender = mpsc::UnboundedSender<LightCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<LightCommand>;

/// Status channel: fed by the receive loop, consumed by the status dispatcher.
pub type StatusSender = mpsc::UnboundedSender<LightStatus>;
pub type StatusReceiver = mpsc::UnboundedReceiver<LightStatus>;

/// Deserialize an on/off flag that can be either a boolean or a number.
///
/// The roster endpoint reports `on` as `1`/`0` while socket events use booleans.
pub(crate) fn deserialize_on_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct OnFlag;

    impl<'de> de::Visitor<'de> for OnFlag {
        type Value = Option<bool>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("boolean, number, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_any(OnFlag)
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v == 1))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v == 1))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v == 1.0))
        }
    }

    deserializer.deserialize_any(OnFlag)
}

/// Deserialize a brightness value, clamping it into 0-255.
pub(crate) fn deserialize_brightness<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct Brightness;

    impl<'de> de::Visitor<'de> for Brightness {
        type Value = Option<u8>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("number or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_any(Brightness)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.clamp(0, 255) as u8))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.min(255) as u8))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.round().clamp(0.0, 255.0) as u8))
        }
    }

    deserializer.deserialize_any(Brightness)
}
