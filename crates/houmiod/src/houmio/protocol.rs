//! Socket.IO event definitions for the Houmio service.
//!
//! Outbound:
//! - `clientReady` `{siteKey}`: announcement, sent on every (re)connect and heartbeat
//! - `apply/light` `{_id, on?, bri?}`: light command
//!
//! Inbound:
//! - `setLightState` `{_id, on?, bri?}`: light status, fields present are the changed ones

use serde::Serialize;

use crate::engine::LightStatus;
use crate::error::Error;

pub const CLIENT_READY: &str = "clientReady";
pub const APPLY_LIGHT: &str = "apply/light";
pub const SET_LIGHT_STATE: &str = "setLightState";

/// Payload of the `clientReady` announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientReady<'a> {
    #[serde(rename = "siteKey")]
    pub site_key: &'a str,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    LightState(LightStatus),
    /// Event name we don't handle; dropped by the caller.
    Unknown(String),
}

/// Decode an inbound event into a typed envelope.
///
/// Socket.IO delivers arguments as a list; the payload is the first argument.
pub fn decode_inbound(event: &str, payload: serde_json::Value) -> Result<Inbound, Error> {
    if event != SET_LIGHT_STATE {
        return Ok(Inbound::Unknown(event.to_string()));
    }

    let payload = match payload {
        serde_json::Value::Array(mut args) => {
            if args.is_empty() {
                return Err(Error::MalformedInboundEvent {
                    event: event.to_string(),
                    reason: "empty argument list".to_string(),
                });
            }
            args.swap_remove(0)
        }
        other => other,
    };

    serde_json::from_value(payload)
        .map(Inbound::LightState)
        .map_err(|e| Error::MalformedInboundEvent {
            event: event.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LightFields;
    use serde_json::json;

    #[test]
    fn test_client_ready_payload() {
        let ready = ClientReady { site_key: "site-1" };
        insta::assert_snapshot!(serde_json::to_string(&ready).unwrap(), @r#"{"siteKey":"site-1"}"#);
    }

    #[test]
    fn test_decode_light_state() {
        let inbound = decode_inbound(SET_LIGHT_STATE, json!({"_id": "x", "on": true})).unwrap();
        assert_eq!(
            inbound,
            Inbound::LightState(LightStatus {
                light_id: "x".to_string(),
                fields: LightFields {
                    on: Some(true),
                    brightness: None,
                },
            })
        );
    }

    #[test]
    fn test_decode_argument_list() {
        let inbound =
            decode_inbound(SET_LIGHT_STATE, json!([{"_id": "x", "bri": 9}, "extra"])).unwrap();
        match inbound {
            Inbound::LightState(status) => assert_eq!(status.fields.brightness, Some(9)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_event() {
        let inbound = decode_inbound("newLight", json!({"_id": "x"})).unwrap();
        assert_eq!(inbound, Inbound::Unknown("newLight".to_string()));
    }

    #[test]
    fn test_decode_malformed_payload() {
        let err = decode_inbound(SET_LIGHT_STATE, json!({"on": true})).unwrap_err();
        assert!(matches!(err, Error::MalformedInboundEvent { .. }));

        let err = decode_inbound(SET_LIGHT_STATE, json!([])).unwrap_err();
        assert!(matches!(err, Error::MalformedInboundEvent { .. }));

        let err = decode_inbound(SET_LIGHT_STATE, json!("nope")).unwrap_err();
        assert!(matches!(err, Error::MalformedInboundEvent { .. }));
    }
}
