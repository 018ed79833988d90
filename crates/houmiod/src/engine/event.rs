use serde::Serialize;

use super::light::Light;

/// Notification that a light's state was updated from the remote service.
///
/// Broadcast to the host platform; delivery is best effort. Brightness is absent for
/// binary lights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChanged {
    pub light_id: String,
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

impl StateChanged {
    /// Snapshot the host-visible state of `light`.
    pub fn from_light(light: &Light) -> Self {
        Self {
            light_id: light.id().to_string(),
            on: light.is_on(),
            brightness: light.brightness(),
        }
    }
}
