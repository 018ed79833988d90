use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;
use tracing::warn;

use super::message::CommandSender;
use super::message::LightCommand;
use super::message::LightFields;
use super::message::deserialize_brightness;
use super::message::deserialize_on_flag;
use super::state::Feature;
use super::state::LightKind;
use super::state::LightState;
use super::transition::Direction;
use super::transition::Ramp;
use super::transition::Transition;

/// Full brightness, the default `turn_on` target.
pub const MAX_BRIGHTNESS: u8 = 255;

/// Light as described by the roster endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LightDescriptor {
    #[serde(rename = "_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub room: String,

    #[serde(rename = "type")]
    pub kind: LightKind,

    #[serde(
        rename = "bri",
        default,
        deserialize_with = "deserialize_brightness"
    )]
    pub brightness: Option<u8>,

    #[serde(default, deserialize_with = "deserialize_on_flag")]
    pub on: Option<bool>,
}

/// Options accepted by `Light::turn_on`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnOnOptions {
    /// Target brightness, defaults to full.
    pub brightness: Option<u8>,
    /// Ramp duration. `None` or zero switches immediately.
    pub transition: Option<Duration>,
}

/// Options accepted by `Light::turn_off`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnOffOptions {
    pub transition: Option<Duration>,
}

/// A remote-controlled light.
///
/// Identity fields are fixed at creation. State is written only by the status
/// dispatcher; commands issued here go out through the command queue and come back
/// as status events.
#[derive(Debug)]
pub struct Light {
    id: String,
    name: String,
    room: String,
    kind: LightKind,
    state: RwLock<LightState>,
    transition: Mutex<Option<Transition>>,
    transition_interval: Duration,
    commands: CommandSender,
}

impl Light {
    pub fn new(
        descriptor: LightDescriptor,
        commands: CommandSender,
        transition_interval: Duration,
    ) -> Self {
        let state = LightState {
            on: descriptor.on.unwrap_or(false),
            brightness: descriptor.brightness.unwrap_or(0),
        };

        Self {
            id: descriptor.id,
            name: descriptor.name,
            room: descriptor.room,
            kind: descriptor.kind,
            state: RwLock::new(state),
            transition: Mutex::new(None),
            transition_interval,
            commands,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    /// `name` alone when the room is empty, `room/name` otherwise.
    pub fn display_name(&self) -> String {
        if self.room.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.room, self.name)
        }
    }

    /// Brightness, absent for binary lights.
    pub fn brightness(&self) -> Option<u8> {
        match self.kind {
            LightKind::Binary => None,
            LightKind::Dimmable => Some(self.state().brightness),
        }
    }

    pub fn is_on(&self) -> bool {
        self.state().on
    }

    pub fn supported_features(&self) -> &'static [Feature] {
        self.kind.supported_features()
    }

    /// Snapshot of the last-known state, brightness included for every kind.
    pub(crate) fn state(&self) -> LightState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Apply a status update from the remote service.
    pub(crate) fn apply_status(&self, fields: &LightFields) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.apply(fields);
    }

    /// Whether a transition timer is currently running for this light.
    pub fn transition_active(&self) -> bool {
        self.with_transition(|slot| slot.as_ref().is_some_and(Transition::is_active))
    }

    /// Cancel a running transition, if any.
    pub fn cancel_transition(&self) {
        self.with_transition(|slot| {
            if let Some(transition) = slot.take() {
                transition.cancel();
            }
        });
    }

    pub fn turn_on(&self, options: TurnOnOptions) {
        info!("Turn on {}: {:?} {:?}", self.id, options, self.state());
        self.cancel_transition();

        if self.kind == LightKind::Binary {
            self.send(LightFields {
                on: Some(true),
                brightness: None,
            });
            return;
        }

        if let Some(ramp) = self.ramp(Direction::Up, options.transition) {
            self.start_transition(ramp);
            return;
        }

        self.send(LightFields {
            on: Some(true),
            brightness: Some(options.brightness.unwrap_or(MAX_BRIGHTNESS)),
        });
    }

    pub fn turn_off(&self, options: TurnOffOptions) {
        info!("Turn off {}: {:?} {:?}", self.id, options, self.state());
        self.cancel_transition();

        if self.kind == LightKind::Dimmable {
            if let Some(ramp) = self.ramp(Direction::Down, options.transition) {
                self.start_transition(ramp);
                return;
            }
        }

        self.send(LightFields {
            on: Some(false),
            brightness: None,
        });
    }

    fn ramp(&self, direction: Direction, duration: Option<Duration>) -> Option<Ramp> {
        Ramp::new(
            direction,
            self.state(),
            duration?,
            self.transition_interval,
        )
    }

    fn start_transition(&self, ramp: Ramp) {
        let transition = Transition::spawn(
            self.id.clone(),
            ramp,
            self.transition_interval,
            self.commands.clone(),
        );
        self.with_transition(|slot| {
            // Replacing drops (and so cancels) anything started concurrently
            *slot = Some(transition);
        });
    }

    fn send(&self, fields: LightFields) {
        let cmd = LightCommand {
            light_id: self.id.clone(),
            fields,
        };
        if self.commands.send(cmd).is_err() {
            warn!("Command queue closed, dropping command for {}", self.id);
        }
    }

    fn with_transition<R>(&self, f: impl FnOnce(&mut Option<Transition>) -> R) -> R {
        let mut slot = match self.transition.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut slot)
    }
}
