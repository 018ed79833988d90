mod dispatcher;
#[allow(clippy::module_inception)]
mod engine;
mod event;
mod light;
mod message;
mod registry;
pub mod state;
mod transition;

pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use event::StateChanged;
pub use light::Light;
pub use light::LightDescriptor;
pub use light::MAX_BRIGHTNESS;
pub use light::TurnOffOptions;
pub use light::TurnOnOptions;
pub use message::CommandReceiver;
pub use message::CommandSender;
pub use message::LightCommand;
pub use message::LightFields;
pub use message::LightStatus;
pub use message::StatusReceiver;
pub use message::StatusSender;
pub use registry::Registry;
pub use state::Feature;
pub use state::LightKind;
pub use state::LightState;
pub use transition::TRANSITION_INTERVAL;
