pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod houmio;

pub use config::Config;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::LightState;
pub use engine::StateChanged;
pub use error::Error;
