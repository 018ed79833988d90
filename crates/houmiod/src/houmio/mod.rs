//! Houmio cloud service client: socket transport, wire protocol, connection
//! manager, and roster fetch.

pub mod client;
pub mod connection;
pub mod protocol;
pub mod roster;

pub use client::SocketIoTransport;
pub use client::Transport;
pub use connection::ConnectionManager;
pub use connection::ConnectionSettings;
pub use roster::fetch_roster;

/// Default service host.
pub const DEFAULT_HOST: &str = "https://houmi.herokuapp.com";
