//! Error types shared by the engine, the socket client and the roster fetch.

/// Boxed error from a transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The socket was not live when a command or announcement was due.
    #[error("No live connection: {0}")]
    ConnectionUnavailable(String),

    /// An inbound event that could not be decoded.
    #[error("Malformed inbound event '{event}': {reason}")]
    MalformedInboundEvent { event: String, reason: String },

    /// A status or command addressed a light that is not in the registry.
    #[error("Unknown light id: {0}")]
    UnknownLightId(String),

    /// The initial roster fetch failed. Setup cannot continue without it.
    #[error("Failed to fetch light roster: {0}")]
    RosterFetchFailure(String),

    /// Error reported by the socket transport.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("Engine already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
