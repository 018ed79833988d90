use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use futures::FutureExt;
use rust_socketio::Event;
use rust_socketio::Payload;
use rust_socketio::asynchronous::Client;
use rust_socketio::asynchronous::ClientBuilder;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Error;

/// Something that happened on a live connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// First successful handshake.
    Connected,
    /// The transport re-established the connection by itself.
    Reconnected,
    Disconnected,
    /// An application event with its raw payload.
    Event {
        name: String,
        payload: serde_json::Value,
    },
}

pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

/// Outbound half of a connection.
#[async_trait]
pub trait SocketSink: Send + Sync {
    /// Emit one event.
    async fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), Error>;

    /// Close the connection without draining anything in flight.
    async fn disconnect(&self) -> Result<(), Error>;
}

/// One established connection.
///
/// The frame stream ending means the connection is gone for good.
pub struct Connection {
    pub sink: Arc<dyn SocketSink>,
    pub frames: FrameReceiver,
}

/// Opens connections to the remote service.
///
/// This trait allows for mocking the socket for testing purposes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<Connection, Error>;
}

/// Socket.IO transport using rust_socketio.
pub struct SocketIoTransport {
    url: String,
}

impl SocketIoTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

fn payload_to_json(payload: Payload) -> Option<serde_json::Value> {
    match payload {
        Payload::Text(args) => Some(serde_json::Value::Array(args)),
        _ => None,
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    async fn connect(&self) -> Result<Connection, Error> {
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let seen_connect = Arc::new(AtomicBool::new(false));

        let connect_tx = frame_tx.clone();
        let close_tx = frame_tx.clone();
        let event_tx = frame_tx;

        let client = ClientBuilder::new(self.url.clone())
            .on(Event::Connect, move |_payload: Payload, _client: Client| {
                let frame = if seen_connect.swap(true, Ordering::SeqCst) {
                    Frame::Reconnected
                } else {
                    Frame::Connected
                };
                let _ = connect_tx.send(frame);
                async {}.boxed()
            })
            .on(Event::Close, move |_payload: Payload, _client: Client| {
                let _ = close_tx.send(Frame::Disconnected);
                async {}.boxed()
            })
            .on_any(move |event: Event, payload: Payload, _client: Client| {
                let name = match event {
                    Event::Custom(name) => name,
                    Event::Message => "message".to_string(),
                    other => format!("{:?}", other),
                };
                match payload_to_json(payload) {
                    Some(payload) => {
                        let _ = event_tx.send(Frame::Event { name, payload });
                    }
                    None => debug!("Ignoring non-text payload for event {}", name),
                }
                async {}.boxed()
            })
            .connect()
            .await
            .map_err(|e| Error::Transport(Box::new(e)))?;

        Ok(Connection {
            sink: Arc::new(SocketIoSink { client }),
            frames,
        })
    }
}

struct SocketIoSink {
    client: Client,
}

#[async_trait]
impl SocketSink for SocketIoSink {
    async fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), Error> {
        self.client
            .emit(event, payload)
            .await
            .map_err(|e| Error::Transport(Box::new(e)))
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.client
            .disconnect()
            .await
            .map_err(|e| Error::Transport(Box::new(e)))
    }
}
