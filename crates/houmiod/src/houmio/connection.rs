//! Connection manager.
//!
//! Owns the single live socket to the remote service. Three loops cooperate:
//! - the session loop (here) connects, announces, runs the heartbeat and forced
//!   reconnect timers, and tears sessions down
//! - the receive loop decodes inbound frames onto the status channel
//! - the send loop drains the command queue onto whatever socket is current
//!
//! State machine:
//! `Disconnected -> Connecting -> Connected -> (Reconnecting -> Connected | Disconnected)`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::client::Connection;
use super::client::Frame;
use super::client::FrameReceiver;
use super::client::SocketSink;
use super::client::Transport;
use super::protocol::APPLY_LIGHT;
use super::protocol::CLIENT_READY;
use super::protocol::ClientReady;
use super::protocol::Inbound;
use super::protocol::decode_inbound;
use crate::engine::CommandReceiver;
use crate::engine::StatusSender;

/// Default interval between `clientReady` liveness announcements.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1800);

/// Default interval between unconditional socket rebuilds.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3600);

/// Default receive-loop poll slice.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default wait between failed connect attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub site_key: String,
    pub heartbeat_interval: Duration,
    /// `None` disables forced reconnects.
    pub reconnect_interval: Option<Duration>,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
}

impl ConnectionSettings {
    pub fn new(site_key: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_interval: Some(RECONNECT_INTERVAL),
            poll_interval: POLL_INTERVAL,
            retry_delay: RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Why a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    ForcedReconnect,
    StreamLost,
}

type CurrentSocket = Option<Arc<dyn SocketSink>>;

pub struct ConnectionManager<T: Transport> {
    transport: T,
    settings: ConnectionSettings,
    /// Handed to the send loop when `run` starts
    commands: Option<CommandReceiver>,
    statuses: StatusSender,
    state: ConnectionState,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        settings: ConnectionSettings,
        commands: CommandReceiver,
        statuses: StatusSender,
    ) -> Self {
        Self {
            transport,
            settings,
            commands: Some(commands),
            statuses,
            state: ConnectionState::Disconnected,
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let (socket_tx, socket_rx) = watch::channel::<CurrentSocket>(None);

        let Some(commands) = self.commands.take() else {
            error!("Connection manager started without a command queue");
            return;
        };
        let sender = tokio::spawn(send_loop(
            commands,
            socket_rx,
            self.settings.retry_delay,
            shutdown.clone(),
        ));

        loop {
            let Some(connection) = self.connect(&shutdown).await else {
                break;
            };

            self.set_state(ConnectionState::Connected);
            info!("[Connected]");
            let sink = connection.sink;
            announce(sink.as_ref(), &self.settings.site_key).await;
            socket_tx.send_replace(Some(sink.clone()));

            let stop = shutdown.child_token();
            let lost = CancellationToken::new();
            let receiver = tokio::spawn(receive_loop(
                connection.frames,
                sink.clone(),
                self.statuses.clone(),
                self.settings.clone(),
                stop.clone(),
                lost.clone(),
            ));

            let end = self.session(sink.as_ref(), &shutdown, &lost).await;

            // Teardown: detach the socket from the send loop, close it, then stop and
            // join the receive loop before anything new is started.
            socket_tx.send_replace(None);
            if let Err(e) = sink.disconnect().await {
                warn!("Error closing socket: {}", e);
            }
            stop.cancel();
            if let Err(e) = receiver.await {
                error!("Receive loop panicked: {}", e);
            }
            info!("[Disconnected]");

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::ForcedReconnect => {
                    info!("Forced reconnect");
                    self.set_state(ConnectionState::Reconnecting);
                }
                SessionEnd::StreamLost => {
                    warn!("Connection lost, reconnecting");
                    self.set_state(ConnectionState::Reconnecting);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.retry_delay) => {}
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        if let Err(e) = sender.await {
            error!("Send loop panicked: {}", e);
        }
        info!("Connection manager stopped");
    }

    /// Connect, retrying until it works. `None` means shutdown was requested.
    async fn connect(&mut self, shutdown: &CancellationToken) -> Option<Connection> {
        if self.state == ConnectionState::Disconnected {
            self.set_state(ConnectionState::Connecting);
        }

        loop {
            info!("connect");
            let result = tokio::select! {
                _ = shutdown.cancelled() => return None,
                result = self.transport.connect() => result,
            };

            match result {
                Ok(connection) => return Some(connection),
                Err(e) => {
                    warn!(
                        "Connect failed, retrying in {:?}: {}",
                        self.settings.retry_delay, e
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(self.settings.retry_delay) => {}
                    }
                }
            }
        }
    }

    /// Drive the heartbeat and forced-reconnect timers for one connected session.
    async fn session(
        &self,
        sink: &dyn SocketSink,
        shutdown: &CancellationToken,
        lost: &CancellationToken,
    ) -> SessionEnd {
        let heartbeat = self.settings.heartbeat_interval;
        let mut heartbeat_timer = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);

        let reconnect = async {
            match self.settings.reconnect_interval {
                Some(interval) => tokio::time::sleep(interval).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(reconnect);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                _ = lost.cancelled() => return SessionEnd::StreamLost,
                _ = &mut reconnect => return SessionEnd::ForcedReconnect,
                _ = heartbeat_timer.tick() => {
                    debug!("Heartbeat");
                    announce(sink, &self.settings.site_key).await;
                }
            }
        }
    }
}

/// Send the `clientReady` announcement. Failures are logged only.
async fn announce(sink: &dyn SocketSink, site_key: &str) {
    info!("clientReady");
    let payload = match serde_json::to_value(ClientReady { site_key }) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to encode clientReady: {}", e);
            return;
        }
    };
    if let Err(e) = sink.emit(CLIENT_READY, payload).await {
        warn!("Failed to send clientReady: {}", e);
    }
}

/// Pump inbound frames onto the status channel.
///
/// Waits in bounded slices so that `stop` is observed within one `poll_interval`.
/// The connection counts as lost when the frame stream ends, or when the transport
/// reports a disconnect and does not reconnect within `retry_delay`.
async fn receive_loop(
    mut frames: FrameReceiver,
    sink: Arc<dyn SocketSink>,
    statuses: StatusSender,
    settings: ConnectionSettings,
    stop: CancellationToken,
    lost: CancellationToken,
) {
    let mut disconnected_since: Option<Instant> = None;

    while !stop.is_cancelled() {
        if disconnected_since.is_some_and(|since| since.elapsed() >= settings.retry_delay) {
            warn!(
                "Transport did not reconnect within {:?}",
                settings.retry_delay
            );
            lost.cancel();
            break;
        }

        let frame = match tokio::time::timeout(settings.poll_interval, frames.recv()).await {
            Err(_) => continue,
            Ok(Some(frame)) => frame,
            Ok(None) => {
                lost.cancel();
                break;
            }
        };

        match frame {
            Frame::Connected => debug!("Transport reports connected"),
            Frame::Reconnected => {
                info!("[Reconnected]");
                disconnected_since = None;
                announce(sink.as_ref(), &settings.site_key).await;
            }
            Frame::Disconnected => {
                info!("Transport reports disconnected");
                disconnected_since.get_or_insert_with(Instant::now);
            }
            Frame::Event { name, payload } => {
                debug!("on_event: {} {}", name, payload);
                match decode_inbound(&name, payload) {
                    Ok(Inbound::LightState(status)) => {
                        if statuses.send(status).is_err() {
                            warn!("Status channel closed, stopping receive loop");
                            break;
                        }
                    }
                    Ok(Inbound::Unknown(name)) => {
                        info!("Ignoring unknown event: {}", name);
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    info!("Stopping socket receive loop");
}

/// Drain the command queue onto the current socket, in order.
///
/// Blocks while no socket is connected. A command whose emit fails is retried on the
/// next socket (or after `retry_delay`), never dropped.
async fn send_loop(
    mut commands: CommandReceiver,
    mut socket: watch::Receiver<CurrentSocket>,
    retry_delay: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let cmd = tokio::select! {
            _ = shutdown.cancelled() => break,
            cmd = commands.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        let payload = match serde_json::to_value(&cmd) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode command for {}: {}", cmd.light_id, e);
                continue;
            }
        };

        loop {
            let sink = tokio::select! {
                _ = shutdown.cancelled() => return,
                current = socket.wait_for(Option::is_some) => match current {
                    Ok(current) => current.clone(),
                    // Session loop is gone
                    Err(_) => return,
                },
            };
            let Some(sink) = sink else {
                continue;
            };

            match sink.emit(APPLY_LIGHT, payload.clone()).await {
                Ok(()) => {
                    debug!("Sent command: {}", payload);
                    break;
                }
                Err(e) => {
                    warn!("Failed to send command for {}, will retry: {}", cmd.light_id, e);
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = socket.changed() => {}
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
    }

    info!("Send loop stopped");
}
