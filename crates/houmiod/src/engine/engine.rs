use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::dispatcher::Dispatcher;
use super::event::StateChanged;
use super::light::Light;
use super::light::LightDescriptor;
use super::light::TurnOffOptions;
use super::light::TurnOnOptions;
use super::message::CommandReceiver;
use super::message::StatusReceiver;
use super::message::StatusSender;
use super::registry::Registry;
use crate::error::Error;
use crate::houmio::ConnectionManager;
use crate::houmio::ConnectionSettings;
use crate::houmio::Transport;

/// Capacity of the state-change notification channel.
/// Slow subscribers lag and miss notifications rather than blocking the dispatcher.
const NOTIFICATION_CHANNEL_SIZE: usize = 256;

/// houmiod engine
///
/// Owns the light registry and wires the command queue, the status channel, the
/// connection manager, and the status dispatcher together.
pub struct Engine {
    registry: Arc<Registry>,

    /// State-change notifications toward the host platform
    notify: broadcast::Sender<StateChanged>,

    /// Channel ends handed to the background loops by `start`
    pending: Option<(CommandReceiver, StatusSender, StatusReceiver)>,

    shutdown: CancellationToken,

    handles: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Build the registry from the roster. Nothing runs until `start`.
    pub fn new(roster: Vec<LightDescriptor>, transition_interval: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (notify, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);

        let registry = Registry::from_roster(roster, &command_tx, transition_interval);
        info!("Registry populated with {} lights", registry.len());

        Self {
            registry: Arc::new(registry),
            notify,
            pending: Some((command_rx, status_tx, status_rx)),
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn the connection manager and the status dispatcher.
    pub fn start<T: Transport + 'static>(
        &mut self,
        transport: T,
        settings: ConnectionSettings,
    ) -> Result<(), Error> {
        let (command_rx, status_tx, status_rx) =
            self.pending.take().ok_or(Error::AlreadyStarted)?;

        info!("Engine starting");

        let manager = ConnectionManager::new(transport, settings, command_rx, status_tx);
        self.handles
            .push(tokio::spawn(manager.run(self.shutdown.clone())));

        let dispatcher = Dispatcher::new(self.registry.clone(), self.notify.clone());
        self.handles
            .push(tokio::spawn(dispatcher.run(status_rx, self.shutdown.clone())));

        Ok(())
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn light(&self, id: &str) -> Result<&Arc<Light>, Error> {
        self.registry
            .get(id)
            .ok_or_else(|| Error::UnknownLightId(id.to_string()))
    }

    /// Subscribe to state-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.notify.subscribe()
    }

    pub fn turn_on(&self, id: &str, options: TurnOnOptions) -> Result<(), Error> {
        self.light(id)?.turn_on(options);
        Ok(())
    }

    pub fn turn_off(&self, id: &str, options: TurnOffOptions) -> Result<(), Error> {
        self.light(id)?.turn_off(options);
        Ok(())
    }

    /// Stop every loop and transition, then wait for the background tasks.
    pub async fn shutdown(mut self) {
        info!("Engine shutting down");
        self.registry.cancel_transitions();
        self.shutdown.cancel();

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Engine task failed: {}", e);
            }
        }
        info!("Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LightKind;
    use crate::engine::transition::TRANSITION_INTERVAL;
    use crate::houmio::client::Frame;
    use crate::houmio::client::mock::MockTransport;
    use crate::houmio::protocol::APPLY_LIGHT;
    use serde_json::json;

    fn roster() -> Vec<LightDescriptor> {
        vec![
            LightDescriptor {
                id: "dim".to_string(),
                name: "Lamp".to_string(),
                room: "Kitchen".to_string(),
                kind: LightKind::Dimmable,
                brightness: Some(100),
                on: Some(true),
            },
            LightDescriptor {
                id: "plug".to_string(),
                name: "Plug".to_string(),
                room: String::new(),
                kind: LightKind::Binary,
                brightness: None,
                on: Some(false),
            },
        ]
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings::new("site")
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let mut engine = Engine::new(roster(), TRANSITION_INTERVAL);
        engine.start(MockTransport::new(), settings()).unwrap();
        let err = engine.start(MockTransport::new(), settings()).unwrap_err();
        assert!(matches!(err, Error::AlreadyStarted));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_light_command() {
        let engine = Engine::new(roster(), TRANSITION_INTERVAL);
        let err = engine
            .turn_on("nope", TurnOnOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownLightId(id) if id == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_round_trip_through_remote() {
        let transport = MockTransport::new();
        let mut engine = Engine::new(roster(), TRANSITION_INTERVAL);
        let mut changes = engine.subscribe();
        engine.start(transport.clone(), settings()).unwrap();

        engine.turn_off("dim", TurnOffOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = transport.emitted_named(APPLY_LIGHT);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, json!({"_id": "dim", "on": false}));

        // Local state only changes once the service reports it
        assert!(engine.light("dim").unwrap().is_on());

        transport.inject(
            0,
            Frame::Event {
                name: "setLightState".to_string(),
                payload: json!([{"_id": "dim", "on": false}]),
            },
        );
        let changed = changes.recv().await.unwrap();
        assert_eq!(changed.light_id, "dim");
        assert!(!changed.on);
        assert!(!engine.light("dim").unwrap().is_on());
        assert_eq!(engine.light("dim").unwrap().brightness(), Some(100));

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_for_unknown_light_is_ignored() {
        let transport = MockTransport::new();
        let mut engine = Engine::new(roster(), TRANSITION_INTERVAL);
        let mut changes = engine.subscribe();
        engine.start(transport.clone(), settings()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        transport.inject(
            0,
            Frame::Event {
                name: "setLightState".to_string(),
                payload: json!({"_id": "ghost", "on": true}),
            },
        );
        transport.inject(
            0,
            Frame::Event {
                name: "setLightState".to_string(),
                payload: json!({"_id": "plug", "on": true}),
            },
        );

        // Only the known light produces a notification
        let changed = changes.recv().await.unwrap();
        assert_eq!(changed.light_id, "plug");
        assert_eq!(engine.registry().len(), 2);
        assert!(engine.registry().get("ghost").is_none());

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_commands_reach_the_socket() {
        let transport = MockTransport::new();
        let mut engine = Engine::new(roster(), TRANSITION_INTERVAL);
        engine.start(transport.clone(), settings()).unwrap();

        engine
            .turn_off(
                "dim",
                TurnOffOptions {
                    transition: Some(Duration::from_secs(15)),
                },
            )
            .unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;

        let sent: Vec<_> = transport
            .emitted_named(APPLY_LIGHT)
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(
            sent,
            vec![
                json!({"_id": "dim", "on": true, "bri": 66}),
                json!({"_id": "dim", "on": true, "bri": 32}),
                json!({"_id": "dim", "on": false, "bri": 0}),
            ]
        );

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_transitions() {
        let transport = MockTransport::new();
        let mut engine = Engine::new(roster(), TRANSITION_INTERVAL);
        engine.start(transport.clone(), settings()).unwrap();

        engine
            .turn_on(
                "dim",
                TurnOnOptions {
                    brightness: None,
                    transition: Some(Duration::from_secs(60)),
                },
            )
            .unwrap();
        let light = engine.light("dim").unwrap().clone();
        assert!(light.transition_active());

        engine.shutdown().await;
        assert!(!light.transition_active());
    }
}
