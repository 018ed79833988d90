use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use super::event::StateChanged;
use super::message::LightStatus;
use super::message::StatusReceiver;
use super::registry::Registry;
use crate::error::Error;

/// Consumes the status channel and applies each status to its light.
pub struct Dispatcher {
    registry: Arc<Registry>,
    notify: broadcast::Sender<StateChanged>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, notify: broadcast::Sender<StateChanged>) -> Self {
        Self { registry, notify }
    }

    /// Run until the status channel closes or shutdown is requested.
    pub async fn run(self, mut statuses: StatusReceiver, shutdown: CancellationToken) {
        info!("Status dispatcher starting");

        loop {
            let status = tokio::select! {
                _ = shutdown.cancelled() => break,
                status = statuses.recv() => match status {
                    Some(status) => status,
                    None => break,
                },
            };

            if let Err(e) = self.dispatch(status) {
                debug!("Dropping status: {}", e);
            }
        }

        info!("Status dispatcher shutting down");
    }

    /// Apply one status. Unknown ids are reported and nothing is created.
    pub fn dispatch(&self, status: LightStatus) -> Result<(), Error> {
        let light = self
            .registry
            .get(&status.light_id)
            .ok_or_else(|| Error::UnknownLightId(status.light_id.clone()))?;

        light.apply_status(&status.fields);
        let changed = StateChanged::from_light(light);
        info!(
            "Light state changed: {} -> on={}, brightness={:?}",
            changed.light_id, changed.on, changed.brightness
        );

        // Nobody listening is fine
        let _ = self.notify.send(changed);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::light::LightDescriptor;
    use crate::engine::message::LightFields;
    use crate::engine::state::LightKind;
    use crate::engine::state::LightState;
    use crate::engine::transition::TRANSITION_INTERVAL;
    use tokio::sync::mpsc;

    fn registry() -> Arc<Registry> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let roster = vec![
            LightDescriptor {
                id: "lamp".to_string(),
                name: "Lamp".to_string(),
                room: String::new(),
                kind: LightKind::Dimmable,
                brightness: Some(10),
                on: Some(false),
            },
            LightDescriptor {
                id: "plug".to_string(),
                name: "Plug".to_string(),
                room: String::new(),
                kind: LightKind::Binary,
                brightness: None,
                on: Some(false),
            },
        ];
        Arc::new(Registry::from_roster(roster, &tx, TRANSITION_INTERVAL))
    }

    fn status(id: &str, on: Option<bool>, brightness: Option<u8>) -> LightStatus {
        LightStatus {
            light_id: id.to_string(),
            fields: LightFields { on, brightness },
        }
    }

    #[test]
    fn test_dispatch_applies_partial_update() {
        let registry = registry();
        let (notify, mut rx) = broadcast::channel(8);
        let dispatcher = Dispatcher::new(registry.clone(), notify);

        dispatcher.dispatch(status("lamp", Some(true), None)).unwrap();

        let light = registry.get("lamp").unwrap();
        assert_eq!(
            light.state(),
            LightState {
                on: true,
                brightness: 10
            }
        );

        let changed = rx.try_recv().unwrap();
        assert_eq!(changed.light_id, "lamp");
        assert!(changed.on);
        assert_eq!(changed.brightness, Some(10));
    }

    #[test]
    fn test_dispatch_unknown_id_is_dropped() {
        let registry = registry();
        let (notify, mut rx) = broadcast::channel(8);
        let dispatcher = Dispatcher::new(registry.clone(), notify);

        let result = dispatcher.dispatch(status("ghost", Some(true), Some(1)));
        assert!(matches!(result, Err(Error::UnknownLightId(id)) if id == "ghost"));
        assert!(registry.get("ghost").is_none());
        assert_eq!(registry.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_binary_notification_has_no_brightness() {
        let registry = registry();
        let (notify, mut rx) = broadcast::channel(8);
        let dispatcher = Dispatcher::new(registry, notify);

        dispatcher.dispatch(status("plug", Some(true), Some(80))).unwrap();

        let changed = rx.try_recv().unwrap();
        assert_eq!(changed.brightness, None);
        assert_eq!(
            serde_json::to_value(&changed).unwrap(),
            serde_json::json!({"light_id": "plug", "on": true})
        );
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let registry = registry();
        let (notify, _) = broadcast::channel(8);
        let dispatcher = Dispatcher::new(registry.clone(), notify);

        dispatcher.dispatch(status("lamp", None, Some(200))).unwrap();
        assert_eq!(registry.get("lamp").unwrap().brightness(), Some(200));
    }

    #[tokio::test]
    async fn test_run_dispatches_in_order_and_stops_on_close() {
        let registry = registry();
        let (notify, mut rx) = broadcast::channel(8);
        let (tx, statuses) = mpsc::unbounded_channel();

        tx.send(status("lamp", None, Some(1))).unwrap();
        tx.send(status("ghost", None, Some(2))).unwrap();
        tx.send(status("lamp", None, Some(3))).unwrap();
        drop(tx);

        Dispatcher::new(registry.clone(), notify)
            .run(statuses, CancellationToken::new())
            .await;

        assert_eq!(rx.try_recv().unwrap().brightness, Some(1));
        assert_eq!(rx.try_recv().unwrap().brightness, Some(3));
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.get("lamp").unwrap().brightness(), Some(3));
    }
}
