use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::light::Light;
use super::light::LightDescriptor;
use super::message::CommandSender;

/// In-memory lights keyed by id, populated once from the roster.
///
/// The set of lights never changes during a session; only their state does.
#[derive(Debug, Default)]
pub struct Registry {
    lights: HashMap<String, Arc<Light>>,
    /// Roster order, for stable listing
    order: Vec<String>,
}

impl Registry {
    pub fn from_roster(
        roster: Vec<LightDescriptor>,
        commands: &CommandSender,
        transition_interval: Duration,
    ) -> Self {
        let mut registry = Self::default();
        for descriptor in roster {
            if registry.lights.contains_key(&descriptor.id) {
                tracing::warn!("Duplicate light id in roster, skipping: {}", descriptor.id);
                continue;
            }
            let light = Light::new(descriptor, commands.clone(), transition_interval);
            registry.order.push(light.id().to_string());
            registry
                .lights
                .insert(light.id().to_string(), Arc::new(light));
        }
        registry
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Light>> {
        self.lights.get(id)
    }

    /// Lights in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Light>> {
        self.order.iter().filter_map(|id| self.lights.get(id))
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Cancel every running transition.
    pub fn cancel_transitions(&self) {
        for light in self.lights.values() {
            light.cancel_transition();
        }
    }
}
