//! The Home Assistant side of the bridge.
//!
//! Sessions never talk to Home Assistant directly. They read entity state,
//! call services, fire events and persist their config entry through the
//! traits in this module, bundled into a [`Host`] handle.

pub mod config_store;
pub mod hass;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::ApiResult;
use crate::model::binding::domain_of;

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }

    fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// `friendly_name`, or the object id when the entity has none.
    #[must_use]
    pub fn name(&self) -> &str {
        self.attr_str("friendly_name").unwrap_or_else(|| {
            self.entity_id
                .split_once('.')
                .map_or(self.entity_id.as_str(), |(_, object_id)| object_id)
        })
    }

    #[must_use]
    pub fn icon(&self) -> Option<&str> {
        self.attr_str("icon")
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        self.attr_str("unit_of_measurement").unwrap_or_default()
    }

    /// Current brightness, 0 when the light is off or reports none.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn brightness(&self) -> i64 {
        self.attributes
            .get("brightness")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
            .unwrap_or(0)
    }
}

/// A `state_changed` notification from the host event bus.
#[derive(Clone, Debug, PartialEq)]
pub struct StateChanged {
    pub entity_id: String,
    pub new_state: Option<EntityState>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when the entity does not exist.
    async fn get_state(&self, entity_id: &str) -> ApiResult<Option<EntityState>>;

    /// All entity ids whose domain is one of `domains`.
    async fn entity_ids(&self, domains: &[String]) -> ApiResult<Vec<String>>;

    async fn set_state(
        &self,
        entity_id: &str,
        state: &str,
        attributes: Map<String, Value>,
    ) -> ApiResult<()>;
}

#[async_trait]
pub trait CommandBus: Send + Sync {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        data: Map<String, Value>,
    ) -> ApiResult<()>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn fire_event(&self, event_type: &str, data: Value) -> ApiResult<()>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ButtonEntry {
    #[serde(default)]
    pub entity_id: String,
}

/// Persisted data of one config entry. Unknown keys are carried through
/// untouched so a rewrite never drops them.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EntryData {
    #[serde(default)]
    pub buttons: BTreeMap<String, ButtonEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self, entry_id: &str) -> ApiResult<Option<EntryData>>;

    /// Fails with [`crate::error::ApiError::EntryNotFound`] when the entry
    /// has been removed in the meantime.
    async fn save(&self, entry_id: &str, data: EntryData) -> ApiResult<()>;
}

#[derive(Clone)]
pub struct Host {
    pub states: Arc<dyn StateStore>,
    pub commands: Arc<dyn CommandBus>,
    pub events: Arc<dyn EventBus>,
    pub config: Arc<dyn ConfigStore>,
    state_changes: broadcast::Sender<StateChanged>,
}

impl Host {
    const STATE_CHANGES_BUFFER_SIZE: usize = 128;

    pub fn new(
        states: Arc<dyn StateStore>,
        commands: Arc<dyn CommandBus>,
        events: Arc<dyn EventBus>,
        config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            states,
            commands,
            events,
            config,
            state_changes: broadcast::Sender::new(Self::STATE_CHANGES_BUFFER_SIZE),
        }
    }

    #[must_use]
    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<StateChanged> {
        self.state_changes.subscribe()
    }

    #[must_use]
    pub fn state_change_sender(&self) -> broadcast::Sender<StateChanged> {
        self.state_changes.clone()
    }

    /// Feed a state change into every subscribed session.
    pub fn publish_state_change(&self, event: StateChanged) {
        // no receivers just means no session is running
        let _ = self.state_changes.send(event);
    }
}
