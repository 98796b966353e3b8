//! In-process host: entity states, recorded service calls and events, and
//! config entries all live in memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::host::{
    CommandBus, ConfigStore, EntityState, EntryData, EventBus, Host, StateChanged, StateStore,
};

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub entity_id: String,
    pub data: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FiredEvent {
    pub event_type: String,
    pub data: Value,
}

#[derive(Default)]
pub struct MemoryHost {
    states: Mutex<BTreeMap<String, EntityState>>,
    calls: Mutex<Vec<ServiceCall>>,
    events: Mutex<Vec<FiredEvent>>,
    entries: Mutex<BTreeMap<String, EntryData>>,
    state_lookups: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wrap this store into a [`Host`] handle.
    #[must_use]
    pub fn host(self: &Arc<Self>) -> Host {
        Host::new(self.clone(), self.clone(), self.clone(), self.clone())
    }

    pub fn put_state(&self, state: EntityState) {
        lock(&self.states).insert(state.entity_id.clone(), state);
    }

    /// Insert the state and announce it on `host`, like the real event bus.
    pub fn change_state(&self, host: &Host, state: EntityState) {
        self.put_state(state.clone());
        host.publish_state_change(StateChanged {
            entity_id: state.entity_id.clone(),
            new_state: Some(state),
        });
    }

    #[must_use]
    pub fn state(&self, entity_id: &str) -> Option<EntityState> {
        lock(&self.states).get(entity_id).cloned()
    }

    pub fn put_entry(&self, entry_id: &str, data: EntryData) {
        lock(&self.entries).insert(entry_id.to_string(), data);
    }

    pub fn remove_entry(&self, entry_id: &str) {
        lock(&self.entries).remove(entry_id);
    }

    #[must_use]
    pub fn entry(&self, entry_id: &str) -> Option<EntryData> {
        lock(&self.entries).get(entry_id).cloned()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ServiceCall> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<FiredEvent> {
        lock(&self.events).clone()
    }

    /// Number of `get_state` calls served so far.
    #[must_use]
    pub fn state_lookups(&self) -> usize {
        self.state_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryHost {
    async fn get_state(&self, entity_id: &str) -> ApiResult<Option<EntityState>> {
        self.state_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.state(entity_id))
    }

    async fn entity_ids(&self, domains: &[String]) -> ApiResult<Vec<String>> {
        Ok(lock(&self.states)
            .values()
            .filter(|state| domains.iter().any(|d| d == state.domain()))
            .map(|state| state.entity_id.clone())
            .collect())
    }

    async fn set_state(
        &self,
        entity_id: &str,
        state: &str,
        attributes: Map<String, Value>,
    ) -> ApiResult<()> {
        self.put_state(EntityState {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes,
        });
        Ok(())
    }
}

#[async_trait]
impl CommandBus for MemoryHost {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        data: Map<String, Value>,
    ) -> ApiResult<()> {
        lock(&self.calls).push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            entity_id: entity_id.to_string(),
            data,
        });
        Ok(())
    }
}

#[async_trait]
impl EventBus for MemoryHost {
    async fn fire_event(&self, event_type: &str, data: Value) -> ApiResult<()> {
        lock(&self.events).push(FiredEvent {
            event_type: event_type.to_string(),
            data,
        });
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryHost {
    async fn load(&self, entry_id: &str) -> ApiResult<Option<EntryData>> {
        Ok(self.entry(entry_id))
    }

    async fn save(&self, entry_id: &str, data: EntryData) -> ApiResult<()> {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(entry_id) else {
            return Err(ApiError::EntryNotFound(entry_id.to_string()));
        };
        *entry = data;
        Ok(())
    }
}
