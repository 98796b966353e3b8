use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ApiError, ApiResult};
use crate::host::{ButtonEntry, ConfigStore, EntryData};
use crate::model::binding::Binding;

/// Button uuid to binding map of one config entry.
///
/// Reads are served from memory. Every mutation re-reads the persisted entry,
/// merges into it and writes it back while holding the lock, so the select
/// path and the reconcile path never interleave a read-merge-write cycle.
pub struct ButtonBindings {
    entry_id: String,
    store: Arc<dyn ConfigStore>,
    buttons: Mutex<BTreeMap<String, String>>,
}

fn flatten(data: &EntryData) -> BTreeMap<String, String> {
    data.buttons
        .iter()
        .map(|(uuid, button)| (uuid.clone(), button.entity_id.clone()))
        .collect()
}

impl ButtonBindings {
    pub async fn load(entry_id: &str, store: Arc<dyn ConfigStore>) -> ApiResult<Self> {
        let data = store
            .load(entry_id)
            .await?
            .ok_or_else(|| ApiError::EntryNotFound(entry_id.to_string()))?;

        Ok(Self {
            entry_id: entry_id.to_string(),
            store,
            buttons: Mutex::new(flatten(&data)),
        })
    }

    #[must_use]
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    async fn fresh_entry(&self) -> ApiResult<EntryData> {
        self.store
            .load(&self.entry_id)
            .await?
            .ok_or_else(|| ApiError::EntryNotFound(self.entry_id.clone()))
    }

    /// Add an empty binding for every device button not seen before.
    ///
    /// Bindings for buttons the device did not report are kept. Returns
    /// whether anything was added (and persisted).
    pub async fn reconcile<'a>(&self, uuids: impl IntoIterator<Item = &'a str>) -> ApiResult<bool> {
        let mut buttons = self.buttons.lock().await;
        let mut data = self.fresh_entry().await?;

        let mut added = 0;
        for uuid in uuids {
            if !data.buttons.contains_key(uuid) {
                data.buttons.insert(uuid.to_string(), ButtonEntry::default());
                added += 1;
            }
        }

        if added > 0 {
            log::debug!("[{}] Adding {added} new buttons", self.entry_id);
            self.store.save(&self.entry_id, data.clone()).await?;
        }
        *buttons = flatten(&data);

        Ok(added > 0)
    }

    /// Binding of `uuid`, or `None` when the button is not known.
    pub async fn get(&self, uuid: &str) -> Option<Binding> {
        self.buttons
            .lock()
            .await
            .get(uuid)
            .map(|entity| Binding::parse(entity))
    }

    /// Bind `uuid` to `entity_id` (or a sentinel) and persist right away.
    pub async fn set(&self, uuid: &str, entity_id: &str) -> ApiResult<()> {
        let mut buttons = self.buttons.lock().await;
        let mut data = self.fresh_entry().await?;

        data.buttons.insert(
            uuid.to_string(),
            ButtonEntry {
                entity_id: entity_id.to_string(),
            },
        );
        self.store.save(&self.entry_id, data.clone()).await?;
        *buttons = flatten(&data);

        Ok(())
    }

    pub async fn entities_bound_to(&self, entity_id: &str) -> Vec<String> {
        self.buttons
            .lock()
            .await
            .iter()
            .filter(|(_, bound)| *bound == entity_id)
            .map(|(uuid, _)| uuid.clone())
            .collect()
    }

    pub async fn uuids(&self) -> Vec<String> {
        self.buttons.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use crate::error::ApiError;
    use crate::host::memory::MemoryHost;
    use crate::host::{ButtonEntry, EntryData};
    use crate::model::binding::{Binding, Direction};
    use crate::session::bindings::ButtonBindings;

    fn entry(buttons: &[(&str, &str)]) -> EntryData {
        EntryData {
            buttons: buttons
                .iter()
                .map(|(uuid, entity)| {
                    (
                        (*uuid).to_string(),
                        ButtonEntry {
                            entity_id: (*entity).to_string(),
                        },
                    )
                })
                .collect(),
            ..EntryData::default()
        }
    }

    #[tokio::test]
    async fn reconcile_adds_empty_bindings() {
        let mem = MemoryHost::new();
        mem.put_entry("office", EntryData::default());

        let bindings = ButtonBindings::load("office", mem.clone()).await.unwrap();
        assert!(bindings.reconcile(["A", "B"]).await.unwrap());

        assert_eq!(
            mem.entry("office").unwrap().buttons,
            btreemap! {
                "A".to_string() => ButtonEntry::default(),
                "B".to_string() => ButtonEntry::default(),
            }
        );
        assert_eq!(bindings.get("A").await, Some(Binding::Unbound));
        assert_eq!(bindings.get("C").await, None);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_and_keeps_bindings() {
        let mem = MemoryHost::new();
        mem.put_entry("office", entry(&[("A", "light.kitchen"), ("gone", "switch.fan")]));

        let bindings = ButtonBindings::load("office", mem.clone()).await.unwrap();
        assert!(bindings.reconcile(["A", "B"]).await.unwrap());
        let after_first = mem.entry("office").unwrap();

        assert!(!bindings.reconcile(["A", "B"]).await.unwrap());
        assert_eq!(mem.entry("office").unwrap(), after_first);

        assert_eq!(after_first.buttons["A"].entity_id, "light.kitchen");
        assert_eq!(after_first.buttons["gone"].entity_id, "switch.fan");
        assert_eq!(after_first.buttons["B"].entity_id, "");
    }

    #[tokio::test]
    async fn set_persists_and_preserves_extra_keys() {
        let mem = MemoryHost::new();
        let mut data = entry(&[("A", "")]);
        data.extra.insert("host".to_string(), "10.0.0.5".into());
        mem.put_entry("office", data);

        let bindings = ButtonBindings::load("office", mem.clone()).await.unwrap();
        bindings.set("A", ">>UP<<").await.unwrap();

        let stored = mem.entry("office").unwrap();
        assert_eq!(stored.buttons["A"].entity_id, ">>UP<<");
        assert_eq!(stored.extra["host"], "10.0.0.5");
        assert_eq!(bindings.get("A").await, Some(Binding::Adjust(Direction::Up)));
    }

    #[tokio::test]
    async fn set_fails_when_entry_removed() {
        let mem = MemoryHost::new();
        mem.put_entry("office", entry(&[("A", "")]));

        let bindings = ButtonBindings::load("office", mem.clone()).await.unwrap();
        mem.remove_entry("office");

        let err = bindings.set("A", "light.kitchen").await.unwrap_err();
        assert!(matches!(err, ApiError::EntryNotFound(id) if id == "office"));
        assert_eq!(bindings.get("A").await, Some(Binding::Unbound));
    }

    #[tokio::test]
    async fn reverse_lookup() {
        let mem = MemoryHost::new();
        mem.put_entry(
            "office",
            entry(&[("A", "light.kitchen"), ("B", "switch.fan"), ("C", "light.kitchen")]),
        );

        let bindings = ButtonBindings::load("office", mem).await.unwrap();
        assert_eq!(bindings.entities_bound_to("light.kitchen").await, vec!["A", "C"]);
        assert!(bindings.entities_bound_to("light.hall").await.is_empty());
        assert_eq!(bindings.uuids().await, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn load_requires_entry() {
        let mem = MemoryHost::new();
        assert!(ButtonBindings::load("missing", mem).await.is_err());
    }
}
