//! Runtime state of one configured Stream Deck.

pub mod bindings;
pub mod manager;
pub mod router;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use itertools::Itertools;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use streamdeck_api::config::DeckConfig;
use streamdeck_api::{DeviceInfo, WebSocketMessage};

use crate::deck::DeckApi;
use crate::deck::supervisor::LinkHandler;
use crate::error::{ApiError, ApiResult};
use crate::host::{Host, StateChanged};
use crate::model::binding::{Binding, SELECT_DEFAULT_OPTIONS, SELECT_OPTION_CLEAR};
use crate::render::glyph::GlyphSource;
use crate::render::{RenderOutcome, render};
use crate::session::bindings::ButtonBindings;

pub struct Session {
    entry_id: String,
    title: String,
    deck_host: String,
    enabled_platforms: Vec<String>,
    api: Arc<dyn DeckApi>,
    host: Host,
    bindings: ButtonBindings,
    glyphs: Arc<dyn GlyphSource>,
    last_pressed: Mutex<Option<String>>,
    reachable: AtomicBool,
    pushes: Semaphore,
    cancel: CancellationToken,
}

impl Session {
    const MAX_CONCURRENT_PUSHES: usize = 4;

    pub async fn open(
        entry_id: &str,
        deck: &DeckConfig,
        api: Arc<dyn DeckApi>,
        host: Host,
        glyphs: Arc<dyn GlyphSource>,
    ) -> ApiResult<Arc<Self>> {
        let bindings = ButtonBindings::load(entry_id, host.config.clone()).await?;

        Ok(Arc::new(Self {
            entry_id: entry_id.to_string(),
            title: deck.title(entry_id).to_string(),
            deck_host: deck.host.clone(),
            enabled_platforms: deck.enabled_platforms.clone(),
            api,
            host,
            bindings,
            glyphs,
            last_pressed: Mutex::new(None),
            reachable: AtomicBool::new(false),
            pushes: Semaphore::new(Self::MAX_CONCURRENT_PUSHES),
            cancel: CancellationToken::new(),
        }))
    }

    #[must_use]
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn bindings(&self) -> &ButtonBindings {
        &self.bindings
    }

    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub async fn last_pressed(&self) -> Option<String> {
        self.last_pressed.lock().await.clone()
    }

    async fn set_last_pressed(&self, entity_id: &str) {
        log::debug!("[{}] Last pressed entity is now {entity_id}", self.title);
        *self.last_pressed.lock().await = Some(entity_id.to_string());
    }

    /// Cancel pending icon pushes. Pushes started after this are dropped.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Re-render button `uuid` and push it to the device.
    ///
    /// Returns `false` when nothing was pushed, either because the bound
    /// entity has no state or because the session was closed.
    pub async fn refresh_icon(&self, uuid: &str) -> ApiResult<bool> {
        let binding = self.bindings.get(uuid).await;

        let state = match &binding {
            Some(Binding::Entity(entity_id)) => self.host.states.get_state(entity_id).await?,
            _ => None,
        };

        let svg = match render(uuid, binding.as_ref(), state.as_ref(), self.glyphs.as_ref()) {
            RenderOutcome::Icon(svg) => svg,
            RenderOutcome::Skip => {
                log::info!(
                    "[{}] No state for entity bound to {uuid}, keeping current icon",
                    self.title
                );
                return Ok(false);
            }
        };

        let push = async {
            let _permit = self
                .pushes
                .acquire()
                .await
                .map_err(|_| ApiError::service_error("icon push pool closed"))?;
            self.api.push_icon(uuid, &svg).await
        };

        tokio::select! {
            () = self.cancel.cancelled() => Ok(false),
            res = push => res.map(|()| true),
        }
    }

    async fn refresh_logged(&self, uuid: &str) {
        if let Err(err) = self.refresh_icon(uuid).await {
            log::debug!("[{}] Icon update for {uuid} failed: {err}", self.title);
        }
    }

    /// Re-render every known button.
    pub async fn refresh_all(&self) {
        let uuids = self.bindings.uuids().await;
        log::debug!("[{}] Refreshing {} button icons", self.title, uuids.len());
        join_all(uuids.iter().map(|uuid| self.refresh_logged(uuid))).await;
    }

    pub fn spawn_refresh(self: &Arc<Self>, uuid: String) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.refresh_logged(&uuid).await })
    }

    /// Schedule an icon refresh for every button showing the changed entity.
    pub async fn on_entity_state_change(self: &Arc<Self>, event: &StateChanged) -> Vec<JoinHandle<()>> {
        if event.new_state.is_none() {
            return vec![];
        }

        let uuids = self.bindings.entities_bound_to(&event.entity_id).await;
        if !uuids.is_empty() {
            log::trace!(
                "[{}] {} changed, refreshing {} buttons",
                self.title,
                event.entity_id,
                uuids.len()
            );
        }
        uuids
            .into_iter()
            .map(|uuid| self.spawn_refresh(uuid))
            .collect()
    }

    /// Options offered for every button: the sentinels followed by the
    /// entities of the enabled platforms.
    pub async fn options(&self) -> ApiResult<Vec<String>> {
        let entities = self.host.states.entity_ids(&self.enabled_platforms).await?;

        Ok(SELECT_DEFAULT_OPTIONS
            .iter()
            .map(ToString::to_string)
            .chain(entities.into_iter().sorted())
            .collect())
    }

    /// Assign `option` to button `uuid`, then update its icon.
    ///
    /// Choosing the clear sentinel unbinds the button.
    pub async fn select(&self, uuid: &str, option: &str) -> ApiResult<()> {
        if self.bindings.get(uuid).await.is_none() {
            return Err(ApiError::service_error(format!("Unknown button {uuid}")));
        }
        if !self.options().await?.iter().any(|opt| opt == option) {
            return Err(ApiError::service_error(format!("Invalid option {option:?}")));
        }

        let stored = if option == SELECT_OPTION_CLEAR { "" } else { option };
        self.bindings.set(uuid, stored).await?;
        log::info!("[{}] Button {uuid} bound to {stored:?}", self.title);

        self.refresh_logged(uuid).await;
        Ok(())
    }

    pub async fn fetch_icon(&self, uuid: &str) -> ApiResult<String> {
        self.api.fetch_icon(uuid).await
    }
}

#[async_trait]
impl LinkHandler for Session {
    async fn on_online(&self, info: DeviceInfo) {
        self.set_reachable(true);

        match self.bindings.reconcile(info.button_uuids()).await {
            Ok(true) => log::info!("[{}] New buttons discovered", self.title),
            Ok(false) => {}
            Err(err) => log::error!("[{}] Failed to store button inventory: {err}", self.title),
        }

        self.refresh_all().await;
    }

    async fn on_message(&self, msg: WebSocketMessage) {
        self.dispatch(&msg).await;
    }

    async fn on_offline(&self) {
        self.set_reachable(false);
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;

    use streamdeck_api::config::DeckConfig;

    use crate::deck::supervisor::LinkHandler;
    use crate::deck::supervisor::tests::{ScriptedDeck, sample_info};
    use crate::error::ApiError;
    use crate::host::memory::MemoryHost;
    use crate::host::{ButtonEntry, EntityState, EntryData, StateChanged};
    use crate::model::binding::Binding;
    use crate::render::glyph::MdiGlyphs;
    use crate::session::Session;

    pub const BUTTON_A: &str = "aaaa-bbbb-cccc";
    pub const BUTTON_B: &str = "dddd-eeee-ffff";

    pub async fn session_with(
        buttons: &[(&str, &str)],
    ) -> (Arc<Session>, Arc<MemoryHost>, Arc<ScriptedDeck>) {
        let mem = MemoryHost::new();
        mem.put_entry(
            "office",
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
            },
        );

        let deck = Arc::new(ScriptedDeck::default());
        let mut config = DeckConfig::new("10.0.0.5");
        config.name = Some("Office".to_string());
        config.enabled_platforms = vec!["light".to_string(), "switch".to_string()];

        let session = Session::open("office", &config, deck.clone(), mem.host(), Arc::new(MdiGlyphs))
            .await
            .unwrap();
        (session, mem, deck)
    }

    fn kitchen(state: &str) -> EntityState {
        EntityState::new("light.kitchen", state).with_attr("friendly_name", "Kitchen")
    }

    #[tokio::test]
    async fn online_reconciles_and_pushes_all() {
        let (session, mem, deck) = session_with(&[(BUTTON_A, "light.kitchen")]).await;
        mem.put_state(kitchen("on"));

        session.on_online(sample_info()).await;

        assert!(session.is_reachable());
        assert_eq!(mem.entry("office").unwrap().buttons[BUTTON_B].entity_id, "");

        let pushed = deck.pushed();
        assert_eq!(pushed.len(), 2);
        let (_, a_svg) = pushed.iter().find(|(uuid, _)| uuid == BUTTON_A).unwrap();
        assert!(a_svg.contains(">Kitchen</text>"));
        let (_, b_svg) = pushed.iter().find(|(uuid, _)| uuid == BUTTON_B).unwrap();
        assert!(b_svg.contains(">dddd</text>"));

        session.on_offline().await;
        assert!(!session.is_reachable());
    }

    #[tokio::test]
    async fn missing_state_keeps_icon() {
        let (session, _mem, deck) = session_with(&[(BUTTON_A, "light.gone")]).await;

        assert!(!session.refresh_icon(BUTTON_A).await.unwrap());
        assert!(deck.pushed().is_empty());
    }

    #[tokio::test]
    async fn clear_binding_never_looks_up_state() {
        let (session, mem, deck) = session_with(&[(BUTTON_A, ">>CLEAR<<")]).await;
        let lookups = mem.state_lookups();

        assert!(session.refresh_icon(BUTTON_A).await.unwrap());
        assert_eq!(mem.state_lookups(), lookups);
        assert!(deck.pushed()[0].1.contains(r##"fill="#a00""##));
    }

    #[tokio::test]
    async fn rejected_push_is_an_error() {
        let (session, _mem, deck) = session_with(&[(BUTTON_A, "")]).await;
        *deck.reject_pushes.lock().unwrap() = true;

        assert!(session.refresh_icon(BUTTON_A).await.is_err());
        // but never escapes a bulk refresh
        session.refresh_all().await;
    }

    #[tokio::test]
    async fn closed_session_drops_pushes() {
        let (session, _mem, deck) = session_with(&[(BUTTON_A, "")]).await;
        session.close();

        assert!(!session.refresh_icon(BUTTON_A).await.unwrap());
        assert!(deck.pushed().is_empty());
    }

    #[tokio::test]
    async fn state_change_refreshes_bound_buttons() {
        let (session, mem, deck) = session_with(&[
            (BUTTON_A, "light.kitchen"),
            (BUTTON_B, "switch.fan"),
        ])
        .await;
        mem.put_state(kitchen("off"));

        let event = StateChanged {
            entity_id: "light.kitchen".to_string(),
            new_state: Some(kitchen("off")),
        };
        for handle in session.on_entity_state_change(&event).await {
            handle.await.unwrap();
        }

        let pushed = deck.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, BUTTON_A);
        assert!(pushed[0].1.contains(">off</text>"));

        let removed = StateChanged {
            entity_id: "light.kitchen".to_string(),
            new_state: None,
        };
        assert!(session.on_entity_state_change(&removed).await.is_empty());
    }

    #[tokio::test]
    async fn options_and_select() {
        let (session, mem, deck) = session_with(&[(BUTTON_A, "")]).await;
        mem.put_state(kitchen("on"));
        mem.put_state(EntityState::new("switch.fan", "off"));
        mem.put_state(EntityState::new("sensor.outside", "21"));

        assert_eq!(
            session.options().await.unwrap(),
            vec!["", ">>UP<<", ">>DOWN<<", ">>CLEAR<<", "light.kitchen", "switch.fan"]
        );

        session.select(BUTTON_A, "switch.fan").await.unwrap();
        assert_eq!(mem.entry("office").unwrap().buttons[BUTTON_A].entity_id, "switch.fan");
        assert!(deck.pushed()[0].1.contains(">off</text>"));

        session.select(BUTTON_A, ">>CLEAR<<").await.unwrap();
        assert_eq!(session.bindings().get(BUTTON_A).await, Some(Binding::Unbound));

        assert!(session.select(BUTTON_A, "sensor.outside").await.is_err());
        assert!(session.select("nope", "").await.is_err());
    }

    #[tokio::test]
    async fn select_after_entry_removed() {
        let (session, mem, _deck) = session_with(&[(BUTTON_A, "")]).await;
        mem.put_state(kitchen("on"));
        mem.remove_entry("office");

        let err = session.select(BUTTON_A, "light.kitchen").await.unwrap_err();
        assert!(matches!(err, ApiError::EntryNotFound(_)));
    }
}
