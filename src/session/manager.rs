use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use streamdeck_api::config::DeckConfig;

use crate::deck::DeckApi;
use crate::deck::client::DeckClient;
use crate::deck::supervisor::{LinkState, Supervisor};
use crate::error::{ApiError, ApiResult};
use crate::host::{Host, StateChanged};
use crate::render::glyph::GlyphSource;
use crate::session::Session;

struct RunningSession {
    session: Arc<Session>,
    supervisor: Arc<Supervisor>,
    listener: JoinHandle<()>,
}

/// Owns every live session, keyed by config entry id.
pub struct SessionManager {
    host: Host,
    glyphs: Arc<dyn GlyphSource>,
    sessions: Mutex<BTreeMap<String, RunningSession>>,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(host: Host, glyphs: Arc<dyn GlyphSource>) -> Self {
        Self {
            host,
            glyphs,
            sessions: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Set up the deck at `deck.host`. Fails with [`ApiError::NotReady`]
    /// when the plugin does not answer the info probe.
    pub async fn setup(&self, entry_id: &str, deck: &DeckConfig) -> ApiResult<Arc<Session>> {
        let api = Arc::new(DeckClient::new(&deck.host, deck.port)?);
        self.setup_with(entry_id, deck, api).await
    }

    pub async fn setup_with(
        &self,
        entry_id: &str,
        deck: &DeckConfig,
        api: Arc<dyn DeckApi>,
    ) -> ApiResult<Arc<Session>> {
        let title = deck.title(entry_id);

        let info = match api.fetch_info().await {
            Ok(info) => info,
            Err(err) => {
                log::error!("[{title}] Stream Deck not available at {}: {err}", deck.host);
                return Err(ApiError::NotReady(deck.host.clone()));
            }
        };
        log::info!(
            "[{title}] Found {} running Stream Deck {} at {}",
            info.model(),
            info.application.version,
            deck.host
        );

        if self.unload(entry_id).await {
            log::warn!("[{title}] Replaced existing session");
        }

        let session = Session::open(
            entry_id,
            deck,
            api.clone(),
            self.host.clone(),
            self.glyphs.clone(),
        )
        .await?;
        session.bindings().reconcile(info.button_uuids()).await?;

        let mut sessions = self.sessions.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            session.close();
            return Err(ApiError::service_error(format!(
                "[{title}] Session manager is shut down"
            )));
        }

        let supervisor = Supervisor::new(title, api, session.clone());
        supervisor.start().await;

        let listener = tokio::spawn(Self::listen(
            session.clone(),
            self.host.subscribe_state_changes(),
        ));

        sessions.insert(
            entry_id.to_string(),
            RunningSession {
                session: session.clone(),
                supervisor,
                listener,
            },
        );

        Ok(session)
    }

    /// Forward host state changes to `session` until it is closed.
    async fn listen(session: Arc<Session>, rx: broadcast::Receiver<StateChanged>) {
        let mut events = BroadcastStream::new(rx);
        loop {
            let event = tokio::select! {
                () = session.cancel.cancelled() => break,
                event = events.next() => event,
            };
            match event {
                Some(Ok(event)) => {
                    session.on_entity_state_change(&event).await;
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    log::warn!("[{}] Missed {skipped} state changes", session.title());
                }
                None => break,
            }
        }
    }

    /// Stop the session of `entry_id`. Returns whether one was running.
    pub async fn unload(&self, entry_id: &str) -> bool {
        let Some(running) = self.sessions.lock().await.remove(entry_id) else {
            return false;
        };

        running.session.close();
        running.supervisor.stop().await;
        if let Err(err) = running.listener.await {
            log::error!("[{}] State listener failed: {err}", running.session.title());
        }
        log::info!("[{}] Session unloaded", running.session.title());
        true
    }

    /// Unload every session. Later setups are refused.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for entry_id in self.entry_ids().await {
            self.unload(&entry_id).await;
        }
    }

    pub async fn entry_ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn session(&self, entry_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .await
            .get(entry_id)
            .map(|running| running.session.clone())
    }

    pub async fn link_state(&self, entry_id: &str) -> Option<LinkState> {
        self.sessions
            .lock()
            .await
            .get(entry_id)
            .map(|running| running.supervisor.state())
    }
}
