//! Keeps a websocket session with the plugin alive.
//!
//! ```text
//! Stopped -> Probing -> Connected -> Probing (on disconnect) -> ...
//!                 \________________________________________-> Stopped (on stop)
//! ```
//!
//! While probing, the supervisor fetches `/sd/info` and opens the websocket,
//! backing off between failed attempts. A session that drops before it was
//! up for [`Supervisor::STABLE_AFTER`] counts as a failed attempt too. Every
//! entry into `Connected` invokes [`LinkHandler::on_online`] exactly once,
//! since a rebooted device has forgotten all pushed icons.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use streamdeck_api::{DeviceInfo, WebSocketMessage, parse_message_str};

use crate::backoff::Backoff;
use crate::deck::{DeckApi, FrameStream};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Stopped,
    Probing,
    Connected,
}

#[async_trait]
pub trait LinkHandler: Send + Sync {
    async fn on_online(&self, info: DeviceInfo);

    /// Called once per decoded frame, in arrival order.
    async fn on_message(&self, msg: WebSocketMessage);

    async fn on_offline(&self) {}
}

pub struct Supervisor {
    name: String,
    api: Arc<dyn DeckApi>,
    handler: Arc<dyn LinkHandler>,
    backoff: Backoff,
    cancel: CancellationToken,
    state: watch::Sender<LinkState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

enum Exit {
    Stopped,
    Disconnected,
}

impl Supervisor {
    /// Sessions lasting at least this long reset the backoff.
    pub const STABLE_AFTER: Duration = Duration::from_secs(10);

    pub fn new(name: &str, api: Arc<dyn DeckApi>, handler: Arc<dyn LinkHandler>) -> Arc<Self> {
        Self::with_backoff(name, api, handler, Backoff::default())
    }

    pub fn with_backoff(
        name: &str,
        api: Arc<dyn DeckApi>,
        handler: Arc<dyn LinkHandler>,
        backoff: Backoff,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            api,
            handler,
            backoff,
            cancel: CancellationToken::new(),
            state: watch::Sender::new(LinkState::Stopped),
            task: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Spawn the receive loop. Calling this on a running or stopped
    /// supervisor does nothing.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let this = self.clone();
        *task = Some(tokio::spawn(async move { this.run().await }));
    }

    /// Stop the loop and close any open session. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                log::error!("[{}] Supervisor task failed: {err}", self.name);
            }
        }
        self.state.send_replace(LinkState::Stopped);
    }

    async fn run(&self) {
        let mut backoff = self.backoff.clone();

        while !self.cancel.is_cancelled() {
            self.state.send_replace(LinkState::Probing);

            let Some(stream) = self.probe(&mut backoff).await else {
                continue;
            };

            let connected_at = Instant::now();
            let exit = self.receive(stream).await;
            self.handler.on_offline().await;
            if let Exit::Stopped = exit {
                break;
            }

            if connected_at.elapsed() >= Self::STABLE_AFTER {
                backoff.reset();
            } else {
                let delay = backoff.next_delay();
                log::debug!(
                    "[{}] Websocket dropped right after connecting, retrying in {delay:?}",
                    self.name
                );
                self.pause(delay).await;
            }
        }

        self.state.send_replace(LinkState::Stopped);
        log::debug!("[{}] Supervisor stopped", self.name);
    }

    /// One probe attempt. On failure this sleeps out the backoff delay
    /// (or until stopped) and returns `None`.
    async fn probe(&self, backoff: &mut Backoff) -> Option<(DeviceInfo, Box<dyn FrameStream>)> {
        let attempt = async {
            let info = self.api.fetch_info().await?;
            let stream = self.api.connect().await?;
            Ok::<_, crate::error::ApiError>((info, stream))
        };

        let res = tokio::select! {
            () = self.cancel.cancelled() => return None,
            res = attempt => res,
        };

        match res {
            Ok(ok) => Some(ok),
            Err(err) => {
                let delay = backoff.next_delay();
                log::debug!(
                    "[{}] Stream Deck unavailable ({err}), retrying in {delay:?}",
                    self.name
                );
                self.pause(delay).await;
                None
            }
        }
    }

    /// Sleep for `delay`, or until stopped.
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }

    async fn receive(&self, (info, mut stream): (DeviceInfo, Box<dyn FrameStream>)) -> Exit {
        log::info!(
            "[{}] Stream Deck online ({}, {} buttons)",
            self.name,
            info.model(),
            info.buttons.len()
        );
        self.state.send_replace(LinkState::Connected);
        self.handler.on_online(info).await;

        loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => None,
                frame = stream.next_frame() => Some(frame),
            };

            let Some(frame) = frame else {
                stream.close().await;
                log::info!("[{}] Websocket closed", self.name);
                return Exit::Stopped;
            };

            match frame {
                Ok(Some(text)) => match parse_message_str(&text) {
                    Ok(msg) => self.handler.on_message(msg).await,
                    Err(err) => {
                        log::warn!("[{}] Dropping undecodable websocket frame: {err}", self.name);
                    }
                },
                Ok(None) => {
                    log::warn!("[{}] Websocket closed by Stream Deck. Reconnecting", self.name);
                    return Exit::Disconnected;
                }
                Err(err) => {
                    log::warn!("[{}] Websocket client crashed ({err}). Reconnecting", self.name);
                    return Exit::Disconnected;
                }
            }
        }
    }
}
