use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::broadcast::Sender;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use streamdeck_api::config::HassServer;

use crate::backoff::Backoff;
use crate::error::{ApiError, ApiResult};
use crate::host::{CommandBus, EntityState, EventBus, StateChanged, StateStore};

#[derive(Debug, Deserialize)]
struct HassWsEventEnvelope {
    #[serde(default)]
    pub event_type: String,
    pub data: HassWsEventData,
}

#[derive(Debug, Deserialize)]
struct HassWsEventData {
    pub entity_id: String,
    pub new_state: Option<EntityState>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum HassWsIncoming {
    #[serde(rename = "auth_required")]
    AuthRequired,
    #[serde(rename = "auth_ok")]
    AuthOk,
    #[serde(rename = "auth_invalid")]
    AuthInvalid,
    #[serde(rename = "result")]
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        error: Option<Value>,
    },
    #[serde(rename = "event")]
    Event { event: HassWsEventEnvelope },
    #[serde(other)]
    Other,
}

pub struct HassWs {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl HassWs {
    async fn recv_json(&mut self) -> ApiResult<Option<HassWsIncoming>> {
        let Some(msg) = self.socket.next().await else {
            return Ok(None);
        };
        let Message::Text(text) = msg? else {
            return Ok(Some(HassWsIncoming::Other));
        };
        Ok(Some(serde_json::from_str::<HassWsIncoming>(&text)?))
    }

    pub async fn next_state_changed(&mut self) -> ApiResult<Option<StateChanged>> {
        while let Some(msg) = self.recv_json().await? {
            if let HassWsIncoming::Event { event } = msg {
                if event.event_type == "state_changed" {
                    return Ok(Some(StateChanged {
                        entity_id: event.data.entity_id,
                        new_state: event.data.new_state,
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// Home Assistant REST + websocket client.
pub struct HassClient {
    base_url: Url,
    http: reqwest::Client,
    token: String,
}

impl HassClient {
    const DEFAULT_TOKEN_ENV: &'static str = "HASS_TOKEN";
    const DEFAULT_TIMEOUT_SECS: u64 = 10;

    pub fn new(server: &HassServer) -> ApiResult<Self> {
        let token_env = server
            .token_env
            .as_deref()
            .unwrap_or(Self::DEFAULT_TOKEN_ENV);
        let token = std::env::var(token_env).map_err(|_| {
            ApiError::service_error(format!("Missing Home Assistant token env var {token_env}"))
        })?;
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(ApiError::service_error(format!(
                "Empty Home Assistant token in env var {token_env}"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url: server.url.clone(),
            http,
            token,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> ApiResult<Url> {
        let base = if self.base_url.path().is_empty() {
            format!("{}/", self.base_url)
        } else {
            self.base_url.to_string()
        };
        let base = Url::parse(&base)?;
        Ok(base.join(endpoint.trim_start_matches('/'))?)
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> ApiResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let details = if body.is_empty() {
            format!("{status}")
        } else {
            format!("{status}: {body}")
        };

        let err = if status == StatusCode::UNAUTHORIZED {
            format!("Home Assistant unauthorized during {action}. Verify the access token")
        } else {
            format!("Home Assistant error during {action}: {details}")
        };

        Err(ApiError::service_error(err))
    }

    pub async fn get_states(&self) -> ApiResult<Vec<EntityState>> {
        let url = self.endpoint_url("/api/states")?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = self.check_status(response, "GET /api/states").await?;
        Ok(response.json().await?)
    }

    fn ws_endpoint_url(&self) -> ApiResult<Url> {
        let mut url = self.endpoint_url("/api/websocket")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|()| {
            ApiError::service_error("Failed to convert Home Assistant url scheme for websocket")
        })?;
        Ok(url)
    }

    pub async fn subscribe_state_changed(&self) -> ApiResult<HassWs> {
        let ws_url = self.ws_endpoint_url()?;
        let (mut socket, _response) = connect_async(ws_url.as_str()).await?;

        // Consume initial auth challenge.
        let _ = socket.next().await;

        let auth = serde_json::json!({
            "type": "auth",
            "access_token": self.token,
        });
        socket.send(Message::Text(auth.to_string().into())).await?;

        loop {
            let Some(msg) = socket.next().await else {
                return Err(ApiError::service_error(
                    "Home Assistant websocket closed during auth",
                ));
            };
            if let Message::Text(text) = msg? {
                match serde_json::from_str::<HassWsIncoming>(&text)? {
                    HassWsIncoming::AuthOk => break,
                    HassWsIncoming::AuthInvalid => {
                        return Err(ApiError::service_error(
                            "Home Assistant websocket auth failed (check token)",
                        ));
                    }
                    _ => {}
                }
            }
        }

        let sub = serde_json::json!({
            "id": 1,
            "type": "subscribe_events",
            "event_type": "state_changed",
        });
        socket.send(Message::Text(sub.to_string().into())).await?;

        loop {
            let Some(msg) = socket.next().await else {
                return Err(ApiError::service_error(
                    "Home Assistant websocket closed during subscribe",
                ));
            };
            if let Message::Text(text) = msg? {
                let value: HassWsIncoming = serde_json::from_str(&text)?;
                if let HassWsIncoming::Result { id: 1, success, error } = value {
                    if success {
                        break;
                    }
                    return Err(ApiError::service_error(format!(
                        "Home Assistant subscribe_events failed: {}",
                        error.unwrap_or(Value::Null)
                    )));
                }
            }
        }

        Ok(HassWs { socket })
    }

    /// Forward `state_changed` events into `sink` until `cancel` fires,
    /// resubscribing with backoff whenever the websocket drops.
    pub async fn pump_state_changes(&self, sink: Sender<StateChanged>, cancel: CancellationToken) {
        let mut backoff = Backoff::default();

        while !cancel.is_cancelled() {
            let ws = tokio::select! {
                () = cancel.cancelled() => break,
                ws = self.subscribe_state_changed() => ws,
            };

            let mut ws = match ws {
                Ok(ws) => {
                    log::info!("Subscribed to Home Assistant state changes");
                    backoff.reset();
                    ws
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    log::warn!("Home Assistant websocket unavailable ({err}), retrying in {delay:?}");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    ev = ws.next_state_changed() => match ev {
                        Ok(Some(ev)) => {
                            let _ = sink.send(ev);
                        }
                        Ok(None) => {
                            log::warn!("Home Assistant websocket closed, resubscribing");
                            break;
                        }
                        Err(err) => {
                            log::warn!("Home Assistant websocket error: {err}");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StateStore for HassClient {
    async fn get_state(&self, entity_id: &str) -> ApiResult<Option<EntityState>> {
        let url = self.endpoint_url(&format!("/api/states/{entity_id}"))?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self
            .check_status(response, &format!("GET /api/states/{entity_id}"))
            .await?;
        Ok(Some(response.json().await?))
    }

    async fn entity_ids(&self, domains: &[String]) -> ApiResult<Vec<String>> {
        Ok(self
            .get_states()
            .await?
            .into_iter()
            .filter(|state| domains.iter().any(|d| d == state.domain()))
            .map(|state| state.entity_id)
            .collect())
    }

    async fn set_state(
        &self,
        entity_id: &str,
        state: &str,
        attributes: Map<String, Value>,
    ) -> ApiResult<()> {
        let url = self.endpoint_url(&format!("/api/states/{entity_id}"))?;
        let payload = serde_json::json!({
            "state": state,
            "attributes": attributes,
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        self.check_status(response, &format!("POST /api/states/{entity_id}"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CommandBus for HassClient {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        mut data: Map<String, Value>,
    ) -> ApiResult<()> {
        let url = self.endpoint_url(&format!("/api/services/{domain}/{service}"))?;
        if !entity_id.trim().is_empty() {
            data.insert(
                "entity_id".to_string(),
                Value::String(entity_id.to_string()),
            );
        }

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&Value::Object(data))
            .send()
            .await?;
        self.check_status(response, &format!("POST /api/services/{domain}/{service}"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventBus for HassClient {
    async fn fire_event(&self, event_type: &str, data: Value) -> ApiResult<()> {
        let url = self.endpoint_url(&format!("/api/events/{event_type}"))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&data)
            .send()
            .await?;
        self.check_status(response, &format!("POST /api/events/{event_type}"))
            .await?;
        Ok(())
    }
}
