use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use streamdeck_api::{DeviceInfo, PLUGIN_ICON, PLUGIN_INFO, parse_info};

use crate::deck::{DeckApi, FrameStream};
use crate::error::{ApiError, ApiResult};

/// HTTP + websocket client for one Stream Deck plugin instance.
#[derive(Clone, Debug)]
pub struct DeckClient {
    host: String,
    port: u16,
    http: reqwest::Client,
}

impl DeckClient {
    const DEFAULT_TIMEOUT_SECS: u64 = 5;

    pub fn new(host: &str, port: u16) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            host: host.to_string(),
            port,
            http,
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn info_url(&self) -> String {
        format!("http://{}:{}{PLUGIN_INFO}", self.host, self.port)
    }

    #[must_use]
    pub fn icon_url(&self, uuid: &str) -> String {
        format!("http://{}:{}{PLUGIN_ICON}/{uuid}", self.host, self.port)
    }

    #[must_use]
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    fn check_status(response: &reqwest::Response, url: &str) -> ApiResult<()> {
        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(ApiError::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            })
        }
    }
}

fn is_svg(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .is_ok_and(|mime| mime.essence_str() == mime::IMAGE_SVG.essence_str())
}

#[async_trait]
impl DeckApi for DeckClient {
    async fn fetch_info(&self) -> ApiResult<DeviceInfo> {
        let url = self.info_url();
        let response = self.http.get(&url).send().await?;
        Self::check_status(&response, &url)?;

        let value: Value = response.json().await?;
        Ok(parse_info(&value)?)
    }

    async fn fetch_icon(&self, uuid: &str) -> ApiResult<String> {
        let url = self.icon_url(uuid);
        let response = self.http.get(&url).send().await?;
        Self::check_status(&response, &url)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_svg(&content_type) {
            return Err(ApiError::ContentType { content_type, url });
        }

        Ok(response.text().await?)
    }

    async fn push_icon(&self, uuid: &str, svg: &str) -> ApiResult<()> {
        let url = self.icon_url(uuid);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, mime::IMAGE_SVG.as_ref())
            .body(svg.to_string())
            .send()
            .await?;
        Self::check_status(&response, &url)
    }

    async fn connect(&self) -> ApiResult<Box<dyn FrameStream>> {
        let (socket, _response) = connect_async(self.websocket_url()).await?;
        Ok(Box::new(DeckWs { socket }))
    }
}

pub struct DeckWs {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for DeckWs {
    async fn next_frame(&mut self) -> ApiResult<Option<String>> {
        while let Some(msg) = self.socket.next().await {
            match msg? {
                Message::Text(text) => return Ok(Some(text.as_str().to_string())),
                Message::Close(_) => return Ok(None),
                other => log::trace!("Ignoring non-text websocket frame: {other:?}"),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if let Err(err) = self.socket.close(None).await {
            log::debug!("Error closing Stream Deck websocket: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    use crate::deck::DeckApi;
    use crate::deck::client::{DeckClient, is_svg};
    use crate::error::ApiError;

    const INFO: &str = r#"{
        "application": {"font": "", "language": "en", "platform": "windows", "platformVersion": "10", "version": "6.4.0"},
        "devices": [{"id": "D1", "name": "Deck", "type": 0, "size": {"columns": 5, "rows": 3}}],
        "buttons": {
            "aaaa-bbbb-cccc": {"uuid": "aaaa-bbbb-cccc", "device": "D1", "position": {"x": 0, "y": 0}, "svg": ""}
        }
    }"#;

    /// Read one request (headers plus `content-length` body) off `socket`.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve a single canned response on a local port. The receiver yields
    /// the raw request that was answered.
    async fn serve_once(
        status: &str,
        content_type: &str,
        body: &str,
    ) -> (DeckClient, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(request);
        });

        (DeckClient::new("127.0.0.1", port).unwrap(), rx)
    }

    #[test]
    fn endpoint_urls() {
        let client = DeckClient::new("10.0.0.5", 6153).unwrap();

        assert_eq!(client.info_url(), "http://10.0.0.5:6153/sd/info");
        assert_eq!(client.icon_url("a-b-c"), "http://10.0.0.5:6153/sd/icon/a-b-c");
        assert_eq!(client.websocket_url(), "ws://10.0.0.5:6153");
    }

    #[test]
    fn svg_content_type() {
        assert!(is_svg("image/svg+xml"));
        assert!(is_svg("image/svg+xml; charset=utf-8"));
        assert!(!is_svg("text/html"));
        assert!(!is_svg(""));
    }

    #[tokio::test]
    async fn fetch_info_decodes() {
        let (client, request) = serve_once("200 OK", "application/json", INFO).await;

        let info = client.fetch_info().await.unwrap();
        assert_eq!(info.button_uuids().collect::<Vec<_>>(), vec!["aaaa-bbbb-cccc"]);
        assert!(request.await.unwrap().starts_with("GET /sd/info "));
    }

    #[tokio::test]
    async fn fetch_info_rejects_bad_status() {
        let (client, _request) = serve_once("404 Not Found", "application/json", INFO).await;

        let err = client.fetch_info().await.unwrap_err();
        assert!(
            matches!(err, ApiError::HttpStatus { status, .. } if status == StatusCode::NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn fetch_info_rejects_non_json() {
        let (client, _request) = serve_once("200 OK", "text/html", "<html></html>").await;

        let err = client.fetch_info().await.unwrap_err();
        assert!(matches!(err, ApiError::ReqwestError(_)));
    }

    #[tokio::test]
    async fn fetch_info_rejects_wrong_shape() {
        let (client, _request) =
            serve_once("200 OK", "application/json", r#"{"application": 1}"#).await;

        let err = client.fetch_info().await.unwrap_err();
        assert!(matches!(err, ApiError::DecodeError(_)));
    }

    #[tokio::test]
    async fn fetch_icon_requires_svg() {
        let (client, _request) = serve_once("200 OK", "text/html", "<svg/>").await;
        let err = client.fetch_icon("a-b-c").await.unwrap_err();
        assert!(matches!(err, ApiError::ContentType { content_type, .. } if content_type == "text/html"));

        let (client, request) = serve_once("200 OK", "image/svg+xml", "<svg/>").await;
        assert_eq!(client.fetch_icon("a-b-c").await.unwrap(), "<svg/>");
        assert!(request.await.unwrap().starts_with("GET /sd/icon/a-b-c "));
    }

    #[tokio::test]
    async fn push_icon_posts_svg() {
        let (client, request) = serve_once("200 OK", "text/plain", "").await;
        client.push_icon("a-b-c", "<svg>x</svg>").await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /sd/icon/a-b-c "));
        assert!(request.to_ascii_lowercase().contains("content-type: image/svg+xml"));
        assert!(request.ends_with("<svg>x</svg>"));
    }

    #[tokio::test]
    async fn push_icon_reports_rejection() {
        let (client, _request) = serve_once("500 Internal Server Error", "text/plain", "").await;

        let err = client.push_icon("a-b-c", "<svg/>").await.unwrap_err();
        assert!(
            matches!(err, ApiError::HttpStatus { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR)
        );
    }
}
