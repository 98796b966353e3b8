pub mod client;
pub mod supervisor;

use async_trait::async_trait;

use streamdeck_api::DeviceInfo;

use crate::error::ApiResult;

/// Request/response surface of the Stream Deck plugin.
#[async_trait]
pub trait DeckApi: Send + Sync {
    async fn fetch_info(&self) -> ApiResult<DeviceInfo>;

    async fn fetch_icon(&self, uuid: &str) -> ApiResult<String>;

    /// The plugin rejects pushes for buttons that are not on the visible
    /// page, so an error here is expected now and then.
    async fn push_icon(&self, uuid: &str, svg: &str) -> ApiResult<()>;

    async fn connect(&self) -> ApiResult<Box<dyn FrameStream>>;
}

/// An open websocket session with the plugin.
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame, or `Ok(None)` once the server closed the session.
    async fn next_frame(&mut self) -> ApiResult<Option<String>>;

    async fn close(&mut self);
}
