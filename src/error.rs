use reqwest::StatusCode;
use thiserror::Error;

use streamdeck_api::DecodeError;

#[derive(Error, Debug)]
pub enum ApiError {
    /* mapped errors */
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    SerdeYaml(#[from] serde_yml::Error),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    TungsteniteError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),

    #[error(transparent)]
    SetLoggerError(#[from] log::SetLoggerError),

    #[error(transparent)]
    DecodeError(#[from] DecodeError),

    /* stream deck errors */
    #[error("Unexpected response {status} from {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("Unexpected content type {content_type:?} from {url}")]
    ContentType { content_type: String, url: String },

    #[error("Stream Deck not available at {0}")]
    NotReady(String),

    #[error("Config entry {0} not found")]
    EntryNotFound(String),

    #[error("{0}")]
    ServiceError(String),
}

impl ApiError {
    pub fn service_error(msg: impl Into<String>) -> Self {
        Self::ServiceError(msg.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
