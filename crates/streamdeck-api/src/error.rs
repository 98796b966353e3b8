use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Websocket message has no event tag")]
    MissingEvent,

    #[error("Unsupported websocket argument shape: {0}")]
    InvalidArgs(&'static str),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
