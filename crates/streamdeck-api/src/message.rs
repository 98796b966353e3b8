use std::fmt::{self, Display};

use serde_json::{Map, Value};

use crate::error::{DecodeError, DecodeResult};
use crate::info::{DeviceInfo, parse_info};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    SingleTap,
    LongPress,
    Status,
    KeyDown,
    KeyUp,
    Unknown(String),
}

impl EventKind {
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "singleTap" => Self::SingleTap,
            "longPress" => Self::LongPress,
            "status" => Self::Status,
            "keyDown" => Self::KeyDown,
            "keyUp" => Self::KeyUp,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SingleTap => "singleTap",
            Self::LongPress => "longPress",
            Self::Status => "status",
            Self::KeyDown => "keyDown",
            Self::KeyUp => "keyUp",
            Self::Unknown(tag) => tag,
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `args` member of a websocket frame.
///
/// The plugin reuses the same argument shapes across event tags, so the
/// variant is chosen from the JSON shape alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageArgs {
    Empty,
    Text(String),
    Info(Box<DeviceInfo>),
}

impl MessageArgs {
    pub fn decode(value: Option<&Value>) -> DecodeResult<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::Empty),
            Some(Value::Object(obj)) if obj.is_empty() => Ok(Self::Empty),
            Some(Value::String(text)) => Ok(Self::Text(text.clone())),
            Some(obj @ Value::Object(_)) => Ok(Self::Info(Box::new(parse_info(obj)?))),
            Some(Value::Array(_)) => Err(DecodeError::InvalidArgs("array")),
            Some(Value::Bool(_)) => Err(DecodeError::InvalidArgs("bool")),
            Some(Value::Number(_)) => Err(DecodeError::InvalidArgs("number")),
        }
    }

    /// Button uuid carried by press/release events.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Object(Map::new()),
            Self::Text(text) => Value::String(text.clone()),
            Self::Info(info) => info.to_value(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSocketMessage {
    pub event: EventKind,
    pub args: MessageArgs,
}

impl WebSocketMessage {
    #[must_use]
    pub fn new(event: EventKind, args: MessageArgs) -> Self {
        Self { event, args }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("event".to_string(), Value::String(self.event.to_string()));
        obj.insert("args".to_string(), self.args.to_value());
        Value::Object(obj)
    }
}

pub fn parse_message(value: &Value) -> DecodeResult<WebSocketMessage> {
    let event = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingEvent)?;

    Ok(WebSocketMessage {
        event: EventKind::from_tag(event),
        args: MessageArgs::decode(value.get("args"))?,
    })
}

pub fn parse_message_str(text: &str) -> DecodeResult<WebSocketMessage> {
    let value: Value = serde_json::from_str(text)?;
    parse_message(&value)
}
