pub mod config;
pub mod error;
pub mod info;
pub mod message;

pub use error::{DecodeError, DecodeResult};
pub use info::{Application, ButtonDescriptor, Device, DeviceInfo, GridSize, Position, parse_info};
pub use message::{EventKind, MessageArgs, WebSocketMessage, parse_message, parse_message_str};

/// Port the Stream Deck plugin listens on, for both HTTP and websocket.
pub const PLUGIN_PORT: u16 = 6153;
pub const PLUGIN_INFO: &str = "/sd/info";
pub const PLUGIN_ICON: &str = "/sd/icon";
