use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeResult;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub font: String,
    pub language: String,
    pub platform: String,
    pub platform_version: String,
    pub version: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridSize {
    pub columns: u32,
    pub rows: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u32,
    pub size: GridSize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ButtonDescriptor {
    pub uuid: String,
    pub device: String,
    pub position: Position,
    /// Placeholder icon the plugin shows before anything is pushed.
    #[serde(default)]
    pub svg: String,
}

/// Snapshot returned by `GET /sd/info`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub application: Application,
    pub devices: Vec<Device>,
    pub buttons: BTreeMap<String, ButtonDescriptor>,
}

/// Decode an info payload. Fails when `application`, `devices` or `buttons`
/// (or any of their required members) are missing or mistyped.
pub fn parse_info(value: &Value) -> DecodeResult<DeviceInfo> {
    Ok(DeviceInfo::deserialize(value)?)
}

impl DeviceInfo {
    pub fn button_uuids(&self) -> impl Iterator<Item = &str> {
        self.buttons.keys().map(String::as_str)
    }

    #[must_use]
    pub fn button(&self, uuid: &str) -> Option<&ButtonDescriptor> {
        self.buttons.get(uuid)
    }

    /// Human readable model name, guessed from the grid of the first device.
    #[must_use]
    pub fn model(&self) -> &'static str {
        let Some(device) = self.devices.first() else {
            return "None";
        };
        match (device.size.columns, device.size.rows) {
            (3, 2) => "Stream Deck Mini",
            (5, 3) => "Stream Deck MK.2",
            (4, 2) => "Stream Deck +",
            (8, 4) => "Stream Deck XL",
            _ => "Unknown",
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        // plain structs with string keys always serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
