use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::PLUGIN_PORT;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct BridgeConfig {
    pub bindings_file: Utf8PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct HassServer {
    pub url: Url,
    pub token_env: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct DeckConfig {
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "DeckConfig::default_port")]
    pub port: u16,
    #[serde(default = "DeckConfig::default_platforms")]
    pub enabled_platforms: Vec<String>,
}

impl DeckConfig {
    const fn default_port() -> u16 {
        PLUGIN_PORT
    }

    fn default_platforms() -> Vec<String> {
        vec!["light".to_string()]
    }

    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            name: None,
            host: host.into(),
            port: Self::default_port(),
            enabled_platforms: Self::default_platforms(),
        }
    }

    /// Title of the config entry. Falls back to the entry id.
    #[must_use]
    pub fn title<'a>(&'a self, entry_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(entry_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub hass: HassServer,
    #[serde(default)]
    pub decks: BTreeMap<String, DeckConfig>,
}

impl AppConfig {
    #[must_use]
    pub fn has_decks(&self) -> bool {
        !self.decks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::{AppConfig, DeckConfig};

    #[test]
    fn deck_defaults() {
        let conf: AppConfig = serde_json::from_value(json!({
            "bridge": {"bindings_file": "bindings.yaml"},
            "hass": {"url": "http://127.0.0.1:8123", "token_env": null},
            "decks": {"office": {"host": "10.0.0.5"}}
        }))
        .unwrap();

        let deck = &conf.decks["office"];
        assert_eq!(deck, &DeckConfig::new("10.0.0.5"));
        assert_eq!(deck.port, 6153);
        assert_eq!(deck.enabled_platforms, vec!["light"]);
        assert_eq!(deck.title("office"), "office");
        assert!(conf.has_decks());
    }
}
