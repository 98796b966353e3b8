use camino::Utf8Path;
use config::{Config, ConfigError};

pub use streamdeck_api::config::*;

pub fn parse(filename: &Utf8Path) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .set_default("bridge.bindings_file", "bindings.yaml")?
        .set_default("hass.url", "http://127.0.0.1:8123")?
        .set_default("hass.token_env", "HASS_TOKEN")?
        .add_source(config::File::with_name(filename.as_str()))
        .build()?;

    settings.try_deserialize()
}
