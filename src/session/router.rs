use serde_json::{Map, Value, json};

use streamdeck_api::{EventKind, WebSocketMessage};

use crate::error::ApiResult;
use crate::host::{STATE_OFF, STATE_ON};
use crate::model::binding::{
    BRIGHTNESS_MAX, Binding, Direction, domain_of, is_toggleable, supports_up_down, unique_id,
};
use crate::session::Session;

const EVENT_PREFIX: &str = "streamdeck";
const SERVICE_TOGGLE: &str = "toggle";
const SERVICE_TURN_ON: &str = "turn_on";
const ATTR_BRIGHTNESS: &str = "brightness";

impl Session {
    /// Handle one decoded websocket frame.
    ///
    /// The frame is republished on the host event bus before it is acted
    /// on, so a failed dispatch never hides it from automations.
    pub async fn dispatch(&self, msg: &WebSocketMessage) {
        self.republish(msg).await;

        let res = match &msg.event {
            EventKind::SingleTap => match self.button_of(msg) {
                Some(uuid) => self.on_press(uuid).await,
                None => Ok(()),
            },
            EventKind::LongPress => match self.button_of(msg) {
                Some(uuid) => self.on_long_press(uuid).await,
                None => Ok(()),
            },
            EventKind::KeyDown => match self.button_of(msg) {
                Some(uuid) => self.set_button_sensor(uuid, STATE_ON).await,
                None => Ok(()),
            },
            EventKind::KeyUp => match self.button_of(msg) {
                Some(uuid) => self.set_button_sensor(uuid, STATE_OFF).await,
                None => Ok(()),
            },
            EventKind::Status => {
                log::debug!("[{}] Status: {}", self.title, msg.args.to_value());
                self.set_reachable(true);
                Ok(())
            }
            EventKind::Unknown(tag) => {
                log::debug!("[{}] Unknown event from Stream Deck plugin: {tag}", self.title);
                Ok(())
            }
        };

        if let Err(err) = res {
            log::warn!("[{}] Failed to handle {} event: {err}", self.title, msg.event);
        }
    }

    async fn republish(&self, msg: &WebSocketMessage) {
        let event_type = format!("{EVENT_PREFIX}_{}", msg.event);
        let data = json!({
            "host": self.deck_host,
            "event_data": msg.args.to_value(),
        });

        if let Err(err) = self.host.events.fire_event(&event_type, data).await {
            log::warn!("[{}] Failed to publish {event_type}: {err}", self.title);
        }
    }

    fn button_of<'a>(&self, msg: &'a WebSocketMessage) -> Option<&'a str> {
        let uuid = msg.args.as_text();
        if uuid.is_none() {
            log::warn!("[{}] {} event without button uuid", self.title, msg.event);
        }
        uuid
    }

    async fn on_press(&self, uuid: &str) -> ApiResult<()> {
        match self.bindings.get(uuid).await {
            None => {
                log::info!("[{}] Press on unknown button {uuid}", self.title);
                Ok(())
            }
            Some(Binding::Unbound | Binding::Clear) => {
                log::info!("[{}] No entity bound to {uuid}", self.title);
                Ok(())
            }
            Some(Binding::Adjust(direction)) => self.adjust_last_pressed(direction).await,
            Some(Binding::Entity(entity_id)) => {
                self.set_last_pressed(&entity_id).await;
                self.toggle(&entity_id).await
            }
        }
    }

    async fn on_long_press(&self, uuid: &str) -> ApiResult<()> {
        match self.bindings.get(uuid).await {
            Some(Binding::Entity(entity_id)) => self.set_last_pressed(&entity_id).await,
            other => {
                log::debug!("[{}] Ignoring long press on {uuid} ({other:?})", self.title);
            }
        }
        Ok(())
    }

    async fn toggle(&self, entity_id: &str) -> ApiResult<()> {
        let Some(state) = self.host.states.get_state(entity_id).await? else {
            log::warn!("[{}] Entity {entity_id} has no state", self.title);
            return Ok(());
        };

        let domain = state.domain();
        if !is_toggleable(domain) {
            log::debug!("[{}] {entity_id} cannot be toggled", self.title);
            return Ok(());
        }

        self.host
            .commands
            .call_service(domain, SERVICE_TOGGLE, entity_id, Map::new())
            .await
    }

    /// Step the brightness of the last pressed entity.
    async fn adjust_last_pressed(&self, direction: Direction) -> ApiResult<()> {
        let Some(entity_id) = self.last_pressed().await else {
            log::info!("[{}] Nothing pressed yet to adjust", self.title);
            return Ok(());
        };

        let domain = domain_of(&entity_id);
        if !supports_up_down(domain) {
            log::debug!("[{}] {entity_id} does not support up/down", self.title);
            return Ok(());
        }

        let Some(state) = self.host.states.get_state(&entity_id).await? else {
            log::warn!("[{}] Entity {entity_id} has no state", self.title);
            return Ok(());
        };

        let brightness = (state.brightness() + direction.step()).clamp(0, BRIGHTNESS_MAX);
        let mut data = Map::new();
        data.insert(ATTR_BRIGHTNESS.to_string(), Value::from(brightness));

        self.host
            .commands
            .call_service(domain, SERVICE_TURN_ON, &entity_id, data)
            .await
    }

    /// Mirror key down/up onto the button's binary sensor, if it exists.
    async fn set_button_sensor(&self, uuid: &str, value: &str) -> ApiResult<()> {
        let entity_id = format!("binary_sensor.{}", unique_id(&format!("{} {uuid}", self.title)));

        let Some(current) = self.host.states.get_state(&entity_id).await? else {
            log::info!("[{}] No sensor {entity_id} for button {uuid}", self.title);
            return Ok(());
        };

        self.host
            .states
            .set_state(&entity_id, value, current.attributes)
            .await
    }
}
