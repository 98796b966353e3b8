use std::fmt::{self, Display};

pub const SELECT_OPTION_UP: &str = ">>UP<<";
pub const SELECT_OPTION_DOWN: &str = ">>DOWN<<";
pub const SELECT_OPTION_CLEAR: &str = ">>CLEAR<<";

pub const SELECT_DEFAULT_OPTIONS: &[&str] = &[
    "",
    SELECT_OPTION_UP,
    SELECT_OPTION_DOWN,
    SELECT_OPTION_CLEAR,
];

pub const TOGGLEABLE_PLATFORMS: &[&str] = &[
    "cover",
    "fan",
    "humidifier",
    "input_boolean",
    "light",
    "media_player",
    "remote",
    "siren",
    "switch",
    "vacuum",
];

pub const UP_DOWN_PLATFORMS: &[&str] = &["light"];
pub const UP_DOWN_STEPS: i64 = 15;
pub const BRIGHTNESS_MAX: i64 = 255;

pub const MDI_PREFIX: &str = "mdi:";
pub const MDI_DEFAULT: &str = "mdi:help";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[must_use]
    pub const fn step(self) -> i64 {
        match self {
            Self::Up => UP_DOWN_STEPS,
            Self::Down => -UP_DOWN_STEPS,
        }
    }
}

/// What a stored binding string means.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Clear,
    Adjust(Direction),
    Entity(String),
}

impl Binding {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "" => Self::Unbound,
            SELECT_OPTION_CLEAR => Self::Clear,
            SELECT_OPTION_UP => Self::Adjust(Direction::Up),
            SELECT_OPTION_DOWN => Self::Adjust(Direction::Down),
            entity => Self::Entity(entity.to_string()),
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::Entity(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unbound => "",
            Self::Clear => SELECT_OPTION_CLEAR,
            Self::Adjust(Direction::Up) => SELECT_OPTION_UP,
            Self::Adjust(Direction::Down) => SELECT_OPTION_DOWN,
            Self::Entity(id) => id,
        }
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map_or("", |(domain, _)| domain)
}

#[must_use]
pub fn is_toggleable(domain: &str) -> bool {
    TOGGLEABLE_PLATFORMS.contains(&domain)
}

#[must_use]
pub fn supports_up_down(domain: &str) -> bool {
    UP_DOWN_PLATFORMS.contains(&domain)
}

#[must_use]
pub fn default_icon(domain: &str) -> &'static str {
    match domain {
        "cover" => "mdi:window-closed",
        "fan" => "mdi:fan",
        "humidifier" => "mdi:air-humidifier",
        "input_boolean" => "mdi:toggle-switch-off-outline",
        "light" => "mdi:lightbulb",
        "media_player" => "mdi:cast",
        "remote" => "mdi:remote",
        "siren" => "mdi:bullhorn",
        "switch" => "mdi:toggle-switch-variant",
        "vacuum" => "mdi:vacuum",
        _ => MDI_DEFAULT,
    }
}

/// Lowercase `name`, collapsing every run of non-alphanumerics into `_`.
#[must_use]
pub fn unique_id(name: &str) -> String {
    let mut res = String::with_capacity(name.len());
    let mut in_gap = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            res.push(ch.to_ascii_lowercase());
            in_gap = false;
        } else if !in_gap {
            res.push('_');
            in_gap = true;
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use crate::model::binding::{
        Binding, Direction, default_icon, domain_of, is_toggleable, supports_up_down, unique_id,
    };

    #[test]
    fn sentinels_are_not_entities() {
        assert_eq!(Binding::parse(""), Binding::Unbound);
        assert_eq!(Binding::parse(">>CLEAR<<"), Binding::Clear);
        assert_eq!(Binding::parse(">>UP<<"), Binding::Adjust(Direction::Up));
        assert_eq!(Binding::parse(">>DOWN<<"), Binding::Adjust(Direction::Down));
        assert_eq!(Binding::parse(">>DOWN<<").entity_id(), None);
        assert_eq!(
            Binding::parse("light.kitchen").entity_id(),
            Some("light.kitchen")
        );
    }

    #[test]
    fn binding_string_roundtrip() {
        for raw in ["", ">>UP<<", ">>DOWN<<", ">>CLEAR<<", "switch.fan"] {
            assert_eq!(Binding::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn domains() {
        assert_eq!(domain_of("light.kitchen"), "light");
        assert_eq!(domain_of("garbage"), "");
        assert!(is_toggleable("switch"));
        assert!(!is_toggleable("sensor"));
        assert!(supports_up_down("light"));
        assert!(!supports_up_down("switch"));
        assert_eq!(default_icon("fan"), "mdi:fan");
        assert_eq!(default_icon("sensor"), "mdi:help");
    }

    #[test]
    fn unique_ids() {
        assert_eq!(unique_id("Office Deck 1a2b-3c4d"), "office_deck_1a2b_3c4d");
        assert_eq!(unique_id("A -- B"), "a_b");
    }
}
