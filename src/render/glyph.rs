use crate::model::binding::{MDI_DEFAULT, MDI_PREFIX};

/// Turns an icon identifier into an embeddable SVG fragment.
pub trait GlyphSource: Send + Sync {
    /// `None` when `name` (without the `mdi:` prefix) is unknown.
    fn glyph(&self, name: &str, color: &str) -> Option<String>;
}

/// Strip the `mdi:` prefix, so both `mdi:fan` and `fan` resolve alike.
#[must_use]
pub fn icon_name(icon: &str) -> &str {
    icon.strip_prefix(MDI_PREFIX).unwrap_or(icon)
}

/// Resolve `icon`, falling back to the default glyph when `source` has no
/// match. The default glyph itself may be missing, which yields an empty
/// fragment.
pub fn resolve(source: &dyn GlyphSource, icon: &str, color: &str) -> String {
    source
        .glyph(icon_name(icon), color)
        .or_else(|| source.glyph(icon_name(MDI_DEFAULT), color))
        .unwrap_or_default()
}

/// Built-in subset of Material Design Icons (24x24 path data).
#[derive(Clone, Copy, Debug, Default)]
pub struct MdiGlyphs;

impl MdiGlyphs {
    /// Rendered size of a glyph before the button transform scales it.
    const SIZE: u32 = 80;

    fn path(name: &str) -> Option<&'static str> {
        let path = match name {
            "help" => {
                "M10,19H13V22H10V19M12,2C17.35,2.22 19.68,7.62 16.5,11.67C15.67,12.67 14.33,13.33 13.67,14.17C13,15 13,16 13,17H10C10,15.33 10,13.92 10.67,12.92C11.33,11.92 12.67,11.33 13.5,10.67C15.92,8.43 15.32,5.26 12,5A3,3 0 0,0 9,8H6A6,6 0 0,1 12,2Z"
            }
            "plus" => "M19,13H13V19H11V13H5V11H11V5H13V11H19V13Z",
            "minus" => "M19,13H5V11H19V13Z",
            "lightbulb" => {
                "M12,2A7,7 0 0,0 5,9C5,11.38 6.19,13.47 8,14.74V17A1,1 0 0,0 9,18H15A1,1 0 0,0 16,17V14.74C17.81,13.47 19,11.38 19,9A7,7 0 0,0 12,2M9,21A1,1 0 0,0 10,22H14A1,1 0 0,0 15,21V20H9V21Z"
            }
            "power" => {
                "M16.56,5.44L15.11,6.89C16.84,7.94 18,9.83 18,12A6,6 0 0,1 12,18A6,6 0 0,1 6,12C6,9.83 7.16,7.94 8.88,6.88L7.44,5.44C5.36,6.88 4,9.28 4,12A8,8 0 0,0 12,20A8,8 0 0,0 20,12C20,9.28 18.64,6.88 16.56,5.44M13,3H11V13H13"
            }
            "toggle-switch" | "toggle-switch-variant" => {
                "M17,7H7A5,5 0 0,0 2,12A5,5 0 0,0 7,17H17A5,5 0 0,0 22,12A5,5 0 0,0 17,7M17,15A3,3 0 0,1 14,12A3,3 0 0,1 17,9A3,3 0 0,1 20,12A3,3 0 0,1 17,15Z"
            }
            "toggle-switch-off" | "toggle-switch-off-outline" | "toggle-switch-variant-off" => {
                "M7,7A5,5 0 0,0 2,12A5,5 0 0,0 7,17H17A5,5 0 0,0 22,12A5,5 0 0,0 17,7H7M7,9A3,3 0 0,1 10,12A3,3 0 0,1 7,15A3,3 0 0,1 4,12A3,3 0 0,1 7,9Z"
            }
            "thermometer" => {
                "M15,13V5A3,3 0 0,0 9,5V13A5,5 0 1,0 15,13M12,4A1,1 0 0,1 13,5V8H11V5A1,1 0 0,1 12,4Z"
            }
            "window-closed" => {
                "M6,11H10V9H14V11H18V4H6V11M18,13H6V20H18V13M6,2H18A2,2 0 0,1 20,4V22H4V4A2,2 0 0,1 6,2Z"
            }
            "fan" => {
                "M12,11A1,1 0 0,0 11,12A1,1 0 0,0 12,13A1,1 0 0,0 13,12A1,1 0 0,0 12,11M12.5,2C17,2 17.11,5.57 14.75,6.75C13.76,7.24 13.32,8.29 13.13,9.22C13.61,9.42 14.03,9.73 14.35,10.13C18.05,8.13 22.03,8.92 22.03,12.5C22.03,17 18.46,17.1 17.28,14.73C16.78,13.74 15.72,13.3 14.79,13.11C14.59,13.59 14.28,14 13.88,14.34C15.87,18.03 15.08,22 11.5,22C7,22 6.91,18.42 9.27,17.24C10.25,16.75 10.69,15.71 10.89,14.79C10.4,14.59 9.97,14.27 9.65,13.87C5.96,15.85 2,15.07 2,11.5C2,7 5.56,6.89 6.74,9.26C7.24,10.25 8.29,10.68 9.22,10.87C9.41,10.39 9.73,9.97 10.14,9.65C8.15,5.96 8.94,2 12.5,2Z"
            }
            "air-humidifier" => {
                "M6,22A3,3 0 0,1 3,19C3,17 6,13.62 6,13.62C6,13.62 9,17 9,19A3,3 0 0,1 6,22M12,2H15V4H17V2H21V9.5C21,10.88 19.88,12 18.5,12H17V20A2,2 0 0,1 15,22H11V20H15V12H12V10H18.5A0.5,0.5 0 0,0 19,9.5V4H12V2M5,9.09C2.91,8.9 1.59,7.75 1.37,7.23C3.12,7.78 5.58,6.91 7,5.5L8.5,7C6.9,8.3 6.35,8.97 5,9.09Z"
            }
            "cast" => {
                "M1,10V12A9,9 0 0,1 10,21H12C12,14.92 7.07,10 1,10M1,14V16A5,5 0 0,1 6,21H8A7,7 0 0,0 1,14M1,18V21H4A3,3 0 0,0 1,18M21,3H3C1.89,3 1,3.89 1,5V8H3V5H21V19H14V21H21A2,2 0 0,0 23,19V5C23,3.89 22.1,3 21,3Z"
            }
            "remote" => {
                "M12,0C8.96,0 6.21,1.23 4.22,3.22L5.63,4.63C7.26,3 9.5,2 12,2C14.5,2 16.74,3 18.36,4.64L19.77,3.23C17.79,1.23 15.04,0 12,0M7.05,6.05L8.46,7.46C9.37,6.56 10.62,6 12,6C13.38,6 14.63,6.56 15.54,7.46L16.95,6.05C15.68,4.78 13.93,4 12,4C10.07,4 8.32,4.78 7.05,6.05M12,15A2,2 0 0,1 10,13A2,2 0 0,1 12,11A2,2 0 0,1 14,13A2,2 0 0,1 12,15M15,9H9A1,1 0 0,0 8,10V22A1,1 0 0,0 9,23H15A1,1 0 0,0 16,22V10A1,1 0 0,0 15,9Z"
            }
            "bullhorn" => {
                "M12,8H4A2,2 0 0,0 2,10V14A2,2 0 0,0 4,16H5V20A1,1 0 0,0 6,21H8A1,1 0 0,0 9,20V16H12L17,20V4L12,8M21.5,12C21.5,13.71 20.54,15.26 19,16V8C20.53,8.75 21.5,10.3 21.5,12Z"
            }
            "vacuum" => {
                "M12,2C14.65,2 17.19,3.06 19.07,4.93L17.65,6.35C16.15,4.85 14.12,4 12,4C9.88,4 7.84,4.84 6.35,6.35L4.93,4.93C6.81,3.06 9.35,2 12,2M3.66,6.5L5.11,7.94C4.39,9.17 4,10.57 4,12A8,8 0 0,0 12,20A8,8 0 0,0 20,12C20,10.57 19.61,9.17 18.88,7.94L20.34,6.5C21.42,8.12 22,10.04 22,12A10,10 0 0,1 12,22A10,10 0 0,1 2,12C2,10.04 2.58,8.12 3.66,6.5M12,6A6,6 0 0,1 18,12C18,13.59 17.37,15.12 16.24,16.24L14.83,14.83C14.08,15.58 13.06,16 12,16C10.94,16 9.92,15.58 9.17,14.83L7.76,16.24C6.63,15.12 6,13.59 6,12A6,6 0 0,1 12,6M12,8A1,1 0 0,0 11,9A1,1 0 0,0 12,10A1,1 0 0,0 13,9A1,1 0 0,0 12,8Z"
            }
            "play" => "M8,5.14V19.14L19,12.14L8,5.14Z",
            "pause" => "M14,19H18V5H14M6,19H10V5H6V19Z",
            "close" => {
                "M19,6.41L17.59,5L12,10.59L6.41,5L5,6.41L10.59,12L5,17.59L6.41,19L12,13.41L17.59,19L19,17.59L13.41,12L19,6.41Z"
            }
            "check" => "M21,7L9,19L3.5,13.5L4.91,12.09L9,16.17L19.59,5.59L21,7Z",
            _ => return None,
        };
        Some(path)
    }
}

impl GlyphSource for MdiGlyphs {
    fn glyph(&self, name: &str, color: &str) -> Option<String> {
        let path = Self::path(name)?;
        let size = Self::SIZE;
        Some(format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" width="{size}" height="{size}"><path fill="{color}" d="{path}"/></svg>"#
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::binding::{TOGGLEABLE_PLATFORMS, default_icon};
    use crate::render::glyph::{GlyphSource, MdiGlyphs, icon_name, resolve};

    #[test]
    fn strips_prefix() {
        assert_eq!(icon_name("mdi:lightbulb"), "lightbulb");
        assert_eq!(icon_name("lightbulb"), "lightbulb");
    }

    #[test]
    fn colors_path() {
        let glyph = MdiGlyphs.glyph("plus", "#fff").unwrap();
        assert!(glyph.contains(r##"fill="#fff""##));
        assert!(glyph.contains("M19,13H13V19H11V13H5V11H11V5H13V11H19V13Z"));
    }

    #[test]
    fn unknown_falls_back_to_help() {
        assert!(MdiGlyphs.glyph("no-such-icon", "#000").is_none());
        assert_eq!(
            resolve(&MdiGlyphs, "mdi:no-such-icon", "#0e0"),
            MdiGlyphs.glyph("help", "#0e0").unwrap()
        );
    }

    #[test]
    fn every_domain_default_is_built_in() {
        let missing: Vec<&str> = TOGGLEABLE_PLATFORMS
            .iter()
            .map(|domain| default_icon(domain))
            .filter(|icon| MdiGlyphs.glyph(icon_name(icon), "#fff").is_none())
            .collect();
        assert!(missing.is_empty(), "no glyph for {missing:?}");
    }
}
