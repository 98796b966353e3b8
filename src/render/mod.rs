//! Button icon composition.
//!
//! Everything here is pure: the same binding, entity state and glyph source
//! always produce the same SVG document.

pub mod glyph;

use std::fmt::Write;

use quick_xml::escape::escape;

use crate::host::{EntityState, STATE_OFF, STATE_ON};
use crate::model::binding::{Binding, Direction, default_icon};
use crate::render::glyph::{GlyphSource, resolve};

const SVG_OPEN: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 72 72">"#;
const SVG_CLOSE: &str = "</svg>";

const COLOR_ON: &str = "#0e0";
const COLOR_OFF: &str = "#e00";
const COLOR_NEUTRAL: &str = "#000";
const COLOR_TEXT: &str = "#fff";
const COLOR_UNBOUND: &str = "#a00";
const COLOR_ADJUST: &str = "#333";

const MARKER_OPACITY: &str = "0.25";
const GLYPH_TRANSFORM: &str = "translate(16, 12) scale(0.5)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Icon(String),
    /// The bound entity has no state. The device keeps what it shows.
    Skip,
}

impl RenderOutcome {
    #[must_use]
    pub fn into_svg(self) -> Option<String> {
        match self {
            Self::Icon(svg) => Some(svg),
            Self::Skip => None,
        }
    }
}

fn background(svg: &mut String, color: &str) {
    let _ = write!(svg, r#"<rect width="72" height="72" fill="{color}" />"#);
}

fn text(svg: &mut String, y: u32, size: u32, content: &str) {
    let _ = write!(
        svg,
        r#"<text text-anchor="middle" x="35" y="{y}" fill="{COLOR_TEXT}" font-size="{size}">{}</text>"#,
        escape(content)
    );
}

fn glyph(svg: &mut String, fragment: &str) {
    let _ = write!(svg, r#"<g transform="{GLYPH_TRANSFORM}">{fragment}</g>"#);
}

/// Red tile with the first three `-` separated segments of the uuid.
#[must_use]
pub fn placeholder(uuid: &str) -> String {
    let mut svg = String::from(SVG_OPEN);
    background(&mut svg, COLOR_UNBOUND);
    for (segment, y) in uuid.split('-').zip([20, 40, 60]) {
        text(&mut svg, y, 13, segment);
    }
    svg.push_str(SVG_CLOSE);
    svg
}

#[must_use]
pub fn adjust_icon(direction: Direction, glyphs: &dyn GlyphSource) -> String {
    let icon = match direction {
        Direction::Up => "plus",
        Direction::Down => "minus",
    };

    let mut svg = String::from(SVG_OPEN);
    background(&mut svg, COLOR_ADJUST);
    glyph(&mut svg, &resolve(glyphs, icon, COLOR_TEXT));
    svg.push_str(SVG_CLOSE);
    svg
}

/// On/off color for a state value, `None` for anything else.
fn state_color(state: &str) -> Option<&'static str> {
    match state {
        STATE_ON => Some(COLOR_ON),
        STATE_OFF => Some(COLOR_OFF),
        _ => None,
    }
}

#[must_use]
pub fn entity_icon(state: &EntityState, glyphs: &dyn GlyphSource) -> String {
    let marker = state_color(&state.state);
    let icon = state
        .icon()
        .unwrap_or_else(|| default_icon(state.domain()));

    let mut svg = String::from(SVG_OPEN);
    background(&mut svg, COLOR_NEUTRAL);
    if let Some(color) = marker {
        let _ = write!(
            svg,
            r#"<rect width="72" height="72" fill="{color}" fill-opacity="{MARKER_OPACITY}" />"#
        );
    }
    text(&mut svg, 15, 12, &format!("{}{}", state.state, state.unit()));
    text(&mut svg, 65, 12, state.name());
    glyph(&mut svg, &resolve(glyphs, icon, marker.unwrap_or(COLOR_TEXT)));
    svg.push_str(SVG_CLOSE);
    svg
}

/// Compose the icon for button `uuid`.
///
/// `state` is the current state of the bound entity and is only consulted
/// for entity bindings.
#[must_use]
pub fn render(
    uuid: &str,
    binding: Option<&Binding>,
    state: Option<&EntityState>,
    glyphs: &dyn GlyphSource,
) -> RenderOutcome {
    match binding {
        None | Some(Binding::Unbound | Binding::Clear) => RenderOutcome::Icon(placeholder(uuid)),
        Some(Binding::Adjust(direction)) => RenderOutcome::Icon(adjust_icon(*direction, glyphs)),
        Some(Binding::Entity(_)) => match state {
            Some(state) => RenderOutcome::Icon(entity_icon(state, glyphs)),
            None => RenderOutcome::Skip,
        },
    }
}
