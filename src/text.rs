//! Monospace-agnostic text layout for bitmap fonts.
//!
//! Word wrap happens at spaces: before emitting the next word, its width is measured and, if it
//! would cross the wrap width, the pen moves to a new line and the space is dropped.

use glam::Vec2;

use crate::draw::{Rect, TextStyle};

pub trait GlyphMetrics {
    /// Native glyph height in atlas pixels.
    fn base_size(&self) -> f32;
    /// Unscaled advance of `ch`; zero for glyphs the font cannot draw.
    fn glyph_width(&self, ch: char) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedGlyph {
    pub ch: char,
    /// Top-left corner relative to the layout origin.
    pub offset: Vec2,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayout {
    pub glyphs: Vec<PlacedGlyph>,
    pub size: Vec2,
}

fn font_size(metrics: &impl GlyphMetrics, style: &TextStyle) -> f32 {
    metrics.base_size() * style.scale
}

fn advance(metrics: &impl GlyphMetrics, style: &TextStyle, ch: char) -> f32 {
    metrics.glyph_width(ch) * style.scale + style.spacing
}

fn next_word_width(metrics: &impl GlyphMetrics, style: &TextStyle, rest: &str) -> f32 {
    rest.chars().take_while(|ch| *ch > ' ').map(|ch| advance(metrics, style, ch)).sum()
}

/// Lays out `text`; `wrap_width <= 0` disables wrapping.
pub fn layout(metrics: &impl GlyphMetrics, text: &str, style: &TextStyle, wrap_width: f32) -> TextLayout {
    let font_size = font_size(metrics, style);
    let line_advance = font_size + style.line_spacing;
    let mut pen = Vec2::ZERO;
    let mut widest: f32 = 0.0;
    let mut glyphs = Vec::with_capacity(text.len());

    for (index, ch) in text.char_indices() {
        if ch == '\n' {
            widest = widest.max(pen.x);
            pen = Vec2::new(0.0, pen.y + line_advance);
            continue;
        }
        if ch == ' ' || ch == '\t' {
            let rest = &text[index + ch.len_utf8()..];
            if wrap_width > 0.0 && pen.x + next_word_width(metrics, style, rest) > wrap_width {
                widest = widest.max(pen.x);
                pen = Vec2::new(0.0, pen.y + line_advance);
                continue;
            }
            pen.x += advance(metrics, style, ch);
            continue;
        }
        glyphs.push(PlacedGlyph { ch, offset: pen });
        pen.x += advance(metrics, style, ch);
    }
    widest = widest.max(pen.x);

    TextLayout { glyphs, size: Vec2::new(widest, pen.y + font_size) }
}

/// Lays out `text` inside `bounds` and shifts it by `align` (0 = start, 0.5 = centre, 1 = end) of
/// the free space on each axis. Returned glyph offsets are absolute.
pub fn layout_in_rect(
    metrics: &impl GlyphMetrics,
    text: &str,
    bounds: Rect,
    align: Vec2,
    style: &TextStyle,
) -> TextLayout {
    let mut laid_out = layout(metrics, text, style, bounds.width);
    let free = Vec2::new(bounds.width, bounds.height) - laid_out.size;
    let origin = (bounds.top_left() + free * align).floor();
    for glyph in &mut laid_out.glyphs {
        glyph.offset += origin;
    }
    laid_out
}
