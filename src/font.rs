use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{PathBuilder, Rect};
use tracing::{debug, warn};
use ttf_parser::{Face, OutlineBuilder, name_id};
use usvg::fontdb;

use crate::geometry::TextMeasure;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.face_index).ok()
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Family-keyed font registry used for measuring and outlining text.
///
/// Lookups that miss fall back to the first loaded face, and with no faces at
/// all every glyph is measured by script estimate and drawn as a solid block.
#[derive(Debug, Clone, Default)]
pub struct FontBook {
    faces: HashMap<String, FontMetrics>,
    fallback: Option<FontMetrics>,
}

impl FontBook {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads `font_path` when given, then each family from the system database.
    /// Missing fonts are logged and skipped.
    pub fn load(font_path: Option<&Path>, families: &[&str]) -> Self {
        let mut book = Self::empty();
        if let Some(path) = font_path {
            match load_font_metrics(path) {
                Ok(metrics) => book.insert(metrics),
                Err(err) => warn!("font file skipped: {err:#}"),
            }
        }

        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        for family in families {
            if book.faces.contains_key(&family_key(family)) {
                continue;
            }
            match load_font_metrics_from_family(&db, family) {
                Ok(metrics) => {
                    debug!("font resolved: {family}");
                    book.faces.insert(family_key(family), metrics.clone());
                    if book.fallback.is_none() {
                        book.fallback = Some(metrics);
                    }
                }
                Err(err) => debug!("font not available: {err:#}"),
            }
        }
        if book.fallback.is_none()
            && let Ok(metrics) = load_font_metrics_from_family(&db, "sans-serif")
        {
            book.fallback = Some(metrics);
        }
        book
    }

    pub fn insert(&mut self, metrics: FontMetrics) {
        if let Some(family) = metrics.family() {
            self.faces.insert(family_key(family), metrics.clone());
        }
        if self.fallback.is_none() {
            self.fallback = Some(metrics);
        }
    }

    pub fn resolve(&self, family: &str) -> Option<&FontMetrics> {
        self.faces
            .get(&family_key(family))
            .or(self.fallback.as_ref())
    }

    pub fn measure(&self, family: &str) -> FontMeasure<'_> {
        FontMeasure {
            font: self.resolve(family),
        }
    }

    /// Appends outlines for `text` with its top-left at (`x`, `top`).
    /// Returns the advance width.
    pub fn append_text_path(
        &self,
        family: &str,
        text: &str,
        font_size: f32,
        x: f32,
        top: f32,
        builder: &mut PathBuilder,
    ) -> f32 {
        let font = self.resolve(family);
        let mut pen = x;
        for ch in text.chars() {
            pen += append_glyph(font, ch, font_size, pen, top, builder);
        }
        pen - x
    }

    /// Appends one glyph horizontally centred in a cell of `cell_width`.
    pub fn append_centered_glyph(
        &self,
        family: &str,
        ch: char,
        font_size: f32,
        cell_x: f32,
        cell_width: f32,
        top: f32,
        builder: &mut PathBuilder,
    ) {
        let font = self.resolve(family);
        let advance = char_advance(font, ch, font_size);
        let x = cell_x + (cell_width - advance) * 0.5;
        append_glyph(font, ch, font_size, x, top, builder);
    }
}

#[derive(Clone, Copy)]
pub struct FontMeasure<'a> {
    font: Option<&'a FontMetrics>,
}

impl TextMeasure for FontMeasure<'_> {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        measure_text_width_px(text, font_size, self.font)
    }
}

fn family_key(family: &str) -> String {
    family.trim().to_ascii_lowercase()
}

pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font
        && let Some(face) = font.face()
    {
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            advance = advance.saturating_add(glyph_advance_units(font, &face, ch) as u32);
        }
        return advance as f32 * font.scale(font_size);
    }
    estimate_text_width_units(text) * font_size
}

fn glyph_advance_units(font: &FontMetrics, face: &Face<'_>, ch: char) -> u16 {
    if ch == ' ' {
        return font.space_advance;
    }
    face.glyph_index(ch)
        .and_then(|glyph| face.glyph_hor_advance(glyph))
        .unwrap_or(font.space_advance)
}

fn char_advance(font: Option<&FontMetrics>, ch: char, font_size: f32) -> f32 {
    let mut buf = [0u8; 4];
    measure_text_width_px(ch.encode_utf8(&mut buf), font_size, font)
}

fn append_glyph(
    font: Option<&FontMetrics>,
    ch: char,
    font_size: f32,
    x: f32,
    top: f32,
    builder: &mut PathBuilder,
) -> f32 {
    let advance = char_advance(font, ch, font_size);
    if ch.is_whitespace() {
        return advance;
    }
    if let Some(font) = font
        && let Some(face) = font.face()
        && let Some(glyph) = face.glyph_index(ch)
    {
        let scale = font.scale(font_size);
        let mut sink = GlyphSink {
            builder,
            scale,
            origin_x: x,
            baseline: top + font.ascender as f32 * scale,
        };
        face.outline_glyph(glyph, &mut sink);
        return advance;
    }
    push_tofu(builder, x, top, advance, font_size);
    advance
}

fn push_tofu(builder: &mut PathBuilder, x: f32, top: f32, advance: f32, font_size: f32) {
    if let Some(rect) = Rect::from_xywh(
        x + advance * 0.1,
        top + font_size * 0.15,
        (advance * 0.8).max(1.0),
        (font_size * 0.7).max(1.0),
    ) {
        builder.push_rect(rect);
    }
}

struct GlyphSink<'a> {
    builder: &'a mut PathBuilder,
    scale: f32,
    origin_x: f32,
    baseline: f32,
}

impl GlyphSink<'_> {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.baseline - y * self.scale)
    }
}

impl OutlineBuilder for GlyphSink<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7AF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units_for_width)
        .sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let metrics = FontMetrics {
                data: Arc::new(data.to_vec()),
                units_per_em,
                space_advance,
                ascender: face.ascender(),
                family: family.clone(),
                face_index: index,
            };
            if let (Some(preferred), Some(found)) = (preferred_family, &family)
                && found.eq_ignore_ascii_case(preferred)
            {
                return Ok(metrics);
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    load_font_metrics_from_data(&data, Some(family))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_book_estimates_by_script() {
        let book = FontBook::empty();
        let measure = book.measure("WildWords");
        let latin = measure.text_width("ab", 20.0);
        assert!((latin - 22.0).abs() < 1e-4);
        let cjk = measure.text_width("漢字", 20.0);
        assert!((cjk - 40.0).abs() < 1e-4);
        assert_eq!(measure.text_width("a\nb", 10.0), measure.text_width("ab", 10.0));
    }

    #[test]
    fn tofu_blocks_fill_inside_the_advance() {
        let book = FontBook::empty();
        let mut builder = PathBuilder::new();
        let advance = book.append_text_path("any", "A B", 20.0, 10.0, 5.0, &mut builder);
        assert!((advance - (0.55 + 0.25 + 0.55) * 20.0).abs() < 1e-4);
        let path = builder.finish().expect("tofu path");
        let bounds = path.bounds();
        assert!(bounds.left() >= 10.0);
        assert!(bounds.right() <= 10.0 + advance);
        assert!(bounds.top() >= 5.0);
        assert!(bounds.bottom() <= 25.0);
    }

    #[test]
    fn whitespace_only_text_adds_no_outline() {
        let book = FontBook::empty();
        let mut builder = PathBuilder::new();
        book.append_text_path("any", "   ", 20.0, 0.0, 0.0, &mut builder);
        assert!(builder.finish().is_none());
    }
}
