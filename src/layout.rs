use crate::font::FontBook;
use crate::geometry::{
    BoundingBox, LineSpan, Orientation, Point, TextMeasure, copy_button_position, hit_test_rotated,
    rotate_about, wrap_spans,
};
use crate::region::{TextAlign, TextRegion};

pub const ROTATION_HANDLE_RADIUS: f32 = 8.0;
pub const COPY_BUTTON_RADIUS: f32 = 18.0;
pub const COPY_BUTTON_SPACING: f32 = 2.4;

/// Horizontal slack added around the widest line.
const FRAME_SLACK: f32 = 10.0;
const TEXT_INSET: f32 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LaidLine {
    pub text: String,
    /// Character offset of the first character in the region text.
    pub start: usize,
    /// Left edge of the line (horizontal) or column (vertical), unrotated.
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

/// Resolved placement of one region in its own unrotated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionLayout {
    pub font_size: f32,
    pub line_height: f32,
    pub orientation: Orientation,
    pub lines: Vec<LaidLine>,
    /// Background/border/selection rectangle.
    pub frame: BoundingBox,
    pub center: Point,
    pub rotation: f32,
}

impl RegionLayout {
    pub fn contains(&self, point: Point) -> bool {
        hit_test_rotated(point, &self.frame, self.rotation)
    }

    pub fn to_world(&self, local: Point) -> Point {
        rotate_about(local, self.center, self.rotation)
    }

    pub fn rotation_handle(&self) -> Point {
        self.to_world(Point::new(self.frame.x0, self.frame.y0))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.text.trim().is_empty())
    }
}

pub fn layout_region(region: &TextRegion, fonts: &FontBook) -> RegionLayout {
    let style = &region.style;
    let font_size = style.font_size_px.max(1.0);
    let line_height = style.line_height();
    let measure = fonts.measure(&style.font_family);
    match region.orientation {
        Orientation::Horizontal => layout_horizontal(region, &measure, font_size, line_height),
        Orientation::Vertical => layout_vertical(region, font_size, line_height),
    }
}

fn layout_horizontal<M: TextMeasure + ?Sized>(
    region: &TextRegion,
    measure: &M,
    font_size: f32,
    line_height: f32,
) -> RegionLayout {
    let style = &region.style;
    let bbox = region.bounding_box;
    let center = bbox.center();
    let padding = style.padding_px.max(0.0);
    let stroke = style.stroke_width_px.max(0.0);

    let inner_width = (bbox.width() - 2.0 * padding - stroke).max(1.0);
    let chars: Vec<char> = region.text.chars().collect();
    let spans = wrap_spans(measure, &chars, font_size, inner_width);
    let measured: Vec<(LineSpan, String, f32)> = spans
        .into_iter()
        .map(|span| {
            let text: String = chars[span.start..span.end].iter().collect();
            let width = measure.text_width(&text, font_size);
            (span, text, width)
        })
        .collect();
    let max_line = measured.iter().map(|(_, _, w)| *w).fold(0.0, f32::max);
    let count = measured.len().max(1) as f32;

    let frame_width = bbox
        .width()
        .max(max_line + FRAME_SLACK + 2.0 * padding + stroke);
    let content_height =
        line_height * count + stroke + 2.0 * padding + FRAME_SLACK - font_size / 3.0;
    let frame_height = bbox.height().max(content_height);
    let frame = BoundingBox::from_center(center, frame_width, frame_height);

    let block_top = center.y - line_height * count * 0.5;
    let lines = measured
        .into_iter()
        .enumerate()
        .map(|(idx, (span, text, width))| {
            let x = match style.text_align {
                TextAlign::Left => frame.x0 + padding + stroke * 0.5 + TEXT_INSET,
                TextAlign::Center => center.x - width * 0.5,
                TextAlign::Right => frame.x1 - padding - stroke * 0.5 - TEXT_INSET - width,
            };
            LaidLine {
                text,
                start: span.start,
                x,
                y: block_top + idx as f32 * line_height,
                width,
            }
        })
        .collect();

    RegionLayout {
        font_size,
        line_height,
        orientation: Orientation::Horizontal,
        lines,
        frame,
        center,
        rotation: region.rotation_radians,
    }
}

/// Glyph-stacked columns, read right to left. Each paragraph starts a new
/// column and long paragraphs continue in the next column.
fn layout_vertical(region: &TextRegion, font_size: f32, line_height: f32) -> RegionLayout {
    let style = &region.style;
    let bbox = region.bounding_box;
    let center = bbox.center();
    let padding = style.padding_px.max(0.0);
    let stroke = style.stroke_width_px.max(0.0);
    let inner_height = (bbox.height() - 2.0 * padding - stroke).max(line_height);
    let per_column = ((inner_height / line_height).floor() as usize).max(1);

    let chars: Vec<char> = region.text.chars().collect();
    let mut columns: Vec<LineSpan> = Vec::new();
    let mut start = 0usize;
    for idx in 0..=chars.len() {
        if idx == chars.len() || chars[idx] == '\n' {
            let mut cursor = start;
            loop {
                let end = (cursor + per_column).min(idx);
                columns.push(LineSpan { start: cursor, end });
                cursor = end;
                if cursor >= idx {
                    break;
                }
            }
            start = idx + 1;
        }
    }

    let tallest = columns
        .iter()
        .map(|span| span.end - span.start)
        .max()
        .unwrap_or(0)
        .max(1) as f32;
    let count = columns.len().max(1) as f32;
    let block_width = line_height * count;
    let block_height = line_height * tallest;
    let frame = BoundingBox::from_center(
        center,
        bbox.width()
            .max(block_width + FRAME_SLACK + 2.0 * padding + stroke),
        bbox.height()
            .max(block_height + FRAME_SLACK + 2.0 * padding + stroke),
    );

    let right = center.x + block_width * 0.5;
    let top = center.y - block_height * 0.5;
    let lines = columns
        .into_iter()
        .enumerate()
        .map(|(idx, span)| LaidLine {
            text: chars[span.start..span.end].iter().collect(),
            start: span.start,
            x: right - line_height * (idx as f32 + 1.0),
            y: top,
            width: line_height,
        })
        .collect();

    RegionLayout {
        font_size,
        line_height,
        orientation: Orientation::Vertical,
        lines,
        frame,
        center,
        rotation: region.rotation_radians,
    }
}

/// True when `(px, py)` falls inside the region's padded frame after undoing
/// its rotation.
pub fn hit_test_rotated_region(px: f32, py: f32, region: &TextRegion, fonts: &FontBook) -> bool {
    layout_region(region, fonts).contains(Point::new(px, py))
}

/// Hebrew, Arabic, Syriac, Thaana and NKo letters, plus the Arabic
/// presentation forms.
fn is_rtl_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x0590..=0x07FF | 0x08A0..=0x08FF | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF
    )
}

/// Region text containing any right-to-left letter is drawn right to left.
pub fn is_rtl(text: &str) -> bool {
    text.chars().any(is_rtl_char)
}

/// Left-to-right drawing order of a line read right to left. Right-to-left
/// runs and the spaces between them are mirrored, other runs keep their
/// order, and the runs are drawn from last to first.
pub fn visual_order(line: &str) -> String {
    let mut runs: Vec<(bool, String)> = Vec::new();
    for ch in line.chars() {
        let rtl = is_rtl_char(ch) || ch.is_whitespace();
        match runs.last_mut() {
            Some((run_rtl, run)) if *run_rtl == rtl => run.push(ch),
            _ => runs.push((rtl, ch.to_string())),
        }
    }
    runs.into_iter()
        .rev()
        .map(|(rtl, run)| if rtl { run.chars().rev().collect() } else { run })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    Original,
    Translated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopyButton {
    pub kind: CopyKind,
    pub center: Point,
    pub radius: f32,
}

impl CopyButton {
    pub fn contains(&self, point: Point) -> bool {
        self.center.distance_sq(point) <= self.radius * self.radius
    }
}

/// Copy buttons shown next to the active region, original first.
pub fn copy_buttons(
    region: &TextRegion,
    layout: &RegionLayout,
    canvas_width: f32,
    canvas_height: f32,
) -> Vec<CopyButton> {
    let radius = COPY_BUTTON_RADIUS;
    let has_original = region
        .original_text
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty());
    let has_text = !region.text.trim().is_empty();

    let mut buttons = Vec::new();
    if has_original {
        buttons.push(CopyButton {
            kind: CopyKind::Original,
            center: copy_button_position(&layout.frame, radius, canvas_width, canvas_height, 0.0),
            radius,
        });
    }
    if has_text {
        let offset = if has_original {
            radius * COPY_BUTTON_SPACING
        } else {
            0.0
        };
        buttons.push(CopyButton {
            kind: CopyKind::Translated,
            center: copy_button_position(
                &layout.frame,
                radius,
                canvas_width,
                canvas_height,
                offset,
            ),
            radius,
        });
    }
    buttons
}
