use serde::{Deserialize, Serialize};

/// Smallest extent a box may have along either axis.
pub const MIN_EXTENT: f32 = 1.0;

pub const VERTICAL_ASPECT_RATIO: f32 = 1.5;

pub const FIT_MULTIPLIER: f32 = 1.2;
pub const FIT_MIN_PX: f32 = 12.0;
pub const FIT_MAX_PX: f32 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: Point) -> f32 {
        self.distance_sq(other).sqrt()
    }
}

/// Axis-aligned box in image pixel space. Construction keeps `x1 > x0` and
/// `y1 > y0` by at least [`MIN_EXTENT`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (x0, x1) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (y0, y1) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self {
            x0,
            y0,
            x1: x1.max(x0 + MIN_EXTENT),
            y1: y1.max(y0 + MIN_EXTENT),
        }
    }

    pub fn from_center(center: Point, width: f32, height: f32) -> Self {
        let half_w = width.max(MIN_EXTENT) * 0.5;
        let half_h = height.max(MIN_EXTENT) * 0.5;
        Self::new(
            center.x - half_w,
            center.y - half_h,
            center.x + half_w,
            center.y + half_h,
        )
    }

    /// Bounding box of a detection polygon. Fewer than three vertices is not a
    /// polygon and yields `None`.
    pub fn from_polygon(points: &[Point]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let mut x0 = f32::MAX;
        let mut y0 = f32::MAX;
        let mut x1 = f32::MIN;
        let mut y1 = f32::MIN;
        for point in points {
            if !point.x.is_finite() || !point.y.is_finite() {
                return None;
            }
            x0 = x0.min(point.x);
            y0 = y0.min(point.y);
            x1 = x1.max(point.x);
            y1 = y1.max(point.y);
        }
        Some(Self::new(x0, y0, x1, y1))
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(MIN_EXTENT)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(MIN_EXTENT)
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn recentered(&self, center: Point) -> Self {
        let current = self.center();
        self.translated(center.x - current.x, center.y - current.y)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x0 && point.x <= self.x1 && point.y >= self.y0 && point.y <= self.y1
    }

    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        Self::new(
            self.x0.clamp(0.0, width),
            self.y0.clamp(0.0, height),
            self.x1.clamp(0.0, width),
            self.y1.clamp(0.0, height),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

pub fn classify_orientation(bbox: &BoundingBox) -> Orientation {
    if bbox.height() > bbox.width() * VERTICAL_ASPECT_RATIO {
        Orientation::Vertical
    } else {
        Orientation::Horizontal
    }
}

/// Splits one translated string over regions in proportion to the length of
/// their source text. Every word of `translated` lands in exactly one output
/// slot, in order.
pub fn distribute_translated_text(translated: &str, source_lengths: &[usize]) -> Vec<String> {
    let count = source_lengths.len();
    if count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![translated.to_string()];
    }

    let words: Vec<&str> = translated.split_whitespace().collect();
    let total: usize = source_lengths.iter().sum();
    let mut slots: Vec<Vec<&str>> = vec![Vec::new(); count];

    if total == 0 {
        let per_group = words.len().div_ceil(count).max(1);
        for (idx, chunk) in words.chunks(per_group).enumerate() {
            let slot = idx.min(count - 1);
            slots[slot].extend_from_slice(chunk);
        }
        return join_slots(slots);
    }

    let word_count = words.len();
    let mut cursor = 0usize;
    let mut last_filled: Option<usize> = None;
    for (idx, len) in source_lengths.iter().enumerate() {
        let share = (word_count as f64 * *len as f64 / total as f64).round() as usize;
        let end = (cursor + share).min(word_count);
        if end > cursor {
            slots[idx].extend_from_slice(&words[cursor..end]);
            last_filled = Some(idx);
        }
        cursor = end;
    }
    if cursor < word_count {
        let target = last_filled.unwrap_or(count - 1);
        slots[target].extend_from_slice(&words[cursor..]);
    }
    join_slots(slots)
}

fn join_slots(slots: Vec<Vec<&str>>) -> Vec<String> {
    slots.into_iter().map(|slot| slot.join(" ")).collect()
}

pub fn fit_font_size(text: &str, bbox: &BoundingBox) -> f32 {
    fit_font_size_with(text, bbox, FIT_MULTIPLIER, FIT_MIN_PX, FIT_MAX_PX)
}

/// Heuristic font size: the smaller of a per-character width budget and 80% of
/// the box height, scaled by `multiplier` and clamped to `[min, max]`.
pub fn fit_font_size_with(
    text: &str,
    bbox: &BoundingBox,
    multiplier: f32,
    min: f32,
    max: f32,
) -> f32 {
    let width = bbox.width().max(MIN_EXTENT);
    let height = bbox.height().max(MIN_EXTENT);
    let by_height = height * 0.8;
    let length = text.chars().count();
    let candidate = if length == 0 {
        by_height
    } else {
        (width / (length as f32 * 0.6)).min(by_height)
    };
    (candidate * multiplier).clamp(min, max.max(min))
}

/// Width of `text` rendered at `font_size`, in pixels.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f32;
}

/// A wrapped line as a character range `[start, end)` of the wrapped text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

/// Greedy word wrap. Embedded newlines always break; a single word wider than
/// `max_width` stays on its own overflowing line.
pub fn wrap_text<M: TextMeasure + ?Sized>(
    measure: &M,
    text: &str,
    font_size: f32,
    max_width: f32,
) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    wrap_spans(measure, &chars, font_size, max_width)
        .into_iter()
        .map(|span| chars[span.start..span.end].iter().collect())
        .collect()
}

pub fn wrap_spans<M: TextMeasure + ?Sized>(
    measure: &M,
    chars: &[char],
    font_size: f32,
    max_width: f32,
) -> Vec<LineSpan> {
    let mut spans = Vec::new();
    let mut paragraph_start = 0usize;
    for idx in 0..=chars.len() {
        if idx == chars.len() || chars[idx] == '\n' {
            wrap_paragraph(
                measure,
                chars,
                paragraph_start,
                idx,
                font_size,
                max_width,
                &mut spans,
            );
            paragraph_start = idx + 1;
        }
    }
    spans
}

fn wrap_paragraph<M: TextMeasure + ?Sized>(
    measure: &M,
    chars: &[char],
    start: usize,
    end: usize,
    font_size: f32,
    max_width: f32,
    spans: &mut Vec<LineSpan>,
) {
    let words = word_ranges(chars, start, end);
    if words.is_empty() {
        spans.push(LineSpan { start, end: start });
        return;
    }

    let mut line = LineSpan {
        start: words[0].0,
        end: words[0].1,
    };
    for &(word_start, word_end) in &words[1..] {
        let candidate: String = chars[line.start..word_end].iter().collect();
        if measure.text_width(&candidate, font_size) <= max_width {
            line.end = word_end;
        } else {
            spans.push(line);
            line = LineSpan {
                start: word_start,
                end: word_end,
            };
        }
    }
    spans.push(line);
}

fn word_ranges(chars: &[char], start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut words = Vec::new();
    let mut word_start: Option<usize> = None;
    for (idx, ch) in chars.iter().enumerate().take(end).skip(start) {
        if ch.is_whitespace() {
            if let Some(begin) = word_start.take() {
                words.push((begin, idx));
            }
        } else if word_start.is_none() {
            word_start = Some(idx);
        }
    }
    if let Some(begin) = word_start {
        words.push((begin, end));
    }
    words
}

/// Rotates `point` by `angle` radians about `pivot`.
pub fn rotate_about(point: Point, pivot: Point, angle: f32) -> Point {
    let (sin, cos) = angle.sin_cos();
    let dx = point.x - pivot.x;
    let dy = point.y - pivot.y;
    Point::new(
        pivot.x + dx * cos - dy * sin,
        pivot.y + dx * sin + dy * cos,
    )
}

/// Maps a world-space point into the unrotated frame of a box rotated by
/// `rotation` about `pivot`.
pub fn to_local(point: Point, pivot: Point, rotation: f32) -> Point {
    rotate_about(point, pivot, -rotation)
}

/// Hit test against `frame` rotated by `rotation` about the frame's centre.
pub fn hit_test_rotated(point: Point, frame: &BoundingBox, rotation: f32) -> bool {
    let local = to_local(point, frame.center(), rotation);
    frame.contains(local)
}

pub const COPY_BUTTON_MARGIN: f32 = 10.0;

/// Centre for a circular button next to `frame`, probing right, left, above,
/// then below, and finally clamping inside the canvas.
pub fn copy_button_position(
    frame: &BoundingBox,
    radius: f32,
    canvas_width: f32,
    canvas_height: f32,
    offset: f32,
) -> Point {
    let r = radius;
    let margin = COPY_BUTTON_MARGIN;

    let right_x = frame.x1 + r + margin;
    if right_x + r <= canvas_width {
        return Point::new(right_x, frame.y0 + offset + r / 2.0);
    }

    let left_x = frame.x0 - r - margin;
    if left_x - r >= 0.0 {
        return Point::new(left_x, frame.y0 + offset + r / 2.0);
    }

    let top_y = frame.y0 - r - margin;
    if top_y - r >= 0.0 {
        return Point::new(frame.x0 + offset + r / 2.0, top_y);
    }

    let bottom_y = frame.y1 + r + margin;
    if bottom_y + r <= canvas_height {
        return Point::new(frame.x0 + offset + r / 2.0, bottom_y);
    }

    Point::new(
        (frame.x0 + offset + r / 2.0).clamp(r, (canvas_width - r).max(r)),
        (frame.y0 + offset + r / 2.0).clamp(r, (canvas_height - r).max(r)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    struct MonoMeasure;

    impl TextMeasure for MonoMeasure {
        fn text_width(&self, text: &str, font_size: f32) -> f32 {
            text.chars().count() as f32 * font_size * 0.5
        }
    }

    #[test]
    fn vertical_only_when_strictly_taller_than_ratio() {
        let tall = BoundingBox::new(0.0, 0.0, 10.0, 16.0);
        let boundary = BoundingBox::new(0.0, 0.0, 10.0, 15.0);
        let wide = BoundingBox::new(0.0, 0.0, 40.0, 10.0);
        assert_eq!(classify_orientation(&tall), Orientation::Vertical);
        assert_eq!(classify_orientation(&boundary), Orientation::Horizontal);
        assert_eq!(classify_orientation(&wide), Orientation::Horizontal);
    }

    #[test]
    fn degenerate_boxes_keep_minimum_extent() {
        let flat = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        assert!(flat.x1 > flat.x0);
        assert!(flat.y1 > flat.y0);
        let swapped = BoundingBox::new(10.0, 8.0, 2.0, 1.0);
        assert_eq!(swapped.x0, 2.0);
        assert_eq!(swapped.y1, 8.0);
    }

    #[test]
    fn polygon_needs_three_vertices() {
        let two = [Point::new(0.0, 0.0), Point::new(4.0, 4.0)];
        assert!(BoundingBox::from_polygon(&two).is_none());
        let quad = [
            Point::new(10.0, 12.0),
            Point::new(60.0, 10.0),
            Point::new(61.0, 30.0),
            Point::new(9.0, 29.0),
        ];
        let bbox = BoundingBox::from_polygon(&quad).expect("bbox");
        assert_eq!(bbox, BoundingBox::new(9.0, 10.0, 61.0, 30.0));
    }

    #[test]
    fn distribution_handles_trivial_cases() {
        assert!(distribute_translated_text("a b", &[]).is_empty());
        assert_eq!(distribute_translated_text("", &[4]), vec![String::new()]);
        assert_eq!(
            distribute_translated_text("  keep  spacing ", &[3]),
            vec!["  keep  spacing ".to_string()]
        );
    }

    #[test]
    fn distribution_is_proportional_to_source_length() {
        let parts = distribute_translated_text("one two three four five six", &[10, 20]);
        assert_eq!(parts, vec!["one two", "three four five six"]);
    }

    #[test]
    fn distribution_without_source_text_splits_evenly() {
        let parts = distribute_translated_text("a b c d e", &[0, 0, 0]);
        assert_eq!(parts, vec!["a b", "c d", "e"]);
    }

    #[test]
    fn distribution_leftovers_go_to_last_filled_region() {
        // 3 words over lengths 1,1,1,1: each share rounds to 1, last region gets none.
        let parts = distribute_translated_text("x y z", &[1, 1, 1, 1]);
        assert_eq!(parts, vec!["x", "y", "z", ""]);
        // shares round down to zero for the small regions
        let parts = distribute_translated_text("alpha beta", &[1, 1, 10]);
        assert_eq!(parts, vec!["", "", "alpha beta"]);
    }

    #[test]
    fn distribution_conserves_words() {
        let text = "the quick brown fox jumps over the lazy dog again and again";
        let cases: [&[usize]; 4] = [&[3, 7, 2], &[1, 1, 1, 1, 1], &[100, 1], &[0, 5, 0, 9]];
        let expected: Vec<&str> = text.split_whitespace().collect();
        for lengths in cases {
            let parts = distribute_translated_text(text, lengths);
            assert_eq!(parts.len(), lengths.len());
            let joined: Vec<&str> = parts
                .iter()
                .filter(|part| !part.is_empty())
                .flat_map(|part| part.split(' '))
                .collect();
            assert_eq!(joined, expected, "lengths {:?}", lengths);
        }
    }

    #[test]
    fn font_size_is_clamped() {
        let small = BoundingBox::new(0.0, 0.0, 10.0, 5.0);
        assert_eq!(fit_font_size("long text here", &small), FIT_MIN_PX);
        let huge = BoundingBox::new(0.0, 0.0, 2000.0, 900.0);
        assert_eq!(fit_font_size("hi", &huge), FIT_MAX_PX);
        let mid = BoundingBox::new(0.0, 0.0, 50.0, 20.0);
        // min(50 / (5 * 0.6), 16) * 1.2 = 16 * 1.2
        let size = fit_font_size("Hello", &mid);
        assert!((size - 19.2).abs() < 1e-4);
        let empty = fit_font_size("", &BoundingBox::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(empty, FIT_MIN_PX);
    }

    #[test]
    fn wrap_breaks_on_overflow_and_newlines() {
        // 10px per char at font size 20.
        let lines = wrap_text(&MonoMeasure, "aa bb cc\ndd", 20.0, 55.0);
        assert_eq!(lines, vec!["aa bb", "cc", "dd"]);
    }

    #[test]
    fn wrap_keeps_overlong_word_whole() {
        let lines = wrap_text(&MonoMeasure, "a incomprehensibilities b", 20.0, 30.0);
        assert_eq!(lines, vec!["a", "incomprehensibilities", "b"]);
    }

    #[test]
    fn wrap_of_empty_text_is_one_empty_line() {
        assert_eq!(wrap_text(&MonoMeasure, "", 20.0, 30.0), vec![String::new()]);
        assert_eq!(
            wrap_text(&MonoMeasure, "a\n\nb", 20.0, 300.0),
            vec!["a".to_string(), String::new(), "b".to_string()]
        );
    }

    #[test]
    fn centre_hits_for_any_rotation() {
        let frame = BoundingBox::new(10.0, 10.0, 60.0, 30.0);
        let centre = frame.center();
        for step in 0..64 {
            let angle = step as f32 * (2.0 * PI / 64.0);
            assert!(hit_test_rotated(centre, &frame, angle));
        }
    }

    #[test]
    fn rotation_moves_the_hit_area() {
        let frame = BoundingBox::new(0.0, 40.0, 100.0, 60.0);
        let far_right = Point::new(95.0, 50.0);
        assert!(hit_test_rotated(far_right, &frame, 0.0));
        assert!(!hit_test_rotated(far_right, &frame, PI / 2.0));
        let below = Point::new(50.0, 95.0);
        assert!(hit_test_rotated(below, &frame, PI / 2.0));
    }

    #[test]
    fn copy_button_falls_back_to_left_near_right_edge() {
        let frame = BoundingBox::new(150.0, 50.0, 195.0, 70.0);
        let right = copy_button_position(
            &BoundingBox::new(10.0, 50.0, 40.0, 70.0),
            18.0,
            200.0,
            200.0,
            0.0,
        );
        assert_eq!(right, Point::new(68.0, 59.0));
        let left = copy_button_position(&frame, 18.0, 200.0, 200.0, 0.0);
        assert_eq!(left, Point::new(122.0, 59.0));
    }
}
