use crate::geometry::{Orientation, Point, TextMeasure, to_local};
use crate::layout::RegionLayout;

/// Caret inside the text of one region, as a character offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caret {
    pub region_id: u64,
    pub index: usize,
}

/// Nearest character boundary to a world-space point.
pub(crate) fn caret_index_at<M: TextMeasure + ?Sized>(
    layout: &RegionLayout,
    point: Point,
    measure: &M,
) -> usize {
    let Some(first) = layout.lines.first() else {
        return 0;
    };
    let local = to_local(point, layout.center, layout.rotation);
    let step = layout.line_height.max(1.0);

    match layout.orientation {
        Orientation::Horizontal => {
            let row = ((local.y - first.y) / step).floor();
            let row = row.clamp(0.0, (layout.lines.len() - 1) as f32) as usize;
            let line = &layout.lines[row];
            let chars: Vec<char> = line.text.chars().collect();
            let mut best = 0usize;
            let mut best_distance = f32::MAX;
            for idx in 0..=chars.len() {
                let prefix: String = chars[..idx].iter().collect();
                let x = line.x + measure.text_width(&prefix, layout.font_size);
                let distance = (x - local.x).abs();
                if distance < best_distance {
                    best_distance = distance;
                    best = idx;
                }
            }
            line.start + best
        }
        Orientation::Vertical => {
            let line = layout
                .lines
                .iter()
                .min_by(|a, b| {
                    let da = (a.x + step * 0.5 - local.x).abs();
                    let db = (b.x + step * 0.5 - local.x).abs();
                    da.total_cmp(&db)
                })
                .unwrap_or(first);
            let len = line.text.chars().count();
            let row = ((local.y - line.y) / step).round().clamp(0.0, len as f32) as usize;
            line.start + row
        }
    }
}

/// Local-space top and bottom of the caret bar at `index`.
pub(crate) fn caret_segment<M: TextMeasure + ?Sized>(
    layout: &RegionLayout,
    index: usize,
    measure: &M,
) -> Option<(Point, Point)> {
    let line = layout
        .lines
        .iter()
        .find(|line| index >= line.start && index <= line.start + line.text.chars().count())?;
    let offset = index - line.start;
    match layout.orientation {
        Orientation::Horizontal => {
            let prefix: String = line.text.chars().take(offset).collect();
            let x = line.x + measure.text_width(&prefix, layout.font_size);
            Some((
                Point::new(x, line.y),
                Point::new(x, line.y + layout.line_height),
            ))
        }
        Orientation::Vertical => {
            let y = line.y + offset as f32 * layout.line_height;
            Some((Point::new(line.x, y), Point::new(line.x + layout.line_height, y)))
        }
    }
}

fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

pub(crate) fn insert_at(text: &mut String, index: usize, insert: &str) -> usize {
    let offset = byte_offset(text, index);
    text.insert_str(offset, insert);
    index.min(text.chars().count()) + insert.chars().count()
}

/// Removes the character before `index`; returns the new caret index.
pub(crate) fn delete_before(text: &mut String, index: usize) -> Option<usize> {
    if index == 0 {
        return None;
    }
    let start = byte_offset(text, index - 1);
    let end = byte_offset(text, index);
    if start >= end {
        return None;
    }
    text.replace_range(start..end, "");
    Some(index - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontBook;
    use crate::geometry::BoundingBox;
    use crate::layout::layout_region;
    use crate::region::{Confidence, TextAlign, TextRegion, TextStyle};

    fn region(text: &str, rotation: f32) -> TextRegion {
        TextRegion {
            id: 3,
            bounding_box: BoundingBox::new(0.0, 0.0, 300.0, 100.0),
            original_text: None,
            text: text.to_string(),
            style: TextStyle {
                font_size_px: 20.0,
                text_align: TextAlign::Left,
                ..TextStyle::default()
            },
            rotation_radians: rotation,
            orientation: Orientation::Horizontal,
            confidence: Confidence::Medium,
        }
    }

    #[test]
    fn click_maps_to_nearest_boundary_on_second_line() {
        let fonts = FontBook::empty();
        let region = region("ab\ncd", 0.0);
        let layout = layout_region(&region, &fonts);
        let measure = fonts.measure(&region.style.font_family);
        let second = &layout.lines[1];
        // 'c' is 11px wide at 20px; just right of it lands after 'c'.
        let point = Point::new(second.x + 12.0, second.y + 5.0);
        assert_eq!(caret_index_at(&layout, point, &measure), 4);
        let before = Point::new(second.x - 30.0, second.y + 5.0);
        assert_eq!(caret_index_at(&layout, before, &measure), 3);
    }

    #[test]
    fn rotated_click_is_unrotated_first() {
        let fonts = FontBook::empty();
        let plain = region("abcd", 0.0);
        let turned = region("abcd", std::f32::consts::FRAC_PI_2);
        let measure = fonts.measure(&plain.style.font_family);
        let layout = layout_region(&plain, &fonts);
        let line = &layout.lines[0];
        let local = Point::new(line.x + 23.0, line.y + 10.0);
        let expected = caret_index_at(&layout, local, &measure);
        let turned_layout = layout_region(&turned, &fonts);
        let world = turned_layout.to_world(local);
        assert_eq!(caret_index_at(&turned_layout, world, &measure), expected);
        assert_eq!(expected, 2);
    }

    #[test]
    fn caret_segment_sits_after_prefix() {
        let fonts = FontBook::empty();
        let region = region("ab", 0.0);
        let layout = layout_region(&region, &fonts);
        let measure = fonts.measure(&region.style.font_family);
        let (top, bottom) = caret_segment(&layout, 1, &measure).expect("segment");
        assert!((top.x - (layout.lines[0].x + 11.0)).abs() < 1e-3);
        assert!((bottom.y - top.y - layout.line_height).abs() < 1e-3);
        assert!(caret_segment(&layout, 9, &measure).is_none());
    }

    #[test]
    fn editing_respects_multibyte_characters() {
        let mut text = "chào".to_string();
        let caret = insert_at(&mut text, 2, "X");
        assert_eq!(text, "chXào");
        assert_eq!(caret, 3);
        let caret = delete_before(&mut text, 4).expect("deleted");
        assert_eq!(text, "chXo");
        assert_eq!(caret, 3);
        assert!(delete_before(&mut text, 0).is_none());
    }
}
