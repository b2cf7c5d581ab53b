use tiny_skia::{
    BlendMode, Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform,
};

use crate::geometry::Point;
use crate::region::TextRegion;

/// Margin added around the painted mask before cropping for inpainting.
pub const INPAINT_PADDING: u32 = 20;

pub(crate) fn mask_color() -> Color {
    Color::from_rgba8(0x3b, 0x82, 0xf6, 0xff)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BrushKind {
    Erase,
    Paint,
    Mask,
}

pub(crate) fn brush_paint(kind: BrushKind, color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.anti_alias = true;
    match kind {
        BrushKind::Erase => {
            paint.set_color(Color::BLACK);
            paint.blend_mode = BlendMode::DestinationOut;
        }
        BrushKind::Paint => paint.set_color(color),
        BrushKind::Mask => paint.set_color(mask_color()),
    }
    paint
}

/// Stamps a round brush at `to`, joined to `from` by a stroke of the same
/// width so fast pointer motion leaves no gaps.
pub(crate) fn stamp(
    layer: &mut Pixmap,
    from: Option<Point>,
    to: Point,
    diameter: f32,
    paint: &Paint,
) {
    let diameter = diameter.max(1.0);
    if let Some(from) = from
        && from != to
    {
        let mut builder = PathBuilder::new();
        builder.move_to(from.x, from.y);
        builder.line_to(to.x, to.y);
        if let Some(path) = builder.finish() {
            let stroke = Stroke {
                width: diameter,
                line_cap: LineCap::Round,
                line_join: LineJoin::Round,
                ..Stroke::default()
            };
            layer.stroke_path(&path, paint, &stroke, Transform::identity(), None);
        }
    }
    if let Some(circle) = PathBuilder::from_circle(to.x, to.y, diameter * 0.5) {
        layer.fill_path(&circle, paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Points along `from..=to` no further apart than `spacing`.
pub(crate) fn sample_segment(from: Point, to: Point, spacing: f32) -> Vec<Point> {
    let spacing = spacing.max(0.5);
    let steps = (from.distance(to) / spacing).ceil().max(1.0) as usize;
    (0..=steps)
        .map(|step| {
            let t = step as f32 / steps as f32;
            Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
        })
        .collect()
}

/// Drops every region whose centre lies within `radius` of any sample point.
/// Returns the ids that were removed.
pub(crate) fn remove_regions_under(
    regions: &mut Vec<TextRegion>,
    samples: &[Point],
    radius: f32,
) -> Vec<u64> {
    let radius_sq = radius * radius;
    let mut removed = Vec::new();
    regions.retain(|region| {
        let center = region.bounding_box.center();
        let hit = samples
            .iter()
            .any(|point| point.distance_sq(center) <= radius_sq);
        if hit {
            removed.push(region.id);
        }
        !hit
    });
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::region::{Confidence, TextStyle};

    fn region(id: u64, cx: f32, cy: f32) -> TextRegion {
        TextRegion {
            id,
            bounding_box: BoundingBox::from_center(Point::new(cx, cy), 20.0, 10.0),
            original_text: None,
            text: "x".to_string(),
            style: TextStyle::default(),
            rotation_radians: 0.0,
            orientation: Default::default(),
            confidence: Confidence::Low,
        }
    }

    #[test]
    fn samples_include_both_ends() {
        let samples = sample_segment(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 3.0);
        assert_eq!(samples.first(), Some(&Point::new(0.0, 0.0)));
        assert_eq!(samples.last(), Some(&Point::new(10.0, 0.0)));
        assert!(samples.windows(2).all(|pair| pair[0].distance(pair[1]) <= 3.0));
        assert_eq!(sample_segment(Point::new(4.0, 4.0), Point::new(4.0, 4.0), 3.0).len(), 2);
    }

    #[test]
    fn removal_uses_region_centre() {
        let mut regions = vec![region(1, 50.0, 50.0), region(2, 50.0, 120.0)];
        let samples = sample_segment(Point::new(0.0, 50.0), Point::new(100.0, 50.0), 10.0);
        let removed = remove_regions_under(&mut regions, &samples, 45.0);
        assert_eq!(removed, vec![1]);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, 2);
    }

    #[test]
    fn erase_punches_transparency() {
        let mut layer = Pixmap::new(40, 40).expect("pixmap");
        layer.fill(Color::WHITE);
        let paint = brush_paint(BrushKind::Erase, Color::WHITE);
        stamp(&mut layer, Some(Point::new(5.0, 20.0)), Point::new(35.0, 20.0), 10.0, &paint);
        assert_eq!(layer.pixel(20, 20).expect("pixel").alpha(), 0);
        assert_eq!(layer.pixel(20, 2).expect("pixel").alpha(), 255);
    }

    #[test]
    fn mask_paint_is_opaque_blue() {
        let mut mask = Pixmap::new(20, 20).expect("pixmap");
        let paint = brush_paint(BrushKind::Mask, Color::WHITE);
        stamp(&mut mask, None, Point::new(10.0, 10.0), 8.0, &paint);
        let centre = mask.pixel(10, 10).expect("pixel");
        assert_eq!(centre.alpha(), 255);
        assert_eq!(centre.blue(), 0xf6);
    }
}
