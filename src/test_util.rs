use tiny_skia::{Color, Pixmap};

use crate::geometry::{BoundingBox, Orientation, Point};
use crate::region::{Confidence, TextRegion, TextStyle};

pub(crate) fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Pixmap {
    let mut pixmap = Pixmap::new(width, height).expect("pixmap");
    pixmap.fill(Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
    pixmap
}

/// A user-added 60×24 region centred on (`cx`, `cy`).
pub(crate) fn region_at(id: u64, cx: f32, cy: f32, text: &str) -> TextRegion {
    TextRegion {
        id,
        bounding_box: BoundingBox::from_center(Point::new(cx, cy), 60.0, 24.0),
        original_text: None,
        text: text.to_string(),
        style: TextStyle::default(),
        rotation_radians: 0.0,
        orientation: Orientation::Horizontal,
        confidence: Confidence::High,
    }
}
