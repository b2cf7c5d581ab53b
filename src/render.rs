use std::borrow::Cow;
use tiny_skia::{
    BlendMode, Color, FillRule, LineJoin, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect,
    Stroke, StrokeDash, Transform,
};
use tracing::debug;
use usvg::{Options, Tree};

use crate::editor::{EditSession, EditorMode};
use crate::font::FontBook;
use crate::geometry::{BoundingBox, Orientation};
use crate::layout::{
    CopyButton, CopyKind, ROTATION_HANDLE_RADIUS, RegionLayout, copy_buttons, is_rtl,
    layout_region, visual_order,
};
use crate::raster;
use crate::region::TextRegion;

const ACTIVE_OUTLINE: (u8, u8, u8) = (0x60, 0xa5, 0xfa);
const INACTIVE_OUTLINE: (u8, u8, u8) = (0xfb, 0x92, 0x3c);
const DASH: [f32; 2] = [5.0, 3.0];
const MASK_OVERLAY_OPACITY: f32 = 0.5;
const BORDER_WIDTH: f32 = 2.0;

const COPY_ORIGINAL_ICON: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24" fill="none" stroke="#2563eb" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><rect x="9" y="9" width="13" height="13" rx="2"/><path d="M5 15H4a2 2 0 0 1-2-2V4a2 2 0 0 1 2-2h9a2 2 0 0 1 2 2v1"/></svg>"##;
const COPY_TRANSLATED_ICON: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24" fill="none" stroke="#ea580c" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><rect x="9" y="9" width="13" height="13" rx="2"/><path d="M5 15H4a2 2 0 0 1-2-2V4a2 2 0 0 1 2-2h9a2 2 0 0 1 2 2v1"/><path d="M12 13h7M12 17h5"/></svg>"##;

/// Final composite of a session: layers plus text, no editing chrome.
/// A flipped session shows the untouched base image.
pub fn render(session: &EditSession) -> Pixmap {
    if session.is_flipped() {
        return session.base_image().clone();
    }
    compose(
        session.base_image(),
        session.working_layer(),
        session.regions(),
        session.fonts(),
    )
}

/// Interactive view: mask overlay, selection outlines, rotation handle, caret
/// and copy buttons. Text is left out while a brush stroke is in progress.
pub fn render_preview(session: &EditSession) -> Pixmap {
    if session.is_flipped() {
        return session.base_image().clone();
    }
    let mut canvas = flatten_layers(session.base_image(), session.working_layer());

    if session.mode() == EditorMode::InpaintMask {
        let paint = PixmapPaint {
            opacity: MASK_OVERLAY_OPACITY,
            ..PixmapPaint::default()
        };
        canvas.draw_pixmap(
            0,
            0,
            session.mask().as_ref(),
            &paint,
            Transform::identity(),
            None,
        );
    }

    if session.is_stroking() {
        return canvas;
    }

    let fonts = session.fonts();
    let show_chrome = session.mode() == EditorMode::AddText;
    let active = session.active_index();
    let caret = session.caret().filter(|_| session.caret_visible());
    for (index, region) in session.regions().iter().enumerate() {
        let layout = layout_region(region, fonts);
        draw_region(&mut canvas, region, &layout, fonts);
        if !show_chrome {
            continue;
        }
        let is_active = active == Some(index);
        draw_outline(&mut canvas, &layout, is_active);
        if is_active {
            draw_rotation_handle(&mut canvas, &layout);
        }
        if let Some(caret) = caret.filter(|caret| caret.region_id == region.id) {
            draw_caret(&mut canvas, region, &layout, fonts, caret.index);
        }
    }

    if show_chrome
        && let Some(region) = active.and_then(|idx| session.regions().get(idx))
    {
        let layout = layout_region(region, fonts);
        let buttons = copy_buttons(
            region,
            &layout,
            canvas.width() as f32,
            canvas.height() as f32,
        );
        for button in buttons {
            draw_copy_button(&mut canvas, &button);
        }
    }
    canvas
}

/// Working layer over the base image; the base shows through wherever the
/// working layer is transparent.
pub fn flatten_layers(base: &Pixmap, working: &Pixmap) -> Pixmap {
    let mut canvas = working.clone();
    let paint = PixmapPaint {
        blend_mode: BlendMode::DestinationAtop,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(0, 0, base.as_ref(), &paint, Transform::identity(), None);
    canvas
}

pub fn compose(
    base: &Pixmap,
    working: &Pixmap,
    regions: &[TextRegion],
    fonts: &FontBook,
) -> Pixmap {
    let mut canvas = flatten_layers(base, working);
    for region in regions {
        let layout = layout_region(region, fonts);
        draw_region(&mut canvas, region, &layout, fonts);
    }
    debug!("composited {} regions", regions.len());
    canvas
}

fn region_transform(layout: &RegionLayout) -> Transform {
    Transform::from_rotate_at(
        layout.rotation.to_degrees(),
        layout.center.x,
        layout.center.y,
    )
}

fn solid_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

fn rgb_paint((r, g, b): (u8, u8, u8)) -> Paint<'static> {
    solid_paint(Color::from_rgba8(r, g, b, 255))
}

pub fn draw_region(
    canvas: &mut Pixmap,
    region: &TextRegion,
    layout: &RegionLayout,
    fonts: &FontBook,
) {
    let style = &region.style;
    let transform = region_transform(layout);

    if style.background_enabled
        && let Some(color) = raster::parse_color(&style.background_color)
        && let Some(path) = rounded_rect(&layout.frame, style.border_radius_px)
    {
        canvas.fill_path(
            &path,
            &solid_paint(color),
            FillRule::Winding,
            transform,
            None,
        );
    }
    if style.border_enabled
        && let Some(path) = rounded_rect(&layout.frame, style.border_radius_px)
    {
        let stroke = Stroke {
            width: BORDER_WIDTH,
            ..Stroke::default()
        };
        canvas.stroke_path(&path, &solid_paint(Color::BLACK), &stroke, transform, None);
    }

    if layout.is_empty() {
        return;
    }
    let Some(text_path) = text_outline(region, layout, fonts) else {
        return;
    };
    if style.stroke_width_px > 0.0
        && let Some(color) = raster::parse_color(&style.stroke_color)
    {
        let stroke = Stroke {
            width: style.stroke_width_px,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        canvas.stroke_path(&text_path, &solid_paint(color), &stroke, transform, None);
    }
    let fill = raster::parse_color(&style.fill_color).unwrap_or(Color::BLACK);
    canvas.fill_path(
        &text_path,
        &solid_paint(fill),
        FillRule::Winding,
        transform,
        None,
    );
}

fn text_outline(region: &TextRegion, layout: &RegionLayout, fonts: &FontBook) -> Option<Path> {
    let family = &region.style.font_family;
    let font_size = layout.font_size;
    let inset = (layout.line_height - font_size) * 0.5;
    let rtl = is_rtl(&region.text);
    let mut builder = PathBuilder::new();
    for line in &layout.lines {
        match layout.orientation {
            Orientation::Horizontal => {
                let glyphs = if rtl {
                    Cow::Owned(visual_order(&line.text))
                } else {
                    Cow::Borrowed(line.text.as_str())
                };
                fonts.append_text_path(
                    family,
                    &glyphs,
                    font_size,
                    line.x,
                    line.y + inset,
                    &mut builder,
                );
            }
            Orientation::Vertical => {
                for (row, ch) in line.text.chars().enumerate() {
                    let top = line.y + row as f32 * layout.line_height + inset;
                    fonts.append_centered_glyph(
                        family,
                        ch,
                        font_size,
                        line.x,
                        line.width,
                        top,
                        &mut builder,
                    );
                }
            }
        }
    }
    builder.finish()
}

fn rounded_rect(frame: &BoundingBox, radius: f32) -> Option<Path> {
    let rect = Rect::from_ltrb(frame.x0, frame.y0, frame.x1, frame.y1)?;
    let radius = radius.min(rect.width() * 0.5).min(rect.height() * 0.5);
    if radius <= 0.0 {
        return Some(PathBuilder::from_rect(rect));
    }
    let (l, t, r, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
    let mut builder = PathBuilder::new();
    builder.move_to(l + radius, t);
    builder.line_to(r - radius, t);
    builder.quad_to(r, t, r, t + radius);
    builder.line_to(r, b - radius);
    builder.quad_to(r, b, r - radius, b);
    builder.line_to(l + radius, b);
    builder.quad_to(l, b, l, b - radius);
    builder.line_to(l, t + radius);
    builder.quad_to(l, t, l + radius, t);
    builder.close();
    builder.finish()
}

fn draw_outline(canvas: &mut Pixmap, layout: &RegionLayout, active: bool) {
    let frame = &layout.frame;
    let Some(rect) = Rect::from_ltrb(frame.x0, frame.y0, frame.x1, frame.y1) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    let stroke = Stroke {
        width: if active { 2.0 } else { 1.0 },
        dash: StrokeDash::new(DASH.to_vec(), 0.0),
        ..Stroke::default()
    };
    let color = if active {
        ACTIVE_OUTLINE
    } else {
        INACTIVE_OUTLINE
    };
    canvas.stroke_path(
        &path,
        &rgb_paint(color),
        &stroke,
        region_transform(layout),
        None,
    );
}

fn draw_rotation_handle(canvas: &mut Pixmap, layout: &RegionLayout) {
    let handle = layout.rotation_handle();
    let Some(circle) = PathBuilder::from_circle(handle.x, handle.y, ROTATION_HANDLE_RADIUS) else {
        return;
    };
    canvas.fill_path(
        &circle,
        &rgb_paint(ACTIVE_OUTLINE),
        FillRule::Winding,
        Transform::identity(),
        None,
    );
    let stroke = Stroke {
        width: 2.0,
        ..Stroke::default()
    };
    canvas.stroke_path(
        &circle,
        &solid_paint(Color::WHITE),
        &stroke,
        Transform::identity(),
        None,
    );
}

fn draw_caret(
    canvas: &mut Pixmap,
    region: &TextRegion,
    layout: &RegionLayout,
    fonts: &FontBook,
    index: usize,
) {
    let measure = fonts.measure(&region.style.font_family);
    let Some((start, end)) = crate::editor::caret_segment(layout, index, &measure) else {
        return;
    };
    let mut builder = PathBuilder::new();
    builder.move_to(start.x, start.y);
    builder.line_to(end.x, end.y);
    let Some(path) = builder.finish() else {
        return;
    };
    let color = raster::parse_color(&region.style.fill_color).unwrap_or(Color::BLACK);
    let stroke = Stroke {
        width: 2.0,
        ..Stroke::default()
    };
    canvas.stroke_path(
        &path,
        &solid_paint(color),
        &stroke,
        region_transform(layout),
        None,
    );
}

fn draw_copy_button(canvas: &mut Pixmap, button: &CopyButton) {
    let Some(circle) = PathBuilder::from_circle(button.center.x, button.center.y, button.radius)
    else {
        return;
    };
    canvas.fill_path(
        &circle,
        &solid_paint(Color::from_rgba8(255, 255, 255, 230)),
        FillRule::Winding,
        Transform::identity(),
        None,
    );
    let outline = match button.kind {
        CopyKind::Original => ACTIVE_OUTLINE,
        CopyKind::Translated => INACTIVE_OUTLINE,
    };
    let stroke = Stroke {
        width: 1.5,
        ..Stroke::default()
    };
    canvas.stroke_path(
        &circle,
        &rgb_paint(outline),
        &stroke,
        Transform::identity(),
        None,
    );

    let svg = match button.kind {
        CopyKind::Original => COPY_ORIGINAL_ICON,
        CopyKind::Translated => COPY_TRANSLATED_ICON,
    };
    let Ok(tree) = Tree::from_str(svg, &Options::default()) else {
        return;
    };
    let icon_size = button.radius * 1.1;
    let scale = icon_size / tree.size().width().max(1.0);
    let transform = Transform::from_row(
        scale,
        0.0,
        0.0,
        scale,
        button.center.x - icon_size * 0.5,
        button.center.y - icon_size * 0.5,
    );
    resvg::render(&tree, transform, &mut canvas.as_mut());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::begin_edit_session;
    use crate::settings::Settings;
    use crate::test_util::{region_at, solid};
    use std::sync::Arc;

    #[test]
    fn flatten_shows_base_where_working_is_transparent() {
        let base = solid(4, 4, [10, 20, 30, 255]);
        let mut working = Pixmap::new(4, 4).expect("pixmap");
        raster::fill_solid(
            &mut working,
            raster::PixelRect {
                x: 0,
                y: 0,
                width: 2,
                height: 4,
            },
            tiny_skia::ColorU8::from_rgba(200, 0, 0, 255),
        );
        let flat = flatten_layers(&base, &working);
        assert_eq!(flat.pixel(0, 0).expect("pixel").red(), 200);
        let revealed = flat.pixel(3, 3).expect("pixel");
        assert_eq!((revealed.red(), revealed.green(), revealed.blue()), (10, 20, 30));
    }

    #[test]
    fn text_lands_inside_its_box() {
        let base = solid(120, 60, [255, 255, 255, 255]);
        let working = Pixmap::new(120, 60).expect("pixmap");
        let mut region = region_at(1, 35.0, 20.0, "Hi");
        region.style.font_size_px = 14.0;
        region.style.stroke_width_px = 0.0;
        let out = compose(&base, &working, &[region], &FontBook::empty());
        let dark_inside = (10..60)
            .flat_map(|x| (10..30).map(move |y| (x, y)))
            .any(|(x, y)| out.pixel(x, y).is_some_and(|p| p.red() < 128));
        assert!(dark_inside);
        let untouched = (70..120).all(|x| out.pixel(x, 50).is_some_and(|p| p.red() == 255));
        assert!(untouched);
    }

    #[test]
    fn background_fills_the_frame() {
        let base = solid(100, 100, [255, 255, 255, 255]);
        let working = Pixmap::new(100, 100).expect("pixmap");
        let mut region = region_at(1, 50.0, 50.0, "");
        region.style.background_enabled = true;
        region.style.background_color = "#00ff00".to_string();
        region.style.border_radius_px = 0.0;
        let out = compose(&base, &working, &[region], &FontBook::empty());
        let centre = out.pixel(50, 50).expect("pixel");
        assert_eq!((centre.red(), centre.green()), (0, 255));
        assert_eq!(out.pixel(5, 5).expect("pixel").green(), 255);
        assert_eq!(out.pixel(5, 5).expect("pixel").red(), 255);
    }

    #[test]
    fn border_is_black_whatever_the_text_colour() {
        let base = solid(100, 100, [255, 255, 255, 255]);
        let working = Pixmap::new(100, 100).expect("pixmap");
        let mut region = region_at(1, 50.0, 50.0, "");
        region.style.border_enabled = true;
        region.style.border_radius_px = 0.0;
        region.style.fill_color = "#ff0000".to_string();
        let frame = layout_region(&region, &FontBook::empty()).frame;
        let out = compose(&base, &working, &[region], &FontBook::empty());
        let edge = out
            .pixel((frame.x0 - 1.0).ceil() as u32, 50)
            .expect("pixel");
        assert!(edge.red() < 60 && edge.green() < 60, "{edge:?}");
    }

    #[test]
    fn flipped_session_renders_the_base_only() {
        let base = solid(50, 50, [1, 2, 3, 255]);
        let mut session = begin_edit_session(
            base.clone(),
            Some(vec![region_at(1, 25.0, 25.0, "text")]),
            &Settings::default(),
            Arc::new(FontBook::empty()),
        )
        .expect("session");
        session.toggle_flip();
        assert_eq!(render(&session).data(), base.data());
        assert_eq!(render_preview(&session).data(), base.data());
    }

    #[test]
    fn preview_draws_chrome_but_final_render_does_not() {
        let base = solid(200, 120, [255, 255, 255, 255]);
        let mut session = begin_edit_session(
            base,
            Some(vec![region_at(1, 60.0, 60.0, "")]),
            &Settings::default(),
            Arc::new(FontBook::empty()),
        )
        .expect("session");
        session.select(Some(0));
        let layout = layout_region(&session.regions()[0], session.fonts());
        let handle = layout.rotation_handle();
        let preview = render_preview(&session);
        let final_image = render(&session);
        let at_handle = |image: &Pixmap| {
            image
                .pixel(handle.x as u32, handle.y as u32)
                .expect("pixel")
        };
        assert_eq!(at_handle(&final_image).red(), 255);
        assert_eq!(at_handle(&preview).red(), ACTIVE_OUTLINE.0);
    }
}
