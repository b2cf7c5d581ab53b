use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use image::imageops::FilterType;
use std::io::Cursor;
use std::path::Path;
use tiny_skia::{Color, ColorU8, IntSize, Pixmap, PremultipliedColorU8};

use crate::geometry::BoundingBox;

/// Integer pixel rectangle, always at least 1×1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Grows by `padding` on every side, clamped to `[0, max - 1]`.
    pub fn padded(&self, padding: u32, max_width: u32, max_height: u32) -> Self {
        let x0 = self.x.saturating_sub(padding);
        let y0 = self.y.saturating_sub(padding);
        let last_x = (self.right().saturating_sub(1) + padding).min(max_width.saturating_sub(1));
        let last_y = (self.bottom().saturating_sub(1) + padding).min(max_height.saturating_sub(1));
        Self {
            x: x0,
            y: y0,
            width: last_x.saturating_sub(x0) + 1,
            height: last_y.saturating_sub(y0) + 1,
        }
    }

    pub fn from_box(bbox: &BoundingBox, max_width: u32, max_height: u32) -> Option<Self> {
        let clamped = bbox.clamp_to(max_width as f32, max_height as f32);
        let x0 = clamped.x0.floor().max(0.0) as u32;
        let y0 = clamped.y0.floor().max(0.0) as u32;
        let x1 = (clamped.x1.ceil() as u32).min(max_width);
        let y1 = (clamped.y1.ceil() as u32).min(max_height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    pub fn full(pixmap: &Pixmap) -> Self {
        Self {
            x: 0,
            y: 0,
            width: pixmap.width(),
            height: pixmap.height(),
        }
    }
}

pub fn blank(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid raster size {width}x{height}"))
}

pub fn decode_image(bytes: &[u8]) -> Result<Pixmap> {
    let image = image::load_from_memory(bytes)
        .with_context(|| "failed to decode image")?
        .to_rgba8();
    from_rgba_image(&image)
}

pub fn load_image(path: &Path) -> Result<Pixmap> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image: {}", path.display()))?;
    decode_image(&bytes).with_context(|| format!("failed to load image: {}", path.display()))
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>> {
    let image = to_rgba_image(pixmap)?;
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .with_context(|| "failed to encode png")?;
    Ok(bytes)
}

pub fn save_png(pixmap: &Pixmap, path: &Path) -> Result<()> {
    let bytes = encode_png(pixmap)?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write: {}", path.display()))
}

pub fn to_rgba_image(pixmap: &Pixmap) -> Result<RgbaImage> {
    let mut data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .ok_or_else(|| anyhow!("failed to build image buffer"))
}

pub fn from_rgba_image(image: &RgbaImage) -> Result<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())
        .ok_or_else(|| anyhow!("image has zero size"))?;
    let mut data = Vec::with_capacity(image.as_raw().len());
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let color = ColorU8::from_rgba(r, g, b, a).premultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    Pixmap::from_vec(data, size).ok_or_else(|| anyhow!("failed to build raster"))
}

pub fn resize(pixmap: &Pixmap, width: u32, height: u32) -> Result<Pixmap> {
    if pixmap.width() == width && pixmap.height() == height {
        return Ok(pixmap.clone());
    }
    let image = to_rgba_image(pixmap)?;
    let resized = image::imageops::resize(&image, width, height, FilterType::Triangle);
    from_rgba_image(&resized)
}

pub fn crop(pixmap: &Pixmap, rect: PixelRect) -> Option<Pixmap> {
    let rect =
        tiny_skia::IntRect::from_xywh(rect.x as i32, rect.y as i32, rect.width, rect.height)?;
    pixmap.clone_rect(rect)
}

/// Replaces the pixels under `rect` with `patch`, resampling the patch when
/// its size differs from the rect.
pub fn splice(target: &mut Pixmap, patch: &Pixmap, rect: PixelRect) -> Result<()> {
    let resized;
    let patch = if patch.width() != rect.width || patch.height() != rect.height {
        resized = resize(patch, rect.width, rect.height)?;
        &resized
    } else {
        patch
    };
    let target_width = target.width() as usize;
    let target_height = target.height() as usize;
    let patch_width = patch.width() as usize;
    let source = patch.pixels();
    let dest = target.pixels_mut();
    for row in 0..rect.height as usize {
        let y = rect.y as usize + row;
        if y >= target_height {
            break;
        }
        for col in 0..rect.width as usize {
            let x = rect.x as usize + col;
            if x >= target_width {
                break;
            }
            dest[y * target_width + x] = source[row * patch_width + col];
        }
    }
    Ok(())
}

/// Inclusive bounds of every pixel with non-zero alpha, in one pass.
pub fn alpha_bounds(mask: &Pixmap) -> Option<PixelRect> {
    let width = mask.width() as usize;
    let mut min_x = usize::MAX;
    let mut min_y = usize::MAX;
    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut found = false;
    for (idx, pixel) in mask.pixels().iter().enumerate() {
        if pixel.alpha() == 0 {
            continue;
        }
        let x = idx % width;
        let y = idx / width;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
        found = true;
    }
    found.then(|| PixelRect {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

pub fn is_blank(pixmap: &Pixmap) -> bool {
    pixmap.pixels().iter().all(|pixel| pixel.alpha() == 0)
}

pub fn clear(pixmap: &mut Pixmap) {
    pixmap.fill(Color::TRANSPARENT);
}

/// Average straight-alpha colour of the visible pixels under `rect`.
pub fn average_color(pixmap: &Pixmap, rect: PixelRect) -> Option<ColorU8> {
    let width = pixmap.width();
    let height = pixmap.height();
    let pixels = pixmap.pixels();
    let mut totals = [0u64; 3];
    let mut count = 0u64;
    for y in rect.y..rect.bottom().min(height) {
        for x in rect.x..rect.right().min(width) {
            let pixel = pixels[(y * width + x) as usize];
            if pixel.alpha() == 0 {
                continue;
            }
            let color = pixel.demultiply();
            totals[0] += color.red() as u64;
            totals[1] += color.green() as u64;
            totals[2] += color.blue() as u64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(ColorU8::from_rgba(
        (totals[0] / count) as u8,
        (totals[1] / count) as u8,
        (totals[2] / count) as u8,
        255,
    ))
}

pub fn luma(color: ColorU8) -> f32 {
    0.299 * color.red() as f32 + 0.587 * color.green() as f32 + 0.114 * color.blue() as f32
}

/// Black on bright backgrounds, white on dark ones.
pub fn contrasting_text_color(background: ColorU8) -> &'static str {
    if luma(background) > 128.0 {
        "#000000"
    } else {
        "#ffffff"
    }
}

pub fn color_hex(color: ColorU8) -> String {
    format!(
        "#{:02x}{:02x}{:02x}",
        color.red(),
        color.green(),
        color.blue()
    )
}

pub fn fill_solid(pixmap: &mut Pixmap, rect: PixelRect, color: ColorU8) {
    let width = pixmap.width();
    let height = pixmap.height();
    let value = color.premultiply();
    let pixels = pixmap.pixels_mut();
    for y in rect.y..rect.bottom().min(height) {
        for x in rect.x..rect.right().min(width) {
            pixels[(y * width + x) as usize] = value;
        }
    }
}

pub fn pixel_at(pixmap: &Pixmap, x: u32, y: u32) -> Option<PremultipliedColorU8> {
    pixmap.pixel(x, y)
}

/// Parses `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)` and a few names.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "black" => return Some(Color::BLACK),
        "white" => return Some(Color::WHITE),
        "transparent" => return Some(Color::TRANSPARENT),
        _ => {}
    }
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = value.to_ascii_lowercase();
    let inner = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }
    let channel = |part: &str| part.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0) as u8);
    let alpha = match parts.get(3) {
        Some(part) => part.parse::<f32>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    let mut color = Color::from_rgba8(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        255,
    );
    color.set_alpha(alpha);
    Some(color)
}

fn parse_hex(hex: &str) -> Option<Color> {
    let nibble = |idx: usize| u8::from_str_radix(hex.get(idx..idx + 1)?, 16).ok();
    let byte = |idx: usize| u8::from_str_radix(hex.get(idx..idx + 2)?, 16).ok();
    match hex.len() {
        3 => Some(Color::from_rgba8(
            nibble(0)? * 17,
            nibble(1)? * 17,
            nibble(2)? * 17,
            255,
        )),
        6 => Some(Color::from_rgba8(byte(0)?, byte(2)?, byte(4)?, 255)),
        8 => Some(Color::from_rgba8(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}
