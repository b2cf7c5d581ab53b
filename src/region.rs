use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    /// Maps a 0..=100 detector score.
    pub fn from_score(score: f32) -> Self {
        if score > 80.0 {
            Self::High
        } else if score > 60.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_size_px: f32,
    pub font_family: String,
    pub fill_color: String,
    pub stroke_color: String,
    pub stroke_width_px: f32,
    pub text_align: TextAlign,
    pub background_enabled: bool,
    pub background_color: String,
    pub border_enabled: bool,
    pub border_radius_px: f32,
    pub padding_px: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size_px: 24.0,
            font_family: "WildWords".to_string(),
            fill_color: "#000000".to_string(),
            stroke_color: "#ffffff".to_string(),
            stroke_width_px: 3.0,
            text_align: TextAlign::Center,
            background_enabled: false,
            background_color: "#ffffff".to_string(),
            border_enabled: false,
            border_radius_px: 8.0,
            padding_px: 5.0,
        }
    }
}

impl TextStyle {
    pub fn line_height(&self) -> f32 {
        self.font_size_px.max(1.0) * line_height_factor(&self.font_family)
    }

    pub fn apply(&mut self, patch: &StylePatch) {
        if let Some(size) = patch.font_size_px
            && size > 0.0
        {
            self.font_size_px = size;
        }
        if let Some(family) = &patch.font_family
            && !family.trim().is_empty()
        {
            self.font_family = family.clone();
        }
        if let Some(color) = &patch.fill_color {
            self.fill_color = color.clone();
        }
        if let Some(color) = &patch.stroke_color {
            self.stroke_color = color.clone();
        }
        if let Some(width) = patch.stroke_width_px {
            self.stroke_width_px = width.max(0.0);
        }
        if let Some(align) = patch.text_align {
            self.text_align = align;
        }
        if let Some(enabled) = patch.background_enabled {
            self.background_enabled = enabled;
        }
        if let Some(color) = &patch.background_color {
            self.background_color = color.clone();
        }
        if let Some(enabled) = patch.border_enabled {
            self.border_enabled = enabled;
        }
        if let Some(radius) = patch.border_radius_px {
            self.border_radius_px = radius.max(0.0);
        }
        if let Some(padding) = patch.padding_px {
            self.padding_px = padding.max(0.0);
        }
    }
}

/// Partial style update; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StylePatch {
    pub font_size_px: Option<f32>,
    pub font_family: Option<String>,
    pub fill_color: Option<String>,
    pub stroke_color: Option<String>,
    pub stroke_width_px: Option<f32>,
    pub text_align: Option<TextAlign>,
    pub background_enabled: Option<bool>,
    pub background_color: Option<String>,
    pub border_enabled: Option<bool>,
    pub border_radius_px: Option<f32>,
    pub padding_px: Option<f32>,
}

impl StylePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub fn line_height_factor(family: &str) -> f32 {
    let normalized: String = family
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "wildwords" => 1.2,
        "notosans" => 1.4,
        "komikajam" => 1.3,
        "bangers" | "edo" | "ridibatang" | "bushidoo" | "hayah" | "itim" => 1.1,
        _ => 1.2,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRegion {
    pub id: u64,
    pub bounding_box: BoundingBox,
    pub original_text: Option<String>,
    pub text: String,
    pub style: TextStyle,
    #[serde(default)]
    pub rotation_radians: f32,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub confidence: Confidence,
}

impl TextRegion {
    pub fn is_user_added(&self) -> bool {
        self.original_text.is_none()
    }

    pub fn source_len(&self) -> usize {
        self.original_text
            .as_deref()
            .map(|text| text.chars().count())
            .unwrap_or(0)
    }
}

/// Numbered listing of the original and translated texts.
pub fn texts_report(regions: &[TextRegion]) -> String {
    let mut out = String::from("Original texts:\n");
    for (idx, region) in regions.iter().enumerate() {
        let original = region.original_text.as_deref().unwrap_or("");
        out.push_str(&format!("{}. \"{}\"\n", idx + 1, original));
    }
    out.push_str("\n\nTranslated texts:\n");
    for (idx, region) in regions.iter().enumerate() {
        out.push_str(&format!("{}. \"{}\"\n", idx + 1, region.text));
    }
    out
}
