use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::region::{TextAlign, TextStyle};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InpaintFallback {
    /// Keep the original pixels.
    #[default]
    Original,
    /// Paint each region box with its sampled background colour.
    Fill,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub target_language: String,
    pub source_language: Option<String>,
    pub joined_translation: bool,
    pub api_url: String,
    pub default_style: TextStyle,
    pub font_path: Option<String>,
    pub auto_text_color: bool,
    pub erase_brush_px: f32,
    pub paint_brush_px: f32,
    pub inpaint_brush_px: f32,
    pub paint_color: String,
    pub max_concurrent: usize,
    pub translate_timeout: Duration,
    pub inpaint_timeout: Duration,
    pub undo_depth: usize,
    pub inpaint_fallback: InpaintFallback,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_language: "en".to_string(),
            source_language: None,
            joined_translation: false,
            api_url: "http://127.0.0.1:8000".to_string(),
            default_style: TextStyle::default(),
            font_path: None,
            auto_text_color: true,
            erase_brush_px: 90.0,
            paint_brush_px: 90.0,
            inpaint_brush_px: 90.0,
            paint_color: "#ffffff".to_string(),
            max_concurrent: 5,
            translate_timeout: Duration::from_secs(100),
            inpaint_timeout: Duration::from_secs(60),
            undo_depth: 15,
            inpaint_fallback: InpaintFallback::Original,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translate: Option<TranslateSettings>,
    style: Option<StyleSettings>,
    brush: Option<BrushSettings>,
    limits: Option<LimitSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    target_language: Option<String>,
    source_language: Option<String>,
    joined: Option<bool>,
    api_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StyleSettings {
    font_size: Option<f32>,
    font_family: Option<String>,
    font_path: Option<String>,
    fill_color: Option<String>,
    stroke_color: Option<String>,
    stroke_width: Option<f32>,
    text_align: Option<TextAlign>,
    background: Option<bool>,
    background_color: Option<String>,
    border: Option<bool>,
    border_radius: Option<f32>,
    padding: Option<f32>,
    auto_color: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct BrushSettings {
    erase: Option<f32>,
    paint: Option<f32>,
    inpaint: Option<f32>,
    paint_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitSettings {
    max_concurrent: Option<usize>,
    translate_timeout_secs: Option<u64>,
    inpaint_timeout_secs: Option<u64>,
    undo_depth: Option<usize>,
    inpaint_fallback: Option<InpaintFallback>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }
    load_layers(&ordered_paths)
}

/// Merges every existing file in order over the built-in defaults.
pub fn load_layers(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }
    Ok(settings)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translate) = incoming.translate {
            if let Some(lang) = non_empty(translate.target_language) {
                self.target_language = lang;
            }
            if let Some(lang) = non_empty(translate.source_language) {
                self.source_language = Some(lang);
            }
            if let Some(joined) = translate.joined {
                self.joined_translation = joined;
            }
            if let Some(url) = non_empty(translate.api_url) {
                self.api_url = url.trim_end_matches('/').to_string();
            }
        }
        if let Some(style) = incoming.style {
            let target = &mut self.default_style;
            if let Some(size) = style.font_size.filter(|size| *size > 0.0) {
                target.font_size_px = size;
            }
            if let Some(family) = non_empty(style.font_family) {
                target.font_family = family;
            }
            if let Some(path) = non_empty(style.font_path) {
                self.font_path = Some(path);
            }
            if let Some(color) = non_empty(style.fill_color) {
                target.fill_color = color;
            }
            if let Some(color) = non_empty(style.stroke_color) {
                target.stroke_color = color;
            }
            if let Some(width) = style.stroke_width.filter(|width| *width >= 0.0) {
                target.stroke_width_px = width;
            }
            if let Some(align) = style.text_align {
                target.text_align = align;
            }
            if let Some(enabled) = style.background {
                target.background_enabled = enabled;
            }
            if let Some(color) = non_empty(style.background_color) {
                target.background_color = color;
            }
            if let Some(enabled) = style.border {
                target.border_enabled = enabled;
            }
            if let Some(radius) = style.border_radius.filter(|radius| *radius >= 0.0) {
                target.border_radius_px = radius;
            }
            if let Some(padding) = style.padding.filter(|padding| *padding >= 0.0) {
                target.padding_px = padding;
            }
            if let Some(auto) = style.auto_color {
                self.auto_text_color = auto;
            }
        }
        if let Some(brush) = incoming.brush {
            if let Some(size) = brush.erase.filter(|size| *size > 0.0) {
                self.erase_brush_px = size;
            }
            if let Some(size) = brush.paint.filter(|size| *size > 0.0) {
                self.paint_brush_px = size;
            }
            if let Some(size) = brush.inpaint.filter(|size| *size > 0.0) {
                self.inpaint_brush_px = size;
            }
            if let Some(color) = non_empty(brush.paint_color) {
                self.paint_color = color;
            }
        }
        if let Some(limits) = incoming.limits {
            if let Some(limit) = limits.max_concurrent.filter(|limit| *limit > 0) {
                self.max_concurrent = limit;
            }
            if let Some(secs) = limits.translate_timeout_secs.filter(|secs| *secs > 0) {
                self.translate_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = limits.inpaint_timeout_secs.filter(|secs| *secs > 0) {
                self.inpaint_timeout = Duration::from_secs(secs);
            }
            if let Some(depth) = limits.undo_depth.filter(|depth| *depth > 0) {
                self.undo_depth = depth;
            }
            if let Some(fallback) = limits.inpaint_fallback {
                self.inpaint_fallback = fallback;
            }
        }
    }
}

/// Process-wide settings with change notification.
#[derive(Clone)]
pub struct SettingsHub {
    sender: Arc<watch::Sender<Settings>>,
}

impl SettingsHub {
    pub fn new(settings: Settings) -> Self {
        let (sender, _receiver) = watch::channel(settings);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Settings {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.sender.subscribe()
    }

    pub fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut Settings),
    {
        self.sender.send_modify(apply);
    }

    pub fn replace(&self, settings: Settings) {
        self.sender.send_replace(settings);
    }
}

impl Default for SettingsHub {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".overlay-translator-rust"))
        }
    })
}
