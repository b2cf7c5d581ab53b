use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub mod cache;
pub mod capture;
pub mod editor;
pub mod error;
pub mod font;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod raster;
pub mod region;
pub mod registry;
pub mod render;
pub mod services;
pub mod settings;

#[cfg(test)]
mod test_util;

pub use cache::{CachedResult, ResultCache};
pub use editor::{
    AcceptedEdit, EditSession, EditorEffect, EditorMode, PointerEvent, PointerKind, PointerSource,
    begin_edit_session,
};
pub use error::PipelineError;
pub use font::FontBook;
pub use pipeline::{Orchestrator, PipelineOutput, run_automatic_pipeline};
pub use region::{StylePatch, TextRegion, TextStyle};
pub use registry::{ProcessingState, TargetId, TargetRegistry};
pub use services::{HttpServices, Services};
pub use settings::{Settings, SettingsHub};

#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub input: PathBuf,
    pub lang: Option<String>,
    pub api_url: Option<String>,
    pub output: Option<PathBuf>,
    pub regions_out: Option<PathBuf>,
    pub inpainted_out: Option<PathBuf>,
    pub settings_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub original: PathBuf,
    pub inpainted: Option<PathBuf>,
    pub regions: PathBuf,
    pub output: PathBuf,
    pub settings_path: Option<String>,
}

/// Runs the automatic pipeline on one image file over HTTP services and
/// writes the composite, the text-free layer and the regions JSON.
pub async fn run_translate(config: TranslateConfig) -> Result<String> {
    let mut settings = settings::load_settings(config.settings_path.as_deref().map(Path::new))?;
    if let Some(url) = config.api_url.as_deref().filter(|url| !url.trim().is_empty()) {
        settings.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(lang) = config.lang.as_deref().filter(|lang| !lang.trim().is_empty()) {
        settings.target_language = lang.trim().to_string();
    }

    let image = raster::load_image(&config.input)?;
    let fonts = load_fonts(&settings);
    let services = Services::shared(Arc::new(HttpServices::from_settings(&settings)));
    let hub = SettingsHub::new(settings);
    let orchestrator = Orchestrator::new(services, hub, fonts);

    let id = TargetId::new(config.input.to_string_lossy().to_string());
    let output = orchestrator.translate_target(&id, image).await?;

    let composite_path = config
        .output
        .unwrap_or_else(|| sibling_path(&config.input, "translated", "png"));
    raster::save_png(&output.composited, &composite_path)?;
    if let Some(path) = config.inpainted_out.as_deref() {
        raster::save_png(&output.inpainted, path)?;
    }
    if let Some(path) = config.regions_out.as_deref() {
        write_regions(path, &output.regions)?;
    }
    info!("wrote {}", composite_path.display());

    let mut summary = format!(
        "{} regions -> {}",
        output.regions.len(),
        composite_path.display()
    );
    if !output.regions.is_empty() {
        summary.push('\n');
        summary.push_str(region::texts_report(&output.regions).trim_end());
    }
    Ok(summary)
}

/// Re-renders saved regions over a text-free layer without detecting again.
pub fn run_render(config: RenderConfig) -> Result<String> {
    let settings = settings::load_settings(config.settings_path.as_deref().map(Path::new))?;
    let original = raster::load_image(&config.original)?;
    let working = match config.inpainted.as_deref() {
        Some(path) => raster::load_image(path)?,
        None => raster::blank(original.width(), original.height())?,
    };
    if working.width() != original.width() || working.height() != original.height() {
        return Err(anyhow!(
            "inpainted layer is {}x{} but original is {}x{}",
            working.width(),
            working.height(),
            original.width(),
            original.height()
        ));
    }
    let regions = read_regions(&config.regions)?;
    let fonts = load_fonts(&settings);
    let composite = render::compose(&original, &working, &regions, &fonts);
    raster::save_png(&composite, &config.output)?;
    Ok(format!(
        "{} regions -> {}",
        regions.len(),
        config.output.display()
    ))
}

pub fn load_fonts(settings: &Settings) -> Arc<FontBook> {
    let families = [settings.default_style.font_family.as_str()];
    Arc::new(FontBook::load(
        settings.font_path.as_deref().map(Path::new),
        &families,
    ))
}

pub fn read_regions(path: &Path) -> Result<Vec<TextRegion>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read regions: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse regions: {}", path.display()))
}

pub fn write_regions(path: &Path, regions: &[TextRegion]) -> Result<()> {
    let content = serde_json::to_string_pretty(regions)?;
    fs::write(path, content)
        .with_context(|| format!("failed to write regions: {}", path.display()))
}

fn sibling_path(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}.{suffix}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::region_at;

    #[test]
    fn sibling_path_keeps_the_directory() {
        let path = sibling_path(Path::new("/tmp/pages/01.jpg"), "translated", "png");
        assert_eq!(path, PathBuf::from("/tmp/pages/01.translated.png"));
    }

    #[test]
    fn regions_file_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("regions.json");
        let regions = vec![region_at(1, 20.0, 20.0, "one"), region_at(2, 50.0, 20.0, "two")];
        write_regions(&path, &regions).expect("write");
        assert_eq!(read_regions(&path).expect("read"), regions);
    }

    #[test]
    fn broken_regions_file_names_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("regions.json");
        fs::write(&path, "{").expect("write");
        let err = read_regions(&path).expect_err("parse");
        assert!(err.to_string().contains("failed to parse regions"));
    }
}
