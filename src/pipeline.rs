use futures_util::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use tiny_skia::{ColorU8, Pixmap};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::editor::{EditSession, begin_edit_session};
use crate::error::PipelineError;
use crate::font::FontBook;
use crate::geometry::{BoundingBox, classify_orientation, distribute_translated_text, fit_font_size};
use crate::raster::{self, PixelRect};
use crate::region::{Confidence, TextRegion};
use crate::registry::{ProcessingState, TargetId, TargetRegistry};
use crate::render;
use crate::services::{DetectedText, Services, TranslateRequest, with_timeout};
use crate::settings::{InpaintFallback, Settings, SettingsHub};

/// Result of one automatic run over an image.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub regions: Vec<TextRegion>,
    /// Text-free layer; seeds the working layer when the editor is reopened.
    pub inpainted: Pixmap,
    pub composited: Pixmap,
}

struct Draft {
    bbox: BoundingBox,
    rect: PixelRect,
    source: String,
    confidence: Confidence,
    background: Option<ColorU8>,
}

/// Detect, translate, inpaint and compose. Detection finding nothing is a
/// successful run with no regions; translation failures abort the run while
/// inpaint failures fall back per `settings.inpaint_fallback`.
pub async fn run_automatic_pipeline(
    image: &Pixmap,
    target_language: &str,
    services: &Services,
    settings: &Settings,
    fonts: &FontBook,
) -> Result<PipelineOutput, PipelineError> {
    let detected = services.detector.detect(image.clone()).await?;
    info!("detected {} text blocks", detected.len());
    if detected.is_empty() {
        return Ok(PipelineOutput {
            regions: Vec::new(),
            inpainted: image.clone(),
            composited: image.clone(),
        });
    }

    let drafts = prepare_drafts(image, detected);
    if drafts.is_empty() {
        warn!("no detected block had a usable polygon");
        return Ok(PipelineOutput {
            regions: Vec::new(),
            inpainted: image.clone(),
            composited: image.clone(),
        });
    }

    let translations = translate_drafts(&drafts, target_language, services, settings).await?;
    let regions = build_regions(&drafts, translations, settings);

    let inpainted = inpaint_regions(image, &drafts, services, settings).await;
    let composited = render::compose(image, &inpainted, &regions, fonts);
    Ok(PipelineOutput {
        regions,
        inpainted,
        composited,
    })
}

fn prepare_drafts(image: &Pixmap, detected: Vec<DetectedText>) -> Vec<Draft> {
    let (width, height) = (image.width(), image.height());
    detected
        .into_iter()
        .filter_map(|block| {
            let Some(bbox) = BoundingBox::from_polygon(&block.polygon) else {
                warn!("skipping text block with invalid polygon: {:?}", block.text);
                return None;
            };
            let bbox = bbox.clamp_to(width as f32, height as f32);
            let rect = PixelRect::from_box(&bbox, width, height)?;
            Some(Draft {
                bbox,
                rect,
                background: raster::average_color(image, rect),
                source: block.text,
                confidence: block.confidence,
            })
        })
        .collect()
}

async fn translate_drafts(
    drafts: &[Draft],
    target_language: &str,
    services: &Services,
    settings: &Settings,
) -> Result<Vec<String>, PipelineError> {
    if settings.joined_translation {
        let joined = drafts
            .iter()
            .map(|draft| draft.source.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let request = TranslateRequest {
            text: joined,
            target_language: target_language.to_string(),
            source_language: settings.source_language.clone(),
        };
        let translated = services.translator.translate(request).await?;
        let lengths: Vec<usize> = drafts
            .iter()
            .map(|draft| draft.source.chars().count())
            .collect();
        return Ok(distribute_translated_text(&translated, &lengths));
    }

    let parallel = settings.max_concurrent.max(1);
    let requests: Vec<TranslateRequest> = drafts
        .iter()
        .map(|draft| TranslateRequest {
            text: draft.source.clone(),
            target_language: target_language.to_string(),
            source_language: settings.source_language.clone(),
        })
        .collect();
    let results: Vec<Result<String, PipelineError>> = stream::iter(requests)
        .map(|request| services.translator.translate(request))
        .buffered(parallel)
        .collect()
        .await;
    results.into_iter().collect()
}

fn build_regions(
    drafts: &[Draft],
    translations: Vec<String>,
    settings: &Settings,
) -> Vec<TextRegion> {
    drafts
        .iter()
        .zip(translations)
        .enumerate()
        .map(|(idx, (draft, text))| {
            let mut style = settings.default_style.clone();
            style.font_size_px = fit_font_size(&text, &draft.bbox);
            if settings.auto_text_color
                && let Some(background) = draft.background
            {
                let fill = raster::contrasting_text_color(background);
                style.fill_color = fill.to_string();
                style.stroke_color = if fill == "#000000" {
                    "#ffffff".to_string()
                } else {
                    "#000000".to_string()
                };
            }
            TextRegion {
                id: idx as u64 + 1,
                bounding_box: draft.bbox,
                original_text: Some(draft.source.clone()),
                text,
                style,
                rotation_radians: 0.0,
                orientation: classify_orientation(&draft.bbox),
                confidence: draft.confidence,
            }
        })
        .collect()
}

async fn inpaint_regions(
    image: &Pixmap,
    drafts: &[Draft],
    services: &Services,
    settings: &Settings,
) -> Pixmap {
    let Some(mut mask) = Pixmap::new(image.width(), image.height()) else {
        return image.clone();
    };
    let white = ColorU8::from_rgba(255, 255, 255, 255);
    for draft in drafts {
        raster::fill_solid(&mut mask, draft.rect, white);
    }

    let call = services.inpainter.inpaint(image.clone(), mask);
    let failure = match with_timeout("inpaint", settings.inpaint_timeout, call).await {
        Ok(patch) if patch.width() == image.width() && patch.height() == image.height() => {
            return patch;
        }
        Ok(patch) => match raster::resize(&patch, image.width(), image.height()) {
            Ok(resized) => return resized,
            Err(err) => err.to_string(),
        },
        Err(err) => err.to_string(),
    };

    warn!("inpainting failed, using fallback: {failure}");
    let mut fallback = image.clone();
    if settings.inpaint_fallback == InpaintFallback::Fill {
        for draft in drafts {
            if let Some(color) = draft.background {
                raster::fill_solid(&mut fallback, draft.rect, color);
            }
        }
    }
    fallback
}

/// Runs pipelines for many targets, at most `max_concurrent` at a time, and
/// guards editor sessions per target.
#[derive(Clone)]
pub struct Orchestrator {
    services: Services,
    hub: SettingsHub,
    fonts: Arc<FontBook>,
    limiter: Arc<Semaphore>,
    capacity: Arc<Mutex<usize>>,
    registry: TargetRegistry,
}

impl Orchestrator {
    pub fn new(services: Services, hub: SettingsHub, fonts: Arc<FontBook>) -> Self {
        let permits = hub.current().max_concurrent.max(1);
        Self {
            services,
            hub,
            fonts,
            limiter: Arc::new(Semaphore::new(permits)),
            capacity: Arc::new(Mutex::new(permits)),
            registry: TargetRegistry::default(),
        }
    }

    /// Follows `max_concurrent` changes from the hub. Shrinking only takes
    /// idle permits; the rest are dropped on later calls once runs finish.
    fn sync_limit(&self) {
        let wanted = self.hub.current().max_concurrent.max(1);
        let mut capacity = self
            .capacity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if wanted > *capacity {
            self.limiter.add_permits(wanted - *capacity);
            *capacity = wanted;
        } else if wanted < *capacity {
            *capacity -= self.limiter.forget_permits(*capacity - wanted);
        }
        debug!("concurrency limit {} (target {wanted})", *capacity);
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SettingsHub {
        &self.hub
    }

    pub fn fonts(&self) -> Arc<FontBook> {
        self.fonts.clone()
    }

    pub fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Queues `image` behind the concurrency cap, then runs the automatic
    /// pipeline under the translate timeout.
    pub async fn translate_target(
        &self,
        id: &TargetId,
        image: Pixmap,
    ) -> Result<PipelineOutput, PipelineError> {
        self.registry.set(id, ProcessingState::Queued);
        self.sync_limit();
        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| PipelineError::service("orchestrator", err))?;
        self.registry.set(id, ProcessingState::Translating);

        let settings = self.hub.current();
        let limit = settings.translate_timeout;
        let run = run_automatic_pipeline(
            &image,
            &settings.target_language,
            &self.services,
            &settings,
            &self.fonts,
        );
        let result = match tokio::time::timeout(limit, run).await {
            Ok(result) => result,
            Err(_) => {
                warn!("translation of {id} timed out after {:.0}s", limit.as_secs_f32());
                Err(PipelineError::timeout("translate", limit))
            }
        };

        match &result {
            Ok(output) => {
                debug!("{id}: {} regions", output.regions.len());
                self.registry.set(id, ProcessingState::Translated);
            }
            Err(err) => {
                warn!("{id}: pipeline failed: {err}");
                self.registry.set(id, ProcessingState::Failed);
            }
        }
        result
    }

    /// Opens the only editor allowed on `id`. A previous automatic result
    /// restores its regions and text-free layer.
    pub fn open_editor(
        &self,
        id: &TargetId,
        image: Pixmap,
        previous: Option<(Pixmap, Vec<TextRegion>)>,
    ) -> Result<EditSession, PipelineError> {
        self.registry.begin_edit(id)?;
        let settings = self.hub.current();
        let session = match previous {
            Some((working, regions)) => {
                EditSession::reopen(image, working, regions, &settings, self.fonts.clone())
            }
            None => begin_edit_session(image, None, &settings, self.fonts.clone()),
        };
        if session.is_err() {
            self.registry.end_edit(id);
        }
        session
    }

    pub fn close_editor(&self, id: &TargetId, session: &mut EditSession) {
        session.close();
        self.registry.end_edit(id);
    }
}
