#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use overlay_translator_rust::PipelineError;
use overlay_translator_rust::geometry::{BoundingBox, Orientation, Point};
use overlay_translator_rust::region::{Confidence, TextRegion, TextStyle};
use overlay_translator_rust::services::{
    DetectedText, Detector, Inpainter, ServiceFuture, TextTranslator, TranslateRequest,
};
use tiny_skia::{Color, Pixmap};

pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Pixmap {
    let mut pixmap = Pixmap::new(width, height).expect("pixmap");
    pixmap.fill(Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
    pixmap
}

pub fn region(id: u64, x0: f32, y0: f32, x1: f32, y1: f32, text: &str) -> TextRegion {
    let bounding_box = BoundingBox::new(x0, y0, x1, y1);
    TextRegion {
        id,
        bounding_box,
        original_text: Some(format!("source {id}")),
        text: text.to_string(),
        style: TextStyle::default(),
        rotation_radians: 0.0,
        orientation: Orientation::Horizontal,
        confidence: Confidence::High,
    }
}

pub fn rect_block(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> DetectedText {
    DetectedText {
        text: text.to_string(),
        polygon: vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ],
        confidence: Confidence::High,
    }
}

/// In-process stand-in for the detect/translate/inpaint backend.
#[derive(Default)]
pub struct FakeBackend {
    pub blocks: Vec<DetectedText>,
    pub translation: Option<String>,
    pub fail_translate: bool,
    pub translate_calls: AtomicUsize,
    pub inpaint_calls: AtomicUsize,
    pub requests: Mutex<Vec<TranslateRequest>>,
}

impl FakeBackend {
    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn inpaint_calls(&self) -> usize {
        self.inpaint_calls.load(Ordering::SeqCst)
    }
}

impl Detector for FakeBackend {
    fn detect(&self, _image: Pixmap) -> ServiceFuture<Vec<DetectedText>> {
        let blocks = self.blocks.clone();
        Box::pin(async move { Ok(blocks) })
    }
}

impl TextTranslator for FakeBackend {
    fn translate(&self, request: TranslateRequest) -> ServiceFuture<String> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("lock").push(request.clone());
        if self.fail_translate {
            return Box::pin(async { Err(PipelineError::service("translate", "HTTP 502")) });
        }
        let text = self
            .translation
            .clone()
            .unwrap_or_else(|| format!("{}:{}", request.target_language, request.text));
        Box::pin(async move { Ok(text) })
    }
}

impl Inpainter for FakeBackend {
    fn inpaint(&self, image: Pixmap, _mask: Pixmap) -> ServiceFuture<Pixmap> {
        self.inpaint_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(image) })
    }
}
