use std::sync::Arc;
use std::time::Duration;
use tiny_skia::Pixmap;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::font::FontBook;
use crate::geometry::{BoundingBox, Point, TextMeasure, classify_orientation};
use crate::layout::{CopyButton, CopyKind, ROTATION_HANDLE_RADIUS, copy_buttons, layout_region};
use crate::raster::{self, PixelRect};
use crate::region::{Confidence, StylePatch, TextRegion, TextStyle, texts_report};
use crate::render;
use crate::services::{Inpainter, with_timeout};
use crate::settings::Settings;

mod brush;
mod caret;
mod history;
mod touch;

pub use brush::INPAINT_PADDING;
pub use caret::Caret;
pub(crate) use caret::caret_segment;
pub use history::DEFAULT_UNDO_DEPTH;
pub use touch::{SCROLL_THRESHOLD_PX, TOUCH_HOLD_MS};

use brush::BrushKind;
use history::{Snapshot, UndoHistory};
use touch::TouchGesture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorMode {
    #[default]
    AddText,
    Erase,
    Paint,
    InpaintMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerSource {
    #[default]
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
    pub source: PointerSource,
    pub time_ms: u64,
}

impl PointerEvent {
    pub fn mouse(kind: PointerKind, x: f32, y: f32) -> Self {
        Self {
            kind,
            x,
            y,
            source: PointerSource::Mouse,
            time_ms: 0,
        }
    }

    pub fn touch(kind: PointerKind, x: f32, y: f32, time_ms: u64) -> Self {
        Self {
            kind,
            x,
            y,
            source: PointerSource::Touch,
            time_ms,
        }
    }

    fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Crop of the composite and mask waiting to be inpainted.
#[derive(Clone)]
pub struct InpaintJob {
    pub ticket: u64,
    pub rect: PixelRect,
    pub image: Pixmap,
    pub mask: Pixmap,
}

impl std::fmt::Debug for InpaintJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InpaintJob")
            .field("ticket", &self.ticket)
            .field("rect", &self.rect)
            .finish()
    }
}

impl InpaintJob {
    pub async fn submit(
        &self,
        inpainter: &dyn Inpainter,
        limit: Duration,
    ) -> Result<Pixmap, PipelineError> {
        let call = inpainter.inpaint(self.image.clone(), self.mask.clone());
        with_timeout("inpaint", limit, call).await
    }
}

/// What the host has to do after an editor call.
#[derive(Debug, Clone)]
pub enum EditorEffect {
    None,
    Redraw,
    CopyText { kind: CopyKind, text: String },
    InpaintRequested(InpaintJob),
    Status(String),
}

impl EditorEffect {
    fn weight(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Redraw => 1,
            Self::Status(_) => 2,
            Self::CopyText { .. } | Self::InpaintRequested(_) => 3,
        }
    }

    fn merge(self, other: Self) -> Self {
        if other.weight() >= self.weight() {
            other
        } else {
            self
        }
    }
}

/// Result of accepting an edit: the flattened image plus what a cache needs to
/// reopen the session later.
pub struct AcceptedEdit {
    pub composite: Pixmap,
    pub working_layer: Pixmap,
    pub regions: Vec<TextRegion>,
}

#[derive(Debug, Clone, Copy)]
enum Gesture {
    Idle,
    Dragging { index: usize, offset: Point },
    Rotating {
        index: usize,
        start_rotation: f32,
        start_angle: f32,
    },
    Stroking { last: Point },
}

#[derive(Debug, Clone, Copy)]
struct PendingInpaint {
    ticket: u64,
    rect: PixelRect,
}

#[derive(Debug, Clone)]
struct Brushes {
    erase: f32,
    paint: f32,
    inpaint: f32,
    paint_color: String,
}

/// Mutable state of one open editor on one image.
pub struct EditSession {
    base_image: Pixmap,
    working_layer: Pixmap,
    mask: Pixmap,
    regions: Vec<TextRegion>,
    history: UndoHistory,
    mode: EditorMode,
    active: Option<usize>,
    flipped: bool,
    open: bool,
    fonts: Arc<FontBook>,
    default_style: TextStyle,
    brushes: Brushes,
    next_id: u64,
    gesture: Gesture,
    touch: TouchGesture,
    caret: Option<Caret>,
    caret_visible: bool,
    pending_inpaint: Option<PendingInpaint>,
    next_ticket: u64,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("regions", &self.regions.len())
            .field("active", &self.active)
            .field("flipped", &self.flipped)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

/// Opens an editor on `image`, optionally prefilled with regions from an
/// earlier automatic run.
pub fn begin_edit_session(
    image: Pixmap,
    existing: Option<Vec<TextRegion>>,
    settings: &Settings,
    fonts: Arc<FontBook>,
) -> Result<EditSession, PipelineError> {
    let working = Pixmap::new(image.width(), image.height())
        .ok_or_else(|| PipelineError::InvalidInput("image has zero size".to_string()))?;
    EditSession::reopen(image, working, existing.unwrap_or_default(), settings, fonts)
}

impl EditSession {
    /// Restores a session from a cached working layer and region list.
    pub fn reopen(
        base_image: Pixmap,
        working_layer: Pixmap,
        regions: Vec<TextRegion>,
        settings: &Settings,
        fonts: Arc<FontBook>,
    ) -> Result<Self, PipelineError> {
        if base_image.width() != working_layer.width()
            || base_image.height() != working_layer.height()
        {
            return Err(PipelineError::InvalidInput(format!(
                "working layer is {}x{} but image is {}x{}",
                working_layer.width(),
                working_layer.height(),
                base_image.width(),
                base_image.height()
            )));
        }
        let mask = Pixmap::new(base_image.width(), base_image.height())
            .ok_or_else(|| PipelineError::InvalidInput("image has zero size".to_string()))?;
        let next_id = regions.iter().map(|region| region.id).max().unwrap_or(0) + 1;
        debug!(
            "edit session opened: {}x{}, {} regions",
            base_image.width(),
            base_image.height(),
            regions.len()
        );
        Ok(Self {
            base_image,
            working_layer,
            mask,
            regions,
            history: UndoHistory::new(settings.undo_depth),
            mode: EditorMode::AddText,
            active: None,
            flipped: false,
            open: true,
            fonts,
            default_style: settings.default_style.clone(),
            brushes: Brushes {
                erase: settings.erase_brush_px,
                paint: settings.paint_brush_px,
                inpaint: settings.inpaint_brush_px,
                paint_color: settings.paint_color.clone(),
            },
            next_id,
            gesture: Gesture::Idle,
            touch: TouchGesture::default(),
            caret: None,
            caret_visible: true,
            pending_inpaint: None,
            next_ticket: 1,
        })
    }

    pub fn base_image(&self) -> &Pixmap {
        &self.base_image
    }

    pub fn working_layer(&self) -> &Pixmap {
        &self.working_layer
    }

    pub fn mask(&self) -> &Pixmap {
        &self.mask
    }

    pub fn regions(&self) -> &[TextRegion] {
        &self.regions
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    pub fn caret(&self) -> Option<Caret> {
        self.caret
    }

    pub fn caret_visible(&self) -> bool {
        self.caret_visible
    }

    pub fn set_caret_visible(&mut self, visible: bool) {
        self.caret_visible = visible;
    }

    pub fn default_style(&self) -> &TextStyle {
        &self.default_style
    }

    pub fn inpaint_in_flight(&self) -> bool {
        self.pending_inpaint.is_some()
    }

    /// True while a brush stroke is being drawn.
    pub fn is_stroking(&self) -> bool {
        matches!(self.gesture, Gesture::Stroking { .. })
    }

    pub fn set_mode(&mut self, mode: EditorMode) {
        if self.mode == mode {
            return;
        }
        debug!("editor mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.gesture = Gesture::Idle;
        self.touch.reset();
        if mode != EditorMode::AddText {
            self.caret = None;
        }
        if mode != EditorMode::InpaintMask {
            raster::clear(&mut self.mask);
        }
    }

    pub fn set_brush_size(&mut self, mode: EditorMode, diameter: f32) {
        let diameter = diameter.max(1.0);
        match mode {
            EditorMode::Erase => self.brushes.erase = diameter,
            EditorMode::Paint => self.brushes.paint = diameter,
            EditorMode::InpaintMask => self.brushes.inpaint = diameter,
            EditorMode::AddText => {}
        }
    }

    pub fn set_paint_color(&mut self, color: impl Into<String>) {
        self.brushes.paint_color = color.into();
    }

    /// Selection only; not recorded for undo.
    pub fn select(&mut self, index: Option<usize>) {
        self.active = index.filter(|idx| *idx < self.regions.len());
        if self.caret_region_index() != self.active {
            self.caret = None;
        }
    }

    pub fn toggle_flip(&mut self) -> bool {
        self.flipped = !self.flipped;
        self.gesture = Gesture::Idle;
        self.touch.reset();
        self.flipped
    }

    pub fn set_default_style(&mut self, patch: &StylePatch) {
        self.default_style.apply(patch);
    }

    pub fn export_regions(&self) -> Vec<TextRegion> {
        self.regions.clone()
    }

    pub fn texts_report(&self) -> String {
        texts_report(&self.regions)
    }

    pub fn render(&self) -> Pixmap {
        render::render(self)
    }

    pub fn render_preview(&self) -> Pixmap {
        render::render_preview(self)
    }

    fn record(&mut self) {
        self.history.push(Snapshot {
            working_layer: self.working_layer.clone(),
            regions: self.regions.clone(),
        });
    }

    /// Restores the state captured before the last mutation. Returns false
    /// when there is nothing left to undo.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        self.working_layer = snapshot.working_layer;
        self.regions = snapshot.regions;
        self.active = self.active.filter(|idx| *idx < self.regions.len());
        self.caret = None;
        self.gesture = Gesture::Idle;
        true
    }

    fn canvas_size(&self) -> (f32, f32) {
        (self.base_image.width() as f32, self.base_image.height() as f32)
    }

    fn index_of(&self, id: u64) -> Option<usize> {
        self.regions.iter().position(|region| region.id == id)
    }

    fn caret_region_index(&self) -> Option<usize> {
        self.caret.and_then(|caret| self.index_of(caret.region_id))
    }

    fn new_region(&mut self, at: Point, style: TextStyle) -> TextRegion {
        let id = self.next_id;
        self.next_id += 1;
        let height = style.line_height() + 2.0 * style.padding_px + style.stroke_width_px;
        let width = (style.font_size_px * 4.0).max(height);
        let bounding_box = BoundingBox::from_center(at, width, height);
        TextRegion {
            id,
            orientation: classify_orientation(&bounding_box),
            bounding_box,
            original_text: None,
            text: String::new(),
            style,
            rotation_radians: 0.0,
            confidence: Confidence::High,
        }
    }

    fn push_region(&mut self, region: TextRegion) -> usize {
        let id = region.id;
        self.regions.push(region);
        let index = self.regions.len() - 1;
        self.active = Some(index);
        self.caret = Some(Caret {
            region_id: id,
            index: self.regions[index].text.chars().count(),
        });
        index
    }

    /// Appends an empty region centred on `at`; it becomes active.
    pub fn add_region(&mut self, at: Point, style: Option<TextStyle>) -> usize {
        self.record();
        let style = style.unwrap_or_else(|| self.default_style.clone());
        let region = self.new_region(at, style);
        self.push_region(region)
    }

    /// Appends a fully specified region, assigning it a fresh id.
    pub fn insert_region(&mut self, mut region: TextRegion) -> usize {
        self.record();
        region.id = self.next_id;
        self.next_id += 1;
        self.push_region(region)
    }

    pub fn remove_region(&mut self, index: usize) -> Option<TextRegion> {
        if index >= self.regions.len() {
            return None;
        }
        self.record();
        let removed = self.regions.remove(index);
        self.active = match self.active {
            Some(active) if active == index => None,
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        if self.caret.is_some_and(|caret| caret.region_id == removed.id) {
            self.caret = None;
        }
        Some(removed)
    }

    /// Removes the active region and keeps the selection on the nearest
    /// remaining index.
    pub fn remove_active_region(&mut self) -> bool {
        let Some(index) = self.active else {
            return false;
        };
        if self.remove_region(index).is_none() {
            return false;
        }
        self.active = if self.regions.is_empty() {
            None
        } else {
            Some(index.min(self.regions.len() - 1))
        };
        true
    }

    pub fn move_region(&mut self, index: usize, dx: f32, dy: f32) -> bool {
        if index >= self.regions.len() {
            return false;
        }
        self.record();
        let region = &mut self.regions[index];
        region.bounding_box = region.bounding_box.translated(dx, dy);
        true
    }

    /// Rotates about the box centre.
    pub fn rotate_region(&mut self, index: usize, delta: f32) -> bool {
        if index >= self.regions.len() {
            return false;
        }
        self.record();
        self.regions[index].rotation_radians += delta;
        true
    }

    pub fn set_text(&mut self, index: usize, text: impl Into<String>) -> bool {
        if index >= self.regions.len() {
            return false;
        }
        self.record();
        self.regions[index].text = text.into();
        if let Some(caret) = self.caret.as_mut()
            && caret.region_id == self.regions[index].id
        {
            caret.index = caret.index.min(self.regions[index].text.chars().count());
        }
        self.grow_user_region(index);
        true
    }

    pub fn set_style(&mut self, index: usize, patch: &StylePatch) -> bool {
        if index >= self.regions.len() || patch.is_empty() {
            return false;
        }
        self.record();
        self.regions[index].style.apply(patch);
        true
    }

    /// Puts the caret at the end of the region's text.
    pub fn begin_text_edit(&mut self, index: usize) -> bool {
        let Some(region) = self.regions.get(index) else {
            return false;
        };
        let caret = Caret {
            region_id: region.id,
            index: region.text.chars().count(),
        };
        self.record();
        self.active = Some(index);
        self.caret = Some(caret);
        true
    }

    pub fn end_text_edit(&mut self) {
        self.caret = None;
    }

    pub fn insert_text(&mut self, insert: &str) -> bool {
        let Some(index) = self.caret_region_index() else {
            return false;
        };
        let Some(caret) = self.caret.as_mut() else {
            return false;
        };
        caret.index = caret::insert_at(&mut self.regions[index].text, caret.index, insert);
        self.grow_user_region(index);
        true
    }

    pub fn insert_newline(&mut self) -> bool {
        self.insert_text("\n")
    }

    pub fn delete_backward(&mut self) -> bool {
        let Some(index) = self.caret_region_index() else {
            return false;
        };
        let Some(caret) = self.caret.as_mut() else {
            return false;
        };
        match caret::delete_before(&mut self.regions[index].text, caret.index) {
            Some(next) => {
                caret.index = next;
                true
            }
            None => false,
        }
    }

    pub fn move_caret_left(&mut self) -> bool {
        match self.caret.as_mut() {
            Some(caret) if caret.index > 0 => {
                caret.index -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn move_caret_right(&mut self) -> bool {
        let Some(index) = self.caret_region_index() else {
            return false;
        };
        let len = self.regions[index].text.chars().count();
        match self.caret.as_mut() {
            Some(caret) if caret.index < len => {
                caret.index += 1;
                true
            }
            _ => false,
        }
    }

    /// User-added boxes widen around their centre to fit the longest line.
    fn grow_user_region(&mut self, index: usize) {
        let Some(region) = self.regions.get(index) else {
            return;
        };
        if !region.is_user_added() {
            return;
        }
        let style = &region.style;
        let measure = self.fonts.measure(&style.font_family);
        let widest = region
            .text
            .split('\n')
            .map(|line| measure.text_width(line, style.font_size_px))
            .fold(0.0, f32::max);
        let needed = widest + 2.0 * style.padding_px + style.stroke_width_px;
        let bbox = region.bounding_box;
        if needed > bbox.width() {
            let grown = BoundingBox::from_center(bbox.center(), needed, bbox.height());
            self.regions[index].bounding_box = grown;
        }
    }

    /// Dispatches a pointer event according to the current mode.
    pub fn apply_pointer_event(&mut self, event: PointerEvent) -> EditorEffect {
        if !self.open || self.flipped {
            return EditorEffect::None;
        }
        match event.source {
            PointerSource::Mouse => self.dispatch(event.kind, event.point()),
            PointerSource::Touch => {
                let point = event.point();
                let forwarded = match event.kind {
                    PointerKind::Down => self.touch.down(point, event.time_ms),
                    PointerKind::Move => self.touch.moved(point, event.time_ms),
                    PointerKind::Up | PointerKind::Leave => self.touch.up(point, event.time_ms),
                };
                self.dispatch_all(forwarded)
            }
        }
    }

    /// Fires a held touch once the hold delay has passed.
    pub fn poll_touch_hold(&mut self, now_ms: u64) -> EditorEffect {
        if !self.open || self.flipped {
            return EditorEffect::None;
        }
        let forwarded = self.touch.poll(now_ms);
        self.dispatch_all(forwarded)
    }

    fn dispatch_all(&mut self, events: Vec<(PointerKind, Point)>) -> EditorEffect {
        events
            .into_iter()
            .fold(EditorEffect::None, |effect, (kind, point)| {
                effect.merge(self.dispatch(kind, point))
            })
    }

    fn dispatch(&mut self, kind: PointerKind, point: Point) -> EditorEffect {
        match (self.mode, kind) {
            (EditorMode::AddText, PointerKind::Down) => self.text_pointer_down(point),
            (EditorMode::AddText, PointerKind::Move) => self.text_pointer_move(point),
            (EditorMode::AddText, PointerKind::Up | PointerKind::Leave) => {
                self.finish_gesture()
            }
            (_, PointerKind::Down) => self.stroke_begin(point),
            (_, PointerKind::Move) => self.stroke_continue(point),
            (_, PointerKind::Up | PointerKind::Leave) => self.stroke_end(),
        }
    }

    fn active_copy_buttons(&self) -> Vec<CopyButton> {
        let Some(region) = self.active.and_then(|idx| self.regions.get(idx)) else {
            return Vec::new();
        };
        let layout = layout_region(region, &self.fonts);
        let (width, height) = self.canvas_size();
        copy_buttons(region, &layout, width, height)
    }

    pub fn copy_button_layout(&self) -> Vec<CopyButton> {
        self.active_copy_buttons()
    }

    fn text_pointer_down(&mut self, point: Point) -> EditorEffect {
        if let Some(button) = self
            .active_copy_buttons()
            .into_iter()
            .find(|button| button.contains(point))
            && let Some(region) = self.active.and_then(|idx| self.regions.get(idx))
        {
            let text = match button.kind {
                CopyKind::Original => region.original_text.clone().unwrap_or_default(),
                CopyKind::Translated => region.text.replace('\n', " "),
            };
            return EditorEffect::CopyText {
                kind: button.kind,
                text,
            };
        }

        if let Some(index) = self.active
            && let Some(region) = self.regions.get(index)
        {
            let layout = layout_region(region, &self.fonts);
            if layout.rotation_handle().distance(point) <= ROTATION_HANDLE_RADIUS {
                let center = layout.center;
                let start_rotation = region.rotation_radians;
                self.record();
                self.caret = None;
                self.gesture = Gesture::Rotating {
                    index,
                    start_rotation,
                    start_angle: (point.y - center.y).atan2(point.x - center.x),
                };
                return EditorEffect::Redraw;
            }
        }

        let hit = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, region)| layout_region(region, &self.fonts).contains(point))
            .map(|(idx, _)| idx)
            .last();
        if let Some(index) = hit {
            let region = &self.regions[index];
            let layout = layout_region(region, &self.fonts);
            let measure = self.fonts.measure(&region.style.font_family);
            let caret_index = caret::caret_index_at(&layout, point, &measure);
            let center = region.bounding_box.center();
            let region_id = region.id;
            self.record();
            self.active = Some(index);
            self.caret = Some(Caret {
                region_id,
                index: caret_index,
            });
            self.gesture = Gesture::Dragging {
                index,
                offset: Point::new(point.x - center.x, point.y - center.y),
            };
            return EditorEffect::Redraw;
        }

        self.add_region(point, None);
        self.gesture = Gesture::Idle;
        EditorEffect::Redraw
    }

    fn text_pointer_move(&mut self, point: Point) -> EditorEffect {
        match self.gesture {
            Gesture::Dragging { index, offset } => {
                if let Some(region) = self.regions.get_mut(index) {
                    let center = Point::new(point.x - offset.x, point.y - offset.y);
                    region.bounding_box = region.bounding_box.recentered(center);
                    return EditorEffect::Redraw;
                }
                EditorEffect::None
            }
            Gesture::Rotating {
                index,
                start_rotation,
                start_angle,
            } => {
                if let Some(region) = self.regions.get_mut(index) {
                    let center = region.bounding_box.center();
                    let angle = (point.y - center.y).atan2(point.x - center.x);
                    region.rotation_radians = start_rotation + (angle - start_angle);
                    return EditorEffect::Redraw;
                }
                EditorEffect::None
            }
            Gesture::Idle | Gesture::Stroking { .. } => EditorEffect::None,
        }
    }

    fn finish_gesture(&mut self) -> EditorEffect {
        let was_active = !matches!(self.gesture, Gesture::Idle);
        self.gesture = Gesture::Idle;
        if was_active {
            EditorEffect::Redraw
        } else {
            EditorEffect::None
        }
    }

    fn brush_for_mode(&self) -> (BrushKind, f32) {
        match self.mode {
            EditorMode::Erase => (BrushKind::Erase, self.brushes.erase),
            EditorMode::Paint => (BrushKind::Paint, self.brushes.paint),
            EditorMode::InpaintMask | EditorMode::AddText => {
                (BrushKind::Mask, self.brushes.inpaint)
            }
        }
    }

    fn stroke_begin(&mut self, point: Point) -> EditorEffect {
        self.record();
        self.gesture = Gesture::Stroking { last: point };
        self.stamp(None, point);
        EditorEffect::Redraw
    }

    fn stroke_continue(&mut self, point: Point) -> EditorEffect {
        let Gesture::Stroking { last } = self.gesture else {
            return EditorEffect::None;
        };
        self.stamp(Some(last), point);
        self.gesture = Gesture::Stroking { last: point };
        EditorEffect::Redraw
    }

    fn stamp(&mut self, from: Option<Point>, to: Point) {
        let (kind, diameter) = self.brush_for_mode();
        let color = raster::parse_color(&self.brushes.paint_color)
            .unwrap_or(tiny_skia::Color::WHITE);
        let paint = brush::brush_paint(kind, color);
        match kind {
            BrushKind::Mask => brush::stamp(&mut self.mask, from, to, diameter, &paint),
            BrushKind::Erase | BrushKind::Paint => {
                brush::stamp(&mut self.working_layer, from, to, diameter, &paint)
            }
        }
        if kind == BrushKind::Erase {
            let radius = diameter * 0.5;
            let samples = match from {
                Some(from) => brush::sample_segment(from, to, (radius * 0.5).max(1.0)),
                None => vec![to],
            };
            let active_id = self.active.and_then(|idx| self.regions.get(idx)).map(|r| r.id);
            let removed = brush::remove_regions_under(&mut self.regions, &samples, radius);
            if !removed.is_empty() {
                debug!("erase removed {} regions", removed.len());
                self.active = active_id.and_then(|id| self.index_of(id));
                if self
                    .caret
                    .is_some_and(|caret| removed.contains(&caret.region_id))
                {
                    self.caret = None;
                }
            }
        }
    }

    fn stroke_end(&mut self) -> EditorEffect {
        if !matches!(self.gesture, Gesture::Stroking { .. }) {
            return EditorEffect::None;
        }
        self.gesture = Gesture::Idle;
        if self.mode == EditorMode::InpaintMask {
            return self.request_inpaint();
        }
        EditorEffect::Redraw
    }

    /// Turns the painted mask into an inpaint job. An empty mask is a no-op.
    pub fn request_inpaint(&mut self) -> EditorEffect {
        let Some(bounds) = raster::alpha_bounds(&self.mask) else {
            return EditorEffect::None;
        };
        if self.pending_inpaint.is_some() {
            raster::clear(&mut self.mask);
            let err = PipelineError::ConcurrencyGuardRejected(
                "an inpaint request is already running".to_string(),
            );
            info!("{err}");
            return EditorEffect::Redraw;
        }

        let (width, height) = (self.base_image.width(), self.base_image.height());
        let rect = bounds.padded(INPAINT_PADDING, width, height);
        if rect.width < 2 || rect.height < 2 {
            raster::clear(&mut self.mask);
            let err = PipelineError::InvalidInput(format!(
                "mask area {}x{} is too small",
                rect.width, rect.height
            ));
            warn!("{err}");
            return EditorEffect::Status(err.to_string());
        }

        let composite = render::flatten_layers(&self.base_image, &self.working_layer);
        let (Some(image), Some(mask)) = (
            raster::crop(&composite, rect),
            raster::crop(&self.mask, rect),
        ) else {
            raster::clear(&mut self.mask);
            return EditorEffect::Status("could not crop the masked area".to_string());
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending_inpaint = Some(PendingInpaint { ticket, rect });
        raster::clear(&mut self.mask);
        debug!(
            "inpaint job {ticket}: {}x{} at ({}, {})",
            rect.width, rect.height, rect.x, rect.y
        );
        EditorEffect::InpaintRequested(InpaintJob {
            ticket,
            rect,
            image,
            mask,
        })
    }

    /// Applies the outcome of an inpaint job. Results for a closed session or
    /// a stale ticket are dropped.
    pub fn complete_inpaint(
        &mut self,
        ticket: u64,
        result: Result<Pixmap, PipelineError>,
    ) -> EditorEffect {
        if !self.open {
            debug!("inpaint result {ticket} discarded: session closed");
            return EditorEffect::None;
        }
        let Some(pending) = self.pending_inpaint.filter(|pending| pending.ticket == ticket) else {
            debug!("inpaint result {ticket} discarded: not in flight");
            return EditorEffect::None;
        };
        self.pending_inpaint = None;
        match result {
            Ok(patch) => match raster::splice(&mut self.working_layer, &patch, pending.rect) {
                Ok(()) => EditorEffect::Redraw,
                Err(err) => {
                    warn!("inpaint patch rejected: {err:#}");
                    EditorEffect::Status("Inpainting failed".to_string())
                }
            },
            Err(err) => {
                warn!("inpaint failed, keeping original crop: {err}");
                EditorEffect::Status(format!("Inpainting failed: {err}"))
            }
        }
    }

    /// Flattens the edit, closes the session and hands back what to cache.
    pub fn accept(&mut self) -> Result<AcceptedEdit, PipelineError> {
        if !self.open {
            return Err(PipelineError::InvalidInput(
                "edit session is closed".to_string(),
            ));
        }
        let composite = render::compose(
            &self.base_image,
            &self.working_layer,
            &self.regions,
            &self.fonts,
        );
        self.close();
        Ok(AcceptedEdit {
            composite,
            working_layer: self.working_layer.clone(),
            regions: self.regions.clone(),
        })
    }

    pub fn close(&mut self) {
        if self.open {
            debug!("edit session closed");
        }
        self.open = false;
        self.pending_inpaint = None;
        self.gesture = Gesture::Idle;
        self.touch.reset();
        self.caret = None;
        raster::clear(&mut self.mask);
        self.history.clear();
    }
}
