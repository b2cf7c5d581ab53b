use anyhow::{Result, anyhow};
use std::time::Duration;
use tiny_skia::{Pixmap, PixmapPaint, Transform};
use tracing::{debug, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(150);

/// What the driver should ask the host to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStep {
    ScrollTo(u32),
    Capture,
    Done,
    Failed(String),
}

/// A page that can be scrolled and captured one viewport at a time.
pub trait CaptureHost {
    /// Scrolls to `offset` and reports where the page actually ended up.
    fn scroll_to(&mut self, offset: u32) -> u32;
    fn capture(&mut self) -> Result<Pixmap>;
}

/// Step sequence for capturing a page taller than the viewport: scroll,
/// capture, advance by one viewport, repeat. A scroll that lands elsewhere
/// is retried a bounded number of times before the capture fails.
#[derive(Debug)]
pub struct ScrollAndCapture {
    total_height: u32,
    viewport_height: u32,
    target_offset: u32,
    current_offset: Option<u32>,
    captured_height: u32,
    retries: u32,
    max_retries: u32,
    strips: Vec<(u32, Pixmap)>,
    step: CaptureStep,
}

impl ScrollAndCapture {
    pub fn new(total_height: u32, viewport_height: u32, max_retries: u32) -> Self {
        let step = if total_height == 0 || viewport_height == 0 {
            CaptureStep::Failed("page or viewport has zero height".to_string())
        } else {
            CaptureStep::ScrollTo(0)
        };
        Self {
            total_height,
            viewport_height,
            target_offset: 0,
            current_offset: None,
            captured_height: 0,
            retries: 0,
            max_retries,
            strips: Vec::new(),
            step,
        }
    }

    pub fn step(&self) -> &CaptureStep {
        &self.step
    }

    pub fn target_offset(&self) -> u32 {
        self.target_offset
    }

    pub fn captured_height(&self) -> u32 {
        self.captured_height
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn on_scrolled(&mut self, actual: u32) {
        if !matches!(self.step, CaptureStep::ScrollTo(_)) {
            return;
        }
        if actual == self.target_offset {
            self.retries = 0;
            self.current_offset = Some(actual);
            self.step = CaptureStep::Capture;
            return;
        }
        self.retries += 1;
        if self.retries > self.max_retries {
            warn!(
                "scroll stuck at {actual}, wanted {} after {} retries",
                self.target_offset, self.max_retries
            );
            self.step = CaptureStep::Failed(format!(
                "could not scroll to offset {} (stuck at {actual})",
                self.target_offset
            ));
        } else {
            debug!("scroll landed at {actual}, retrying {}", self.target_offset);
            self.step = CaptureStep::ScrollTo(self.target_offset);
        }
    }

    pub fn on_captured(&mut self, strip: Pixmap) {
        if self.step != CaptureStep::Capture {
            return;
        }
        let offset = self.current_offset.unwrap_or(self.target_offset);
        self.captured_height = (offset + strip.height()).min(self.total_height);
        self.strips.push((offset, strip));

        if self.captured_height >= self.total_height {
            self.step = CaptureStep::Done;
            return;
        }
        // The last viewport is pinned to the bottom of the page.
        let max_offset = self.total_height.saturating_sub(self.viewport_height);
        let next = self.captured_height.min(max_offset);
        if next <= offset {
            self.step = CaptureStep::Failed(format!(
                "capture at offset {offset} made no progress"
            ));
            return;
        }
        self.target_offset = next;
        self.step = CaptureStep::ScrollTo(next);
    }

    pub fn on_capture_failed(&mut self, reason: impl Into<String>) {
        self.step = CaptureStep::Failed(reason.into());
    }

    /// Draws every strip at its offset into one raster of the page height.
    pub fn stitch(&self) -> Result<Pixmap> {
        if self.step != CaptureStep::Done {
            return Err(anyhow!("capture is not finished: {:?}", self.step));
        }
        let width = self
            .strips
            .iter()
            .map(|(_, strip)| strip.width())
            .max()
            .unwrap_or(0);
        let mut page = Pixmap::new(width, self.total_height)
            .ok_or_else(|| anyhow!("invalid page size {width}x{}", self.total_height))?;
        for (offset, strip) in &self.strips {
            page.draw_pixmap(
                0,
                *offset as i32,
                strip.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
        Ok(page)
    }
}

/// Drives `host` through the whole capture and returns the stitched page.
pub async fn capture_full_page<H: CaptureHost>(
    host: &mut H,
    total_height: u32,
    viewport_height: u32,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<Pixmap> {
    let mut machine = ScrollAndCapture::new(total_height, viewport_height, max_retries);
    loop {
        match machine.step().clone() {
            CaptureStep::ScrollTo(offset) => {
                if machine.retries() > 0 {
                    tokio::time::sleep(retry_delay).await;
                }
                let actual = host.scroll_to(offset);
                machine.on_scrolled(actual);
            }
            CaptureStep::Capture => match host.capture() {
                Ok(strip) => machine.on_captured(strip),
                Err(err) => machine.on_capture_failed(err.to_string()),
            },
            CaptureStep::Done => return machine.stitch(),
            CaptureStep::Failed(reason) => return Err(anyhow!(reason)),
        }
    }
}
