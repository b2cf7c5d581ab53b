use crate::geometry::Point;

use super::PointerKind;

/// Movement beyond this many pixels before the hold delay means a scroll.
pub const SCROLL_THRESHOLD_PX: f32 = 10.0;
pub const TOUCH_HOLD_MS: u64 = 50;

/// Separates touch drawing/dragging from page scrolling. A touch only turns
/// into pointer input once it has been held for [`TOUCH_HOLD_MS`] without
/// drifting past [`SCROLL_THRESHOLD_PX`].
#[derive(Debug, Default)]
pub(crate) struct TouchGesture {
    pending: Option<(Point, u64)>,
    engaged: bool,
}

impl TouchGesture {
    pub fn down(&mut self, point: Point, time_ms: u64) -> Vec<(PointerKind, Point)> {
        self.pending = Some((point, time_ms));
        self.engaged = false;
        Vec::new()
    }

    pub fn moved(&mut self, point: Point, time_ms: u64) -> Vec<(PointerKind, Point)> {
        if self.engaged {
            return vec![(PointerKind::Move, point)];
        }
        let Some((start, started_at)) = self.pending else {
            return Vec::new();
        };
        if time_ms.saturating_sub(started_at) >= TOUCH_HOLD_MS {
            self.engaged = true;
            self.pending = None;
            return vec![(PointerKind::Down, start), (PointerKind::Move, point)];
        }
        if start.distance(point) > SCROLL_THRESHOLD_PX {
            self.reset();
        }
        Vec::new()
    }

    pub fn up(&mut self, point: Point, time_ms: u64) -> Vec<(PointerKind, Point)> {
        let events = if self.engaged {
            vec![(PointerKind::Up, point)]
        } else {
            match self.pending {
                Some((start, started_at))
                    if time_ms.saturating_sub(started_at) >= TOUCH_HOLD_MS =>
                {
                    vec![(PointerKind::Down, start), (PointerKind::Up, point)]
                }
                _ => Vec::new(),
            }
        };
        self.reset();
        events
    }

    /// Timer hook: engages a pending touch once the hold delay elapsed.
    pub fn poll(&mut self, now_ms: u64) -> Vec<(PointerKind, Point)> {
        match self.pending {
            Some((start, started_at))
                if !self.engaged && now_ms.saturating_sub(started_at) >= TOUCH_HOLD_MS =>
            {
                self.engaged = true;
                self.pending = None;
                vec![(PointerKind::Down, start)]
            }
            _ => Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.engaged = false;
    }
}
