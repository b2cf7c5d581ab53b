use std::collections::VecDeque;
use tiny_skia::Pixmap;

use crate::region::TextRegion;

pub const DEFAULT_UNDO_DEPTH: usize = 15;

/// Full copy of the mutable session state taken before a mutation.
#[derive(Clone)]
pub(crate) struct Snapshot {
    pub working_layer: Pixmap,
    pub regions: Vec<TextRegion>,
}

/// Bounded undo stack; the oldest snapshot is evicted on overflow.
pub(crate) struct UndoHistory {
    entries: VecDeque<Snapshot>,
    limit: usize,
}

impl UndoHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<Snapshot> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(marker: usize) -> Snapshot {
        Snapshot {
            working_layer: Pixmap::new(marker as u32 + 1, 1).expect("pixmap"),
            regions: Vec::new(),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = UndoHistory::new(3);
        for marker in 0..5 {
            history.push(snapshot(marker));
        }
        assert_eq!(history.len(), 3);
        let widths: Vec<u32> = std::iter::from_fn(|| history.pop())
            .map(|entry| entry.working_layer.width())
            .collect();
        assert_eq!(widths, vec![5, 4, 3]);
        assert!(history.pop().is_none());
    }

    #[test]
    fn zero_limit_still_keeps_one() {
        let mut history = UndoHistory::new(0);
        history.push(snapshot(0));
        history.push(snapshot(1));
        assert_eq!(history.len(), 1);
    }
}
