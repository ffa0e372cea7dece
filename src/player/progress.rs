use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Playback positions for feed indices near the current item.
///
/// Only indices in `[current - window, current + window]` are kept, so the
/// tracker never holds more than `2 * window + 1` entries.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    current_index: usize,
    window: usize,
    positions: BTreeMap<usize, Duration>,
}

impl ProgressTracker {
    pub fn new(window: usize) -> Self {
        Self {
            current_index: 0,
            window,
            positions: BTreeMap::new(),
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Re-center the window and drop positions that fell out of it
    pub fn set_current_index(&mut self, index: usize) {
        if index == self.current_index {
            return;
        }
        self.current_index = index;

        let before = self.positions.len();
        let (low, high) = self.bounds();
        self.positions.retain(|i, _| (low..=high).contains(i));
        trace!(
            "Progress window now [{}, {}], purged {} entries",
            low,
            high,
            before - self.positions.len()
        );
    }

    pub fn in_window(&self, index: usize) -> bool {
        let (low, high) = self.bounds();
        (low..=high).contains(&index)
    }

    /// Store a position. Indices outside the window are ignored.
    pub fn record(&mut self, index: usize, position: Duration) -> bool {
        if !self.in_window(index) {
            return false;
        }
        self.positions.insert(index, position);
        true
    }

    pub fn get(&self, index: usize) -> Option<Duration> {
        self.positions.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn bounds(&self) -> (usize, usize) {
        (
            self.current_index.saturating_sub(self.window),
            self.current_index.saturating_add(self.window),
        )
    }
}
