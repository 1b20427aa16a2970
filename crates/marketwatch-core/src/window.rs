//! Playback windows: bounded block ranges requested during catch-up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive block range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackWindow {
    pub from: u64,
    pub to: u64,
}

impl PlaybackWindow {
    /// Number of blocks covered.
    pub fn block_count(&self) -> u64 {
        self.to - self.from + 1
    }
}

impl fmt::Display for PlaybackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Walks `[start, end]` in windows of at most `size` blocks.
///
/// The size can be reduced mid-walk; the next window then starts at the same
/// block with the smaller size.
#[derive(Debug, Clone)]
pub struct WindowCursor {
    next: u64,
    end: u64,
    size: u64,
}

impl WindowCursor {
    /// A `size` of 0 is treated as 1.
    pub fn new(start: u64, end: u64, size: u64) -> Self {
        Self {
            next: start,
            end,
            size: size.max(1),
        }
    }

    /// The window to fetch next, or `None` once the range is exhausted.
    pub fn peek(&self) -> Option<PlaybackWindow> {
        if self.next > self.end {
            return None;
        }
        let to = self.next.saturating_add(self.size - 1).min(self.end);
        Some(PlaybackWindow { from: self.next, to })
    }

    /// Mark `window` done and move past it.
    pub fn complete(&mut self, window: PlaybackWindow) {
        self.next = window.to.saturating_add(1);
    }

    /// Halve the window size, never going below `floor`. Returns `false` if
    /// the size was already at the floor.
    pub fn shrink(&mut self, floor: u64) -> bool {
        let floor = floor.max(1);
        if self.size <= floor {
            return false;
        }
        self.size = (self.size / 2).max(floor);
        true
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Extend the walk to a new end (used when the head moved on).
    pub fn extend_to(&mut self, end: u64) {
        self.end = self.end.max(end);
    }
}
