//! Windowing over an externally sized collection

use crate::error::{ensure_in_range, Result};
use crate::reactive::{Observable, ReadOnly};
use std::ops::Range;
use tracing::trace;

/// A fixed-size window scrolling over `total` items
///
/// The position is always within `[0, total - window]` (or 0 when the
/// collection is smaller than the window).
pub struct ScrollableWindow {
    name: String,
    window: usize,
    position: Observable<usize>,
    total: Observable<usize>,
    can_move_back: Observable<bool>,
    can_move_forth: Observable<bool>,
}

impl ScrollableWindow {
    pub fn new(name: impl Into<String>, window: usize) -> Result<Self> {
        ensure_in_range(window, 1, usize::MAX, "window size")?;

        let position = Observable::new(0usize);
        let total = Observable::new(0usize);

        let p = position.clone();
        let can_move_back = Observable::computed(&[&position], move || p.get() > 0);

        let (p, t) = (position.clone(), total.clone());
        let can_move_forth = Observable::computed(&[&position, &total], move || {
            p.get() + window < t.get()
        });

        Ok(Self {
            name: name.into(),
            window,
            position,
            total,
            can_move_back,
            can_move_forth,
        })
    }

    pub fn with_total(self, total: usize) -> Self {
        self.set_total_items(total);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window_size(&self) -> usize {
        self.window
    }

    pub fn position(&self) -> ReadOnly<usize> {
        self.position.read_only()
    }

    pub fn total_items(&self) -> ReadOnly<usize> {
        self.total.read_only()
    }

    pub fn can_move_back(&self) -> ReadOnly<bool> {
        self.can_move_back.read_only()
    }

    pub fn can_move_forth(&self) -> ReadOnly<bool> {
        self.can_move_forth.read_only()
    }

    /// Highest valid position for the current total
    pub fn max_position(&self) -> usize {
        self.total.get().saturating_sub(self.window)
    }

    /// Indices of the items currently inside the window
    pub fn visible_range(&self) -> Range<usize> {
        let start = self.position.get();
        let end = (start + self.window).min(self.total.get().max(start));
        start..end
    }

    /// Push a new item count from the backing collection, re-clamping the position
    pub fn set_total_items(&self, total: usize) {
        let max = total.saturating_sub(self.window);
        // Clamp first so no observer sees a position beyond the new end
        if self.position.get() > max {
            self.position.set(max);
        }
        if self.total.set(total) {
            trace!("{}: total items = {}", self.name, total);
        }
    }

    /// Move to `position`, clamped; returns whether the position changed
    pub fn scroll_to(&self, position: usize) -> bool {
        let clamped = position.min(self.max_position());
        self.position.set(clamped)
    }

    fn scroll_by(&self, delta: isize) -> bool {
        let current = self.position.get();
        let target = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta as usize)
        };
        self.scroll_to(target)
    }

    pub fn move_forth(&self) -> bool {
        self.scroll_by(1)
    }

    pub fn move_back(&self) -> bool {
        self.scroll_by(-1)
    }

    pub fn move_page_forth(&self) -> bool {
        self.scroll_by(self.window as isize)
    }

    pub fn move_page_back(&self) -> bool {
        self.scroll_by(-(self.window as isize))
    }
}

impl std::fmt::Debug for ScrollableWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollableWindow")
            .field("name", &self.name)
            .field("window", &self.window)
            .field("position", &self.position.get())
            .field("total", &self.total.get())
            .finish()
    }
}
