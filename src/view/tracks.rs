//! Channel-axis view over a track bank

use super::ScrollableWindow;
use crate::error::{ensure_in_range, Result};
use crate::reactive::ReadOnly;

pub const MAX_TRACKS: usize = 128;
pub const MAX_SENDS: usize = 16;

/// Windowed view over an external bank of tracks
pub struct TracksView {
    name: String,
    num_tracks: usize,
    num_sends: usize,
    channels: ScrollableWindow,
}

impl TracksView {
    pub fn new(name: impl Into<String>, num_tracks: usize, num_sends: usize) -> Result<Self> {
        let name = name.into();
        ensure_in_range(num_tracks, 1, MAX_TRACKS, "tracks")?;
        ensure_in_range(num_sends, 0, MAX_SENDS, "sends")?;
        let channels = ScrollableWindow::new(format!("{}-channels", name), num_tracks)?;
        Ok(Self {
            name,
            num_tracks,
            num_sends,
            channels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    pub fn num_sends(&self) -> usize {
        self.num_sends
    }

    pub fn channels(&self) -> &ScrollableWindow {
        &self.channels
    }

    /// Push the bank's total track count
    pub fn set_total_tracks(&self, total: usize) {
        self.channels.set_total_items(total);
    }

    pub fn channel_position(&self) -> ReadOnly<usize> {
        self.channels.position()
    }

    pub fn can_move_channel_back(&self) -> ReadOnly<bool> {
        self.channels.can_move_back()
    }

    pub fn can_move_channel_forth(&self) -> ReadOnly<bool> {
        self.channels.can_move_forth()
    }

    pub fn move_channel_back(&self) -> bool {
        self.channels.move_back()
    }

    pub fn move_channel_forth(&self) -> bool {
        self.channels.move_forth()
    }

    pub fn move_channel_page_back(&self) -> bool {
        self.channels.move_page_back()
    }

    pub fn move_channel_page_forth(&self) -> bool {
        self.channels.move_page_forth()
    }
}
