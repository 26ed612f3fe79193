//! Windowed views over external collections

mod matrix;
mod scrollable;
mod tracks;

pub use matrix::{LauncherSlot, MatrixView, Orientation, SlotState, MAX_SCENES};
pub use scrollable::ScrollableWindow;
pub use tracks::{TracksView, MAX_SENDS, MAX_TRACKS};
