//! One send per track across a row of tracks, paged by send index

use super::{ControlValue, RangedValue, ValueSet};
use crate::error::{ensure_in_range, Result, SurfaceError};
use crate::reactive::{Observable, Subscription};
use crate::view::ScrollableWindow;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Value set over `sends[track][send]` where the page selects the send
///
/// The page mirrors a send cursor. Each set owns its cursor unless built
/// with [`SendsValueSet::sharing_cursor_with`], in which case moving either
/// set moves both.
pub struct SendsValueSet {
    values: Rc<ValueSet>,
    cursor: Rc<ScrollableWindow>,
    _links: Vec<Subscription>,
}

impl SendsValueSet {
    pub fn new(name: impl Into<String>, sends: Vec<Vec<Observable<u8>>>) -> Result<Self> {
        let name = name.into();
        let cursor = Rc::new(ScrollableWindow::new(format!("{}-cursor", name), 1)?);
        Self::build(name, sends, cursor)
    }

    /// Build a set that scrolls together with `other`
    pub fn sharing_cursor_with(
        name: impl Into<String>,
        other: &SendsValueSet,
        sends: Vec<Vec<Observable<u8>>>,
    ) -> Result<Self> {
        Self::build(name.into(), sends, Rc::clone(&other.cursor))
    }

    fn build(
        name: String,
        sends: Vec<Vec<Observable<u8>>>,
        cursor: Rc<ScrollableWindow>,
    ) -> Result<Self> {
        let tracks = sends.len();
        ensure_in_range(tracks, 1, usize::MAX, "tracks")?;
        let send_count = sends[0].len();
        if sends.iter().any(|track| track.len() != send_count) {
            return Err(SurfaceError::config(format!(
                "sends of '{}' differ in length between tracks",
                name
            )));
        }

        let cursor_total = cursor.total_items().get();
        if cursor_total == 0 {
            cursor.set_total_items(send_count);
        } else if cursor_total != send_count {
            return Err(SurfaceError::config(format!(
                "'{}' has {} sends, shared cursor has {}",
                name, send_count, cursor_total
            )));
        }

        let factory_name = name.clone();
        let values = ValueSet::with_len(name.clone(), tracks, tracks * send_count, move |index| {
            let (send, track) = (index / tracks, index % tracks);
            let cell = sends.get(track)?.get(send)?;
            let value: Rc<dyn ControlValue> = Rc::new(RangedValue::new(
                format!("{}-Send{}-Track{}", factory_name, send, track),
                cell,
            ));
            Some(value)
        })?;
        values.set_page(cursor.position().get());

        let weak_values: Weak<ValueSet> = Rc::downgrade(&values);
        let weak_cursor: Weak<ScrollableWindow> = Rc::downgrade(&cursor);

        let follow_cursor = {
            let weak_values = weak_values.clone();
            cursor.position().subscribe(move |position| {
                if let Some(values) = weak_values.upgrade() {
                    values.set_page(*position);
                }
            })
        };
        let drive_cursor = values.current_page().subscribe(move |page| {
            if let Some(cursor) = weak_cursor.upgrade() {
                cursor.scroll_to(*page);
            }
        });
        let follow_total = cursor.total_items().subscribe(move |total| {
            if let Some(values) = weak_values.upgrade() {
                values.set_len(tracks * total);
            }
        });

        debug!("Created sends value set '{}' ({} tracks x {} sends)", name, tracks, send_count);

        Ok(Self {
            values,
            cursor,
            _links: vec![follow_cursor, drive_cursor, follow_total],
        })
    }

    pub fn value_set(&self) -> &Rc<ValueSet> {
        &self.values
    }

    pub fn cursor(&self) -> &Rc<ScrollableWindow> {
        &self.cursor
    }

    /// Select the send shown on all tracks
    pub fn set_send(&self, send: usize) -> bool {
        self.values.set_page(send)
    }

    pub fn shares_cursor_with(&self, other: &SendsValueSet) -> bool {
        Rc::ptr_eq(&self.cursor, &other.cursor)
    }
}
