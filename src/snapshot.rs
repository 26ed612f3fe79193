//! Bank/preset snapshot slots with program change output
//!
//! A snapshot is the composite `(bank << 8) | preset`. Up to
//! [`TOTAL_SNAPSHOTS`] snapshots can be stored in sparse slots, laid out as
//! [`SNAPSHOT_PAGES`] pages of [`SNAPSHOTS_PER_PAGE`] pads. Every change of
//! the current snapshot, including re-loading the same one, is announced as
//! bank select plus program change messages.

use crate::error::Result;
use crate::gesture::Gesture;
use crate::midi::MidiMessage;
use crate::prefs::Preferences;
use crate::reactive::{Observable, ReadOnly, Subscription};
use crate::value::{ControlValue, SyncedValue, ValueSet};
use std::cell::Cell;
use std::rc::{Rc, Weak};
use tracing::debug;

pub const SNAPSHOT_PAGES: usize = 8;
pub const SNAPSHOTS_PER_PAGE: usize = 16;
pub const TOTAL_SNAPSHOTS: usize = SNAPSHOT_PAGES * SNAPSHOTS_PER_PAGE;

/// Bank and preset numbers are 7-bit on the wire
const MAX_BANK_OR_PRESET: u8 = 127;

pub const SEND_BANK_MSB: &str = "send_bank_msb";
pub const RESET_PRESET_ON_BANK_CHANGE: &str = "reset_preset_on_bank_change";
pub const PROGRAM_CHANGE_CHANNEL: &str = "program_change_channel";

/// Pad feedback for the three slot states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadColors {
    pub empty: u8,
    pub saved: u8,
    pub active: u8,
}

impl Default for PadColors {
    fn default() -> Self {
        Self {
            empty: 0,
            saved: 1,
            active: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFill {
    Empty,
    Saved,
    /// Saved and equal to the current snapshot
    Active,
}

pub struct SnapshotBank {
    snapshot: Observable<u16>,
    bank: Observable<u8>,
    preset: Observable<u8>,
    slots: Observable<Vec<Option<u16>>>,
    displayed_page: Observable<usize>,
    last_clicked: Cell<usize>,
    send_bank_msb: Observable<bool>,
    reset_preset_on_bank_change: Observable<bool>,
    channel: Observable<f64>,
}

impl SnapshotBank {
    /// Declares its settings in `prefs`
    pub fn new(prefs: &Preferences) -> Result<Rc<Self>> {
        let snapshot = Observable::new(0u16);
        let bank = snapshot.map(|s| (s >> 8) as u8);
        let preset = snapshot.map(|s| (s & 0xff) as u8);
        Ok(Rc::new(Self {
            snapshot,
            bank,
            preset,
            slots: Observable::new(vec![None; TOTAL_SNAPSHOTS]),
            displayed_page: Observable::new(0),
            last_clicked: Cell::new(0),
            send_bank_msb: prefs.bool_setting(SEND_BANK_MSB, false)?,
            reset_preset_on_bank_change: prefs.bool_setting(RESET_PRESET_ON_BANK_CHANGE, true)?,
            channel: prefs.number_setting(PROGRAM_CHANGE_CHANNEL, 0.0, 15.0, 0.0)?,
        }))
    }

    pub fn snapshot(&self) -> ReadOnly<u16> {
        self.snapshot.read_only()
    }

    pub fn bank(&self) -> ReadOnly<u8> {
        self.bank.read_only()
    }

    pub fn preset(&self) -> ReadOnly<u8> {
        self.preset.read_only()
    }

    /// Set the current snapshot; listeners are notified even if unchanged
    pub fn set_snapshot(&self, snapshot: u16) {
        self.snapshot.set_always(snapshot);
    }

    /// Select a bank, resetting the preset to 0 unless configured otherwise
    pub fn set_bank(&self, bank: u8) {
        let bank = bank.min(MAX_BANK_OR_PRESET) as u16;
        let preset = if self.reset_preset_on_bank_change.get() {
            0
        } else {
            self.preset.get() as u16
        };
        self.set_snapshot((bank << 8) + preset);
    }

    /// Select a preset within the current bank
    pub fn set_preset(&self, preset: u8) {
        let preset = preset.min(MAX_BANK_OR_PRESET) as u16;
        self.set_snapshot((self.snapshot.get() & 0xff00) + preset);
    }

    /// Relative change from an encoder turn, limited to 0-127
    pub fn nudge_bank(&self, delta: i32) {
        self.set_bank(limit(self.bank.get(), delta));
    }

    pub fn nudge_preset(&self, delta: i32) {
        self.set_preset(limit(self.preset.get(), delta));
    }

    pub fn displayed_page(&self) -> &Observable<usize> {
        &self.displayed_page
    }

    pub fn slot(&self, index: usize) -> Option<u16> {
        self.slots.with(|slots| slots.get(index).copied().flatten())
    }

    pub fn saved_count(&self) -> usize {
        self.slots.with(|slots| slots.iter().flatten().count())
    }

    pub fn slot_fill(&self, index: usize) -> SlotFill {
        match self.slot(index) {
            None => SlotFill::Empty,
            Some(s) if s == self.snapshot.get() => SlotFill::Active,
            Some(_) => SlotFill::Saved,
        }
    }

    /// Store the current snapshot in slot `index`
    pub fn save(&self, index: usize) -> bool {
        if index >= TOTAL_SNAPSHOTS {
            return false;
        }
        let current = self.snapshot.get();
        self.last_clicked.set(index);
        self.slots.modify(|slots| slots[index] = Some(current));
        debug!("Saved snapshot {:04x} in slot {}", current, index);
        true
    }

    /// Load slot `index`; returns false if it is empty
    pub fn load(&self, index: usize) -> bool {
        if index >= TOTAL_SNAPSHOTS {
            return false;
        }
        self.last_clicked.set(index);
        match self.slot(index) {
            Some(snapshot) => {
                self.set_snapshot(snapshot);
                debug!("Loaded snapshot {:04x} from slot {}", snapshot, index);
                true
            }
            None => {
                debug!("No snapshot in slot {}", index);
                false
            }
        }
    }

    /// Pad click on the displayed page: save while `save` is held, else load
    pub fn click_pad(&self, pad: usize, save: bool) -> bool {
        let index = self.displayed_page.get() * SNAPSHOTS_PER_PAGE + pad;
        if save {
            self.save(index)
        } else {
            self.load(index)
        }
    }

    /// Load the nearest saved snapshot after (`direction > 0`) or before the
    /// last clicked slot, wrapping around and skipping slots that hold the
    /// current snapshot
    pub fn load_next_or_prev(&self, direction: i32) -> bool {
        if direction == 0 {
            return false;
        }
        let current = self.snapshot.get();
        let start = self.last_clicked.get();
        let found = (1..TOTAL_SNAPSHOTS)
            .map(|step| {
                if direction > 0 {
                    (start + step) % TOTAL_SNAPSHOTS
                } else {
                    (start + TOTAL_SNAPSHOTS - step) % TOTAL_SNAPSHOTS
                }
            })
            .find_map(|index| match self.slot(index) {
                Some(s) if s != current => Some((index, s)),
                _ => None,
            });

        let Some((index, snapshot)) = found else {
            debug!("No other snapshot found");
            return false;
        };
        self.last_clicked.set(index);
        self.set_snapshot(snapshot);
        self.displayed_page.set(index / SNAPSHOTS_PER_PAGE);
        true
    }

    fn program_change_channel(&self) -> u8 {
        self.channel.get().clamp(0.0, 15.0) as u8
    }

    /// Bank select (optional MSB, then LSB) followed by program change
    pub fn program_change_messages(&self, snapshot: u16) -> Vec<MidiMessage> {
        let channel = self.program_change_channel();
        let bank = (snapshot >> 8) as u8;
        let preset = (snapshot & 0xff) as u8;
        let mut messages = Vec::with_capacity(3);
        if self.send_bank_msb.get() {
            messages.push(MidiMessage::ControlChange { channel, cc: 0, value: 0 });
        }
        messages.push(MidiMessage::ControlChange { channel, cc: 32, value: bank });
        messages.push(MidiMessage::ProgramChange { channel, program: preset });
        messages
    }

    /// Deliver program change messages on every later snapshot change
    ///
    /// The current snapshot at subscription time is not sent.
    pub fn on_program_change(self: &Rc<Self>, sink: impl Fn(Vec<MidiMessage>) + 'static) -> Subscription {
        let weak = Rc::downgrade(self);
        self.snapshot.subscribe(move |snapshot| {
            if let Some(bank) = weak.upgrade() {
                debug!(
                    "Sending bank {} preset {} to MIDI channel {}",
                    snapshot >> 8,
                    snapshot & 0xff,
                    bank.program_change_channel()
                );
                sink(bank.program_change_messages(*snapshot));
            }
        })
    }

    /// One value per pad of the displayed snapshot page
    ///
    /// Clicking loads the slot, or saves into it while `save_modifier` is set.
    pub fn pad_value_set(
        self: &Rc<Self>,
        save_modifier: ReadOnly<bool>,
        colors: PadColors,
    ) -> Result<Rc<ValueSet>> {
        let bank = Rc::downgrade(self);
        ValueSet::new("SnapshotValueSet", SNAPSHOTS_PER_PAGE, 1, move |pad| {
            let value: Rc<dyn ControlValue> = Rc::new(SnapshotPad {
                name: format!("SnapshotVal{}", pad + 1),
                pad,
                bank: Weak::clone(&bank),
                save_modifier: save_modifier.clone(),
                colors,
            });
            Some(value)
        })
    }

    /// Page selectors for the snapshot pads
    pub fn page_value_set(&self, on: u8, off: u8) -> Result<Rc<ValueSet>> {
        let displayed_page = self.displayed_page.clone();
        ValueSet::new("SnapshotPageSet", SNAPSHOT_PAGES, 1, move |page| {
            let value: Rc<dyn ControlValue> =
                SyncedValue::builder(format!("SnapshotPage{}", page + 1), page, &displayed_page)
                    .on_off(on, off)
                    .build();
            Some(value)
        })
    }
}

fn limit(current: u8, delta: i32) -> u8 {
    (current as i32 + delta).clamp(0, MAX_BANK_OR_PRESET as i32) as u8
}

struct SnapshotPad {
    name: String,
    pad: usize,
    bank: Weak<SnapshotBank>,
    save_modifier: ReadOnly<bool>,
    colors: PadColors,
}

impl ControlValue for SnapshotPad {
    fn name(&self) -> &str {
        &self.name
    }

    fn velocity(&self) -> u8 {
        let Some(bank) = self.bank.upgrade() else {
            return self.colors.empty;
        };
        let index = bank.displayed_page.get() * SNAPSHOTS_PER_PAGE + self.pad;
        match bank.slot_fill(index) {
            SlotFill::Empty => self.colors.empty,
            SlotFill::Saved => self.colors.saved,
            SlotFill::Active => self.colors.active,
        }
    }

    fn on_gesture(&self, gesture: Gesture) {
        if !matches!(gesture, Gesture::Click | Gesture::LongClick) {
            return;
        }
        if let Some(bank) = self.bank.upgrade() {
            bank.click_pad(self.pad, self.save_modifier.get());
        }
    }

    fn watch(&self, listener: Rc<dyn Fn()>) -> Subscription {
        let Some(bank) = self.bank.upgrade() else {
            return Subscription::empty();
        };
        let (a, b, c) = (Rc::clone(&listener), Rc::clone(&listener), listener);
        Subscription::merge(vec![
            bank.snapshot.subscribe(move |_| a()),
            bank.slots.subscribe(move |_| b()),
            bank.displayed_page.subscribe(move |_| c()),
        ])
    }
}
