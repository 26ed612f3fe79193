//! Demonstration layout: bank/preset/snapshot selector for an 8 + 16 pad
//! controller (Behringer CMD DC-1 note map)
//!
//! Three mode buttons choose what the numeric buttons and the pads show.
//! The push encoder changes bank or preset, or steps through saved
//! snapshots; holding shift while clicking a snapshot pad saves into it.

use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use surface_bind::control::{Control, ControlConfig, ControlSet};
use surface_bind::midi::{ControlIdentifier, MidiMessage};
use surface_bind::prefs::Preferences;
use surface_bind::reactive::{Observable, ReadOnly, Subscription};
use surface_bind::snapshot::{PadColors, SnapshotBank, SNAPSHOTS_PER_PAGE, SNAPSHOT_PAGES};
use surface_bind::value::{ControlValue, SyncedValue, Token, ValueSet};
use surface_bind::Surface;
use tracing::{debug, info, warn};

mod note {
    pub const APP_MODE: u8 = 1;
    pub const BANK_MODE: u8 = 4;
    pub const PRESET_MODE: u8 = 5;
    pub const SNAPSHOT_MODE: u8 = 6;
    pub const SHIFT: u8 = 7;
    pub const FIRST_NUM_BUTTON: u8 = 16;
    pub const PUSH_ENCODER_CLICK: u8 = 32;
    pub const PAD1: u8 = 36;
}

const PUSH_ENCODER_CC: u8 = 32;

mod color {
    pub const ORANGE: u8 = 0;
    pub const BLUE: u8 = 1;
    pub const BLUE_BLINK: u8 = 2;
}

const BANK_MODE: Token = Token::Key("bank");
const PRESET_MODE: Token = Token::Key("preset");
const SNAPSHOT_MODE: Token = Token::Key("snapshot");

/// Page and pad value sets for picking a 0-127 number
struct NumberPicker {
    pages: Rc<ValueSet>,
    pads: Rc<ValueSet>,
    _follow: Subscription,
}

impl NumberPicker {
    fn new(name: &str, current: ReadOnly<u8>, select: Rc<dyn Fn(u8)>) -> Result<Self> {
        let displayed_page = Observable::new(0usize);

        // Follow the active page whenever the number changes
        let dp = displayed_page.clone();
        let follow = current.subscribe(move |n| {
            dp.set(*n as usize / SNAPSHOTS_PER_PAGE);
        });

        let (cur, dp) = (current.clone(), displayed_page.clone());
        let page_name = name.to_string();
        let pages = ValueSet::new(format!("{}PageSet", name), SNAPSHOT_PAGES, 1, move |index| {
            let current = cur.clone();
            let value: Rc<dyn ControlValue> =
                SyncedValue::builder(format!("{}Page{}", page_name, index + 1), index, &dp)
                    .computed(move |v| {
                        let active_page = current.get() as usize / SNAPSHOTS_PER_PAGE;
                        if v.is_active() {
                            color::BLUE
                        } else if *v.own() == active_page {
                            color::BLUE_BLINK
                        } else {
                            color::ORANGE
                        }
                    })
                    .depends_on(cur.clone())
                    .build();
            Some(value)
        })?;

        let pad_of_current = current.map(|n| n % SNAPSHOTS_PER_PAGE as u8);
        let (cur, dp) = (current, displayed_page);
        let pad_name = name.to_string();
        let pads = ValueSet::new(format!("{}ValueSet", name), SNAPSHOTS_PER_PAGE, 1, move |index| {
            let (current, page) = (cur.clone(), dp.clone());
            let (click_page, select) = (dp.clone(), Rc::clone(&select));
            let value: Rc<dyn ControlValue> = SyncedValue::builder(
                format!("{}Val{}", pad_name, index + 1),
                index as u8,
                &pad_of_current,
            )
            .computed(move |v| {
                let visible = page.get() == current.get() as usize / SNAPSHOTS_PER_PAGE;
                if visible && v.is_active() {
                    color::BLUE
                } else {
                    color::ORANGE
                }
            })
            .depends_on(dp.clone())
            .on_click(move |pad, _, _| {
                let n = click_page.get() * SNAPSHOTS_PER_PAGE + *pad as usize;
                select(n.min(u8::MAX as usize) as u8);
            })
            .build();
            Some(value)
        })?;

        Ok(Self {
            pages,
            pads,
            _follow: follow,
        })
    }
}

/// Everything the demo layout keeps alive
pub struct Layout {
    snapshots: Rc<SnapshotBank>,
    mode: Observable<Token>,
    _numeric: Rc<ControlSet>,
    pads: Rc<ControlSet>,
    outbox: Rc<RefCell<Vec<MidiMessage>>>,
    _mode_buttons: Vec<Rc<Control>>,
    _pickers: Vec<NumberPicker>,
    _subscriptions: Vec<Subscription>,
}

impl Layout {
    pub fn build(surface: &Surface, prefs: &Preferences, channel: u8) -> Result<Self> {
        let dispatcher = surface.dispatcher();
        let snapshots = SnapshotBank::new(prefs)?;
        let mode = Observable::new(PRESET_MODE);

        let outbox = Rc::new(RefCell::new(Vec::new()));
        let out = Rc::clone(&outbox);
        let program_changes = snapshots.on_program_change(move |messages| {
            out.borrow_mut().extend(messages);
        });

        let mut mode_buttons = Vec::new();
        for (label, number, token) in [
            ("Bank", note::BANK_MODE, BANK_MODE),
            ("Preset", note::PRESET_MODE, PRESET_MODE),
            ("Snapshot", note::SNAPSHOT_MODE, SNAPSHOT_MODE),
        ] {
            let button = Control::new(
                surface,
                ControlConfig::button(
                    format!("{}ModeButton", label),
                    ControlIdentifier::note(channel, number)?,
                ),
            )?;
            let value: Rc<dyn ControlValue> =
                SyncedValue::builder(format!("{}ModeValue", label), token, &mode)
                    .on_off(color::BLUE, color::ORANGE)
                    .restore_after_long_click()
                    .build();
            button.bind(Some(value));
            mode_buttons.push(button);
        }

        let app_mode = ControlIdentifier::note(channel, note::APP_MODE)?;
        let output = Rc::clone(surface.output());
        surface.on_first_flush(move || {
            // App mode is not part of this layout; keep its LED dark
            output.send(app_mode, color::ORANGE);
        });

        let shift = ControlIdentifier::note(channel, note::SHIFT)?;
        let output = Rc::clone(surface.output());
        dispatcher.register(shift, move |velocity| {
            let led = if velocity > 0 { color::BLUE_BLINK } else { color::ORANGE };
            output.send(shift, led);
        })?;
        let shift_pressed = dispatcher.press_observable(shift);

        let numeric = ControlSet::build("NumericButtons", SNAPSHOT_PAGES, |i| {
            Control::new(
                surface,
                ControlConfig::button(
                    format!("NumBtn{}", i + 1),
                    ControlIdentifier::note(channel, note::FIRST_NUM_BUTTON + i as u8)?,
                ),
            )
        })?;
        let pads = ControlSet::build("Pads", SNAPSHOTS_PER_PAGE, |i| {
            Control::new(
                surface,
                ControlConfig::button(
                    format!("PadBtn{}", i + 1),
                    ControlIdentifier::note(channel, note::PAD1 + i as u8)?,
                ),
            )
        })?;

        let bank_select: Rc<dyn Fn(u8)> = {
            let snapshots = Rc::clone(&snapshots);
            Rc::new(move |bank| snapshots.set_bank(bank))
        };
        let preset_select: Rc<dyn Fn(u8)> = {
            let snapshots = Rc::clone(&snapshots);
            Rc::new(move |preset| snapshots.set_preset(preset))
        };
        let banks = NumberPicker::new("Bank", snapshots.bank(), bank_select)?;
        let presets = NumberPicker::new("Preset", snapshots.preset(), preset_select)?;
        let snapshot_pages = snapshots.page_value_set(color::BLUE, color::ORANGE)?;
        let snapshot_pads = snapshots.pad_value_set(shift_pressed, PadColors::default())?;

        let mode_sets: Vec<(Token, Rc<ValueSet>, Rc<ValueSet>)> = vec![
            (BANK_MODE, Rc::clone(&banks.pages), Rc::clone(&banks.pads)),
            (PRESET_MODE, Rc::clone(&presets.pages), Rc::clone(&presets.pads)),
            (SNAPSHOT_MODE, snapshot_pages, snapshot_pads),
        ];
        attach_for_mode(&mode.get(), &mode_sets, &numeric, &pads);

        let (n, p) = (Rc::downgrade(&numeric), Rc::downgrade(&pads));
        let mode_switch = mode.subscribe(move |token| {
            if let (Some(numeric), Some(pads)) = (n.upgrade(), p.upgrade()) {
                attach_for_mode(token, &mode_sets, &numeric, &pads);
            }
        });

        let (s, m) = (Rc::clone(&snapshots), mode.clone());
        let push_turn = dispatcher.on_cc(channel, PUSH_ENCODER_CC, move |value| {
            let diff = value as i32 - 64;
            if diff == 0 {
                return;
            }
            match m.get() {
                t if t == BANK_MODE => s.nudge_bank(diff),
                t if t == PRESET_MODE => s.nudge_preset(diff),
                _ => {
                    s.load_next_or_prev(diff);
                }
            }
        })?;
        debug!("Push encoder on {}", push_turn);

        let (s, m) = (Rc::clone(&snapshots), mode.clone());
        dispatcher.on_note_pressed(channel, note::PUSH_ENCODER_CLICK, move || match m.get() {
            t if t == BANK_MODE => s.set_bank(0),
            t if t == PRESET_MODE => s.set_preset(0),
            _ => {}
        })?;

        info!("Layout ready on MIDI channel {}", channel);
        Ok(Self {
            snapshots,
            mode,
            _numeric: numeric,
            pads,
            outbox,
            _mode_buttons: mode_buttons,
            _pickers: vec![banks, presets],
            _subscriptions: vec![program_changes, mode_switch],
        })
    }

    /// Program change messages produced since the last call
    pub fn take_program_changes(&self) -> Vec<MidiMessage> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    pub fn snapshots(&self) -> &Rc<SnapshotBank> {
        &self.snapshots
    }

    pub fn mode(&self) -> Token {
        self.mode.get()
    }
}

fn attach_for_mode(
    token: &Token,
    mode_sets: &[(Token, Rc<ValueSet>, Rc<ValueSet>)],
    numeric: &Rc<ControlSet>,
    pads: &Rc<ControlSet>,
) {
    let Some((_, pages, values)) = mode_sets.iter().find(|(t, _, _)| t == token) else {
        warn!("No value sets for mode {}", token);
        return;
    };
    for (set, target) in [(pages, numeric), (values, pads)] {
        if let Err(e) = target.attach(set) {
            warn!("Cannot attach '{}': {}", set.name(), e);
        }
    }
    debug!("Mode {}", token);
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_bind::midi::{FeedbackMessage, MessageKind};

    const CH: u8 = 5;

    fn press(surface: &Surface, number: u8, at_ms: u64) {
        surface.handle_message(MessageKind::Note, CH, number, 127, at_ms);
        surface.handle_message(MessageKind::Note, CH, number, 0, at_ms + 10);
    }

    fn setup() -> (Surface, Preferences, Layout) {
        let surface = Surface::default();
        let prefs = Preferences::new();
        let layout = Layout::build(&surface, &prefs, CH).unwrap();
        (surface, prefs, layout)
    }

    #[test]
    fn test_initial_feedback_after_first_flush() {
        let (surface, _prefs, _layout) = setup();
        let sent = surface.flush();
        let preset_button = ControlIdentifier::note(CH, note::PRESET_MODE).unwrap();
        assert!(sent.contains(&FeedbackMessage { target: preset_button, value: color::BLUE }));
        // preset 0 is active on the first pad
        let pad1 = ControlIdentifier::note(CH, note::PAD1).unwrap();
        assert!(sent.contains(&FeedbackMessage { target: pad1, value: color::BLUE }));
    }

    #[test]
    fn test_preset_pad_sends_program_change() {
        let (surface, _prefs, layout) = setup();
        press(&surface, note::PAD1 + 3, 0);
        assert_eq!(layout.snapshots().preset().get(), 3);
        assert_eq!(
            layout.take_program_changes(),
            vec![
                MidiMessage::ControlChange { channel: 0, cc: 32, value: 0 },
                MidiMessage::ProgramChange { channel: 0, program: 3 },
            ]
        );
    }

    #[test]
    fn test_mode_switch_rebinds_pads() {
        let (surface, _prefs, layout) = setup();
        press(&surface, note::BANK_MODE, 0);
        assert_eq!(layout.mode(), BANK_MODE);
        assert_eq!(
            layout.pads.control(0).and_then(|c| c.bound()).map(|v| v.name().to_string()),
            Some("BankVal1".to_string())
        );

        // numeric button 2 shows bank page 2; pad 1 there selects bank 16
        press(&surface, note::FIRST_NUM_BUTTON + 1, 1000);
        press(&surface, note::PAD1, 2000);
        assert_eq!(layout.snapshots().bank().get(), 16);
    }

    #[test]
    fn test_long_press_mode_button_is_momentary() {
        let (surface, _prefs, layout) = setup();
        surface.handle_message(MessageKind::Note, CH, note::SNAPSHOT_MODE, 127, 0);
        surface.advance_to(600);
        assert_eq!(layout.mode(), SNAPSHOT_MODE);
        surface.handle_message(MessageKind::Note, CH, note::SNAPSHOT_MODE, 0, 700);
        assert_eq!(layout.mode(), PRESET_MODE);
    }

    #[test]
    fn test_shift_click_saves_snapshot() {
        let (surface, _prefs, layout) = setup();
        press(&surface, note::PAD1 + 2, 0);
        press(&surface, note::SNAPSHOT_MODE, 1000);

        surface.handle_message(MessageKind::Note, CH, note::SHIFT, 127, 2000);
        press(&surface, note::PAD1 + 4, 2100);
        surface.handle_message(MessageKind::Note, CH, note::SHIFT, 0, 2200);

        assert_eq!(layout.snapshots().slot(4), Some(0x0002));
    }

    #[test]
    fn test_push_encoder_nudges_preset() {
        let (surface, _prefs, layout) = setup();
        surface.handle_message(MessageKind::ControlChange, CH, PUSH_ENCODER_CC, 66, 0);
        assert_eq!(layout.snapshots().preset().get(), 2);
        surface.handle_message(MessageKind::Note, CH, note::PUSH_ENCODER_CLICK, 127, 10);
        assert_eq!(layout.snapshots().preset().get(), 0);
    }
}
