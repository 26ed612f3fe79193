//! End-to-end binding behaviour through the public API

use std::cell::RefCell;
use std::rc::Rc;
use surface_bind::control::{Control, ControlConfig, ControlSet};
use surface_bind::gesture::Gesture;
use surface_bind::midi::{ControlIdentifier, FeedbackMessage, MessageKind};
use surface_bind::reactive::{Observable, Subscription};
use surface_bind::value::{ControlValue, SyncedValue, ValueSet};
use surface_bind::Surface;

/// Value recording every gesture it receives
struct Recorder {
    name: String,
    seen: Rc<RefCell<Vec<Gesture>>>,
    double_click_aware: bool,
}

impl ControlValue for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn velocity(&self) -> u8 {
        0
    }

    fn on_gesture(&self, gesture: Gesture) {
        self.seen.borrow_mut().push(gesture);
    }

    fn watch(&self, _listener: Rc<dyn Fn()>) -> Subscription {
        Subscription::empty()
    }

    fn is_double_click_aware(&self) -> bool {
        self.double_click_aware
    }
}

fn button(surface: &Surface, note: u8) -> Rc<Control> {
    let id = ControlIdentifier::note(0, note).unwrap();
    Control::new(surface, ControlConfig::button(format!("btn{}", note), id)).unwrap()
}

fn recording_button(surface: &Surface, double_click_aware: bool) -> (Rc<Control>, Rc<RefCell<Vec<Gesture>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let control = button(surface, 60);
    control.bind(Some(Rc::new(Recorder {
        name: "recorder".into(),
        seen: Rc::clone(&seen),
        double_click_aware,
    })));
    (control, seen)
}

fn note(surface: &Surface, value: u8, at_ms: u64) {
    surface.handle_message(MessageKind::Note, 0, 60, value, at_ms);
}

fn named_values(name: &'static str) -> impl FnMut(usize) -> Option<Rc<dyn ControlValue>> {
    let target = Observable::new(usize::MAX);
    move |i| {
        let value: Rc<dyn ControlValue> =
            SyncedValue::builder(format!("{}{}", name, i), i, &target).build();
        Some(value)
    }
}

#[test]
fn short_press_is_one_click() {
    let surface = Surface::default();
    let (_control, seen) = recording_button(&surface, true);

    note(&surface, 127, 0);
    note(&surface, 0, 100);
    surface.advance_to(2000);

    assert_eq!(*seen.borrow(), vec![Gesture::Click]);
}

#[test]
fn two_quick_presses_are_one_double_click() {
    let surface = Surface::default();
    let (_control, seen) = recording_button(&surface, true);

    note(&surface, 127, 0);
    note(&surface, 0, 80);
    note(&surface, 127, 200);
    note(&surface, 0, 260);
    surface.advance_to(2000);

    assert_eq!(*seen.borrow(), vec![Gesture::DoubleClick]);
}

#[test]
fn held_press_is_one_long_click() {
    let surface = Surface::default();
    let (_control, seen) = recording_button(&surface, false);

    note(&surface, 127, 0);
    note(&surface, 0, 900);
    surface.advance_to(2000);

    assert_eq!(*seen.borrow(), vec![Gesture::LongClick, Gesture::LongRelease]);
    assert!(!seen.borrow().contains(&Gesture::Click));
}

#[test]
fn unchanged_feedback_is_sent_once() {
    let surface = Surface::default();
    let control = button(&surface, 10);
    let target = Observable::new(1u8);
    let value: Rc<dyn ControlValue> = SyncedValue::builder("v", 1u8, &target).on_off(127, 0).build();
    control.bind(Some(value));

    let id = ControlIdentifier::note(0, 10).unwrap();
    assert_eq!(surface.flush(), vec![FeedbackMessage { target: id, value: 127 }]);

    // Velocity stays 0 for both writes
    target.set(2);
    target.set(3);
    assert_eq!(surface.flush(), vec![FeedbackMessage { target: id, value: 0 }]);
    control.render();
    assert!(surface.flush().is_empty());
}

#[test]
fn value_set_paging_scenario() {
    let set = ValueSet::new("Sixteen", 8, 2, named_values("v")).unwrap();

    assert!(set.next_page());
    assert_eq!(set.current_page().get(), 1);
    assert!(!set.has_next_page().get());
    assert!(!set.next_page());
    assert_eq!(set.current_page().get(), 1);

    assert!(set.prev_page());
    assert_eq!(set.current_page().get(), 0);
    assert!(!set.has_prev_page().get());
}

#[test]
fn entries_are_memoized() {
    let set = ValueSet::new("Memo", 4, 3, named_values("m")).unwrap();
    let a = set.entry_at(2, 1).unwrap();
    let calls = set.factory_calls();
    let b = set.entry_at(2, 1).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(set.factory_calls(), calls);
}

#[test]
fn swapping_value_sets_rebinds_every_control() {
    let surface = Surface::default();
    let controls = ControlSet::build("Four", 4, |i| Ok(button(&surface, i as u8))).unwrap();
    let first = ValueSet::new("First", 4, 1, named_values("first")).unwrap();
    let second = ValueSet::new("Second", 4, 1, named_values("second")).unwrap();

    controls.attach(&first).unwrap();
    controls.attach(&second).unwrap();

    for (i, control) in controls.controls().iter().enumerate() {
        let expected = second.entry(i).unwrap();
        assert!(control.is_bound_to(&expected));
    }
    let bound = controls.control(2).and_then(|c| c.bound()).unwrap();
    assert!(Rc::ptr_eq(&bound, &second.entry(2).unwrap()));
    assert!(!Rc::ptr_eq(&bound, &first.entry(2).unwrap()));
}

#[test]
fn page_position_belongs_to_the_value_set() {
    let surface = Surface::default();
    let controls = ControlSet::build("Four", 4, |i| Ok(button(&surface, 20 + i as u8))).unwrap();
    let a = ValueSet::new("A", 4, 3, named_values("a")).unwrap();
    let b = ValueSet::new("B", 4, 3, named_values("b")).unwrap();

    controls.attach(&a).unwrap();
    assert!(controls.next_value_page());
    assert!(controls.next_value_page());

    controls.attach(&b).unwrap();
    assert_eq!(controls.value_page().get(), 0);

    controls.attach(&a).unwrap();
    assert_eq!(controls.value_page().get(), 2);
    let bound = controls.control(0).and_then(|c| c.bound()).unwrap();
    assert_eq!(bound.name(), "a8");
}

fn static_values(name: &'static str, per_page: [u8; 2]) -> impl FnMut(usize) -> Option<Rc<dyn ControlValue>> {
    let target = Observable::new(0usize);
    move |i| {
        let value: Rc<dyn ControlValue> = SyncedValue::builder(format!("{}{}", name, i), i, &target)
            .static_velocity(per_page[i / 4])
            .build();
        Some(value)
    }
}

#[test]
fn page_change_emits_no_intermediate_frame() {
    let surface = Surface::default();
    let controls = ControlSet::build("Four", 4, |i| Ok(button(&surface, 40 + i as u8))).unwrap();
    let same = ValueSet::new("Same", 4, 2, static_values("s", [100, 100])).unwrap();
    controls.attach(&same).unwrap();
    assert_eq!(surface.flush().len(), 4);

    // Identical feedback on the next page: nothing to send, not even a blank
    assert!(same.next_page());
    assert!(surface.flush().is_empty());

    let differing = ValueSet::new("Differing", 4, 2, static_values("d", [100, 50])).unwrap();
    controls.attach(&differing).unwrap();
    assert!(surface.flush().is_empty());
    assert!(differing.next_page());
    let sent = surface.flush();
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|m| m.value == 50));
}

#[test]
fn length_change_rebinds_attached_controls() {
    let surface = Surface::default();
    let controls = ControlSet::build("Four", 4, |i| Ok(button(&surface, 50 + i as u8))).unwrap();
    let set = ValueSet::with_len("Bank", 4, 4, named_values("t")).unwrap();
    controls.attach(&set).unwrap();

    set.set_len(2);
    for slot in 0..4 {
        let bound = controls.control(slot).and_then(|c| c.bound()).unwrap();
        match set.entry_at(0, slot) {
            Some(entry) => assert!(Rc::ptr_eq(&bound, &entry)),
            None => assert!(!bound.is_enabled()),
        }
    }

    set.set_len(4);
    let bound = controls.control(3).and_then(|c| c.bound()).unwrap();
    assert!(Rc::ptr_eq(&bound, &set.entry_at(0, 3).unwrap()));
    assert_eq!(bound.name(), "t3");
}

#[test]
fn failed_wiring_can_be_retried() {
    let surface = Surface::default();
    let failed = ControlSet::build("Pads", 3, |i| {
        let id = ControlIdentifier::note(0, if i == 2 { 200 } else { 70 + i as u8 })?;
        Control::new(&surface, ControlConfig::button(format!("pad{}", i), id))
    });
    assert!(failed.is_err());

    let pads = ControlSet::build("Pads", 3, |i| Ok(button(&surface, 70 + i as u8))).unwrap();
    assert_eq!(pads.len(), 3);

    drop(pads);
    let again = button(&surface, 70);
    assert_eq!(again.primary(), ControlIdentifier::note(0, 70).unwrap());
}
