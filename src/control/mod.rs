//! Physical control drivers and control sets
//!
//! A [`Control`] owns the dispatcher registrations for one physical element,
//! its gesture tracker and its current binding. Binding a new value cancels
//! any gesture in flight, drops the old value's listeners and renders the new
//! value's feedback, all in one call. Dropping a control releases its
//! identifiers.

mod set;

pub use set::ControlSet;

use crate::dispatcher::EventDispatcher;
use crate::error::{Result, SurfaceError};
use crate::feedback::FeedbackOutput;
use crate::gesture::{Gesture, GestureTracker};
use crate::midi::ControlIdentifier;
use crate::reactive::Subscription;
use crate::surface::Surface;
use crate::value::{ControlValue, TurnMode};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Physical control types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Note or CC button: press/release drive gestures
    Button,
    /// Motor fader: absolute CC position
    Fader,
    /// Endless or absolute encoder
    Encoder { relative: bool },
    /// Encoder with a push switch on a separate identifier
    ClickEncoder { relative: bool },
}

/// Construction parameters for a [`Control`]
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub name: String,
    pub kind: ControlKind,
    pub primary: ControlIdentifier,
    pub click: Option<ControlIdentifier>,
    pub sync: Option<ControlIdentifier>,
    pub touch: Option<ControlIdentifier>,
}

impl ControlConfig {
    pub fn button(name: impl Into<String>, id: ControlIdentifier) -> Self {
        Self::with_kind(name, ControlKind::Button, id)
    }

    pub fn fader(name: impl Into<String>, id: ControlIdentifier) -> Self {
        Self::with_kind(name, ControlKind::Fader, id)
    }

    pub fn encoder(name: impl Into<String>, id: ControlIdentifier, relative: bool) -> Self {
        Self::with_kind(name, ControlKind::Encoder { relative }, id)
    }

    pub fn click_encoder(
        name: impl Into<String>,
        turn: ControlIdentifier,
        click: ControlIdentifier,
        relative: bool,
    ) -> Self {
        let mut config = Self::with_kind(name, ControlKind::ClickEncoder { relative }, turn);
        config.click = Some(click);
        config
    }

    /// Echo feedback to a second identifier (global LED bank)
    pub fn with_sync(mut self, id: ControlIdentifier) -> Self {
        self.sync = Some(id);
        self
    }

    /// Hold feedback while this touch sensor reports contact
    pub fn with_touch(mut self, id: ControlIdentifier) -> Self {
        self.touch = Some(id);
        self
    }

    fn with_kind(name: impl Into<String>, kind: ControlKind, primary: ControlIdentifier) -> Self {
        Self {
            name: name.into(),
            kind,
            primary,
            click: None,
            sync: None,
            touch: None,
        }
    }
}

struct Binding {
    value: Rc<dyn ControlValue>,
    _watch: Subscription,
}

/// One physical control element
pub struct Control {
    name: String,
    kind: ControlKind,
    primary: ControlIdentifier,
    click: Option<ControlIdentifier>,
    sync: Option<ControlIdentifier>,
    touch: Option<ControlIdentifier>,
    output: Rc<FeedbackOutput>,
    dispatcher: Weak<EventDispatcher>,
    /// Identifiers this control holds in the dispatcher
    registered: RefCell<Vec<ControlIdentifier>>,
    tracker: Rc<GestureTracker>,
    binding: RefCell<Option<Binding>>,
    touched: Cell<bool>,
    muted: Cell<bool>,
    weak_self: Weak<Control>,
}

impl Control {
    /// Create a control and register its identifiers with the dispatcher
    ///
    /// On failure no identifier of this control stays registered.
    pub fn new(surface: &Surface, config: ControlConfig) -> Result<Rc<Self>> {
        if matches!(config.kind, ControlKind::ClickEncoder { .. }) && config.click.is_none() {
            return Err(SurfaceError::config(format!(
                "click encoder '{}' needs a click identifier",
                config.name
            )));
        }

        let tracker = GestureTracker::new(surface.scheduler().clone(), surface.timing());
        let control = Rc::new_cyclic(|weak_self| Control {
            name: config.name,
            kind: config.kind,
            primary: config.primary,
            click: config.click,
            sync: config.sync,
            touch: config.touch,
            output: Rc::clone(surface.output()),
            dispatcher: Rc::downgrade(surface.dispatcher()),
            registered: RefCell::new(Vec::new()),
            tracker,
            binding: RefCell::new(None),
            touched: Cell::new(false),
            muted: Cell::new(false),
            weak_self: weak_self.clone(),
        });

        let weak = Rc::downgrade(&control);
        control.tracker.set_sink(move |gesture| {
            if let Some(control) = weak.upgrade() {
                control.on_gesture(gesture);
            }
        });

        // On error `control` is dropped here, which releases what was registered
        control.register(surface)?;
        debug!("Created control '{}' on {}", control.name, control.primary);
        Ok(control)
    }

    fn register(self: &Rc<Self>, surface: &Surface) -> Result<()> {
        let dispatcher = surface.dispatcher();
        let mut routes: Vec<(ControlIdentifier, fn(&Control, u8))> =
            vec![(self.primary, Control::on_primary)];
        if let Some(click) = self.click {
            routes.push((click, Control::on_click_switch));
        }
        if let Some(touch) = self.touch {
            routes.push((touch, Control::on_touch));
        }

        for (id, route) in routes {
            let weak = Rc::downgrade(self);
            dispatcher.register(id, move |value| {
                if let Some(control) = weak.upgrade() {
                    route(&control, value);
                }
            })?;
            self.registered.borrow_mut().push(id);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn primary(&self) -> ControlIdentifier {
        self.primary
    }

    pub fn click_id(&self) -> Option<ControlIdentifier> {
        self.click
    }

    pub fn sync_id(&self) -> Option<ControlIdentifier> {
        self.sync
    }

    pub fn touch_id(&self) -> Option<ControlIdentifier> {
        self.touch
    }

    pub fn tracker(&self) -> &GestureTracker {
        &self.tracker
    }

    pub fn bound(&self) -> Option<Rc<dyn ControlValue>> {
        self.binding.borrow().as_ref().map(|b| Rc::clone(&b.value))
    }

    pub fn is_bound_to(&self, value: &Rc<dyn ControlValue>) -> bool {
        self.binding
            .borrow()
            .as_ref()
            .map(|b| Rc::ptr_eq(&b.value, value))
            .unwrap_or(false)
    }

    /// Bind a value (or nothing) to this control
    pub fn bind(&self, value: Option<Rc<dyn ControlValue>>) {
        if let Some(value) = &value {
            if self.is_bound_to(value) {
                return;
            }
        }

        // A gesture in flight belongs to the previous binding
        self.tracker.cancel();
        let previous = self.binding.borrow_mut().take();
        drop(previous);

        match value {
            Some(value) => {
                trace!("{}: bind {}", self.name, value.name());
                self.tracker
                    .set_double_click_aware(value.is_double_click_aware());
                let weak = self.weak_self.clone();
                let watch = value.watch(Rc::new(move || {
                    if let Some(control) = weak.upgrade() {
                        control.render();
                    }
                }));
                *self.binding.borrow_mut() = Some(Binding {
                    value,
                    _watch: watch,
                });
            }
            None => {
                trace!("{}: unbind", self.name);
                self.tracker.set_double_click_aware(false);
            }
        }
        self.render();
    }

    /// Send the bound value's feedback (0 when unbound)
    pub fn render(&self) {
        if self.touched.get() {
            return;
        }
        let velocity = self.bound().map(|v| v.velocity()).unwrap_or(0);
        self.output.send(self.primary, velocity);
        if let Some(sync) = self.sync {
            self.output.send(sync, velocity);
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    pub fn is_touched(&self) -> bool {
        self.touched.get()
    }

    fn on_primary(&self, value: u8) {
        match self.kind {
            ControlKind::Button => self.tracker.handle_velocity(value),
            ControlKind::Fader => self.on_turn(value, TurnMode::Absolute),
            ControlKind::Encoder { relative } | ControlKind::ClickEncoder { relative } => {
                let mode = if relative {
                    TurnMode::Relative
                } else {
                    TurnMode::Absolute
                };
                self.on_turn(value, mode);
            }
        }
    }

    fn on_click_switch(&self, value: u8) {
        self.tracker.handle_velocity(value);
    }

    fn on_touch(&self, value: u8) {
        let touched = value > 0;
        if self.touched.replace(touched) && !touched {
            // Motor fader must return to the value's position
            self.output.invalidate(&self.primary);
            self.render();
        }
    }

    fn on_turn(&self, raw: u8, mode: TurnMode) {
        if self.muted.get() {
            trace!("{}: muted, ignoring {}", self.name, raw);
            return;
        }
        if let Some(value) = self.bound() {
            value.on_turn(raw, mode);
        }
    }

    fn on_gesture(&self, gesture: Gesture) {
        if let Some(value) = self.bound() {
            debug!("{}: {:?} on {}", self.name, gesture, value.name());
            value.on_gesture(gesture);
        }
    }
}

impl Drop for Control {
    fn drop(&mut self) {
        self.tracker.cancel();
        let registered = std::mem::take(self.registered.get_mut());
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return;
        };
        for id in &registered {
            dispatcher.unregister(id);
        }
        if !registered.is_empty() {
            trace!("{}: released {} identifier(s)", self.name, registered.len());
        }
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("primary", &self.primary)
            .field("bound", &self.bound().map(|v| v.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::GestureTiming;
    use crate::midi::MessageKind;
    use crate::reactive::Observable;
    use crate::value::{RangedValue, SyncedValue};

    fn surface() -> Surface {
        let surface = Surface::new(GestureTiming::default());
        surface.flush();
        surface
    }

    #[test]
    fn test_duplicate_identifier_rolls_back() {
        let surface = surface();
        let note = ControlIdentifier::note(0, 1).unwrap();
        let touch = ControlIdentifier::note(0, 104).unwrap();
        Control::new(&surface, ControlConfig::button("a", note)).unwrap();

        let fader = ControlIdentifier::cc(0, 1).unwrap();
        let config = ControlConfig::fader("f", fader).with_touch(touch);
        let _first = Control::new(&surface, config.clone()).unwrap();
        assert_eq!(
            Control::new(&surface, ControlConfig::fader("g", ControlIdentifier::cc(0, 2).unwrap()).with_touch(touch))
                .unwrap_err(),
            SurfaceError::DuplicateRegistration(touch)
        );
        assert!(!surface
            .dispatcher()
            .is_registered(&ControlIdentifier::cc(0, 2).unwrap()));
    }

    #[test]
    fn test_drop_releases_identifiers() {
        let surface = surface();
        let id = ControlIdentifier::cc(0, 9).unwrap();
        let click = ControlIdentifier::note(0, 9).unwrap();
        let config = ControlConfig::click_encoder("e", id, click, true);

        let encoder = Control::new(&surface, config.clone()).unwrap();
        assert!(surface.dispatcher().is_registered(&click));
        drop(encoder);
        assert_eq!(surface.dispatcher().registered_count(), 0);

        let again = Control::new(&surface, config).unwrap();
        assert_eq!(again.click_id(), Some(click));
    }

    #[test]
    fn test_failed_registration_keeps_the_holder() {
        let surface = surface();
        let id = ControlIdentifier::note(0, 3).unwrap();
        let _holder = Control::new(&surface, ControlConfig::button("a", id)).unwrap();
        assert!(Control::new(&surface, ControlConfig::button("b", id)).is_err());
        assert!(surface.dispatcher().is_registered(&id));
    }

    #[test]
    fn test_button_click_writes_and_renders() {
        let surface = surface();
        let id = ControlIdentifier::note(0, 36).unwrap();
        let sync = ControlIdentifier::note(1, 36).unwrap();
        let button = Control::new(&surface, ControlConfig::button("pad", id).with_sync(sync)).unwrap();

        let mode = Observable::new(0u8);
        let value: Rc<dyn ControlValue> = SyncedValue::builder("m2", 2u8, &mode).build();
        button.bind(Some(value));
        surface.flush();

        surface.handle_message(MessageKind::Note, 0, 36, 127, 0);
        surface.handle_message(MessageKind::Note, 0, 36, 0, 50);
        assert_eq!(mode.get(), 2);

        let sent = surface.flush();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.value == 127));
        assert!(sent.iter().any(|m| m.target == sync));
    }

    #[test]
    fn test_fader_touch_holds_feedback() {
        let surface = surface();
        let id = ControlIdentifier::cc(0, 1).unwrap();
        let touch = ControlIdentifier::note(0, 104).unwrap();
        let fader = Control::new(&surface, ControlConfig::fader("f1", id).with_touch(touch)).unwrap();

        let volume = Observable::new(10u8);
        fader.bind(Some(RangedValue::new("vol", &volume).into_rc()));
        surface.flush();

        surface.handle_message(MessageKind::Note, 0, 104, 127, 0);
        surface.handle_message(MessageKind::ControlChange, 0, 1, 90, 10);
        assert_eq!(volume.get(), 90);
        assert!(surface.flush().is_empty());

        surface.handle_message(MessageKind::Note, 0, 104, 0, 20);
        let sent = surface.flush();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].value, 90);
    }

    #[test]
    fn test_muted_control_ignores_turns() {
        let surface = surface();
        let id = ControlIdentifier::cc(0, 16).unwrap();
        let encoder = Control::new(&surface, ControlConfig::encoder("e", id, true)).unwrap();
        let pan = Observable::new(64u8);
        encoder.bind(Some(RangedValue::new("pan", &pan).into_rc()));

        encoder.set_muted(true);
        surface.handle_message(MessageKind::ControlChange, 0, 16, 65, 0);
        assert_eq!(pan.get(), 64);

        encoder.set_muted(false);
        surface.handle_message(MessageKind::ControlChange, 0, 16, 66, 0);
        assert_eq!(pan.get(), 66);
    }

    #[test]
    fn test_click_encoder_needs_click_id() {
        let surface = surface();
        let mut config = ControlConfig::encoder("e", ControlIdentifier::cc(0, 16).unwrap(), true);
        config.kind = ControlKind::ClickEncoder { relative: true };
        assert!(Control::new(&surface, config).is_err());
    }

    #[test]
    fn test_rebind_cancels_pending_gesture() {
        let surface = surface();
        let id = ControlIdentifier::note(0, 5).unwrap();
        let button = Control::new(&surface, ControlConfig::button("b", id)).unwrap();

        let target = Observable::new(0u8);
        let first: Rc<dyn ControlValue> = SyncedValue::builder("first", 1u8, &target).build();
        let second: Rc<dyn ControlValue> = SyncedValue::builder("second", 2u8, &target).build();
        button.bind(Some(first));

        surface.handle_message(MessageKind::Note, 0, 5, 127, 0);
        button.bind(Some(Rc::clone(&second)));
        surface.advance_to(1_000);
        surface.handle_message(MessageKind::Note, 0, 5, 0, 1_100);

        assert_eq!(target.get(), 0);
        assert!(button.is_bound_to(&second));
    }

    #[test]
    fn test_unbound_renders_off() {
        let surface = surface();
        let id = ControlIdentifier::note(0, 7).unwrap();
        let button = Control::new(&surface, ControlConfig::button("b", id)).unwrap();
        let lit = Observable::new(true);
        let value: Rc<dyn ControlValue> = SyncedValue::builder("lit", true, &lit).build();
        button.bind(Some(value));
        button.bind(None);
        let sent = surface.flush();
        assert_eq!(sent.last().map(|m| m.value), Some(0));
    }
}
