//! Two-way binding between a control and one application cell

use super::{BindingToken, ControlValue};
use crate::gesture::Gesture;
use crate::reactive::{Observable, Signal, Subscription};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Custom click handler: `(own, target, is_double_click)`
pub type ClickHandler<T> = Rc<dyn Fn(&T, &Observable<T>, bool)>;

/// Computed feedback, evaluated against the value it belongs to
pub type VelocityFn<T> = Rc<dyn Fn(&SyncedValue<T>) -> u8>;

/// What a click does to the target cell
pub enum ClickAction<T: BindingToken> {
    /// Write the own token into the target
    Assign,
    /// Write the own token, or `off` if the target already holds it
    Toggle { off: T },
    /// Clicks have no effect
    Ignore,
    Custom(ClickHandler<T>),
}

/// How feedback is derived
pub enum Velocity<T: BindingToken> {
    /// Constant feedback regardless of state
    Static(u8),
    /// `on` while the target equals the own token, `off` otherwise
    Comparison { on: u8, off: u8 },
    /// Arbitrary function of the value; re-evaluated when `deps` change
    Computed {
        deps: Vec<Rc<dyn Signal>>,
        compute: VelocityFn<T>,
    },
}

/// Couples one physical control to one cell of application state
pub struct SyncedValue<T: BindingToken> {
    name: String,
    own: T,
    target: Observable<T>,
    click: ClickAction<T>,
    velocity: Velocity<T>,
    double_click_aware: bool,
    restore_after_long_click: bool,
    /// Target value to restore on the release following a LongClick
    saved: RefCell<Option<T>>,
}

impl<T: BindingToken> SyncedValue<T> {
    pub fn builder(name: impl Into<String>, own: T, target: &Observable<T>) -> SyncedValueBuilder<T> {
        SyncedValueBuilder {
            name: name.into(),
            own,
            target: target.clone(),
            click: ClickAction::Assign,
            velocity: Velocity::Comparison { on: 127, off: 0 },
            deps: Vec::new(),
            double_click_aware: false,
            restore_after_long_click: false,
        }
    }

    pub fn own(&self) -> &T {
        &self.own
    }

    pub fn target(&self) -> &Observable<T> {
        &self.target
    }

    /// Whether the target currently holds the own token
    pub fn is_active(&self) -> bool {
        self.target.with(|current| *current == self.own)
    }

    pub fn evaluate_velocity(&self) -> u8 {
        match &self.velocity {
            Velocity::Static(v) => *v,
            Velocity::Comparison { on, off } => {
                if self.is_active() {
                    *on
                } else {
                    *off
                }
            }
            Velocity::Computed { compute, .. } => compute(self),
        }
    }

    pub fn handle_gesture(&self, gesture: Gesture) {
        match gesture {
            Gesture::Click => self.click(false),
            Gesture::DoubleClick => self.click(true),
            Gesture::LongClick if self.restore_after_long_click => {
                *self.saved.borrow_mut() = Some(self.target.get());
                self.click(false);
            }
            Gesture::LongClick => self.click(false),
            Gesture::LongRelease => {
                let saved = self.saved.borrow_mut().take();
                if let Some(previous) = saved {
                    debug!("{}: restoring target to {:?}", self.name, previous);
                    self.target.set(previous);
                }
            }
        }
    }

    fn click(&self, is_double_click: bool) {
        match &self.click {
            ClickAction::Assign => self.assign(),
            ClickAction::Toggle { off } => {
                if self.is_active() {
                    self.target.set(off.clone());
                } else {
                    self.assign();
                }
            }
            ClickAction::Ignore => {}
            ClickAction::Custom(handler) => {
                let handler = Rc::clone(handler);
                handler(&self.own, &self.target, is_double_click);
            }
        }
    }

    fn assign(&self) {
        // A token that stands for the target cell itself must not be written into it
        if self.own.source_id() == Some(self.target.id()) {
            debug!("{}: skipping self-referential write", self.name);
            return;
        }
        self.target.set(self.own.clone());
    }
}

impl<T: BindingToken> ControlValue for SyncedValue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn velocity(&self) -> u8 {
        self.evaluate_velocity()
    }

    fn on_gesture(&self, gesture: Gesture) {
        self.handle_gesture(gesture);
    }

    fn watch(&self, listener: Rc<dyn Fn()>) -> Subscription {
        let mut subscriptions = vec![self.target.watch(Rc::clone(&listener))];
        if let Velocity::Computed { deps, .. } = &self.velocity {
            for dep in deps {
                subscriptions.push(dep.watch(Rc::clone(&listener)));
            }
        }
        Subscription::merge(subscriptions)
    }

    fn is_double_click_aware(&self) -> bool {
        self.double_click_aware
    }
}

impl<T: BindingToken> fmt::Debug for SyncedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedValue")
            .field("name", &self.name)
            .field("own", &self.own)
            .field("target", &self.target.get())
            .finish()
    }
}

pub struct SyncedValueBuilder<T: BindingToken> {
    name: String,
    own: T,
    target: Observable<T>,
    click: ClickAction<T>,
    velocity: Velocity<T>,
    deps: Vec<Rc<dyn Signal>>,
    double_click_aware: bool,
    restore_after_long_click: bool,
}

impl<T: BindingToken> SyncedValueBuilder<T> {
    /// Feedback `on` while active, `off` otherwise
    pub fn on_off(mut self, on: u8, off: u8) -> Self {
        self.velocity = Velocity::Comparison { on, off };
        self
    }

    pub fn static_velocity(mut self, velocity: u8) -> Self {
        self.velocity = Velocity::Static(velocity);
        self
    }

    /// Computed feedback; add re-evaluation triggers with [`Self::depends_on`]
    pub fn computed(mut self, compute: impl Fn(&SyncedValue<T>) -> u8 + 'static) -> Self {
        self.velocity = Velocity::Computed {
            deps: Vec::new(),
            compute: Rc::new(compute),
        };
        self
    }

    /// Extra cell whose changes re-evaluate computed feedback
    pub fn depends_on(mut self, signal: impl Signal + 'static) -> Self {
        self.deps.push(Rc::new(signal));
        self
    }

    pub fn on_click(mut self, handler: impl Fn(&T, &Observable<T>, bool) + 'static) -> Self {
        self.click = ClickAction::Custom(Rc::new(handler));
        self
    }

    pub fn toggle(mut self, off: T) -> Self {
        self.click = ClickAction::Toggle { off };
        self
    }

    pub fn ignore_clicks(mut self) -> Self {
        self.click = ClickAction::Ignore;
        self
    }

    pub fn double_click_aware(mut self) -> Self {
        self.double_click_aware = true;
        self
    }

    /// Hold to switch, release to return
    pub fn restore_after_long_click(mut self) -> Self {
        self.restore_after_long_click = true;
        self
    }

    pub fn build(self) -> Rc<SyncedValue<T>> {
        let velocity = match self.velocity {
            Velocity::Computed { compute, .. } => Velocity::Computed {
                deps: self.deps,
                compute,
            },
            other => other,
        };
        Rc::new(SyncedValue {
            name: self.name,
            own: self.own,
            target: self.target,
            click: self.click,
            velocity,
            double_click_aware: self.double_click_aware,
            restore_after_long_click: self.restore_after_long_click,
            saved: RefCell::new(None),
        })
    }
}
