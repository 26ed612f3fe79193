//! Bindable values and paged value collections
//!
//! A [`ControlValue`] is whatever a physical control can be bound to: it
//! renders a feedback velocity, reacts to gestures and turns, and announces
//! when its feedback may have changed.

mod ranged;
mod sends;
mod set;
mod synced;

pub use ranged::RangedValue;
pub use sends::SendsValueSet;
pub use set::{ValueFactory, ValueSet};
pub use synced::{ClickAction, ClickHandler, SyncedValue, SyncedValueBuilder, Velocity, VelocityFn};

use crate::gesture::Gesture;
use crate::reactive::{ObservableId, Subscription};
use std::fmt;
use std::rc::Rc;

/// How a continuous control reports movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    /// Raw value is the new position (faders, absolute encoders)
    Absolute,
    /// Raw value is a delta centred on 64 (relative encoders)
    Relative,
}

/// A value a physical control can be bound to
pub trait ControlValue {
    fn name(&self) -> &str;

    /// Outbound feedback for the current state (0-127 or a device color index)
    fn velocity(&self) -> u8;

    fn on_gesture(&self, gesture: Gesture);

    fn on_turn(&self, _raw: u8, _mode: TurnMode) {}

    /// Call `listener` whenever [`ControlValue::velocity`] may have changed
    fn watch(&self, listener: Rc<dyn Fn()>) -> Subscription;

    /// Whether clicks must wait for the double-click window
    fn is_double_click_aware(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Opaque identity used for mode selection and value-set selection
///
/// Compared by value; `Cell` refers to an observable by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Flag(bool),
    Index(usize),
    Key(&'static str),
    Handle(u64),
    Cell(ObservableId),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Flag(v) => write!(f, "flag:{}", v),
            Token::Index(i) => write!(f, "#{}", i),
            Token::Key(k) => write!(f, "{}", k),
            Token::Handle(h) => write!(f, "handle:{}", h),
            Token::Cell(id) => write!(f, "cell:{:?}", id),
        }
    }
}

/// Values usable as a [`SyncedValue`] identity token
pub trait BindingToken: Clone + PartialEq + fmt::Debug + 'static {
    /// The observable this token stands for, if it is a cell reference
    fn source_id(&self) -> Option<ObservableId> {
        None
    }
}

impl BindingToken for Token {
    fn source_id(&self) -> Option<ObservableId> {
        match self {
            Token::Cell(id) => Some(*id),
            _ => None,
        }
    }
}

impl<T: BindingToken> BindingToken for Option<T> {
    fn source_id(&self) -> Option<ObservableId> {
        self.as_ref().and_then(BindingToken::source_id)
    }
}

impl BindingToken for bool {}
impl BindingToken for u8 {}
impl BindingToken for u16 {}
impl BindingToken for usize {}
impl BindingToken for i32 {}
impl BindingToken for &'static str {}
impl BindingToken for String {}

/// Stand-in bound where a value set has no entry: ignores input, renders off
#[derive(Debug, Clone)]
pub struct DisabledValue {
    name: String,
    off_velocity: u8,
}

impl DisabledValue {
    pub fn new(name: impl Into<String>, off_velocity: u8) -> Self {
        Self {
            name: name.into(),
            off_velocity,
        }
    }
}

impl ControlValue for DisabledValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn velocity(&self) -> u8 {
        self.off_velocity
    }

    fn on_gesture(&self, _gesture: Gesture) {}

    fn watch(&self, _listener: Rc<dyn Fn()>) -> Subscription {
        Subscription::empty()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;

    #[test]
    fn test_cell_token_source() {
        let cell = Observable::new(0u8);
        let token = Token::Cell(cell.id());
        assert_eq!(token.source_id(), Some(cell.id()));
        assert_eq!(Some(token.clone()).source_id(), Some(cell.id()));
        assert_eq!(Token::Index(3).source_id(), None);
        assert_ne!(token, Token::Handle(0));
    }

    #[test]
    fn test_disabled_value_ignores_everything() {
        let value = DisabledValue::new("stub", 0);
        value.on_gesture(Gesture::Click);
        value.on_turn(127, TurnMode::Absolute);
        assert_eq!(value.velocity(), 0);
        assert!(!value.is_enabled());
    }
}
