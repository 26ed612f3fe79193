//! Continuous 7-bit parameters for faders and encoders

use super::{ControlValue, TurnMode};
use crate::gesture::Gesture;
use crate::reactive::{Observable, Signal, Subscription};
use std::rc::Rc;

/// A 0-127 parameter bound to an observable cell
pub struct RangedValue {
    name: String,
    value: Observable<u8>,
    reset_on_click: Option<u8>,
}

impl RangedValue {
    pub fn new(name: impl Into<String>, value: &Observable<u8>) -> Self {
        Self {
            name: name.into(),
            value: value.clone(),
            reset_on_click: None,
        }
    }

    /// Clicking the control (encoder push) resets the value
    pub fn with_reset_on_click(mut self, value: u8) -> Self {
        self.reset_on_click = Some(value.min(127));
        self
    }

    pub fn into_rc(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn cell(&self) -> &Observable<u8> {
        &self.value
    }

    /// Apply a relative move; 64 is no movement, 65 is +1, 63 is -1
    pub fn apply_delta(&self, raw: u8) {
        let delta = raw as i16 - 64;
        if delta == 0 {
            return;
        }
        self.value
            .update(|current| (*current as i16 + delta).clamp(0, 127) as u8);
    }
}

impl ControlValue for RangedValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn velocity(&self) -> u8 {
        self.value.get()
    }

    fn on_gesture(&self, gesture: Gesture) {
        if let (Gesture::Click, Some(reset)) = (gesture, self.reset_on_click) {
            self.value.set(reset);
        }
    }

    fn on_turn(&self, raw: u8, mode: TurnMode) {
        match mode {
            TurnMode::Absolute => {
                self.value.set(raw.min(127));
            }
            TurnMode::Relative => self.apply_delta(raw),
        }
    }

    fn watch(&self, listener: Rc<dyn Fn()>) -> Subscription {
        self.value.watch(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_turn() {
        let cell = Observable::new(0u8);
        let value = RangedValue::new("vol", &cell);
        value.on_turn(100, TurnMode::Absolute);
        assert_eq!(cell.get(), 100);
        assert_eq!(value.velocity(), 100);
    }

    #[test]
    fn test_relative_turn_clamps() {
        let cell = Observable::new(120u8);
        let value = RangedValue::new("pan", &cell);
        value.on_turn(64 + 20, TurnMode::Relative);
        assert_eq!(cell.get(), 127);
        value.on_turn(0, TurnMode::Relative);
        assert_eq!(cell.get(), 63);
        value.on_turn(64, TurnMode::Relative);
        assert_eq!(cell.get(), 63);
    }

    #[test]
    fn test_reset_on_click() {
        let cell = Observable::new(10u8);
        let value = RangedValue::new("pan", &cell).with_reset_on_click(64);
        value.on_gesture(Gesture::DoubleClick);
        assert_eq!(cell.get(), 10);
        value.on_gesture(Gesture::Click);
        assert_eq!(cell.get(), 64);
    }
}
