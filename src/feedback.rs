//! Outbound feedback with shadow-state de-duplication
//!
//! Every value written to a control identifier is remembered in a shadow map.
//! Sending the same value again is dropped, so re-evaluating an unchanged
//! binding never produces a second message. Until the surface is ready, sends
//! are coalesced per identifier and replayed when the flush gate opens.

use crate::midi::{ControlIdentifier, FeedbackMessage};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use tracing::trace;

#[derive(Default)]
pub struct FeedbackOutput {
    ready: Cell<bool>,
    /// Last value sent per identifier
    shadow: RefCell<HashMap<ControlIdentifier, u8>>,
    /// Latest value per identifier while not ready, in first-send order
    buffer: RefCell<Vec<FeedbackMessage>>,
    pending: RefCell<Vec<FeedbackMessage>>,
    suppressed: Cell<u64>,
}

impl FeedbackOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Queue `value` for `target`; returns false if dropped as redundant
    pub fn send(&self, target: ControlIdentifier, value: u8) -> bool {
        if !self.ready.get() {
            let mut buffer = self.buffer.borrow_mut();
            match buffer.iter_mut().find(|m| m.target == target) {
                Some(existing) => existing.value = value,
                None => buffer.push(FeedbackMessage { target, value }),
            }
            return true;
        }

        {
            let mut shadow = self.shadow.borrow_mut();
            if shadow.get(&target) == Some(&value) {
                trace!("Suppressed duplicate feedback {} v:{}", target, value);
                self.suppressed.set(self.suppressed.get() + 1);
                return false;
            }
            shadow.insert(target, value);
        }

        trace!("Feedback {} v:{}", target, value);
        self.pending
            .borrow_mut()
            .push(FeedbackMessage { target, value });
        true
    }

    /// Open the output and replay everything buffered so far
    pub fn mark_ready(&self) {
        if self.ready.replace(true) {
            return;
        }
        let buffered = std::mem::take(&mut *self.buffer.borrow_mut());
        trace!("Replaying {} buffered feedback messages", buffered.len());
        for message in buffered {
            self.send(message.target, message.value);
        }
    }

    /// Drain messages ready for transmission
    pub fn take_pending(&self) -> Vec<FeedbackMessage> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Last value sent for `target`
    pub fn last_sent(&self, target: &ControlIdentifier) -> Option<u8> {
        self.shadow.borrow().get(target).copied()
    }

    /// Forget the shadow value so the next send goes out unconditionally
    pub fn invalidate(&self, target: &ControlIdentifier) {
        self.shadow.borrow_mut().remove(target);
    }

    /// Forget all shadow values (after the surface was reconnected)
    pub fn invalidate_all(&self) {
        self.shadow.borrow_mut().clear();
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.get()
    }
}
