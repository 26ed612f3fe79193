//! Composition root for one control surface
//!
//! Owns the single dispatcher, scheduler, feedback output and flush gate of a
//! surface and hands out shared handles to them. Nothing here is global; a
//! process may drive several surfaces side by side.

use crate::dispatcher::EventDispatcher;
use crate::feedback::FeedbackOutput;
use crate::flush::FlushGate;
use crate::gesture::GestureTiming;
use crate::midi::{FeedbackMessage, InboundMessage, MessageKind};
use crate::scheduler::Scheduler;
use std::rc::Rc;
use tracing::info;

/// Shared context handed to controls and wiring code
#[derive(Clone)]
pub struct Surface {
    dispatcher: Rc<EventDispatcher>,
    scheduler: Scheduler,
    output: Rc<FeedbackOutput>,
    flush_gate: Rc<FlushGate>,
    timing: GestureTiming,
}

impl Surface {
    pub fn new(timing: GestureTiming) -> Self {
        Self {
            dispatcher: Rc::new(EventDispatcher::new()),
            scheduler: Scheduler::new(),
            output: Rc::new(FeedbackOutput::new()),
            flush_gate: Rc::new(FlushGate::new()),
            timing,
        }
    }

    pub fn dispatcher(&self) -> &Rc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn output(&self) -> &Rc<FeedbackOutput> {
        &self.output
    }

    pub fn flush_gate(&self) -> &Rc<FlushGate> {
        &self.flush_gate
    }

    pub fn timing(&self) -> GestureTiming {
        self.timing
    }

    /// Fire due timers, then route one inbound message received at `at_ms`
    pub fn handle_message(
        &self,
        kind: MessageKind,
        channel: u8,
        number: u8,
        value: u8,
        at_ms: u64,
    ) -> bool {
        self.scheduler.advance_to(at_ms);
        self.dispatcher.dispatch(kind, channel, number, value)
    }

    pub fn handle_inbound(&self, msg: &InboundMessage, at_ms: u64) -> bool {
        self.handle_message(msg.kind, msg.channel, msg.number, msg.value, at_ms)
    }

    /// Fire timers due at or before `at_ms`
    pub fn advance_to(&self, at_ms: u64) {
        self.scheduler.advance_to(at_ms);
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.scheduler.next_deadline_ms()
    }

    /// Run `callback` once the surface completed its first flush
    pub fn on_first_flush(&self, callback: impl FnOnce() + 'static) {
        self.flush_gate.on_first_flush(callback);
    }

    /// One flush cycle: returns the feedback to transmit
    ///
    /// The first call runs the deferred initialisation and then releases
    /// everything buffered so far, de-duplicated per identifier.
    pub fn flush(&self) -> Vec<FeedbackMessage> {
        if !self.flush_gate.is_open() {
            self.flush_gate.open();
            self.output.mark_ready();
            info!("Surface ready");
        }
        self.output.take_pending()
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new(GestureTiming::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::ControlIdentifier;
    use std::cell::Cell;

    #[test]
    fn test_feedback_before_first_flush_is_coalesced() {
        let surface = Surface::default();
        let id = ControlIdentifier::note(0, 1).unwrap();
        surface.output().send(id, 1);
        surface.output().send(id, 2);

        let sent = surface.flush();
        assert_eq!(sent, vec![FeedbackMessage { target: id, value: 2 }]);
        assert!(surface.flush().is_empty());
    }

    #[test]
    fn test_deferred_init_runs_on_first_flush() {
        let surface = Surface::default();
        let id = ControlIdentifier::note(0, 9).unwrap();
        let ran = Rc::new(Cell::new(0));

        let output = Rc::clone(surface.output());
        let ran_clone = Rc::clone(&ran);
        surface.on_first_flush(move || {
            ran_clone.set(ran_clone.get() + 1);
            output.send(id, 127);
        });

        assert_eq!(ran.get(), 0);
        let sent = surface.flush();
        assert_eq!(ran.get(), 1);
        assert_eq!(sent.len(), 1);

        surface.flush();
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_handle_message_advances_clock_first() {
        let surface = Surface::default();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = Rc::clone(&fired);
        let _timer = surface.scheduler().schedule(100, move || fired_clone.set(true));

        assert!(!surface.handle_message(MessageKind::Note, 0, 0, 127, 150));
        assert!(fired.get());
        assert_eq!(surface.next_deadline_ms(), None);
    }
}
