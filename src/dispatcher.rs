//! Inbound message routing
//!
//! Routes decoded `(kind, channel, number, value)` triples to at most one
//! registered handler per [`ControlIdentifier`], and maintains derived cells
//! for press state and last controller value.

use crate::error::{Result, SurfaceError};
use crate::midi::{ControlIdentifier, InboundMessage, MessageKind};
use crate::reactive::{Observable, ReadOnly};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// Handler invoked with the raw value (0-127) of a dispatched message
pub type Handler = Rc<dyn Fn(u8)>;

/// Dispatch counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub unhandled: u64,
}

/// Routes inbound hardware messages to registered handlers
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RefCell<HashMap<ControlIdentifier, Handler>>,
    press_cells: RefCell<HashMap<ControlIdentifier, Observable<bool>>>,
    value_cells: RefCell<HashMap<ControlIdentifier, Observable<u8>>>,
    handled: Cell<u64>,
    unhandled: Cell<u64>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to an identifier
    ///
    /// Fails with [`SurfaceError::DuplicateRegistration`] if a handler is
    /// already bound; use [`EventDispatcher::replace`] to rebind on purpose.
    pub fn register(&self, id: ControlIdentifier, handler: impl Fn(u8) + 'static) -> Result<()> {
        let mut handlers = self.handlers.borrow_mut();
        if handlers.contains_key(&id) {
            return Err(SurfaceError::DuplicateRegistration(id));
        }
        handlers.insert(id, Rc::new(handler));
        debug!("Registered handler for {}", id);
        Ok(())
    }

    /// Bind a handler, replacing any existing one; returns true if one was replaced
    pub fn replace(&self, id: ControlIdentifier, handler: impl Fn(u8) + 'static) -> bool {
        let previous = self.handlers.borrow_mut().insert(id, Rc::new(handler));
        debug!("Replaced handler for {} (existed: {})", id, previous.is_some());
        previous.is_some()
    }

    pub fn unregister(&self, id: &ControlIdentifier) -> bool {
        self.handlers.borrow_mut().remove(id).is_some()
    }

    pub fn is_registered(&self, id: &ControlIdentifier) -> bool {
        self.handlers.borrow().contains_key(id)
    }

    /// Register a note handler receiving the raw velocity
    pub fn on_note(
        &self,
        channel: u8,
        note: u8,
        handler: impl Fn(u8) + 'static,
    ) -> Result<ControlIdentifier> {
        let id = ControlIdentifier::note(channel, note)?;
        self.register(id, handler)?;
        Ok(id)
    }

    /// Register a note handler that only fires on press (velocity > 0)
    pub fn on_note_pressed(
        &self,
        channel: u8,
        note: u8,
        handler: impl Fn() + 'static,
    ) -> Result<ControlIdentifier> {
        self.on_note(channel, note, move |velocity| {
            if velocity > 0 {
                handler();
            }
        })
    }

    /// Register a controller handler receiving the raw value
    pub fn on_cc(
        &self,
        channel: u8,
        cc: u8,
        handler: impl Fn(u8) + 'static,
    ) -> Result<ControlIdentifier> {
        let id = ControlIdentifier::cc(channel, cc)?;
        self.register(id, handler)?;
        Ok(id)
    }

    /// Cell holding `value > 0` of the last message dispatched for `id`
    pub fn press_observable(&self, id: ControlIdentifier) -> ReadOnly<bool> {
        self.press_cells
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| Observable::new(false))
            .read_only()
    }

    /// Cell holding the raw value of the last message dispatched for `id`
    pub fn positive_value_observable(&self, id: ControlIdentifier) -> ReadOnly<u8> {
        self.value_cells
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| Observable::new(0))
            .read_only()
    }

    /// Route one message; returns whether a handler was invoked
    ///
    /// Derived cells are updated (and their subscribers notified) before the
    /// handler runs, all inside this call.
    pub fn dispatch(&self, kind: MessageKind, channel: u8, number: u8, value: u8) -> bool {
        let id = ControlIdentifier {
            kind,
            channel,
            number,
        };

        // Clone cells and handler out so no borrow is held across callbacks
        let press_cell = self.press_cells.borrow().get(&id).cloned();
        if let Some(cell) = press_cell {
            cell.set(value > 0);
        }
        let value_cell = self.value_cells.borrow().get(&id).cloned();
        if let Some(cell) = value_cell {
            cell.set(value);
        }

        let handler = self.handlers.borrow().get(&id).cloned();
        match handler {
            Some(handler) => {
                trace!("Dispatch {} v:{}", id, value);
                self.handled.set(self.handled.get() + 1);
                handler(value);
                true
            }
            None => {
                trace!("Unhandled {} v:{}", id, value);
                self.unhandled.set(self.unhandled.get() + 1);
                false
            }
        }
    }

    pub fn dispatch_inbound(&self, msg: &InboundMessage) -> bool {
        self.dispatch(msg.kind, msg.channel, msg.number, msg.value)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            handled: self.handled.get(),
            unhandled: self.unhandled.get(),
        }
    }

    pub fn registered_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}
