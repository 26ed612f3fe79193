//! Deferral of initialisation until the first flush cycle

use std::cell::{Cell, RefCell};
use tracing::debug;

type Deferred = Box<dyn FnOnce()>;

/// Runs registered callbacks exactly once, on the first flush
#[derive(Default)]
pub struct FlushGate {
    opened: Cell<bool>,
    deferred: RefCell<Vec<Deferred>>,
}

impl FlushGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.opened.get()
    }

    /// Defer `callback` until the first flush; runs immediately once open
    pub fn on_first_flush(&self, callback: impl FnOnce() + 'static) {
        if self.opened.get() {
            callback();
        } else {
            self.deferred.borrow_mut().push(Box::new(callback));
        }
    }

    /// Open the gate; returns false if it was already open
    ///
    /// Callbacks registered while the deferred batch runs are executed in
    /// the same call, after the batch.
    pub fn open(&self) -> bool {
        if self.opened.get() {
            return false;
        }

        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.deferred.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for callback in batch {
                callback();
                ran += 1;
            }
        }
        self.opened.set(true);
        debug!("Flush gate opened, ran {} deferred callbacks", ran);
        true
    }

    pub fn pending(&self) -> usize {
        self.deferred.borrow().len()
    }
}
