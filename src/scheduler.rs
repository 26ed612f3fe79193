//! Delayed callbacks on an explicit monotonic clock
//!
//! The scheduler never reads the wall clock itself. The host advances it with
//! monotonic millisecond timestamps (see [`MonotonicClock`]) before each
//! dispatched message, which makes gesture timing deterministic in tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tracing::trace;

type TimerCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerState {
    now_ms: u64,
    next_id: u64,
    /// Keyed by (due, id) so equal deadlines fire in scheduling order
    timers: BTreeMap<(u64, u64), TimerCallback>,
}

/// Shared timer queue; clones refer to the same queue
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock position in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }

    /// Run `callback` once, `delay_ms` after the current clock position
    pub fn schedule(&self, delay_ms: u64, callback: impl FnOnce() + 'static) -> TimerHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now_ms.saturating_add(delay_ms);
        state.timers.insert((due, id), Box::new(callback));
        trace!("Timer {} scheduled for t={}ms", id, due);

        TimerHandle {
            key: (due, id),
            state: Rc::downgrade(&self.state),
        }
    }

    /// Move the clock forward, firing every timer due at or before `now_ms`
    ///
    /// The clock never moves backwards; an older timestamp only fires
    /// timers that are already overdue.
    pub fn advance_to(&self, now_ms: u64) {
        loop {
            let due_callback = {
                let mut state = self.state.borrow_mut();
                let target = now_ms.max(state.now_ms);
                match state.timers.keys().next().copied() {
                    Some(key) if key.0 <= target => {
                        state.now_ms = state.now_ms.max(key.0);
                        state.timers.remove(&key)
                    }
                    _ => {
                        state.now_ms = target;
                        None
                    }
                }
            };

            // Borrow released: callbacks may schedule or cancel timers
            match due_callback {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Advance by a relative amount
    pub fn advance_by(&self, delta_ms: u64) {
        let target = self.now_ms().saturating_add(delta_ms);
        self.advance_to(target);
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.state.borrow().timers.keys().next().map(|(due, _)| *due)
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().timers.len()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Scheduler")
            .field("now_ms", &state.now_ms)
            .field("pending", &state.timers.len())
            .finish()
    }
}

/// Handle to one scheduled callback
#[derive(Debug, Clone)]
pub struct TimerHandle {
    key: (u64, u64),
    state: Weak<RefCell<SchedulerState>>,
}

impl TimerHandle {
    /// Cancel the callback; returns false if it already fired or was cancelled
    pub fn cancel(&self) -> bool {
        match self.state.upgrade() {
            Some(state) => {
                let removed = state.borrow_mut().timers.remove(&self.key).is_some();
                if removed {
                    trace!("Timer {} cancelled", self.key.1);
                }
                removed
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state
            .upgrade()
            .map(|state| state.borrow().timers.contains_key(&self.key))
            .unwrap_or(false)
    }

    pub fn due_ms(&self) -> u64 {
        self.key.0
    }
}

/// Millisecond timestamps relative to a fixed start instant
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start_instant: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start_instant: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    /// Timestamp of `instant`; instants before the start map to 0
    pub fn ms_at(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.start_instant).as_millis() as u64
    }

    /// Instant corresponding to a timestamp from this clock
    pub fn instant_at(&self, ms: u64) -> Instant {
        self.start_instant + std::time::Duration::from_millis(ms)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_fires_in_deadline_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (delay, tag) in [(30, "c"), (10, "a"), (20, "b")] {
            let log = Rc::clone(&log);
            scheduler
                .schedule(delay, move || log.borrow_mut().push(tag))
                .is_pending();
        }

        scheduler.advance_to(15);
        assert_eq!(*log.borrow(), vec!["a"]);

        scheduler.advance_to(100);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(scheduler.now_ms(), 100);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let scheduler = Scheduler::new();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = Rc::clone(&fired);

        let handle = scheduler.schedule(50, move || fired_clone.set(true));
        assert!(handle.cancel());
        assert!(!handle.cancel());

        scheduler.advance_to(1_000);
        assert!(!fired.get());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_callback_can_schedule_follow_up() {
        let scheduler = Scheduler::new();
        let hits = Rc::new(Cell::new(0));

        let inner_scheduler = scheduler.clone();
        let hits_clone = Rc::clone(&hits);
        let _handle = scheduler.schedule(10, move || {
            hits_clone.set(hits_clone.get() + 1);
            let hits_again = Rc::clone(&hits_clone);
            let _ = inner_scheduler.schedule(10, move || hits_again.set(hits_again.get() + 1));
        });

        scheduler.advance_to(15);
        assert_eq!(hits.get(), 1);
        assert_eq!(scheduler.next_deadline_ms(), Some(20));

        scheduler.advance_to(20);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_clock_never_runs_backwards() {
        let scheduler = Scheduler::new();
        scheduler.advance_to(500);
        scheduler.advance_to(100);
        assert_eq!(scheduler.now_ms(), 500);

        let handle = scheduler.schedule(0, || {});
        assert_eq!(handle.due_ms(), 500);
    }
}
