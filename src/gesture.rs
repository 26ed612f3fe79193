//! Press/release classification into click, double-click and long-click
//!
//! [`GestureMachine`] is the pure state machine; [`GestureTracker`] owns one
//! machine per physical control plus its single outstanding timer.
//!
//! ```text
//! Idle --press--> Pressed --release--> Idle (Click)
//!                    |        \--release, double-click aware--> DoubleClickPending
//!                    |                    |--window expires--> Idle (Click)
//!                    |                    \--press--> SecondPress (DoubleClick) --release--> Idle
//!                    \--long-press timer--> LongPressed (LongClick) --release--> Idle (LongRelease)
//! ```

use crate::scheduler::{Scheduler, TimerHandle};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Semantic gestures emitted by a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Click,
    DoubleClick,
    LongClick,
    /// Release following a LongClick
    LongRelease,
}

/// Gesture thresholds in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct GestureTiming {
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
    #[serde(default = "default_double_click_ms")]
    pub double_click_ms: u64,
}

fn default_long_press_ms() -> u64 {
    550
}

fn default_double_click_ms() -> u64 {
    350
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self {
            long_press_ms: default_long_press_ms(),
            double_click_ms: default_double_click_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    Pressed,
    LongPressed,
    DoubleClickPending,
    SecondPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    LongPress,
    DoubleClickWindow,
}

/// What the owner must do with its timer after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Keep,
    Cancel,
    /// Cancel any outstanding timer and arm this one
    Arm(TimerKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub gesture: Option<Gesture>,
    pub timer: TimerCommand,
}

impl Transition {
    fn none() -> Self {
        Self {
            gesture: None,
            timer: TimerCommand::Keep,
        }
    }

    fn emit(gesture: Gesture, timer: TimerCommand) -> Self {
        Self {
            gesture: Some(gesture),
            timer,
        }
    }

    fn timer(timer: TimerCommand) -> Self {
        Self {
            gesture: None,
            timer,
        }
    }
}

/// Pure gesture state machine, free of clocks and timers
#[derive(Debug, Clone)]
pub struct GestureMachine {
    state: GestureState,
    double_click_aware: bool,
}

impl GestureMachine {
    pub fn new(double_click_aware: bool) -> Self {
        Self {
            state: GestureState::Idle,
            double_click_aware,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn set_double_click_aware(&mut self, aware: bool) {
        self.double_click_aware = aware;
    }

    pub fn press(&mut self) -> Transition {
        match self.state {
            GestureState::Idle => {
                self.state = GestureState::Pressed;
                Transition::timer(TimerCommand::Arm(TimerKind::LongPress))
            }
            GestureState::DoubleClickPending => {
                self.state = GestureState::SecondPress;
                Transition::emit(Gesture::DoubleClick, TimerCommand::Cancel)
            }
            // Repeated note-on while held
            GestureState::Pressed | GestureState::LongPressed | GestureState::SecondPress => {
                Transition::none()
            }
        }
    }

    pub fn release(&mut self) -> Transition {
        match self.state {
            GestureState::Pressed if self.double_click_aware => {
                self.state = GestureState::DoubleClickPending;
                Transition::timer(TimerCommand::Arm(TimerKind::DoubleClickWindow))
            }
            GestureState::Pressed => {
                self.state = GestureState::Idle;
                Transition::emit(Gesture::Click, TimerCommand::Cancel)
            }
            GestureState::LongPressed => {
                self.state = GestureState::Idle;
                Transition::emit(Gesture::LongRelease, TimerCommand::Keep)
            }
            GestureState::SecondPress => {
                self.state = GestureState::Idle;
                Transition::none()
            }
            GestureState::Idle | GestureState::DoubleClickPending => Transition::none(),
        }
    }

    pub fn timer_fired(&mut self, kind: TimerKind) -> Transition {
        match (self.state, kind) {
            (GestureState::Pressed, TimerKind::LongPress) => {
                self.state = GestureState::LongPressed;
                Transition::emit(Gesture::LongClick, TimerCommand::Keep)
            }
            (GestureState::DoubleClickPending, TimerKind::DoubleClickWindow) => {
                self.state = GestureState::Idle;
                Transition::emit(Gesture::Click, TimerCommand::Keep)
            }
            _ => Transition::none(),
        }
    }

    /// Drop any gesture in progress
    pub fn reset(&mut self) -> Transition {
        self.state = GestureState::Idle;
        Transition::timer(TimerCommand::Cancel)
    }
}

struct TrackerState {
    machine: GestureMachine,
    timer: Option<TimerHandle>,
    /// Bumped whenever the outstanding timer is replaced or cancelled
    epoch: u64,
    pressed_at_ms: Option<u64>,
}

type GestureSink = Rc<dyn Fn(Gesture)>;

/// Per-control gesture tracker with one cancellable timer
pub struct GestureTracker {
    scheduler: Scheduler,
    timing: GestureTiming,
    state: RefCell<TrackerState>,
    sink: RefCell<Option<GestureSink>>,
    weak_self: Weak<GestureTracker>,
}

impl GestureTracker {
    pub fn new(scheduler: Scheduler, timing: GestureTiming) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            scheduler,
            timing,
            state: RefCell::new(TrackerState {
                machine: GestureMachine::new(false),
                timer: None,
                epoch: 0,
                pressed_at_ms: None,
            }),
            sink: RefCell::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Receiver for emitted gestures
    pub fn set_sink(&self, sink: impl Fn(Gesture) + 'static) {
        *self.sink.borrow_mut() = Some(Rc::new(sink));
    }

    pub fn set_double_click_aware(&self, aware: bool) {
        self.state.borrow_mut().machine.set_double_click_aware(aware);
    }

    pub fn state(&self) -> GestureState {
        self.state.borrow().machine.state()
    }

    pub fn is_pressed(&self) -> bool {
        matches!(
            self.state(),
            GestureState::Pressed | GestureState::LongPressed | GestureState::SecondPress
        )
    }

    /// Timestamp of the press currently held, if any
    pub fn pressed_at_ms(&self) -> Option<u64> {
        self.state.borrow().pressed_at_ms
    }

    pub fn press(&self) {
        let transition = {
            let mut state = self.state.borrow_mut();
            if state.pressed_at_ms.is_none() {
                state.pressed_at_ms = Some(self.scheduler.now_ms());
            }
            state.machine.press()
        };
        self.apply(transition);
    }

    pub fn release(&self) {
        let transition = {
            let mut state = self.state.borrow_mut();
            state.pressed_at_ms = None;
            state.machine.release()
        };
        self.apply(transition);
    }

    /// Feed a raw velocity: > 0 presses, 0 releases
    pub fn handle_velocity(&self, velocity: u8) {
        if velocity > 0 {
            self.press();
        } else {
            self.release();
        }
    }

    /// Abandon the gesture in progress and cancel the outstanding timer
    pub fn cancel(&self) {
        let transition = {
            let mut state = self.state.borrow_mut();
            state.pressed_at_ms = None;
            state.machine.reset()
        };
        self.apply(transition);
    }

    fn apply(&self, transition: Transition) {
        match transition.timer {
            TimerCommand::Keep => {}
            TimerCommand::Cancel => self.cancel_timer(),
            TimerCommand::Arm(kind) => self.arm_timer(kind),
        }
        if let Some(gesture) = transition.gesture {
            self.emit(gesture);
        }
    }

    fn cancel_timer(&self) {
        let mut state = self.state.borrow_mut();
        state.epoch += 1;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
    }

    fn arm_timer(&self, kind: TimerKind) {
        self.cancel_timer();

        let delay = match kind {
            TimerKind::LongPress => self.timing.long_press_ms,
            TimerKind::DoubleClickWindow => self.timing.double_click_ms,
        };
        let epoch = self.state.borrow().epoch;
        let weak = self.weak_self.clone();
        let handle = self.scheduler.schedule(delay, move || {
            if let Some(tracker) = weak.upgrade() {
                tracker.on_timer(kind, epoch);
            }
        });
        self.state.borrow_mut().timer = Some(handle);
    }

    fn on_timer(&self, kind: TimerKind, epoch: u64) {
        let transition = {
            let mut state = self.state.borrow_mut();
            if state.epoch != epoch {
                debug!("Ignoring stale {:?} timer (epoch {} != {})", kind, epoch, state.epoch);
                return;
            }
            state.timer = None;
            state.machine.timer_fired(kind)
        };
        self.apply(transition);
    }

    fn emit(&self, gesture: Gesture) {
        let sink = self.sink.borrow().clone();
        match sink {
            Some(sink) => {
                trace!("Gesture {:?}", gesture);
                sink(gesture);
            }
            None => trace!("Gesture {:?} without sink", gesture),
        }
    }
}
