//! Reactive binding of physical control surfaces to application state
//!
//! A [`Surface`] owns one event dispatcher, scheduler, feedback output and
//! flush gate. [`Control`]s register with it, [`ControlSet`]s page through
//! [`ValueSet`]s of [`ControlValue`]s, and every value re-renders its control
//! whenever the observable state it depends on changes.

pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod feedback;
pub mod flush;
pub mod gesture;
pub mod midi;
pub mod ports;
pub mod prefs;
pub mod reactive;
pub mod scheduler;
pub mod snapshot;
pub mod surface;
pub mod value;
pub mod view;

pub use control::{Control, ControlConfig, ControlKind, ControlSet};
pub use dispatcher::EventDispatcher;
pub use error::{Result, SurfaceError};
pub use gesture::{Gesture, GestureTiming, GestureTracker};
pub use midi::{ControlIdentifier, FeedbackMessage, MessageKind, MidiMessage};
pub use reactive::{Observable, ReadOnly, Subscription};
pub use scheduler::Scheduler;
pub use surface::Surface;
pub use value::{ControlValue, RangedValue, SyncedValue, Token, ValueSet};
pub use view::{MatrixView, ScrollableWindow, TracksView};
