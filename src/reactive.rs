//! Single-threaded observable cells
//!
//! Every piece of application state the surface reflects is an
//! [`Observable`]. Writes notify subscribers synchronously, inside the call
//! that made the write, so a hardware message and all the feedback it causes
//! settle before the next message is dispatched.
//!
//! No `RefCell` borrow is held while listeners run: listeners may read the
//! cell, write it again, subscribe or unsubscribe.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBSERVABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an observable cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableId(u64);

impl ObservableId {
    fn next() -> Self {
        ObservableId(NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct ListenerSlot<T> {
    id: u64,
    active: Cell<bool>,
    callback: Box<dyn Fn(&T)>,
}

struct Inner<T> {
    id: ObservableId,
    value: RefCell<T>,
    listeners: RefCell<Vec<Rc<ListenerSlot<T>>>>,
    next_listener: Cell<u64>,
    /// Upstream subscriptions of derived cells
    sources: RefCell<Vec<Subscription>>,
}

impl<T> Inner<T> {
    fn remove_listener(&self, listener_id: u64) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(pos) = listeners.iter().position(|l| l.id == listener_id) {
            listeners[pos].active.set(false);
            listeners.remove(pos);
        }
    }
}

/// A shared, observable value cell
///
/// Cloning shares the cell; equality of cells is identity ([`Observable::ptr_eq`]).
pub struct Observable<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: ObservableId::next(),
                value: RefCell::new(initial),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                sources: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> ObservableId {
        self.inner.id
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Write a value, notifying subscribers only if it differs
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.notify();
        true
    }

    /// Write a value and notify subscribers even if it is unchanged
    pub fn set_always(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    /// Compute a new value from the current one
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Mutate in place and notify unconditionally
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Re-deliver the current value to every subscriber
    ///
    /// Each listener receives the value current at the time it is called, so
    /// a write made by an earlier listener is what later listeners observe.
    pub fn notify(&self) {
        let listeners: Vec<_> = self.inner.listeners.borrow().iter().cloned().collect();
        for listener in listeners {
            // Unsubscribed by an earlier listener during this round
            if listener.active.get() {
                let value = self.get();
                (listener.callback)(&value);
            }
        }
    }

    /// Subscribe to changes; the listener is removed when the returned
    /// subscription is dropped
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push(Rc::new(ListenerSlot {
            id,
            active: Cell::new(true),
            callback: Box::new(listener),
        }));

        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_listener(id);
            }
        })
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Derived cell tracking `f(self)`
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let derived = Observable::new(self.with(|v| f(v)));
        let weak = Rc::downgrade(&derived.inner);
        let sub = self.subscribe(move |v| {
            if let Some(inner) = weak.upgrade() {
                Observable { inner }.set(f(v));
            }
        });
        derived.inner.sources.borrow_mut().push(sub);
        derived
    }

    /// Derived cell recomputed whenever any of `deps` changes
    pub fn computed<F>(deps: &[&dyn Signal], f: F) -> Observable<T>
    where
        F: Fn() -> T + 'static,
    {
        let compute: Rc<dyn Fn() -> T> = Rc::new(f);
        let derived = Observable::new(compute());
        for dep in deps {
            let weak = Rc::downgrade(&derived.inner);
            let compute = Rc::clone(&compute);
            let sub = dep.watch(Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Observable { inner }.set(compute());
                }
            }));
            derived.inner.sources.borrow_mut().push(sub);
        }
        derived
    }

    /// Read-only view on this cell
    pub fn read_only(&self) -> ReadOnly<T> {
        ReadOnly(self.clone())
    }

    pub fn ptr_eq(&self, other: &Observable<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Observable<bool> {
    /// Flip a boolean cell
    pub fn toggle(&self) {
        self.update(|v| !v);
    }
}

/// Read-only handle to an observable cell
pub struct ReadOnly<T>(Observable<T>);

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        ReadOnly(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Clone + PartialEq + 'static> ReadOnly<T> {
    pub fn id(&self) -> ObservableId {
        self.0.id()
    }

    pub fn get(&self) -> T {
        self.0.get()
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        self.0.subscribe(listener)
    }

    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        self.0.map(f)
    }
}

/// Anything that can announce "I changed" without exposing its type
pub trait Signal {
    fn watch(&self, listener: Rc<dyn Fn()>) -> Subscription;
}

impl<T: Clone + PartialEq + 'static> Signal for Observable<T> {
    fn watch(&self, listener: Rc<dyn Fn()>) -> Subscription {
        self.subscribe(move |_| listener())
    }
}

impl<T: Clone + PartialEq + 'static> Signal for ReadOnly<T> {
    fn watch(&self, listener: Rc<dyn Fn()>) -> Subscription {
        self.0.watch(listener)
    }
}

/// Handle keeping a listener registered; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that owns nothing
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Bundle several subscriptions into one handle
    pub fn merge(subscriptions: Vec<Subscription>) -> Self {
        if subscriptions.is_empty() {
            return Self::empty();
        }
        Self::new(move || drop(subscriptions))
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the listener registered for the lifetime of the source
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_notifies_only_on_change() {
        let cell = Observable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = cell.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        assert!(cell.set(2));
        assert!(!cell.set(2));
        cell.set_always(2);

        assert_eq!(*seen.borrow(), vec![2, 2]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let cell = Observable::new(false);
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let sub = cell.subscribe(move |_| hits_clone.set(hits_clone.get() + 1));

        cell.toggle();
        drop(sub);
        cell.toggle();

        assert_eq!(hits.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn test_detached_subscription_stays() {
        let cell = Observable::new(0u8);
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        cell.subscribe(move |_| hits_clone.set(hits_clone.get() + 1))
            .detach();

        cell.set(5);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_reentrant_write_from_listener() {
        let cell = Observable::new(0);
        let writer = cell.clone();
        let _sub = cell.subscribe(move |v| {
            if *v < 3 {
                writer.set(v + 1);
            }
        });

        cell.set(1);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn test_listener_may_subscribe_and_write_back() {
        let cell = Observable::new(0u8);
        let clamp = cell.clone();
        let _clamp = cell.subscribe(move |v| {
            if *v > 10 {
                clamp.set(10);
            }
        });

        let late: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let late_hits = Rc::new(Cell::new(0));
        let (source, slot, hits) = (cell.clone(), Rc::clone(&late), Rc::clone(&late_hits));
        let _subscriber = cell.subscribe(move |_| {
            if slot.borrow().is_none() {
                let hits = Rc::clone(&hits);
                let sub = source.subscribe(move |_| hits.set(hits.get() + 1));
                *slot.borrow_mut() = Some(sub);
            }
        });

        cell.set(15);
        assert_eq!(cell.get(), 10);
        assert!(late.borrow().is_some());

        let before = late_hits.get();
        cell.set(4);
        assert_eq!(late_hits.get(), before + 1);
    }

    #[test]
    fn test_listener_removed_mid_round_is_skipped() {
        let cell = Observable::new(0);
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));

        let victim_clone = Rc::clone(&victim);
        let _killer = cell.subscribe(move |_| {
            victim_clone.borrow_mut().take();
        });
        let hits_clone = Rc::clone(&hits);
        *victim.borrow_mut() = Some(cell.subscribe(move |_| hits_clone.set(hits_clone.get() + 1)));

        cell.set(1);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_map_and_computed() {
        let page = Observable::new(0usize);
        let last_page = Observable::new(3usize);
        let is_first = page.map(|p| *p == 0);

        let (p, l) = (page.clone(), last_page.clone());
        let has_next = Observable::computed(&[&page, &last_page], move || p.get() < l.get());

        assert!(is_first.get());
        assert!(has_next.get());

        page.set(3);
        assert!(!is_first.get());
        assert!(!has_next.get());

        last_page.set(5);
        assert!(has_next.get());
    }

    #[test]
    fn test_read_only_signal() {
        let cell = Observable::new(10u8);
        let view = cell.read_only();
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let _sub = view.watch(Rc::new(move || hits_clone.set(hits_clone.get() + 1)));

        cell.set(11);
        assert_eq!(view.get(), 11);
        assert_eq!(hits.get(), 1);
        assert_eq!(view.id(), cell.id());
    }
}
