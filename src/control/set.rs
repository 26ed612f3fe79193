//! Fixed rows of controls with hot-swappable value sets

use super::Control;
use crate::error::{ensure_in_range, Result, SurfaceError};
use crate::reactive::{Observable, ReadOnly, Subscription};
use crate::value::{ControlValue, DisabledValue, Token, ValueSet};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// A fixed array of controls showing one page of an attached [`ValueSet`]
///
/// While a set is attached, control `i` is bound to
/// `set.entry_at(set.current_page(), i)`; page changes rebind every control
/// within the page-change notification, and length changes rebind within the
/// length notification. A value set is attached to at most one control set
/// at a time.
pub struct ControlSet {
    name: String,
    controls: Vec<Rc<Control>>,
    /// Bound where the attached set has no entry
    stubs: Vec<Rc<dyn ControlValue>>,
    attached: RefCell<Option<Rc<ValueSet>>>,
    links: RefCell<Vec<Subscription>>,
    known_sets: RefCell<Vec<Rc<ValueSet>>>,
    auto_swap: Cell<bool>,
    muted: Cell<bool>,
    selection: Observable<Option<Token>>,
    value_page: Observable<usize>,
    has_prev_value_page: Observable<bool>,
    has_next_value_page: Observable<bool>,
    own_links: RefCell<Vec<Subscription>>,
    weak_self: Weak<ControlSet>,
}

impl ControlSet {
    pub fn new(name: impl Into<String>, controls: Vec<Rc<Control>>) -> Result<Rc<Self>> {
        let name = name.into();
        ensure_in_range(controls.len(), 1, usize::MAX, "control count")?;

        let stubs = (0..controls.len())
            .map(|i| {
                let stub: Rc<dyn ControlValue> =
                    Rc::new(DisabledValue::new(format!("{}-empty{}", name, i), 0));
                stub
            })
            .collect();

        let set = Rc::new_cyclic(|weak_self| ControlSet {
            name,
            controls,
            stubs,
            attached: RefCell::new(None),
            links: RefCell::new(Vec::new()),
            known_sets: RefCell::new(Vec::new()),
            auto_swap: Cell::new(false),
            muted: Cell::new(false),
            selection: Observable::new(None),
            value_page: Observable::new(0),
            has_prev_value_page: Observable::new(false),
            has_next_value_page: Observable::new(false),
            own_links: RefCell::new(Vec::new()),
            weak_self: weak_self.clone(),
        });

        let weak = Rc::downgrade(&set);
        let selection_link = set.selection.subscribe(move |token| {
            if let Some(set) = weak.upgrade() {
                set.on_selection(token.clone());
            }
        });
        let weak = Rc::downgrade(&set);
        let page_link = set.value_page.subscribe(move |page| {
            if let Some(set) = weak.upgrade() {
                set.on_value_page_written(*page);
            }
        });
        set.own_links
            .borrow_mut()
            .extend([selection_link, page_link]);

        debug!("Created control set '{}' with {} controls", set.name, set.controls.len());
        Ok(set)
    }

    /// Build `size` controls with `create(index)`
    ///
    /// If any control fails, those already created are dropped and release
    /// their identifiers.
    pub fn build(
        name: impl Into<String>,
        size: usize,
        mut create: impl FnMut(usize) -> Result<Rc<Control>>,
    ) -> Result<Rc<Self>> {
        let controls = (0..size).map(&mut create).collect::<Result<Vec<_>>>()?;
        Self::new(name, controls)
    }

    /// Rebind on page changes and take over displaced sets when another
    /// control set steals the attached one
    pub fn with_auto_swap(self: Rc<Self>) -> Rc<Self> {
        self.auto_swap.set(true);
        self
    }

    pub fn has_auto_swap(&self) -> bool {
        self.auto_swap.get()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn controls(&self) -> &[Rc<Control>] {
        &self.controls
    }

    pub fn control(&self, index: usize) -> Option<&Rc<Control>> {
        self.controls.get(index)
    }

    pub fn attached(&self) -> Option<Rc<ValueSet>> {
        self.attached.borrow().clone()
    }

    pub fn is_attached_to(&self, set: &Rc<ValueSet>) -> bool {
        self.attached
            .borrow()
            .as_ref()
            .map(|current| Rc::ptr_eq(current, set))
            .unwrap_or(false)
    }

    fn check_window(&self, set: &ValueSet) -> Result<()> {
        if set.window() != self.controls.len() {
            return Err(SurfaceError::WindowSizeMismatch {
                value_set: set.name().to_string(),
                window: set.window(),
                control_set: self.name.clone(),
                controls: self.controls.len(),
            });
        }
        Ok(())
    }

    /// Make `set` selectable through [`ControlSet::selection`]
    pub fn register_value_set(&self, set: &Rc<ValueSet>) -> Result<()> {
        self.check_window(set)?;
        let mut known = self.known_sets.borrow_mut();
        if !known.iter().any(|k| Rc::ptr_eq(k, set)) {
            known.push(Rc::clone(set));
        }
        Ok(())
    }

    /// Attach `set`, rebinding every control to its current page
    ///
    /// If `set` is attached to another control set it is taken from there;
    /// an auto-swap control set then receives this set's previous value set.
    pub fn attach(&self, set: &Rc<ValueSet>) -> Result<()> {
        self.check_window(set)?;
        if self.is_attached_to(set) {
            return Ok(());
        }
        self.register_value_set(set)?;

        let displaced = self.unlink();
        let stolen_from = set
            .controller()
            .filter(|other| !std::ptr::eq(Rc::as_ptr(other), self));
        if let Some(other) = &stolen_from {
            debug!("'{}' takes '{}' from '{}'", self.name, set.name(), other.name);
            other.unlink();
        }

        self.link(set);

        if let Some(other) = stolen_from {
            match displaced.filter(|_| other.has_auto_swap()) {
                Some(previous) => {
                    if let Err(e) = other.attach(&previous) {
                        warn!("Cannot swap '{}' into '{}': {}", previous.name(), other.name, e);
                        other.clear_bindings();
                    }
                }
                None => other.clear_bindings(),
            }
        }
        Ok(())
    }

    /// Detach the current set; controls are left unbound
    pub fn detach(&self) -> Option<Rc<ValueSet>> {
        let previous = self.unlink();
        if previous.is_some() {
            self.clear_bindings();
        }
        previous
    }

    fn clear_bindings(&self) {
        for control in &self.controls {
            control.bind(None);
        }
        self.selection.set(None);
        self.value_page.set(0);
        self.has_prev_value_page.set(false);
        self.has_next_value_page.set(false);
    }

    /// Drop the attachment without touching control bindings
    fn unlink(&self) -> Option<Rc<ValueSet>> {
        let links = std::mem::take(&mut *self.links.borrow_mut());
        drop(links);
        let previous = self.attached.borrow_mut().take();
        if let Some(set) = &previous {
            let controlled_here = set
                .controller()
                .map(|c| std::ptr::eq(Rc::as_ptr(&c), self))
                .unwrap_or(false);
            if controlled_here {
                set.set_controller(Weak::new());
            }
        }
        previous
    }

    fn link(&self, set: &Rc<ValueSet>) {
        *self.attached.borrow_mut() = Some(Rc::clone(set));
        set.set_controller(self.weak_self.clone());

        let mut links = Vec::with_capacity(4);
        let weak = self.weak_self.clone();
        links.push(set.current_page().subscribe(move |page| {
            if let Some(control_set) = weak.upgrade() {
                control_set.on_page_changed(*page);
            }
        }));
        // Entries appear or vanish on the current page without a page change
        let weak = self.weak_self.clone();
        links.push(set.len_observable().subscribe(move |_| {
            if let Some(control_set) = weak.upgrade() {
                control_set.rebind();
            }
        }));
        let weak = self.weak_self.clone();
        links.push(set.has_prev_page().subscribe(move |has_prev| {
            if let Some(control_set) = weak.upgrade() {
                control_set.has_prev_value_page.set(*has_prev);
            }
        }));
        let weak = self.weak_self.clone();
        links.push(set.has_next_page().subscribe(move |has_next| {
            if let Some(control_set) = weak.upgrade() {
                control_set.has_next_value_page.set(*has_next);
            }
        }));
        *self.links.borrow_mut() = links;

        self.has_prev_value_page.set(set.has_prev_page().get());
        self.has_next_value_page.set(set.has_next_page().get());
        self.value_page.set(set.current_page().get());
        self.rebind();
        self.selection.set(Some(set.token()));
        debug!("'{}' attached '{}' at page {}", self.name, set.name(), set.current_page().get());
    }

    fn on_page_changed(&self, page: usize) {
        self.value_page.set(page);
        self.rebind();
    }

    fn rebind(&self) {
        let Some(set) = self.attached() else {
            return;
        };
        let page = set.current_page().get();
        for (slot, control) in self.controls.iter().enumerate() {
            let value = set
                .entry_at(page, slot)
                .unwrap_or_else(|| Rc::clone(&self.stubs[slot]));
            control.bind(Some(value));
        }
    }

    fn on_selection(&self, token: Option<Token>) {
        let current = self.attached().map(|set| set.token());
        if token == current {
            return;
        }
        match token {
            None => {
                self.detach();
            }
            Some(token) => {
                let found = self
                    .known_sets
                    .borrow()
                    .iter()
                    .find(|set| set.token() == token)
                    .cloned();
                match found {
                    Some(set) => {
                        if let Err(e) = self.attach(&set) {
                            warn!("'{}' cannot select '{}': {}", self.name, set.name(), e);
                        }
                    }
                    None => {
                        warn!("'{}' has no value set for {}", self.name, token);
                        self.selection.set(current);
                    }
                }
            }
        }
    }

    fn on_value_page_written(&self, page: usize) {
        match self.attached() {
            Some(set) => {
                set.set_page(page);
                // Reflect clamping back into the cell
                self.value_page.set(set.current_page().get());
            }
            None => {
                self.value_page.set(0);
            }
        }
    }

    /// Two-way cell with the token of the attached value set
    pub fn selection(&self) -> &Observable<Option<Token>> {
        &self.selection
    }

    /// Two-way cell mirroring the attached set's page (writes are clamped)
    pub fn value_page(&self) -> &Observable<usize> {
        &self.value_page
    }

    pub fn has_prev_value_page(&self) -> ReadOnly<bool> {
        self.has_prev_value_page.read_only()
    }

    pub fn has_next_value_page(&self) -> ReadOnly<bool> {
        self.has_next_value_page.read_only()
    }

    pub fn prev_value_page(&self) -> bool {
        self.attached().map(|set| set.prev_page()).unwrap_or(false)
    }

    pub fn next_value_page(&self) -> bool {
        self.attached().map(|set| set.next_page()).unwrap_or(false)
    }

    /// Ignore inbound turns on all controls (bound values stay)
    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
        for control in &self.controls {
            control.set_muted(muted);
        }
        debug!("'{}' muted: {}", self.name, muted);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    /// Re-send feedback of every control
    pub fn refresh(&self) {
        for control in &self.controls {
            control.render();
        }
    }
}

impl fmt::Debug for ControlSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSet")
            .field("name", &self.name)
            .field("controls", &self.controls.len())
            .field("attached", &self.attached().map(|s| s.name().to_string()))
            .field("auto_swap", &self.auto_swap.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlConfig;
    use crate::gesture::{Gesture, GestureTiming};
    use crate::midi::{ControlIdentifier, MessageKind};
    use crate::surface::Surface;
    use crate::value::SyncedValue;

    fn buttons(surface: &Surface, name: &'static str, channel: u8, size: usize) -> Rc<ControlSet> {
        ControlSet::build(name, size, |i| {
            let id = ControlIdentifier::note(channel, i as u8)?;
            Control::new(surface, ControlConfig::button(format!("{}{}", name, i), id))
        })
        .unwrap()
    }

    fn values(name: &'static str, window: usize, pages: usize) -> Rc<ValueSet> {
        let target = Observable::new(usize::MAX);
        ValueSet::new(name, window, pages, move |i| {
            let value: Rc<dyn ControlValue> =
                SyncedValue::builder(format!("{}{}", name, i), i, &target).build();
            Some(value)
        })
        .unwrap()
    }

    fn bound_name(set: &ControlSet, index: usize) -> String {
        set.control(index)
            .and_then(|c| c.bound())
            .map(|v| v.name().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_window_size_mismatch() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 4);
        let wrong = values("w", 8, 1);
        assert!(matches!(
            set.attach(&wrong),
            Err(SurfaceError::WindowSizeMismatch {
                window: 8,
                controls: 4,
                ..
            })
        ));
        assert!(set.attached().is_none());
    }

    #[test]
    fn test_swap_rebinds_every_control() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 4);
        let first = values("a", 4, 1);
        let second = values("z", 4, 1);

        set.attach(&first).unwrap();
        set.attach(&second).unwrap();

        let expected = second.entry_at(0, 2).unwrap();
        let control = set.control(2).unwrap();
        assert!(control.is_bound_to(&expected));
        assert!(!control.is_bound_to(&first.entry_at(0, 2).unwrap()));
    }

    #[test]
    fn test_page_change_rebinds() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 2).with_auto_swap();
        let list = values("v", 2, 3);
        set.attach(&list).unwrap();

        list.next_page();
        assert_eq!(bound_name(&set, 0), "v2");
        assert_eq!(bound_name(&set, 1), "v3");
        assert_eq!(set.value_page().get(), 1);
    }

    #[test]
    fn test_page_survives_detach_round_trip() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 2);
        let a = values("a", 2, 4);
        let b = values("b", 2, 1);

        set.attach(&a).unwrap();
        a.set_page(3);
        set.attach(&b).unwrap();
        set.attach(&a).unwrap();

        assert_eq!(a.current_page().get(), 3);
        assert_eq!(bound_name(&set, 1), "a7");
    }

    #[test]
    fn test_sparse_page_binds_disabled_stub() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 4);
        let target = Observable::new(0usize);
        let sparse = ValueSet::with_len("sparse", 4, 6, move |i| {
            let value: Rc<dyn ControlValue> =
                SyncedValue::builder(format!("s{}", i), i, &target).build();
            Some(value)
        })
        .unwrap();

        set.attach(&sparse).unwrap();
        sparse.next_page();
        let stub = set.control(3).and_then(|c| c.bound()).unwrap();
        assert!(!stub.is_enabled());
        assert_eq!(stub.velocity(), 0);
        stub.on_gesture(Gesture::Click);
    }

    #[test]
    fn test_steal_from_auto_swap_set_swaps() {
        let surface = Surface::new(GestureTiming::default());
        let encoders = buttons(&surface, "enc", 0, 2).with_auto_swap();
        let faders = buttons(&surface, "fad", 1, 2).with_auto_swap();
        let pan = values("pan", 2, 1);
        let volume = values("vol", 2, 1);

        encoders.attach(&pan).unwrap();
        faders.attach(&volume).unwrap();
        encoders.attach(&volume).unwrap();

        assert!(encoders.is_attached_to(&volume));
        assert!(faders.is_attached_to(&pan));
        assert_eq!(bound_name(&faders, 0), "pan0");
        assert!(Rc::ptr_eq(&pan.controller().unwrap(), &faders));
    }

    #[test]
    fn test_steal_without_auto_swap_leaves_other_unbound() {
        let surface = Surface::new(GestureTiming::default());
        let upper = buttons(&surface, "up", 0, 2);
        let lower = buttons(&surface, "lo", 1, 2);
        let a = values("a", 2, 1);
        let b = values("b", 2, 1);

        upper.attach(&a).unwrap();
        lower.attach(&b).unwrap();
        upper.attach(&b).unwrap();

        assert!(lower.attached().is_none());
        assert!(lower.control(0).unwrap().bound().is_none());
        assert_eq!(lower.selection().get(), None);
    }

    #[test]
    fn test_selection_is_two_way() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 2);
        let a = values("a", 2, 1);
        let b = values("b", 2, 1);
        set.register_value_set(&a).unwrap();
        set.register_value_set(&b).unwrap();

        set.selection().set(Some(b.token()));
        assert!(set.is_attached_to(&b));

        set.attach(&a).unwrap();
        assert_eq!(set.selection().get(), Some(a.token()));

        set.selection().set(Some(Token::Handle(u64::MAX)));
        assert!(set.is_attached_to(&a));
        assert_eq!(set.selection().get(), Some(a.token()));

        set.selection().set(None);
        assert!(set.attached().is_none());
    }

    #[test]
    fn test_value_page_cell_is_clamped() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 2);
        let list = values("v", 2, 3);
        set.attach(&list).unwrap();

        set.value_page().set(10);
        assert_eq!(list.current_page().get(), 2);
        assert_eq!(set.value_page().get(), 2);
        assert!(!set.has_next_value_page().get());
        assert!(set.prev_value_page());
        assert!(set.has_next_value_page().get());
    }

    #[test]
    fn test_value_set_click_through_dispatch() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "pad", 2, 4);
        let mode = Observable::new(0usize);
        let m = mode.clone();
        let modes = ValueSet::new("modes", 4, 1, move |i| {
            let value: Rc<dyn ControlValue> =
                SyncedValue::builder(format!("mode{}", i), i, &m).build();
            Some(value)
        })
        .unwrap();
        set.attach(&modes).unwrap();
        surface.flush();

        surface.handle_message(MessageKind::Note, 2, 3, 127, 0);
        surface.handle_message(MessageKind::Note, 2, 3, 0, 40);
        assert_eq!(mode.get(), 3);

        let sent = surface.flush();
        let lit: Vec<_> = sent.iter().filter(|m| m.value == 127).collect();
        assert_eq!(lit.len(), 1);
        assert_eq!(lit[0].target, ControlIdentifier::note(2, 3).unwrap());
    }

    #[test]
    fn test_failed_build_releases_identifiers() {
        let surface = Surface::new(GestureTiming::default());
        let result = ControlSet::build("bad", 3, |i| {
            let number = if i == 2 { 200 } else { i as u8 };
            let id = ControlIdentifier::note(0, number)?;
            Control::new(&surface, ControlConfig::button(format!("bad{}", i), id))
        });
        assert!(result.is_err());
        assert_eq!(surface.dispatcher().registered_count(), 0);

        let retry = buttons(&surface, "good", 0, 3);
        assert_eq!(retry.len(), 3);
    }

    #[test]
    fn test_length_change_rebinds_current_page() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 4);
        let list = values("v", 4, 1);
        set.attach(&list).unwrap();

        list.set_len(2);
        assert_eq!(bound_name(&set, 1), "v1");
        let stub = set.control(3).and_then(|c| c.bound()).unwrap();
        assert!(!stub.is_enabled());

        list.set_len(4);
        assert_eq!(bound_name(&set, 3), "v3");
        assert!(set.control(3).and_then(|c| c.bound()).unwrap().is_enabled());
    }

    #[test]
    fn test_detach_resets_value_page() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 2);
        let list = values("v", 2, 3);
        set.attach(&list).unwrap();
        list.set_page(2);
        assert_eq!(set.value_page().get(), 2);

        set.detach();
        assert_eq!(set.value_page().get(), 0);
        assert_eq!(list.current_page().get(), 2);
    }

    #[test]
    fn test_mute_applies_to_controls() {
        let surface = Surface::new(GestureTiming::default());
        let set = buttons(&surface, "b", 0, 3);
        set.set_muted(true);
        assert!(set.is_muted());
        assert!(set.controls().iter().all(|c| c.is_muted()));
    }
}
