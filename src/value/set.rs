//! Paged, memoized collections of control values

use super::{ControlValue, Token};
use crate::control::ControlSet;
use crate::error::{ensure_in_range, Result, SurfaceError};
use crate::reactive::{Observable, ReadOnly};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Builds the entry for one logical index; `None` leaves the slot empty
pub type ValueFactory = Box<dyn FnMut(usize) -> Option<Rc<dyn ControlValue>>>;

static NEXT_VALUE_SET: AtomicU64 = AtomicU64::new(1);

/// A logical list of values, viewed `window` entries at a time
///
/// Control `i` of an attached control set steps through the entries
/// `i, i + window, i + 2 * window, ..`, one per page; the number of those is
/// the set's page size ([`ValueSet::values_per_control`]). Entries are
/// created lazily and at most once per index. The current page is owned
/// here, so detaching and re-attaching a set keeps its position.
pub struct ValueSet {
    name: String,
    token: Token,
    window: usize,
    len: Observable<usize>,
    factory: RefCell<ValueFactory>,
    entries: RefCell<HashMap<usize, Option<Rc<dyn ControlValue>>>>,
    factory_calls: Cell<usize>,
    current_page: Observable<usize>,
    last_page: Observable<usize>,
    has_prev_page: Observable<bool>,
    has_next_page: Observable<bool>,
    controller: RefCell<Weak<ControlSet>>,
}

fn last_page_for(len: usize, window: usize) -> usize {
    len.div_ceil(window).saturating_sub(1)
}

impl ValueSet {
    /// Value set giving each of `window` controls `page_size` values
    pub fn new(
        name: impl Into<String>,
        window: usize,
        page_size: usize,
        factory: impl FnMut(usize) -> Option<Rc<dyn ControlValue>> + 'static,
    ) -> Result<Rc<Self>> {
        let name = name.into();
        ensure_in_range(page_size, 1, usize::MAX, "page size")?;
        let len = window.checked_mul(page_size).ok_or_else(|| {
            SurfaceError::config(format!(
                "value set '{}': {} x {} entries overflows",
                name, window, page_size
            ))
        })?;
        Self::with_len(name, window, len, factory)
    }

    /// Value set of `len` entries (the last page may be partial)
    pub fn with_len(
        name: impl Into<String>,
        window: usize,
        len: usize,
        factory: impl FnMut(usize) -> Option<Rc<dyn ControlValue>> + 'static,
    ) -> Result<Rc<Self>> {
        ensure_in_range(window, 1, usize::MAX, "window")?;
        let name = name.into();

        let current_page = Observable::new(0usize);
        let last_page = Observable::new(last_page_for(len, window));

        let cp = current_page.clone();
        let has_prev_page = Observable::computed(&[&current_page], move || cp.get() > 0);
        let (cp, lp) = (current_page.clone(), last_page.clone());
        let has_next_page =
            Observable::computed(&[&current_page, &last_page], move || cp.get() < lp.get());

        debug!("Created value set '{}' (window {}, len {})", name, window, len);

        Ok(Rc::new(Self {
            name,
            token: Token::Handle(NEXT_VALUE_SET.fetch_add(1, Ordering::Relaxed)),
            window,
            len: Observable::new(len),
            factory: RefCell::new(Box::new(factory)),
            entries: RefCell::new(HashMap::new()),
            factory_calls: Cell::new(0),
            current_page,
            last_page,
            has_prev_page,
            has_next_page,
            controller: RefCell::new(Weak::new()),
        }))
    }

    /// Single-page set laid out row by row over a `rows` x `cols` grid
    pub fn create_for_matrix(
        name: impl Into<String>,
        rows: usize,
        cols: usize,
        mut factory: impl FnMut(usize, usize) -> Option<Rc<dyn ControlValue>> + 'static,
    ) -> Result<Rc<Self>> {
        let name = name.into();
        ensure_in_range(rows, 1, usize::MAX, "rows")?;
        ensure_in_range(cols, 1, usize::MAX, "cols")?;
        let window = rows.checked_mul(cols).ok_or_else(|| {
            SurfaceError::config(format!("matrix '{}': {} x {} overflows", name, rows, cols))
        })?;
        Self::new(name, window, 1, move |index| {
            factory(index / cols, index % cols)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity used by selection cells
    pub fn token(&self) -> Token {
        self.token.clone()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len_observable(&self) -> ReadOnly<usize> {
        self.len.read_only()
    }

    /// Page size: how many entries each control steps through
    pub fn values_per_control(&self) -> usize {
        self.last_page.get() + 1
    }

    /// Entry at absolute index, created on first access
    pub fn entry(&self, index: usize) -> Option<Rc<dyn ControlValue>> {
        if index >= self.len() {
            return None;
        }
        if let Some(existing) = self.entries.borrow().get(&index) {
            return existing.clone();
        }

        let created = {
            let mut factory = self.factory.borrow_mut();
            (*factory)(index)
        };
        self.factory_calls.set(self.factory_calls.get() + 1);
        trace!(
            "{}: created entry {} ({})",
            self.name,
            index,
            created.as_ref().map(|v| v.name()).unwrap_or("empty")
        );
        self.entries.borrow_mut().insert(index, created.clone());
        created
    }

    /// Entry for `slot` of `page`
    pub fn entry_at(&self, page: usize, slot: usize) -> Option<Rc<dyn ControlValue>> {
        if slot >= self.window {
            return None;
        }
        self.entry(page * self.window + slot)
    }

    /// All entries, creating any not yet built
    pub fn entries(&self) -> Vec<Option<Rc<dyn ControlValue>>> {
        (0..self.len()).map(|i| self.entry(i)).collect()
    }

    /// Number of factory invocations so far
    pub fn factory_calls(&self) -> usize {
        self.factory_calls.get()
    }

    /// Resize the logical list; the current page is clamped into range
    pub fn set_len(&self, len: usize) {
        let last = last_page_for(len, self.window);
        if self.current_page.get() > last {
            self.current_page.set(last);
        }
        self.last_page.set(last);
        if self.len.set(len) {
            debug!("{}: len = {} (last page {})", self.name, len, last);
        }
    }

    pub fn current_page(&self) -> ReadOnly<usize> {
        self.current_page.read_only()
    }

    pub fn last_page(&self) -> ReadOnly<usize> {
        self.last_page.read_only()
    }

    pub fn has_prev_page(&self) -> ReadOnly<bool> {
        self.has_prev_page.read_only()
    }

    pub fn has_next_page(&self) -> ReadOnly<bool> {
        self.has_next_page.read_only()
    }

    /// Go to `page`, clamped; returns whether the page changed
    pub fn set_page(&self, page: usize) -> bool {
        let clamped = page.min(self.last_page.get());
        let changed = self.current_page.set(clamped);
        if changed {
            debug!("{}: page {}", self.name, clamped);
        }
        changed
    }

    /// No-op on the last page
    pub fn next_page(&self) -> bool {
        if !self.has_next_page.get() {
            return false;
        }
        self.set_page(self.current_page.get() + 1)
    }

    /// No-op on the first page
    pub fn prev_page(&self) -> bool {
        if !self.has_prev_page.get() {
            return false;
        }
        self.set_page(self.current_page.get() - 1)
    }

    pub(crate) fn controller(&self) -> Option<Rc<ControlSet>> {
        self.controller.borrow().upgrade()
    }

    pub(crate) fn set_controller(&self, controller: Weak<ControlSet>) {
        *self.controller.borrow_mut() = controller;
    }
}

impl fmt::Debug for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSet")
            .field("name", &self.name)
            .field("window", &self.window)
            .field("len", &self.len.get())
            .field("page", &self.current_page.get())
            .finish()
    }
}
