//! Named user settings exposed as observable cells
//!
//! Settings are declared once by the layout code and then driven from the
//! outside, typically by a configuration reload. Each declaration hands back
//! the cell so dependants can subscribe to it like any other state.

use crate::error::{Result, SurfaceError};
use crate::reactive::Observable;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// A raw preference value as it appears in configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Number(f64),
    Enum(String),
}

/// Preference values keyed by setting name
pub type PreferenceValues = HashMap<String, PreferenceValue>;

#[derive(Clone)]
enum Setting {
    Bool(Observable<bool>),
    Enum {
        options: Vec<String>,
        cell: Observable<String>,
    },
    Number {
        min: f64,
        max: f64,
        cell: Observable<f64>,
    },
}

impl Setting {
    fn type_name(&self) -> &'static str {
        match self {
            Setting::Bool(_) => "bool",
            Setting::Enum { .. } => "enum",
            Setting::Number { .. } => "number",
        }
    }
}

/// Registry of declared settings
#[derive(Default)]
pub struct Preferences {
    settings: RefCell<BTreeMap<String, Setting>>,
}

impl Preferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a boolean setting, or return the existing cell
    pub fn bool_setting(&self, name: &str, default: bool) -> Result<Observable<bool>> {
        if let Some(existing) = self.settings.borrow().get(name) {
            return match existing {
                Setting::Bool(cell) => Ok(cell.clone()),
                other => Err(type_conflict(name, other, "bool")),
            };
        }
        let cell = Observable::new(default);
        self.insert(name, Setting::Bool(cell.clone()));
        Ok(cell)
    }

    /// Declare an enumerated setting; `default` must be one of `options`
    pub fn enum_setting(&self, name: &str, options: &[&str], default: &str) -> Result<Observable<String>> {
        if let Some(existing) = self.settings.borrow().get(name) {
            return match existing {
                Setting::Enum { cell, .. } => Ok(cell.clone()),
                other => Err(type_conflict(name, other, "enum")),
            };
        }
        if !options.contains(&default) {
            return Err(SurfaceError::config(format!(
                "default '{}' of setting '{}' is not one of {:?}",
                default, name, options
            )));
        }
        let cell = Observable::new(default.to_string());
        self.insert(
            name,
            Setting::Enum {
                options: options.iter().map(|o| o.to_string()).collect(),
                cell: cell.clone(),
            },
        );
        Ok(cell)
    }

    /// Declare a numeric setting bounded by `[min, max]`
    pub fn number_setting(&self, name: &str, min: f64, max: f64, default: f64) -> Result<Observable<f64>> {
        if let Some(existing) = self.settings.borrow().get(name) {
            return match existing {
                Setting::Number { cell, .. } => Ok(cell.clone()),
                other => Err(type_conflict(name, other, "number")),
            };
        }
        if min > max || default < min || default > max {
            return Err(SurfaceError::config(format!(
                "setting '{}': default {} outside [{}, {}]",
                name, default, min, max
            )));
        }
        let cell = Observable::new(default);
        self.insert(name, Setting::Number { min, max, cell: cell.clone() });
        Ok(cell)
    }

    fn insert(&self, name: &str, setting: Setting) {
        debug!("Declared {} setting '{}'", setting.type_name(), name);
        self.settings.borrow_mut().insert(name.to_string(), setting);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.settings.borrow().contains_key(name)
    }

    /// Declared setting names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.settings.borrow().keys().cloned().collect()
    }

    fn lookup(&self, name: &str) -> Result<Setting> {
        self.settings
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| SurfaceError::UnknownSetting(name.to_string()))
    }

    /// Current value of a setting
    pub fn get(&self, name: &str) -> Result<PreferenceValue> {
        Ok(match self.lookup(name)? {
            Setting::Bool(cell) => PreferenceValue::Bool(cell.get()),
            Setting::Enum { cell, .. } => PreferenceValue::Enum(cell.get()),
            Setting::Number { cell, .. } => PreferenceValue::Number(cell.get()),
        })
    }

    /// Set one setting; returns whether its value changed
    ///
    /// Numbers are clamped into the declared range. Enum values outside the
    /// option list are rejected.
    pub fn set(&self, name: &str, value: &PreferenceValue) -> Result<bool> {
        let setting = self.lookup(name)?;
        let write = checked_write(name, &setting, value)?;
        // Cells are written after the registry borrow ends; observers may
        // declare further settings.
        Ok(write())
    }

    /// Apply a batch of values; nothing is written unless all of them are valid
    ///
    /// Returns the number of settings whose value changed.
    pub fn apply(&self, values: &PreferenceValues) -> Result<usize> {
        let mut writes = Vec::with_capacity(values.len());
        for (name, value) in values {
            let setting = self.lookup(name)?;
            writes.push(checked_write(name, &setting, value)?);
        }
        let changed = writes.into_iter().filter(|write| write()).count();
        if changed > 0 {
            debug!("Applied preferences, {} changed", changed);
        }
        Ok(changed)
    }
}

type Write = Box<dyn Fn() -> bool>;

fn checked_write(name: &str, setting: &Setting, value: &PreferenceValue) -> Result<Write> {
    match (setting, value) {
        (Setting::Bool(cell), PreferenceValue::Bool(v)) => {
            let (cell, v) = (cell.clone(), *v);
            Ok(Box::new(move || cell.set(v)))
        }
        // YES/NO enums in older configs map onto booleans
        (Setting::Bool(cell), PreferenceValue::Enum(s)) => {
            let v = match s.to_ascii_uppercase().as_str() {
                "YES" | "TRUE" | "ON" => true,
                "NO" | "FALSE" | "OFF" => false,
                _ => return Err(mismatch(name, setting, value)),
            };
            let cell = cell.clone();
            Ok(Box::new(move || cell.set(v)))
        }
        (Setting::Enum { options, cell }, PreferenceValue::Enum(s)) => {
            if !options.contains(s) {
                return Err(SurfaceError::config(format!(
                    "setting '{}': '{}' is not one of {:?}",
                    name, s, options
                )));
            }
            let (cell, s) = (cell.clone(), s.clone());
            Ok(Box::new(move || cell.set(s.clone())))
        }
        (Setting::Number { min, max, cell }, PreferenceValue::Number(n)) => {
            let clamped = n.clamp(*min, *max);
            if clamped != *n {
                warn!("Setting '{}': {} clamped to {}", name, n, clamped);
            }
            let cell = cell.clone();
            Ok(Box::new(move || cell.set(clamped)))
        }
        _ => Err(mismatch(name, setting, value)),
    }
}

fn mismatch(name: &str, setting: &Setting, value: &PreferenceValue) -> SurfaceError {
    SurfaceError::config(format!(
        "setting '{}' is a {} setting, got {:?}",
        name,
        setting.type_name(),
        value
    ))
}

fn type_conflict(name: &str, existing: &Setting, requested: &str) -> SurfaceError {
    SurfaceError::config(format!(
        "setting '{}' already declared as {}, requested {}",
        name,
        existing.type_name(),
        requested
    ))
}
