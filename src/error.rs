//! Error types for the binding framework
//!
//! Only wiring mistakes are errors. Paging or scrolling past an edge is a
//! defined no-op, and gestures arriving for a control that was just rebound
//! are dropped by timer cancellation instead of being reported.

use crate::midi::ControlIdentifier;
use thiserror::Error;

/// Errors raised while constructing or wiring controls and values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// Invalid construction arguments (out-of-range sizes, channels, numbers)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A primary handler is already bound to this identifier
    #[error("duplicate registration for {0}")]
    DuplicateRegistration(ControlIdentifier),

    /// ValueSet window does not match the number of physical controls
    #[error("value set '{value_set}' has window {window}, control set '{control_set}' has {controls} controls")]
    WindowSizeMismatch {
        value_set: String,
        window: usize,
        control_set: String,
        controls: usize,
    },

    /// Orientation can only change on a square matrix
    #[error("cannot rotate asymmetrical matrix '{0}'")]
    NotRotatable(String),

    /// Preference lookup by unknown name
    #[error("unknown setting '{0}'")]
    UnknownSetting(String),
}

impl SurfaceError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SurfaceError::InvalidConfiguration(msg.into())
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, SurfaceError>;

/// Fail with `InvalidConfiguration` unless `value` lies within `[min, max]`
pub(crate) fn ensure_in_range<N>(value: N, min: N, max: N, what: &str) -> Result<()>
where
    N: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(SurfaceError::config(format!(
            "{} = {} is out of range [{}, {}]",
            what, value, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_check() {
        assert!(ensure_in_range(3, 0, 15, "channel").is_ok());
        let err = ensure_in_range(16, 0, 15, "channel").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: channel = 16 is out of range [0, 15]"
        );
    }
}
