//! Configuration errors.
//!
//! Everything that can be wrong with an instrument is caught while it is being
//! built or edited. The per-sample path never returns an error: numerical
//! trouble there is handled by the guard rails in [`crate::diagnostics`].

use thiserror::Error;

/// Result type for configuration-time operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building or editing an instrument.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Sample rate is not a positive finite number.
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(f64),

    /// A physical or numerical parameter is out of range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// The stability bound yields an unusable grid.
    #[error("unstable discretization for {module}: {message}")]
    Unstable {
        module: &'static str,
        message: String,
    },

    /// The module cannot realise the requested boundary condition.
    #[error("{module} does not support a {boundary} boundary")]
    UnsupportedBoundary {
        module: &'static str,
        boundary: &'static str,
    },

    /// Normalized location outside [0, 1] or not finite.
    #[error("location ({x}, {y}) is outside the module grid")]
    LocationOutOfRange { x: f64, y: f64 },

    /// Mass-ratio weights of a distributed connection do not sum to one.
    #[error("connection weights sum to {sum}, expected 1")]
    WeightSum { sum: f64 },

    /// A connection was given an explicit but empty point list.
    #[error("connection point list is empty")]
    EmptyPointList,

    /// Both ends of a connection land on the same grid point.
    #[error("connection endpoints coincide at grid index {index}")]
    DegenerateConnection { index: usize },

    #[error("unknown module {0}")]
    UnknownModule(usize),

    #[error("unknown exciter {0}")]
    UnknownExciter(usize),

    #[error("unknown connection {0}")]
    UnknownConnection(usize),

    /// An event was addressed to an exciter of the wrong kind.
    #[error("exciter {exciter} is a {kind}, cannot {action}")]
    ExciterMismatch {
        exciter: usize,
        kind: &'static str,
        action: &'static str,
    },
}

impl ConfigError {
    /// Creates an invalid parameter error.
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Require a strictly positive, finite value.
pub(crate) fn positive(name: &str, value: f64) -> ConfigResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(name, format!("must be positive, got {value}")))
    }
}

/// Require a finite value that is zero or positive.
pub(crate) fn non_negative(name: &str, value: f64) -> ConfigResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::invalid(
            name,
            format!("must be zero or positive, got {value}"),
        ))
    }
}
