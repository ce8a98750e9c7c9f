//! Error taxonomy for the aggregator.
//!
//! None of these conditions is fatal to the process. `InvalidEvent` is handed
//! back to the caller of [`Aggregator::ingest`](crate::Aggregator::ingest);
//! late increments and sink failures are logged and counted in
//! [`metrics`](crate::metrics) instead of escalated.

use crate::validation::ValidationError;
use crate::window::Window;
use std::error::Error;
use std::fmt;

/// Errors raised by the aggregator and its components.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorError {
    /// The event failed validation and never reached the store.
    InvalidEvent(Vec<ValidationError>),
    /// The targeted window instance has already entered `Closing`.
    LateEvent { window: Window },
    /// A snapshot could not be delivered to the sink.
    SinkUnavailable {
        window: Window,
        attempts: u32,
        reason: String,
    },
    /// Configuration rejected at construction time.
    InvalidConfig(String),
    /// `stop()` has begun; no further events are accepted.
    ShuttingDown,
    /// `start()` was called on an aggregator that is already running or stopped.
    AlreadyStarted,
}

impl fmt::Display for AggregatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEvent(errors) => {
                let joined = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "invalid event: {joined}")
            }
            Self::LateEvent { window } => write!(
                f,
                "late event for closed window [{}, {})",
                window.start, window.end
            ),
            Self::SinkUnavailable {
                window,
                attempts,
                reason,
            } => write!(
                f,
                "sink unavailable for window [{}, {}) after {attempts} attempt(s): {reason}",
                window.start, window.end
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::ShuttingDown => write!(f, "aggregator is shutting down"),
            Self::AlreadyStarted => write!(f, "aggregator was already started"),
        }
    }
}

impl Error for AggregatorError {}

pub type Result<T> = std::result::Result<T, AggregatorError>;
