use crate::events::EventKind;
use crate::types::AttrType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The runtime is busy")]
    Busy,

    #[error("The runtime is locked")]
    Locked,

    #[error("A '{ty}' payload must be {expected} bytes, got {actual}")]
    PayloadSize {
        ty: AttrType,
        expected: usize,
        actual: usize,
    },

    #[error("'{0}' is not a known attribute type")]
    InvalidType(String),

    #[error("Cannot parse '{value}' as a '{ty}' value")]
    InvalidValue { ty: AttrType, value: String },

    #[error("Cannot {op} while the runtime is {state}")]
    InvalidState {
        op: &'static str,
        state: crate::caliper::Lifecycle,
    },

    #[error("A '{event}' callback failed. {source}")]
    Callback {
        event: EventKind,
        #[source]
        source: CallbackError,
    },

    #[error("Service '{name}' failed to start. {reason}")]
    Service { name: String, reason: String },

    #[error("Invalid configuration. {0}")]
    Config(String),
}

/// Failure reported by a plugin callback.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct CallbackError {
    pub reason: String,
}

impl CallbackError {
    pub fn new(reason: impl Into<String>) -> Self {
        CallbackError {
            reason: reason.into(),
        }
    }
}
