//! Error type shared by the context, value and plugin layers.

use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Every variant is fatal for the operation that produced it: nothing in this
/// crate retries. Defensive defaults (reads on released values, missing
/// callback arguments) never produce an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("context is closed")]
    ContextClosed,

    #[error("value has already been released")]
    Released,

    #[error("value belongs to a different context")]
    ForeignValue,

    #[error("value is not an object")]
    NotAnObject,

    #[error("value is not a function")]
    NotAFunction,

    #[error("failed to compile {name}: {message}")]
    Compile { name: String, message: String },

    #[error("uncaught exception: {0}")]
    Exception(String),

    #[error("script execution was terminated")]
    Terminated,

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("{0}")]
    Host(String),

    #[error("plugin is {current}, expected {expected}")]
    Phase {
        current: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Error raised by host code, thrown into script as an `Error` object.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host(message.into())
    }

    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
