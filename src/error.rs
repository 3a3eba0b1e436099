//! Error kinds shared across the engine.

use std::io;

use thiserror::Error;

use crate::quantity::QuantityId;

/// All failure modes of the engine. Setup errors abort the run before
/// integration starts; I/O errors from output sinks are logged and do not
/// kill the run unless the sink is required.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid setup: {0}")]
    InvalidSetup(String),

    #[error("settings key '{key}' has type {stored}, requested {requested}")]
    TypeMismatch {
        key: String,
        stored: &'static str,
        requested: &'static str,
    },

    #[error("settings key '{0}' was never set and has no default")]
    MissingKey(String),

    #[error("storage does not contain quantity {0:?}")]
    MissingQuantity(QuantityId),

    #[error("storages cannot be merged: {0}")]
    IncompatibleStorage(String),

    #[error("cannot parse config, offending line: '{line}'")]
    ConfigParse { line: String },

    #[error("'{0}' not found in config")]
    ConfigNotFound(String),

    #[error("invalid value '{value}' for key '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("unknown settings key '{0}'")]
    UnknownKey(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("run aborted by user")]
    RunAborted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
