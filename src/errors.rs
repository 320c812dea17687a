// src/errors.rs

//! Crate-wide error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The device subsystem connection or its monitor could not be set up.
    #[error("Device subsystem unavailable: {0}")]
    Subsystem(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device {0} has no parent")]
    NoParent(String),

    #[error("Device {devpath} has no ancestor with subsystem '{subsystem}' and type '{devtype}'")]
    NoMatchingAncestor {
        devpath: String,
        subsystem: String,
        devtype: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure to open a device resource.
///
/// `WrongKind` is the expected outcome for devices that pass the watcher's
/// filter but are not something the opener handles.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("not a supported device: {0}")]
    WrongKind(String),

    #[error("cannot open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl OpenError {
    pub fn is_wrong_kind(&self) -> bool {
        matches!(self, OpenError::WrongKind(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevwatchError>;
