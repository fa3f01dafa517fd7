//! Error types shared by the registry and the producer contract.
//!
//! [`RegistryError`] covers instance lifecycle, [`FetchError`] covers a single
//! `fetch_blocks` run, and [`ConfigError`] covers decoding and installing a
//! producer configuration.

use thiserror::Error;

/// Failures raised by [`Registry`](crate::registry::Registry) operations.
///
/// Every variant names the instance and/or producer type involved so a caller
/// can diagnose without reaching into the producer.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown producer type '{kind}'")]
    UnknownType { kind: String },

    #[error("invalid configuration for '{name}' ({kind}): {source}")]
    InvalidConfig {
        name: String,
        kind: String,
        #[source]
        source: ConfigError,
    },

    #[error("failed to create '{name}' ({kind}): {source}")]
    CreationFailed {
        name: String,
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no instance named '{name}'")]
    NotFound { name: String },

    #[error("producer type '{kind}' is already registered")]
    AlreadyRegistered { kind: String },

    /// The new instance was installed, but closing the one it replaced failed.
    #[error("replaced '{name}' ({kind}) but closing the previous instance failed: {source}")]
    ReplacedCloseFailed {
        name: String,
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to close '{name}' ({kind}): {source}")]
    CloseFailed {
        name: String,
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{} instance(s) failed to close: {}", .0.len(), join_errors(.0))]
    CloseAll(Vec<RegistryError>),

    #[error("cannot decode settings for producer type '{kind}': {source}")]
    Decode {
        kind: String,
        #[source]
        source: ConfigError,
    },
}

fn join_errors(errors: &[RegistryError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of a failed `fetch_blocks` run.
///
/// `Cancelled` is kept apart from `Failed` so drivers can tell "told to stop"
/// from "broke".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch cancelled")]
    Cancelled,

    /// The consumer dropped its end of the queue.
    #[error("output queue closed by consumer")]
    QueueClosed,

    #[error("fetch failed: {0}")]
    Failed(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failures decoding, validating or installing a producer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("expected configuration of type {expected}, got {actual}")]
    WrongShape {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{0}")]
    Invalid(anyhow::Error),

    #[error("malformed settings: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
