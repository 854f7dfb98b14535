//! Core error types for goalgate-core.
//!
//! This module defines the error hierarchy using thiserror. The split
//! mirrors the propagation policy: evaluation-path errors are absorbed at
//! the gate/reconciler boundary ("leave state unchanged"), mutation-path
//! errors are surfaced synchronously to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for goalgate-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Metric query errors
    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    /// Shield enforcement errors
    #[error("Shield error: {0}")]
    Shield(#[from] ShieldError),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Gate / mutation policy errors
    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors from the platform metric query layer.
///
/// `AuthDenied` aborts a whole evaluation; `Unavailable` and `Timeout`
/// degrade a single goal's value to zero.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// Permission to read health data was revoked or never granted.
    #[error("Health data access denied")]
    AuthDenied,

    /// The metric exists but no value could be produced right now.
    #[error("Metric unavailable: {0}")]
    Unavailable(String),

    /// The bounded wait for a metric query elapsed.
    #[error("Metric query timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the app-restriction enforcement layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShieldError {
    /// Restriction management permission is missing.
    #[error("Shield not authorized")]
    NotAuthorized,

    /// The platform rejected the shield update.
    #[error("Shield update failed: {0}")]
    UpdateFailed(String),
}

/// Persistence errors. A mutation whose save fails is not applied.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database.
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Read or write query failed.
    #[error("Store query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be decoded.
    #[error("Malformed stored value for key '{key}': {message}")]
    Malformed { key: String, message: String },
}

/// Mutation-policy errors surfaced to the edit surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The typed emergency confirmation code did not match.
    #[error("Emergency confirmation code mismatch")]
    EmergencyCodeMismatch,

    /// An operation expected a pending change that does not exist.
    #[error("No pending change for weekday {weekday}")]
    NoPendingChange { weekday: u8 },

    /// A goal referenced by id was not found in the container.
    #[error("Unknown goal: {id}")]
    UnknownGoal { id: String },

    /// Weekday outside 1..=7.
    #[error("Invalid weekday: {0} (expected 1..=7)")]
    InvalidWeekday(u8),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::QueryFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
