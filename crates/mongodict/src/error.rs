//! Error types for configuration, the store client, and dictionary lookups.
//!
//! Three layers, one enum each:
//! - [`ConfigError`]: loading and validating table configuration.
//! - [`StoreError`]: classified failures reported by a store client.
//! - [`DictError`]: what a dictionary hands back to its host, carrying the
//!   retryable / permanent distinction via [`DictError::status`].

use std::fmt;

use crate::store::Namespace;

/// Errors raised while loading a table configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A line in the configuration file is not of the form `name = value`.
    #[error("{origin}: line {line}: expected \"name = value\", got {text:?}")]
    Syntax {
        origin: String,
        line: usize,
        text: String,
    },

    /// One or more `${VAR}` references name unset environment variables.
    #[error("{origin}: missing environment variable(s): {}", .vars.join(", "))]
    MissingEnv { origin: String, vars: Vec<String> },

    /// A required option is absent or empty.
    #[error("{origin}: missing required parameter \"{name}\"")]
    Missing { origin: String, name: &'static str },

    /// An option is present but its value cannot be used.
    #[error("{origin}: bad \"{name}\" value {value:?}: {reason}")]
    Invalid {
        origin: String,
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Why a transport connection could not be established.
///
/// Diagnostic only: every variant is retried the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// No socket could be created (e.g. name resolution failed).
    NoSocket,
    /// The server refused or dropped the connection.
    Refused,
    /// Connected, but only to a non-primary node.
    NotPrimary,
    /// No suitable server answered within the timeout.
    Unreachable,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoSocket => "no socket",
            Self::Refused => "connection refused",
            Self::NotPrimary => "not primary",
            Self::Unreachable => "server unreachable",
        };
        f.write_str(s)
    }
}

/// Failures reported by a [`StoreConnection`](crate::store::StoreConnection).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The transport connection could not be opened.
    #[error("{failure}: {message}")]
    Connect {
        failure: ConnectFailure,
        message: String,
    },

    /// I/O failure on an established connection.
    #[error("i/o error: {0}")]
    Io(String),

    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Any other failure while executing a query.
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Build a [`StoreError::Connect`] with the given sub-reason.
    #[must_use]
    pub fn connect(failure: ConnectFailure, message: impl Into<String>) -> Self {
        Self::Connect {
            failure,
            message: message.into(),
        }
    }

    /// `true` for transport-level I/O errors, the only kind that triggers a
    /// reconnect.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Host-facing status of a failed dictionary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictStatus {
    /// Transient failure; the host should defer and try again later.
    Retry,
    /// Permanent configuration problem; retrying will not help.
    Config,
}

impl fmt::Display for DictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retry => "retry",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

/// Errors returned by [`Dictionary`](crate::dict::Dictionary) operations.
///
/// A missing key is not an error: lookups return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum DictError {
    /// The table configuration failed to load.
    #[error("table {table}: {source}")]
    Config {
        table: String,
        #[source]
        source: ConfigError,
    },

    /// Every lookup on a table that failed to open.
    #[error("table {table} is unavailable: {reason}")]
    Surrogate { table: String, reason: String },

    /// The table was opened with a mode other than read-only.
    #[error("table {table}: mongodb map requires read-only access mode")]
    ReadOnly { table: String },

    /// The server could not be reached.
    #[error("connect to mongodb server {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: StoreError,
    },

    /// The server rejected the configured credentials.
    #[error("mongodb authentication failed for {user} at {endpoint}: {source}")]
    Authentication {
        user: String,
        endpoint: String,
        #[source]
        source: StoreError,
    },

    /// The connection dropped and the single reconnect attempt failed.
    #[error("reconnect to mongodb server {endpoint} failed: {source}")]
    Reconnect {
        endpoint: String,
        #[source]
        source: StoreError,
    },

    /// The query could not be executed.
    #[error("query on {namespace} failed: {source}")]
    Query {
        namespace: Namespace,
        #[source]
        source: StoreError,
    },
}

impl DictError {
    /// Host status code for this error.
    #[must_use]
    pub fn status(&self) -> DictStatus {
        match self {
            Self::Config { .. } | Self::Surrogate { .. } | Self::ReadOnly { .. } => {
                DictStatus::Config
            }
            Self::Connect { .. }
            | Self::Authentication { .. }
            | Self::Reconnect { .. }
            | Self::Query { .. } => DictStatus::Retry,
        }
    }

    /// `true` when the host should retry the lookup later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status() == DictStatus::Retry
    }
}

/// Convenience alias for dictionary operations.
pub type Result<T> = std::result::Result<T, DictError>;
