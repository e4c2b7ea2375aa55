//! Error types for Relata operations.

use std::fmt;

/// The primary error type for all Relata operations.
#[derive(Debug)]
pub enum Error {
    /// Configuration errors (unknown aggregate function, unknown operator,
    /// missing subquery field, unknown relationship name). Raised at the
    /// point of misuse, never deferred to execution time.
    Config(ConfigError),
    /// Query execution errors surfaced by the executor.
    Query(QueryError),
    /// Type conversion errors.
    Type(TypeError),
    /// Session lifecycle errors.
    Session(SessionError),
    /// Lazy-loading policy errors (`raise` strategy accessed).
    LazyLoad(LazyLoadError),
    /// Operation was cancelled.
    Cancelled,
    /// Serialization/deserialization errors.
    Serde(String),
    /// Custom error with message.
    Custom(String),
}

/// A misconfiguration detected at the call site.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Human-readable message naming the offending token.
    pub message: String,
}

/// An error reported by the execution collaborator.
#[derive(Debug)]
pub struct QueryError {
    /// The SQL text that failed, if known.
    pub sql: Option<String>,
    /// Driver/server message.
    pub message: String,
}

/// A failed conversion between `Value` and a Rust type.
#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// Session lifecycle violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The session has been closed; no further tracking operations are
    /// accepted.
    Closed,
}

/// A lazy load forbidden by the relationship's declared strategy.
#[derive(Debug, Clone)]
pub struct LazyLoadError {
    /// Name of the relationship that was accessed.
    pub relationship: &'static str,
    /// Table name of the owning type.
    pub owner: &'static str,
}

impl Error {
    /// Create a configuration error with the given message.
    ///
    /// The message must name the offending token so callers can spot the
    /// misuse without a debugger.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
        })
    }

    /// Create a query error without SQL context.
    pub fn query(message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            sql: None,
            message: message.into(),
        })
    }

    /// Create a query error carrying the failed SQL text.
    pub fn query_with_sql(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            sql: Some(sql.into()),
            message: message.into(),
        })
    }

    /// Is this a configuration error?
    pub const fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Is this a closed-session error?
    pub const fn is_session_closed(&self) -> bool {
        matches!(self, Error::Session(SessionError::Closed))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "configuration error: {}", e.message),
            Error::Query(e) => match &e.sql {
                Some(sql) => write!(f, "query error: {} (sql: {})", e.message, sql),
                None => write!(f, "query error: {}", e.message),
            },
            Error::Type(e) => {
                write!(f, "type error: expected {}, got {}", e.expected, e.actual)?;
                if let Some(col) = &e.column {
                    write!(f, " (column '{}')", col)?;
                }
                Ok(())
            }
            Error::Session(SessionError::Closed) => write!(f, "session is closed"),
            Error::LazyLoad(e) => write!(
                f,
                "lazy load of relationship '{}' on {} is disabled (lazy=\"raise\"); \
                 eager-load it instead, e.g. with selectinload",
                e.relationship, e.owner
            ),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Serde(msg) => write!(f, "serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serde(e.to_string())
    }
}

/// Convenience result alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;
