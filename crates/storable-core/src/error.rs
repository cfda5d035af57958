//! Error types shared by every Storable crate.

use thiserror::Error;

/// Errors raised by the connection boundary and by schema description.
#[derive(Debug, Error)]
pub enum Error {
    /// An entity declaration cannot be turned into a table description.
    ///
    /// Raised while describing entities; never retried.
    #[error("configuration error in entity '{entity}': {message}")]
    Configuration {
        /// Entity whose declaration is invalid.
        entity: String,
        /// What is wrong with it.
        message: String,
    },

    /// The entity name was never registered.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// The database engine rejected a statement.
    #[error("query failed: {message}{}", .sql.as_ref().map(|s| format!(" (sql: {s})")).unwrap_or_default())]
    Query {
        /// Message reported by the engine.
        message: String,
        /// Offending SQL, only kept in development mode.
        sql: Option<String>,
    },

    /// Connecting to or disconnecting from the database failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A `{name}` placeholder had no matching parameter.
    #[error("missing query parameter: {{{0}}}")]
    MissingParameter(String),

    /// A value read from the database has an unexpected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Builds a configuration error for `entity`.
    pub fn configuration(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Builds a query error, keeping the SQL text only when `dev_mode` is set.
    pub fn query(message: impl Into<String>, sql: &str, dev_mode: bool) -> Self {
        Self::Query {
            message: message.into(),
            sql: dev_mode.then(|| sql.to_string()),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
