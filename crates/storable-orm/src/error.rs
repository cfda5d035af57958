//! Error types for the entity store.

use thiserror::Error;

/// Errors raised by the entity store.
///
/// Everything but [`OrmError::Core`] is a usage error: the caller asked for
/// something that can never succeed. Missing rows are not errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Connection, query or entity description failure.
    #[error(transparent)]
    Core(#[from] storable_core::Error),

    /// The entity has no property with that name.
    #[error("entity '{entity}' has no property '{property}'")]
    UnknownProperty {
        /// Entity name.
        entity: String,
        /// Requested property.
        property: String,
    },

    /// A value does not fit the declared type of a property.
    #[error("property '{entity}.{property}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Entity name.
        entity: String,
        /// Property being set or read.
        property: String,
        /// Declared type.
        expected: String,
        /// Type of the offending value.
        found: String,
    },

    /// The instance (or a referenced one) has no id yet.
    #[error("{0} has not been stored")]
    NotStored(String),

    /// `store` refused by the entity's editability check.
    #[error("{0} is not editable")]
    NotEditable(String),

    /// `delete` refused by the entity's deletability check.
    #[error("{0} is not deletable")]
    NotDeletable(String),

    /// Abstract entities cannot be instantiated or stored.
    #[error("entity '{0}' is abstract")]
    AbstractEntity(String),

    /// A sort field without a `+` / `-` direction, or naming nothing.
    #[error("invalid sort field '{0}': expected +field or -field")]
    InvalidSort(String),

    /// A dotted path that does not follow references.
    #[error("invalid path '{path}' on entity '{entity}': {reason}")]
    InvalidPath {
        /// Entity the path starts from.
        entity: String,
        /// The path as written.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No connection registered under that id.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// A JSON property could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for entity store operations.
pub type Result<T> = std::result::Result<T, OrmError>;
