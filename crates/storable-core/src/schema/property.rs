//! Property (column) descriptors.

/// The logical type of a property, used for value coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalType {
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Double-precision float.
    Float,
    /// String.
    String,
    /// Arbitrary JSON value.
    Mixed,
    /// Reference to another entity, stored as its id.
    Entity,
    /// Type with its own column contract, named by the type.
    Custom(String),
}

/// Describes one column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Property (and column) name.
    pub name: String,
    /// Logical type.
    pub internal_type: InternalType,
    /// Database type, uppercased (`VARCHAR`, `BIGINT`, ...).
    pub database_type: String,
    /// Length, for types that take one.
    pub length: Option<u32>,
    /// Decimals, for types that take them.
    pub decimals: Option<u32>,
    /// Whether NULL is accepted.
    pub allow_null: bool,
    /// Whether the column is unsigned.
    pub unsigned: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Column comment.
    pub db_comment: Option<String>,
    /// Preceding property in declaration order (column placement only).
    pub after: Option<String>,
    /// Referenced entity, for entity references.
    pub referenced_entity: Option<String>,
    /// Whether references are resolved in batches.
    pub prefetch_enabled: bool,
    /// Maximum ids per prefetch batch.
    pub prefetch_batch_limit: usize,
    /// Whether the column is left out of the default projection.
    pub lazy: bool,
}

impl PropertyDescriptor {
    /// Default maximum number of ids resolved by one prefetch query.
    pub const DEFAULT_PREFETCH_LIMIT: usize = 1000;

    /// Creates a nullable property.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        internal_type: InternalType,
        database_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            internal_type,
            database_type: database_type.into().to_ascii_uppercase(),
            length: None,
            decimals: None,
            allow_null: true,
            unsigned: false,
            auto_increment: false,
            db_comment: None,
            after: None,
            referenced_entity: None,
            prefetch_enabled: true,
            prefetch_batch_limit: Self::DEFAULT_PREFETCH_LIMIT,
            lazy: false,
        }
    }

    /// The primary key: `BIGINT(18) UNSIGNED`, auto-increment, NOT NULL.
    #[must_use]
    pub fn id() -> Self {
        Self::new("id", InternalType::Int, "BIGINT")
            .length(18)
            .unsigned()
            .auto_increment()
            .not_null()
    }

    /// Sets the length.
    #[must_use]
    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the decimals.
    #[must_use]
    pub fn decimals(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    /// Sets the column as unsigned.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.db_comment = Some(comment.into());
        self
    }

    /// Marks the property as a reference to `entity`.
    #[must_use]
    pub fn references(mut self, entity: impl Into<String>) -> Self {
        self.internal_type = InternalType::Entity;
        self.referenced_entity = Some(entity.into());
        self
    }

    /// Excludes the column from the default projection.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Returns true for entity references.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.referenced_entity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_property_shape() {
        let id = PropertyDescriptor::id();
        assert_eq!(id.database_type, "BIGINT");
        assert_eq!(id.length, Some(18));
        assert!(id.unsigned);
        assert!(id.auto_increment);
        assert!(!id.allow_null);
    }

    #[test]
    fn defaults() {
        let p = PropertyDescriptor::new("title", InternalType::String, "varchar");
        assert_eq!(p.database_type, "VARCHAR");
        assert!(p.allow_null);
        assert!(p.prefetch_enabled);
        assert_eq!(p.prefetch_batch_limit, 1000);
        assert!(!p.is_reference());
    }
}
