//! Per-engine DDL generation.
//!
//! A dialect renders the canonical column fragment the diff engine compares,
//! and the statements for every operation kind.

mod mysql;
mod sqlite;

pub use mysql::MySqlDialect;
pub use sqlite::SqliteDialect;

use storable_core::{Engine, IndexDescriptor, PropertyDescriptor, SchemaDescriptor};

/// Types whose length (and decimals) are part of the column definition.
const SIZED_TYPES: [&str; 7] = [
    "FLOAT",
    "DOUBLE",
    "DECIMAL",
    "CHAR",
    "VARCHAR",
    "BINARY",
    "VARBINARY",
];

/// Renders `TYPE[(length[,decimals])]` for `property`.
///
/// Only the types in the sized family carry their length; integer display
/// widths are never part of the comparison.
#[must_use]
pub fn type_fragment(property: &PropertyDescriptor) -> String {
    let base = property.database_type.to_ascii_uppercase();
    if !SIZED_TYPES.contains(&base.as_str()) {
        return base;
    }
    match (property.length, property.decimals) {
        (Some(length), Some(decimals)) => format!("{base}({length},{decimals})"),
        (Some(length), None) => format!("{base}({length})"),
        _ => base,
    }
}

/// Trait for engine-specific schema SQL.
pub trait SchemaDialect {
    /// Returns the engine this dialect targets.
    fn engine(&self) -> Engine;

    /// Quotes an identifier.
    fn quote(&self, name: &str) -> String {
        self.engine().quote_identifier(name)
    }

    /// Canonical column definition used both for comparison and DDL.
    ///
    /// Never includes auto-increment.
    fn column_fragment(&self, property: &PropertyDescriptor) -> String;

    /// Creates `table` with only its primary key.
    fn create_table(&self, table: &str, id: &PropertyDescriptor) -> Vec<String>;

    /// Adds a column.
    fn create_column(&self, table: &str, property: &PropertyDescriptor) -> Vec<String>;

    /// Changes a column to match `property`.
    ///
    /// `live` is the current shape of the table. Returns the statements and
    /// whether they must run in a transaction.
    fn alter_column(
        &self,
        table: &str,
        property: &PropertyDescriptor,
        live: &SchemaDescriptor,
    ) -> (Vec<String>, bool);

    /// Creates an index.
    fn create_index(&self, table: &str, index: &IndexDescriptor) -> Vec<String>;

    /// Drops the index with the given logical name.
    fn drop_index(&self, table: &str, name: &str) -> Vec<String>;

    /// Drops a column.
    fn drop_column(&self, table: &str, column: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )]
    }

    /// Drops a table.
    fn drop_table(&self, table: &str) -> Vec<String> {
        vec![format!("DROP TABLE {}", self.quote(table))]
    }

    /// Inserts or replaces the lineage row of `entity`.
    fn upsert_entity_metadata(
        &self,
        metadata_table: &str,
        entity: &str,
        lineage_json: &str,
    ) -> Vec<String>;

    /// Physical name of a logical index.
    fn physical_index_name(&self, _table: &str, name: &str) -> String {
        name.to_string()
    }

    /// Logical name of a physical index.
    fn logical_index_name(&self, _table: &str, physical: &str) -> String {
        physical.to_string()
    }
}

/// Returns the dialect for `engine`.
#[must_use]
pub fn dialect_for(engine: Engine) -> Box<dyn SchemaDialect> {
    match engine {
        Engine::MySql => Box::new(MySqlDialect::new()),
        Engine::Sqlite => Box::new(SqliteDialect::new()),
    }
}

#[cfg(test)]
mod tests {
    use storable_core::InternalType;

    use super::*;

    #[test]
    fn only_sized_types_keep_their_length() {
        let varchar = PropertyDescriptor::new("a", InternalType::String, "varchar").length(191);
        let int = PropertyDescriptor::new("b", InternalType::Int, "INT").length(11);
        let decimal = PropertyDescriptor::new("c", InternalType::Float, "DECIMAL")
            .length(10)
            .decimals(2);
        assert_eq!(type_fragment(&varchar), "VARCHAR(191)");
        assert_eq!(type_fragment(&int), "INT");
        assert_eq!(type_fragment(&decimal), "DECIMAL(10,2)");
    }
}
