//! SQLite dialect for migrations.
//!
//! SQLite cannot change a column in place, so altering one is done by
//! renaming it away, adding the new definition, copying the data across and
//! dropping the old column (SQLite 3.35.0+). Indexes live in one namespace
//! per database, so their physical names are prefixed with the table name.

use storable_core::{Engine, IndexDescriptor, IndexKind, PropertyDescriptor, SchemaDescriptor};

use super::{type_fragment, SchemaDialect};

/// Separator between table and logical name in physical index names.
const INDEX_SEPARATOR: &str = "__";

/// Suffix of the renamed column during an alter.
const OLD_COLUMN_SUFFIX: &str = "__old";

const NUMERIC_TYPES: [&str; 14] = [
    "BIT", "BOOL", "BOOLEAN", "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "INTEGER", "BIGINT",
    "FLOAT", "DOUBLE", "DECIMAL", "NUMERIC", "REAL",
];

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Literal filled into existing rows when a NOT NULL column is added.
    fn default_literal(property: &PropertyDescriptor) -> &'static str {
        if NUMERIC_TYPES.contains(&property.database_type.as_str()) {
            "0"
        } else {
            "''"
        }
    }

    /// Column definition used in DDL.
    ///
    /// Existing rows need a value, so NOT NULL columns get a type default.
    fn column_definition(&self, property: &PropertyDescriptor) -> String {
        let mut definition = format!("{} {}", self.quote(&property.name), type_fragment(property));
        if !property.allow_null {
            definition.push_str(" NOT NULL DEFAULT ");
            definition.push_str(Self::default_literal(property));
        }
        definition
    }

    fn add_column_sql(&self, table: &str, property: &PropertyDescriptor) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table),
            self.column_definition(property)
        )
    }

    fn rename_column_sql(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote(table),
            self.quote(from),
            self.quote(to)
        )
    }
}

impl SchemaDialect for SqliteDialect {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn column_fragment(&self, property: &PropertyDescriptor) -> String {
        let null = if property.allow_null { "NULL" } else { "NOT NULL" };
        format!("{} {null}", type_fragment(property))
    }

    fn create_table(&self, table: &str, id: &PropertyDescriptor) -> Vec<String> {
        let autoincrement = if id.auto_increment { " AUTOINCREMENT" } else { "" };
        vec![format!(
            "CREATE TABLE {} ({} INTEGER PRIMARY KEY{autoincrement} NOT NULL)",
            self.quote(table),
            self.quote(&id.name)
        )]
    }

    fn create_column(&self, table: &str, property: &PropertyDescriptor) -> Vec<String> {
        vec![self.add_column_sql(table, property)]
    }

    fn alter_column(
        &self,
        table: &str,
        property: &PropertyDescriptor,
        live: &SchemaDescriptor,
    ) -> (Vec<String>, bool) {
        let column = property.name.as_str();
        let old = format!("{column}{OLD_COLUMN_SUFFIX}");
        let dependent: Vec<&IndexDescriptor> = live
            .indexes()
            .filter(|index| index.kind != IndexKind::Primary)
            .filter(|index| {
                index
                    .properties
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(column))
            })
            .collect();

        let mut statements = Vec::new();
        for index in &dependent {
            statements.extend(self.drop_index(table, &index.name));
        }
        statements.push(self.rename_column_sql(table, column, &old));
        statements.push(self.add_column_sql(table, property));

        let source = if property.allow_null {
            self.quote(&old)
        } else {
            format!(
                "COALESCE({}, {})",
                self.quote(&old),
                Self::default_literal(property)
            )
        };
        statements.push(format!(
            "UPDATE {} SET {} = {source}",
            self.quote(table),
            self.quote(column)
        ));
        statements.extend(self.drop_column(table, &old));
        for index in &dependent {
            statements.extend(self.create_index(table, index));
        }
        (statements, true)
    }

    fn create_index(&self, table: &str, index: &IndexDescriptor) -> Vec<String> {
        // No full-text indexes without a virtual table; a plain one stands in.
        let unique = if index.kind == IndexKind::Unique {
            "UNIQUE "
        } else {
            ""
        };
        let columns: Vec<String> = index.properties.iter().map(|p| self.quote(p)).collect();
        vec![format!(
            "CREATE {unique}INDEX {} ON {} ({})",
            self.quote(&self.physical_index_name(table, &index.name)),
            self.quote(table),
            columns.join(", ")
        )]
    }

    fn drop_index(&self, table: &str, name: &str) -> Vec<String> {
        vec![format!(
            "DROP INDEX {}",
            self.quote(&self.physical_index_name(table, name))
        )]
    }

    fn upsert_entity_metadata(
        &self,
        metadata_table: &str,
        entity: &str,
        lineage_json: &str,
    ) -> Vec<String> {
        let engine = self.engine();
        vec![format!(
            "INSERT INTO {} (\"name\", \"lineage\") VALUES ({}, {}) ON CONFLICT(\"name\") DO UPDATE SET \"lineage\" = excluded.\"lineage\"",
            self.quote(metadata_table),
            engine.escape_string(entity),
            engine.escape_string(lineage_json)
        )]
    }

    fn physical_index_name(&self, table: &str, name: &str) -> String {
        format!("{table}{INDEX_SEPARATOR}{name}")
    }

    fn logical_index_name(&self, table: &str, physical: &str) -> String {
        let prefix = format!("{table}{INDEX_SEPARATOR}");
        match (physical.get(..prefix.len()), physical.get(prefix.len()..)) {
            (Some(head), Some(rest)) if !rest.is_empty() && head.eq_ignore_ascii_case(&prefix) => {
                rest.to_string()
            }
            _ => physical.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use storable_core::InternalType;

    use super::*;

    fn title(length: u32) -> PropertyDescriptor {
        PropertyDescriptor::new("title", InternalType::String, "VARCHAR").length(length)
    }

    #[test]
    fn fragment_leaves_out_what_sqlite_cannot_store() {
        let dialect = SqliteDialect::new();
        let mut p = title(191).unsigned().comment("ignored");
        p.after = Some("id".into());
        assert_eq!(dialect.column_fragment(&p), "VARCHAR(191) NULL");
        assert_eq!(
            dialect.column_fragment(&title(191).not_null()),
            "VARCHAR(191) NOT NULL"
        );
    }

    #[test]
    fn create_table_and_columns() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.create_table("post", &PropertyDescriptor::id()),
            ["CREATE TABLE \"post\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL)"]
        );
        let flag = PropertyDescriptor::new("flag", InternalType::Bool, "TINYINT")
            .length(1)
            .not_null();
        assert_eq!(
            dialect.create_column("post", &flag),
            ["ALTER TABLE \"post\" ADD COLUMN \"flag\" TINYINT NOT NULL DEFAULT 0"]
        );
    }

    #[test]
    fn index_names_are_scoped_by_table() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.physical_index_name("post", "author"), "post__author");
        assert_eq!(dialect.logical_index_name("post", "post__author"), "author");
        assert_eq!(dialect.logical_index_name("post", "other"), "other");
        assert_eq!(
            dialect.create_index("post", &IndexDescriptor::unique("slug", ["slug"])),
            ["CREATE UNIQUE INDEX \"post__slug\" ON \"post\" (\"slug\")"]
        );
        assert_eq!(
            dialect.create_index("post", &IndexDescriptor::fulltext("body", ["body"])),
            ["CREATE INDEX \"post__body\" ON \"post\" (\"body\")"]
        );
    }

    #[test]
    fn alter_column_rebuilds_dependent_indexes() {
        let dialect = SqliteDialect::new();
        let live = SchemaDescriptor::for_table("post")
            .with_property(PropertyDescriptor::id())
            .with_property(title(100))
            .with_index(IndexDescriptor::plain("title", ["title"]))
            .with_index(IndexDescriptor::plain("other", ["body"]));

        let (statements, transactional) = dialect.alter_column("post", &title(191), &live);
        assert!(transactional);
        assert_eq!(
            statements,
            [
                "DROP INDEX \"post__title\"",
                "ALTER TABLE \"post\" RENAME COLUMN \"title\" TO \"title__old\"",
                "ALTER TABLE \"post\" ADD COLUMN \"title\" VARCHAR(191)",
                "UPDATE \"post\" SET \"title\" = \"title__old\"",
                "ALTER TABLE \"post\" DROP COLUMN \"title__old\"",
                "CREATE INDEX \"post__title\" ON \"post\" (\"title\")",
            ]
        );
    }

    #[test]
    fn alter_to_not_null_fills_defaults() {
        let dialect = SqliteDialect::new();
        let live = SchemaDescriptor::for_table("post").with_property(title(191));
        let (statements, _) = dialect.alter_column("post", &title(191).not_null(), &live);
        assert!(statements.contains(
            &"UPDATE \"post\" SET \"title\" = COALESCE(\"title__old\", '')".to_string()
        ));
    }
}
