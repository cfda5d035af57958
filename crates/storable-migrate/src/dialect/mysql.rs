//! MySQL dialect.
//!
//! Columns are changed in place with a single `CHANGE` statement, and the
//! fragment carries unsigned, comment and placement.

use storable_core::{Engine, IndexDescriptor, IndexKind, PropertyDescriptor, SchemaDescriptor};

use super::{type_fragment, SchemaDialect};

/// MySQL migration dialect.
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn table(&self, table: &str) -> String {
        self.quote(table)
    }
}

impl SchemaDialect for MySqlDialect {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn column_fragment(&self, property: &PropertyDescriptor) -> String {
        let mut parts = vec![type_fragment(property)];
        if property.unsigned {
            parts.push("UNSIGNED".to_string());
        }
        parts.push(if property.allow_null { "NULL" } else { "NOT NULL" }.to_string());
        if let Some(comment) = &property.db_comment {
            parts.push(format!("COMMENT {}", Engine::MySql.escape_string(comment)));
        }
        match &property.after {
            Some(after) => parts.push(format!("AFTER {}", self.quote(after))),
            None => parts.push("FIRST".to_string()),
        }
        parts.join(" ")
    }

    fn create_table(&self, table: &str, id: &PropertyDescriptor) -> Vec<String> {
        let mut column = vec![self.quote(&id.name), type_fragment(id)];
        if id.unsigned {
            column.push("UNSIGNED".to_string());
        }
        column.push("NOT NULL".to_string());
        if id.auto_increment {
            column.push("AUTO_INCREMENT".to_string());
        }
        vec![format!(
            "CREATE TABLE {} ({}, PRIMARY KEY ({})) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
            self.table(table),
            column.join(" "),
            self.quote(&id.name)
        )]
    }

    fn create_column(&self, table: &str, property: &PropertyDescriptor) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table(table),
            self.quote(&property.name),
            self.column_fragment(property)
        )]
    }

    fn alter_column(
        &self,
        table: &str,
        property: &PropertyDescriptor,
        _live: &SchemaDescriptor,
    ) -> (Vec<String>, bool) {
        let column = self.quote(&property.name);
        let sql = format!(
            "ALTER TABLE {} CHANGE {column} {column} {}",
            self.table(table),
            self.column_fragment(property)
        );
        (vec![sql], false)
    }

    fn create_index(&self, table: &str, index: &IndexDescriptor) -> Vec<String> {
        let kind = match index.kind {
            IndexKind::Unique => "UNIQUE INDEX",
            IndexKind::Fulltext => "FULLTEXT INDEX",
            IndexKind::Plain | IndexKind::Primary => "INDEX",
        };
        let columns: Vec<String> = index.properties.iter().map(|p| self.quote(p)).collect();
        vec![format!(
            "ALTER TABLE {} ADD {kind} {} ({})",
            self.table(table),
            self.quote(&self.physical_index_name(table, &index.name)),
            columns.join(", ")
        )]
    }

    fn drop_index(&self, table: &str, name: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP INDEX {}",
            self.table(table),
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
            "INSERT INTO {} (`name`, `lineage`) VALUES ({}, {}) ON DUPLICATE KEY UPDATE `lineage` = VALUES(`lineage`)",
            self.table(metadata_table),
            engine.escape_string(entity),
            engine.escape_string(lineage_json)
        )]
    }
}
