//! Live schema introspection.
//!
//! Reads tables, columns and indexes through the connection's metadata
//! calls and turns them into synthetic [`SchemaDescriptor`]s the diff engine
//! can compare against the required ones.

use std::collections::{BTreeMap, BTreeSet};

use storable_core::reserved::is_reserved;
use storable_core::{
    ColumnInfo, IndexDescriptor, IndexInfo, IndexKind, InternalType, PropertyDescriptor,
    SchemaDescriptor, SqlConnection,
};

use crate::dialect::SchemaDialect;
use crate::error::Result;

/// The live tables the diff engine cares about, keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct LiveSchema {
    tables: BTreeMap<String, SchemaDescriptor>,
}

impl LiveSchema {
    /// Loads every table that is either required or carries `prefix`.
    ///
    /// Other tables are never compared, so their columns are not read.
    pub fn load(
        conn: &dyn SqlConnection,
        dialect: &dyn SchemaDialect,
        prefix: &str,
        required: &BTreeSet<String>,
    ) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for table in conn.tables()? {
            let key = table.to_ascii_lowercase();
            if !required.contains(&key) && !is_reserved(prefix, &table) {
                continue;
            }
            let columns = conn.table_columns(&table)?;
            let indexes = conn.table_indexes(&table)?;
            tables.insert(key, describe_table(dialect, &table, &columns, &indexes));
        }
        Ok(Self { tables })
    }

    /// Returns the live table, case-insensitively.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&SchemaDescriptor> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    /// Returns the live table mutably, case-insensitively.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut SchemaDescriptor> {
        self.tables.get_mut(&name.to_ascii_lowercase())
    }

    /// Records a table that a planned operation will create.
    pub fn insert(&mut self, descriptor: SchemaDescriptor) {
        self.tables
            .insert(descriptor.table_name.to_ascii_lowercase(), descriptor);
    }

    /// Iterates over the tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &SchemaDescriptor> {
        self.tables.values()
    }
}

/// Builds a descriptor from reported metadata.
#[must_use]
pub fn describe_table(
    dialect: &dyn SchemaDialect,
    table: &str,
    columns: &[ColumnInfo],
    indexes: &[IndexInfo],
) -> SchemaDescriptor {
    let mut descriptor = SchemaDescriptor::for_table(table);
    for column in columns {
        descriptor.add_property(describe_column(column));
    }
    descriptor.link_properties();

    for index in indexes {
        let kind = if index.primary {
            IndexKind::Primary
        } else if index.fulltext {
            IndexKind::Fulltext
        } else if index.unique {
            IndexKind::Unique
        } else {
            IndexKind::Plain
        };
        let name = dialect.logical_index_name(table, &index.name);
        descriptor.add_index(IndexDescriptor::new(name, kind, index.columns.clone()));
    }
    descriptor
}

fn describe_column(column: &ColumnInfo) -> PropertyDescriptor {
    let mut property = PropertyDescriptor::new(
        column.name.clone(),
        internal_type(&column.type_name, column.length),
        column.type_name.clone(),
    );
    property.length = column.length;
    property.decimals = column.decimals;
    property.allow_null = column.nullable;
    property.unsigned = column.unsigned;
    property.auto_increment = column.auto_increment;
    property.db_comment = column.comment.clone().filter(|c| !c.is_empty());
    property
}

fn internal_type(type_name: &str, length: Option<u32>) -> InternalType {
    match type_name {
        "TINYINT" if length == Some(1) => InternalType::Bool,
        "BOOLEAN" | "BOOL" => InternalType::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => InternalType::Int,
        "FLOAT" | "DOUBLE" | "DECIMAL" | "REAL" | "NUMERIC" => InternalType::Float,
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" => InternalType::String,
        _ => InternalType::Mixed,
    }
}
