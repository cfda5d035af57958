//! Framework-managed tables.
//!
//! Two tables carry the registry's reserved prefix: the id-allocation table
//! that hands out ids across all entity tables, and the entity metadata table
//! that records every concrete entity's lineage for polymorphic queries.

use std::collections::BTreeMap;

use crate::connection::SqlConnection;
use crate::error::{Error, Result};
use crate::params::Params;
use crate::schema::{IndexDescriptor, InternalType, PropertyDescriptor, SchemaDescriptor};

/// Name of the id-allocation table.
#[must_use]
pub fn id_table_name(prefix: &str) -> String {
    format!("{prefix}id")
}

/// Name of the entity metadata table.
#[must_use]
pub fn entity_table_name(prefix: &str) -> String {
    format!("{prefix}entity")
}

/// Returns true if `table` is managed by the framework.
#[must_use]
pub fn is_reserved(prefix: &str, table: &str) -> bool {
    table
        .to_ascii_lowercase()
        .starts_with(&prefix.to_ascii_lowercase())
}

/// Descriptor of the id-allocation table: `id` plus the owning entity name.
#[must_use]
pub fn id_table_descriptor(prefix: &str) -> SchemaDescriptor {
    let mut descriptor = SchemaDescriptor::for_table(id_table_name(prefix))
        .with_property(PropertyDescriptor::id())
        .with_property(
            PropertyDescriptor::new("entity", InternalType::String, "VARCHAR")
                .length(191)
                .not_null(),
        );
    descriptor.link_properties();
    descriptor
}

/// Descriptor of the entity metadata table: unique `name` plus JSON `lineage`.
#[must_use]
pub fn entity_table_descriptor(prefix: &str) -> SchemaDescriptor {
    let mut descriptor = SchemaDescriptor::for_table(entity_table_name(prefix))
        .with_property(PropertyDescriptor::id())
        .with_property(
            PropertyDescriptor::new("name", InternalType::String, "VARCHAR")
                .length(191)
                .not_null(),
        )
        .with_property(PropertyDescriptor::new("lineage", InternalType::Mixed, "LONGTEXT"))
        .with_index(IndexDescriptor::unique("name", ["name"]));
    descriptor.link_properties();
    descriptor
}

/// Serializes a lineage for the metadata table.
pub fn encode_lineage(lineage: &[String]) -> Result<String> {
    serde_json::to_string(lineage).map_err(|e| Error::Decode(e.to_string()))
}

/// Reads every stored lineage, keyed by entity name.
///
/// Returns an empty map while the metadata table does not exist yet.
pub fn read_entity_lineage(
    conn: &dyn SqlConnection,
    prefix: &str,
) -> Result<BTreeMap<String, Vec<String>>> {
    let table = entity_table_name(prefix);
    let exists = conn
        .tables()?
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&table));
    if !exists {
        return Ok(BTreeMap::new());
    }

    let sql = format!("SELECT `name`, `lineage` FROM `{table}`");
    let mut lineage = BTreeMap::new();
    for row in conn.fetch_assoc(&sql, &Params::new(), None)? {
        let Some(name) = row.get("name").and_then(|v| v.to_text()) else {
            continue;
        };
        let parents = match row.get("lineage").and_then(|v| v.to_text()) {
            Some(text) if !text.is_empty() => serde_json::from_str(&text)
                .map_err(|e| Error::Decode(format!("lineage of '{name}': {e}")))?,
            _ => Vec::new(),
        };
        lineage.insert(name, parents);
    }
    Ok(lineage)
}
