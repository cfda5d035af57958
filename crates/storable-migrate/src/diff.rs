//! Schema diff engine.
//!
//! Compares the required descriptors with the live database and produces an
//! ordered [`MigrationPlan`]: table creation, columns, indexes, entity
//! metadata, then drops. Drops are only ever planned for tables whose name
//! carries the reserved prefix.

use std::collections::BTreeSet;
use std::rc::Rc;

use storable_core::reserved::{
    encode_lineage, entity_table_descriptor, entity_table_name, id_table_descriptor, is_reserved,
    read_entity_lineage,
};
use storable_core::{IndexKind, PropertyDescriptor, SchemaDescriptor, SqlConnection};
use tracing::debug;

use crate::dialect::{dialect_for, SchemaDialect};
use crate::error::Result;
use crate::live::LiveSchema;
use crate::operations::{MigrationOperation, MigrationPlan, OperationKind};

/// Plans the operations that bring a database in line with its entities.
pub struct SchemaDiff<'a> {
    conn: &'a dyn SqlConnection,
    dialect: Box<dyn SchemaDialect>,
    prefix: String,
}

impl<'a> SchemaDiff<'a> {
    /// Creates a diff engine for `conn`, using the dialect of its engine.
    pub fn new(conn: &'a dyn SqlConnection, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            dialect: dialect_for(conn.engine()),
            prefix: prefix.into(),
        }
    }

    /// Returns the dialect in use.
    #[must_use]
    pub fn dialect(&self) -> &dyn SchemaDialect {
        self.dialect.as_ref()
    }

    /// Computes the migration plan for `required`.
    ///
    /// Abstract descriptors are ignored; the reserved tables are always
    /// required.
    pub fn plan(&self, required: &[Rc<SchemaDescriptor>]) -> Result<MigrationPlan> {
        let tables = self.required_tables(required);
        let names: BTreeSet<String> = tables
            .iter()
            .map(|d| d.table_name.to_ascii_lowercase())
            .collect();
        let mut live = LiveSchema::load(self.conn, self.dialect(), &self.prefix, &names)?;

        let mut operations = Vec::new();
        self.plan_tables(&tables, &mut live, &mut operations);
        self.plan_columns(&tables, &mut live, &mut operations);
        self.plan_indexes(&tables, &mut live, &mut operations);
        self.plan_metadata(&tables, &mut operations)?;
        self.plan_drops(&tables, &live, &mut operations);

        debug!(operations = operations.len(), "Planned schema changes");
        Ok(MigrationPlan::new(operations))
    }

    fn required_tables(&self, required: &[Rc<SchemaDescriptor>]) -> Vec<Rc<SchemaDescriptor>> {
        let mut tables = vec![
            Rc::new(id_table_descriptor(&self.prefix)),
            Rc::new(entity_table_descriptor(&self.prefix)),
        ];
        let mut seen: BTreeSet<String> = tables
            .iter()
            .map(|d| d.table_name.to_ascii_lowercase())
            .collect();
        for descriptor in required.iter().filter(|d| !d.is_abstract) {
            if seen.insert(descriptor.table_name.to_ascii_lowercase()) {
                tables.push(Rc::clone(descriptor));
            }
        }
        tables
    }

    fn plan_tables(
        &self,
        tables: &[Rc<SchemaDescriptor>],
        live: &mut LiveSchema,
        operations: &mut Vec<MigrationOperation>,
    ) {
        for required in tables {
            if live.table(&required.table_name).is_some() {
                continue;
            }
            let id = required
                .property("id")
                .cloned()
                .unwrap_or_else(PropertyDescriptor::id);
            operations.push(MigrationOperation::new(
                OperationKind::CreateTable,
                &required.table_name,
                &required.table_name,
                self.dialect.create_table(&required.table_name, &id),
            ));
            live.insert(SchemaDescriptor::for_table(&required.table_name).with_property(id));
        }
    }

    fn plan_columns(
        &self,
        tables: &[Rc<SchemaDescriptor>],
        live: &mut LiveSchema,
        operations: &mut Vec<MigrationOperation>,
    ) {
        for required in tables {
            let Some(current) = live.table_mut(&required.table_name) else {
                continue;
            };
            // Live column order as it will be once earlier operations ran.
            let mut order: Vec<String> = current
                .properties()
                .iter()
                .map(|p| p.name.clone())
                .collect();

            for property in required.properties() {
                if property.name.eq_ignore_ascii_case("id") {
                    continue;
                }
                let table = &required.table_name;
                let existing = current
                    .properties()
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(&property.name))
                    .cloned();
                match existing {
                    None => {
                        operations.push(MigrationOperation::new(
                            OperationKind::CreateColumn,
                            table,
                            &property.name,
                            self.dialect.create_column(table, property),
                        ));
                        place_after(&mut order, &property.name, property.after.as_deref());
                        current.add_property(property.clone());
                    }
                    Some(mut existing) => {
                        existing.after = predecessor(&order, &existing.name);
                        if self.dialect.column_fragment(&existing)
                            == self.dialect.column_fragment(property)
                        {
                            continue;
                        }
                        let (statements, transactional) =
                            self.dialect.alter_column(table, property, current);
                        operations.push(
                            MigrationOperation::new(
                                OperationKind::AlterColumn,
                                table,
                                &property.name,
                                statements,
                            )
                            .transactional(transactional),
                        );
                        order.retain(|name| !name.eq_ignore_ascii_case(&existing.name));
                        place_after(&mut order, &property.name, property.after.as_deref());
                        current.remove_property(&existing.name);
                        current.add_property(property.clone());
                    }
                }
            }
        }
    }

    fn plan_indexes(
        &self,
        tables: &[Rc<SchemaDescriptor>],
        live: &mut LiveSchema,
        operations: &mut Vec<MigrationOperation>,
    ) {
        for required in tables {
            let Some(current) = live.table_mut(&required.table_name) else {
                continue;
            };
            for index in required.indexes() {
                if index.kind == IndexKind::Primary
                    || current.index_by_signature(&index.signature()).is_some()
                {
                    continue;
                }
                // Same name, other columns: left alone.
                if current.index(&index.name).is_some() {
                    debug!(
                        table = %required.table_name,
                        index = %index.name,
                        "Index exists with a different composition"
                    );
                    continue;
                }
                operations.push(MigrationOperation::new(
                    OperationKind::CreateIndex,
                    &required.table_name,
                    &index.name,
                    self.dialect.create_index(&required.table_name, index),
                ));
                current.add_index(index.clone());
            }
        }
    }

    fn plan_metadata(
        &self,
        tables: &[Rc<SchemaDescriptor>],
        operations: &mut Vec<MigrationOperation>,
    ) -> Result<()> {
        let stored = read_entity_lineage(self.conn, &self.prefix)?;
        let metadata_table = entity_table_name(&self.prefix);
        for required in tables {
            // Framework tables are not entities.
            if required.entity_name == required.table_name
                && is_reserved(&self.prefix, &required.table_name)
            {
                continue;
            }
            let lineage = required.lineage();
            if stored.get(&required.entity_name) == Some(&lineage) {
                continue;
            }
            operations.push(MigrationOperation::new(
                OperationKind::UpsertEntityMetadata,
                &metadata_table,
                &required.entity_name,
                self.dialect.upsert_entity_metadata(
                    &metadata_table,
                    &required.entity_name,
                    &encode_lineage(&lineage)?,
                ),
            ));
        }
        Ok(())
    }

    fn plan_drops(
        &self,
        tables: &[Rc<SchemaDescriptor>],
        live: &LiveSchema,
        operations: &mut Vec<MigrationOperation>,
    ) {
        for current in live.tables() {
            let table = &current.table_name;
            if !is_reserved(&self.prefix, table) {
                continue;
            }
            let Some(required) = tables
                .iter()
                .find(|d| d.table_name.eq_ignore_ascii_case(table))
            else {
                operations.push(MigrationOperation::new(
                    OperationKind::DropTable,
                    table,
                    table,
                    self.dialect.drop_table(table),
                ));
                continue;
            };

            for index in current.indexes() {
                if index.kind == IndexKind::Primary
                    || required.index(&index.name).is_some()
                    || required.index_by_signature(&index.signature()).is_some()
                {
                    continue;
                }
                operations.push(
                    MigrationOperation::new(
                        OperationKind::DropIndex,
                        table,
                        &index.name,
                        self.dialect.drop_index(table, &index.name),
                    )
                    .ignore_errors(),
                );
            }

            for property in current.properties() {
                let wanted = property.name.eq_ignore_ascii_case("id")
                    || required
                        .properties()
                        .iter()
                        .any(|p| p.name.eq_ignore_ascii_case(&property.name));
                if wanted {
                    continue;
                }
                operations.push(
                    MigrationOperation::new(
                        OperationKind::DropColumn,
                        table,
                        &property.name,
                        self.dialect.drop_column(table, &property.name),
                    )
                    .ignore_errors(),
                );
            }
        }
    }
}

/// Moves `name` right behind `after` in `order` (to the front without one).
fn place_after(order: &mut Vec<String>, name: &str, after: Option<&str>) {
    order.retain(|n| !n.eq_ignore_ascii_case(name));
    let position = after
        .and_then(|after| order.iter().position(|n| n.eq_ignore_ascii_case(after)))
        .map_or(0, |i| i + 1);
    order.insert(position, name.to_string());
}

fn predecessor(order: &[String], name: &str) -> Option<String> {
    let position = order.iter().position(|n| n.eq_ignore_ascii_case(name))?;
    position.checked_sub(1).map(|i| order[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(order: &[String]) -> Vec<&str> {
        order.iter().map(String::as_str).collect()
    }

    #[test]
    fn placement_tracks_planned_columns() {
        let mut order = vec!["id".to_string(), "body".to_string()];
        place_after(&mut order, "title", Some("id"));
        assert_eq!(names(&order), ["id", "title", "body"]);
        assert_eq!(predecessor(&order, "body").as_deref(), Some("title"));
        assert_eq!(predecessor(&order, "id"), None);

        place_after(&mut order, "body", Some("id"));
        assert_eq!(names(&order), ["id", "body", "title"]);
    }
}
