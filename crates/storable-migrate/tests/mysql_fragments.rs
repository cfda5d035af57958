//! MySQL planning against a scripted connection.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use storable_core::{
    ColumnInfo, Engine, EntityDefinition, EntityRegistry, IndexInfo, PropertyDeclaration,
    PropertyType, Result, Row, SqlConnection, SqlValue,
};
use storable_migrate::prelude::*;

#[derive(Default)]
struct ScriptedMySql {
    tables: BTreeMap<String, (Vec<ColumnInfo>, Vec<IndexInfo>)>,
    lineage: Vec<(String, String)>,
    executed: RefCell<Vec<String>>,
}

impl ScriptedMySql {
    fn table(mut self, name: &str, columns: Vec<ColumnInfo>, indexes: Vec<IndexInfo>) -> Self {
        self.tables.insert(name.to_string(), (columns, indexes));
        self
    }

    fn lineage(mut self, entity: &str, lineage: &str) -> Self {
        self.lineage.push((entity.to_string(), lineage.to_string()));
        self
    }
}

impl SqlConnection for ScriptedMySql {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<u64> {
        self.executed.borrow_mut().push(sql.to_string());
        Ok(0)
    }

    fn query(&self, _sql: &str) -> Result<Vec<Row>> {
        Ok(self
            .lineage
            .iter()
            .map(|(name, lineage)| {
                Row::new()
                    .with("name", SqlValue::Text(name.clone()))
                    .with("lineage", SqlValue::Text(lineage.clone()))
            })
            .collect())
    }

    fn last_insert_id(&self) -> Option<i64> {
        None
    }

    fn tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self.tables.get(table).map(|t| t.0.clone()).unwrap_or_default())
    }

    fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        Ok(self.tables.get(table).map(|t| t.1.clone()).unwrap_or_default())
    }
}

fn column(name: &str, type_name: &str, length: Option<u32>) -> ColumnInfo {
    ColumnInfo {
        name: name.into(),
        type_name: type_name.into(),
        length,
        decimals: None,
        unsigned: false,
        nullable: true,
        auto_increment: false,
        comment: Some(String::new()),
    }
}

fn id() -> ColumnInfo {
    ColumnInfo {
        unsigned: true,
        nullable: false,
        auto_increment: true,
        ..column("id", "BIGINT", Some(18))
    }
}

fn not_null(column: ColumnInfo) -> ColumnInfo {
    ColumnInfo {
        nullable: false,
        ..column
    }
}

fn index(name: &str, columns: &[&str], unique: bool, primary: bool) -> IndexInfo {
    IndexInfo {
        name: name.into(),
        columns: columns.iter().map(ToString::to_string).collect(),
        unique,
        primary,
        fulltext: false,
    }
}

fn primary() -> IndexInfo {
    index("PRIMARY", &["id"], true, true)
}

fn registry() -> Arc<EntityRegistry> {
    let mut registry = EntityRegistry::new();
    registry
        .register_definition(
            EntityDefinition::new("User")
                .property(PropertyDeclaration::new("email", PropertyType::String)),
        )
        .register_definition(
            EntityDefinition::new("Post")
                .property(PropertyDeclaration::new("title", PropertyType::String))
                .property(PropertyDeclaration::new(
                    "author",
                    PropertyType::Reference("User".into()),
                )),
        );
    Arc::new(registry)
}

/// The id-allocation and entity metadata tables, as created by a sync.
fn reserved_tables() -> ScriptedMySql {
    ScriptedMySql::default()
        .table(
            "storable_id",
            vec![id(), not_null(column("entity", "VARCHAR", Some(191)))],
            vec![primary()],
        )
        .table(
            "storable_entity",
            vec![
                id(),
                not_null(column("name", "VARCHAR", Some(191))),
                column("lineage", "LONGTEXT", None),
            ],
            vec![primary(), index("name", &["name"], true, false)],
        )
}

/// The database as the framework itself would have left it.
fn synced(post_columns: Vec<ColumnInfo>) -> ScriptedMySql {
    let author = ColumnInfo {
        unsigned: true,
        ..column("author", "BIGINT", None)
    };
    let mut post = vec![id()];
    post.extend(post_columns);
    if post.len() == 1 {
        post.push(column("title", "VARCHAR", Some(191)));
        post.push(author);
    }
    reserved_tables()
        .table(
            "user",
            vec![id(), column("email", "VARCHAR", Some(191))],
            vec![primary()],
        )
        .table(
            "post",
            post,
            vec![primary(), index("author", &["author"], false, false)],
        )
        .lineage("User", "[]")
        .lineage("Post", "[]")
}

fn plan(conn: &ScriptedMySql) -> MigrationPlan {
    plan_schema(conn, registry()).unwrap()
}

#[test]
fn reported_shape_matches_required_fragments() {
    let conn = synced(Vec::new());
    let plan = plan(&conn);
    assert!(plan.is_empty(), "unexpected operations: {:?}", plan.operations());
}

#[test]
fn integer_display_width_is_not_compared() {
    let author = ColumnInfo {
        unsigned: true,
        ..column("author", "BIGINT", Some(18))
    };
    let conn = synced(vec![column("title", "VARCHAR", Some(191)), author]);
    assert!(plan(&conn).is_empty());
}

#[test]
fn comment_difference_is_an_alter() {
    let title = ColumnInfo {
        comment: Some("legacy".into()),
        ..column("title", "VARCHAR", Some(191))
    };
    let author = ColumnInfo {
        unsigned: true,
        ..column("author", "BIGINT", None)
    };
    let conn = synced(vec![title, author]);
    let plan = plan(&conn);
    assert_eq!(plan.len(), 1);
    let op = &plan.operations()[0];
    assert_eq!(op.kind, OperationKind::AlterColumn);
    assert!(!op.transactional);
    assert_eq!(
        op.statements,
        ["ALTER TABLE `post` CHANGE `title` `title` VARCHAR(191) NULL AFTER `id`"]
    );
}

#[test]
fn signedness_difference_is_an_alter() {
    let conn = synced(vec![
        column("title", "VARCHAR", Some(191)),
        column("author", "BIGINT", None),
    ]);
    let plan = plan(&conn);
    let targets: Vec<&str> = plan.operations().iter().map(|op| op.target.as_str()).collect();
    assert_eq!(targets, ["author"]);
    assert_eq!(
        plan.operations()[0].statements,
        ["ALTER TABLE `post` CHANGE `author` `author` BIGINT UNSIGNED NULL AFTER `title`"]
    );
}

#[test]
fn moved_column_is_placed_back() {
    let author = ColumnInfo {
        unsigned: true,
        ..column("author", "BIGINT", None)
    };
    let conn = synced(vec![author, column("title", "VARCHAR", Some(191))]);
    let plan = plan(&conn);
    assert_eq!(plan.len(), 1, "unexpected operations: {:?}", plan.operations());
    assert_eq!(plan.operations()[0].target, "title");
}

#[test]
fn missing_column_is_added_in_place() {
    let author = ColumnInfo {
        unsigned: true,
        ..column("author", "BIGINT", None)
    };
    let conn = synced(vec![author]);
    let plan = plan(&conn);
    assert_eq!(plan.len(), 1, "unexpected operations: {:?}", plan.operations());
    assert_eq!(
        plan.operations()[0].statements,
        ["ALTER TABLE `post` ADD COLUMN `title` VARCHAR(191) NULL AFTER `id`"]
    );

    MigrationExecutor::new(&conn).apply(plan.operations()).unwrap();
    assert_eq!(conn.executed.borrow().len(), 1);
}

#[test]
fn changed_lineage_is_upserted() {
    let mut conn = synced(Vec::new());
    conn.lineage = vec![("User".into(), "[]".into())];
    let plan = plan(&conn);
    assert_eq!(plan.len(), 1);
    let op = &plan.operations()[0];
    assert_eq!(op.kind, OperationKind::UpsertEntityMetadata);
    assert_eq!(op.target, "Post");
    assert!(op.statements[0].ends_with("ON DUPLICATE KEY UPDATE `lineage` = VALUES(`lineage`)"));
}

#[test]
fn nullability_difference_is_an_alter() {
    let author = ColumnInfo {
        unsigned: true,
        ..column("author", "BIGINT", None)
    };
    let conn = synced(vec![not_null(column("title", "VARCHAR", Some(191))), author]);
    let plan = plan(&conn);
    assert_eq!(plan.len(), 1, "unexpected operations: {:?}", plan.operations());
    let op = &plan.operations()[0];
    assert_eq!(op.kind, OperationKind::AlterColumn);
    assert_eq!(
        op.statements,
        ["ALTER TABLE `post` CHANGE `title` `title` VARCHAR(191) NULL AFTER `id`"]
    );
}

fn priced(live_decimals: u32) -> (ScriptedMySql, Arc<EntityRegistry>) {
    let mut registry = EntityRegistry::new();
    registry.register_definition(
        EntityDefinition::new("Item").property(
            PropertyDeclaration::new("price", PropertyType::Float)
                .length(10)
                .decimals(2),
        ),
    );
    let price = ColumnInfo {
        decimals: Some(live_decimals),
        ..column("price", "DOUBLE", Some(10))
    };
    let conn = reserved_tables()
        .table("item", vec![id(), price], vec![primary()])
        .lineage("Item", "[]");
    (conn, Arc::new(registry))
}

#[test]
fn decimals_difference_is_an_alter() {
    let (conn, registry) = priced(2);
    assert!(plan_schema(&conn, Arc::clone(&registry)).unwrap().is_empty());

    let (conn, registry) = priced(4);
    let plan = plan_schema(&conn, registry).unwrap();
    assert_eq!(plan.len(), 1, "unexpected operations: {:?}", plan.operations());
    assert_eq!(
        plan.operations()[0].statements,
        ["ALTER TABLE `item` CHANGE `price` `price` DOUBLE(10,2) NULL AFTER `id`"]
    );
}
