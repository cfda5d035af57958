//! # storable-migrate
//!
//! Keeps a database in line with the registered Storable entities.
//!
//! - **Live schema** - reads tables, columns and indexes back from the database
//! - **Diff** - compares them with the entity descriptors and plans operations
//! - **Dialect** - engine-specific DDL for SQLite and MySQL
//! - **Executor** - applies operations, with rollback for multi-statement ones
//! - **Sync** - the two-phase protocol: safe operations first, the rest on request
//!
//! Drops are only ever planned for tables carrying the registry's reserved
//! prefix; other tables in the same database are left alone.
//!
//! ```
//! use std::sync::Arc;
//! use storable_core::{
//!     ConnectionConfig, EntityDefinition, EntityRegistry, PropertyDeclaration, PropertyType,
//! };
//! use storable_migrate::prelude::*;
//!
//! let mut registry = EntityRegistry::new();
//! registry.register_definition(
//!     EntityDefinition::new("Note").property(PropertyDeclaration::new("body", PropertyType::String)),
//! );
//! let registry = Arc::new(registry);
//!
//! let conn = storable_sqlx::connect(&ConnectionConfig::sqlite_memory()).unwrap();
//! let report = sync_schema(conn.as_ref(), Arc::clone(&registry), SyncOptions::default()).unwrap();
//! assert!(!report.safe_applied.is_empty());
//! assert!(plan_schema(conn.as_ref(), registry).unwrap().is_empty());
//! ```

pub mod cli;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod executor;
pub mod live;
pub mod operations;
pub mod sync;

pub use diff::SchemaDiff;
pub use error::{MigrateError, Result};
pub use executor::{ExecutionReport, MigrationExecutor};
pub use operations::{MigrationOperation, MigrationPlan, OperationKind};
pub use sync::{plan_schema, sync_schema, SyncOptions, SyncReport};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{dialect_for, SchemaDialect};
    pub use crate::diff::SchemaDiff;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::MigrationExecutor;
    pub use crate::operations::{MigrationOperation, MigrationPlan, OperationKind};
    pub use crate::sync::{plan_schema, sync_schema, SyncOptions, SyncReport};
}
