//! Two-phase schema synchronization.
//!
//! Safe operations are applied first. The schema is then diffed again, and
//! whatever is left (alters and drops) is applied only when the caller
//! allows destructive changes.

use std::rc::Rc;
use std::sync::Arc;

use storable_core::{EntityIntrospector, EntityRegistry, SchemaDescriptor, SqlConnection};
use tracing::info;

use crate::diff::SchemaDiff;
use crate::error::Result;
use crate::executor::MigrationExecutor;
use crate::operations::{MigrationOperation, MigrationPlan};

/// Options for [`sync_schema`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Apply alters and drops after the safe phase.
    pub allow_unsafe: bool,
    /// Print statements instead of running them.
    pub dry_run: bool,
}

/// What [`sync_schema`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Safe operations applied in the first phase.
    pub safe_applied: Vec<MigrationOperation>,
    /// Unsafe operations applied in the second phase.
    pub unsafe_applied: Vec<MigrationOperation>,
    /// Unsafe operations left for an explicit run.
    pub withheld: Vec<MigrationOperation>,
}

impl SyncReport {
    /// Returns true if the database already matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.safe_applied.is_empty() && self.unsafe_applied.is_empty() && self.withheld.is_empty()
    }
}

/// Describes every registered entity.
pub fn required_descriptors(registry: Arc<EntityRegistry>) -> Result<Vec<Rc<SchemaDescriptor>>> {
    Ok(EntityIntrospector::new(registry).describe_all()?)
}

/// Computes the current plan for `registry`.
pub fn plan_schema(conn: &dyn SqlConnection, registry: Arc<EntityRegistry>) -> Result<MigrationPlan> {
    let prefix = registry.prefix().to_string();
    let required = required_descriptors(registry)?;
    SchemaDiff::new(conn, prefix).plan(&required)
}

/// Brings the database in line with `registry`.
pub fn sync_schema(
    conn: &dyn SqlConnection,
    registry: Arc<EntityRegistry>,
    options: SyncOptions,
) -> Result<SyncReport> {
    let executor = MigrationExecutor::new(conn).dry_run(options.dry_run);
    let mut report = SyncReport::default();

    let plan = plan_schema(conn, Arc::clone(&registry))?;
    if plan.is_empty() {
        info!("Schema is up to date");
        return Ok(report);
    }
    report.safe_applied = executor.apply(plan.safe_operations())?.applied;

    let plan = plan_schema(conn, registry)?;
    let remaining = plan.unsafe_operations();
    if remaining.is_empty() {
        // Safe operations are still pending in dry-run mode.
        report.withheld = plan
            .into_operations()
            .into_iter()
            .filter(|op| !op.is_safe())
            .collect();
    } else if options.allow_unsafe {
        report.unsafe_applied = executor.apply(remaining)?.applied;
    } else {
        info!(operations = remaining.len(), "Withholding unsafe operations");
        report.withheld = remaining.into_iter().cloned().collect();
    }
    Ok(report)
}
