//! Migration executor.
//!
//! Applies planned operations, in order, over a blocking connection.

use storable_core::{Engine, Params, SqlConnection};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::operations::MigrationOperation;

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Operations that ran to completion.
    pub applied: Vec<MigrationOperation>,
    /// Operations that failed but were allowed to.
    pub ignored: Vec<MigrationOperation>,
    /// Statements sent (or printed, in dry-run mode).
    pub statements: Vec<String>,
}

impl ExecutionReport {
    /// Returns true if nothing was applied or attempted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.ignored.is_empty()
    }
}

/// Executes migration operations against a database.
pub struct MigrationExecutor<'a> {
    conn: &'a dyn SqlConnection,
    dry_run: bool,
}

impl<'a> MigrationExecutor<'a> {
    /// Creates a new migration executor.
    pub fn new(conn: &'a dyn SqlConnection) -> Self {
        Self {
            conn,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Applies `operations` in order.
    ///
    /// A failing operation aborts the batch unless it is marked
    /// `ignore_errors`, in which case it is logged and skipped.
    pub fn apply<'o, I>(&self, operations: I) -> Result<ExecutionReport>
    where
        I: IntoIterator<Item = &'o MigrationOperation>,
    {
        let mut report = ExecutionReport::default();
        for operation in operations {
            info!(
                kind = %operation.kind,
                table = %operation.table,
                target = %operation.target,
                "Applying migration operation"
            );
            report.statements.extend(operation.statements.iter().cloned());

            if self.dry_run {
                for sql in &operation.statements {
                    println!("{sql};");
                }
                report.applied.push(operation.clone());
                continue;
            }

            match self.run(operation) {
                Ok(()) => report.applied.push(operation.clone()),
                Err(err) if operation.ignore_errors => {
                    warn!(
                        kind = %operation.kind,
                        table = %operation.table,
                        target = %operation.target,
                        error = %err,
                        "Ignoring failed migration operation"
                    );
                    report.ignored.push(operation.clone());
                }
                Err(err) => return Err(err),
            }
        }

        if !self.dry_run && !report.applied.is_empty() && self.conn.engine() == Engine::Sqlite {
            self.check_integrity()?;
        }
        Ok(report)
    }

    fn run(&self, operation: &MigrationOperation) -> Result<()> {
        if !operation.transactional {
            for sql in &operation.statements {
                self.conn.execute(sql)?;
            }
            return Ok(());
        }

        self.conn.execute("BEGIN")?;
        for sql in &operation.statements {
            if let Err(err) = self.conn.execute(sql) {
                if let Err(rollback) = self.conn.execute("ROLLBACK") {
                    warn!(error = %rollback, "Rollback failed");
                }
                return Err(err.into());
            }
        }
        self.conn.execute("COMMIT")?;
        Ok(())
    }

    fn check_integrity(&self) -> Result<()> {
        let result = self
            .conn
            .fetch_one("PRAGMA integrity_check", &Params::new())?
            .and_then(|value| value.to_text())
            .unwrap_or_default();
        if !result.eq_ignore_ascii_case("ok") {
            return Err(MigrateError::IntegrityCheck(result));
        }
        debug!("Integrity check passed, compacting database");
        self.conn.execute("VACUUM")?;
        Ok(())
    }
}
