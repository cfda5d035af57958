//! Migration operations and plans.
//!
//! An operation is one classified schema change with the statements that
//! perform it. A [`MigrationPlan`] partitions operations into safe ones
//! (purely additive) and the rest, and only hands out the unsafe ones once
//! nothing safe is left to do.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What an operation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Create a table holding only its primary key.
    CreateTable,
    /// Add a column.
    CreateColumn,
    /// Change a column definition.
    AlterColumn,
    /// Add an index.
    CreateIndex,
    /// Remove a column.
    DropColumn,
    /// Remove an index.
    DropIndex,
    /// Remove a table.
    DropTable,
    /// Insert or update an entity's lineage row.
    UpsertEntityMetadata,
}

impl OperationKind {
    /// Returns the kebab-case tag of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "create-table",
            Self::CreateColumn => "create-column",
            Self::AlterColumn => "alter-column",
            Self::CreateIndex => "create-index",
            Self::DropColumn => "drop-column",
            Self::DropIndex => "drop-index",
            Self::DropTable => "drop-table",
            Self::UpsertEntityMetadata => "upsert-entity-metadata",
        }
    }

    /// Returns true for additive kinds that never alter or remove data.
    #[must_use]
    pub const fn is_safe(self) -> bool {
        matches!(
            self,
            Self::CreateTable | Self::CreateColumn | Self::CreateIndex | Self::UpsertEntityMetadata
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single classified schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOperation {
    /// Operation kind.
    pub kind: OperationKind,
    /// Affected table.
    pub table: String,
    /// Affected column, index or entity; the table itself for table kinds.
    pub target: String,
    /// Statements, in execution order.
    pub statements: Vec<String>,
    /// Run the statements inside BEGIN / COMMIT.
    pub transactional: bool,
    /// A failure of this operation is logged and skipped.
    pub ignore_errors: bool,
}

impl MigrationOperation {
    /// Creates an operation.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        table: impl Into<String>,
        target: impl Into<String>,
        statements: Vec<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            target: target.into(),
            statements,
            transactional: false,
            ignore_errors: false,
        }
    }

    /// Wraps the statements in a transaction.
    #[must_use]
    pub fn transactional(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    /// Marks failures of this operation as non-fatal.
    #[must_use]
    pub fn ignore_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }

    /// Returns true if the operation is additive.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.kind.is_safe()
    }
}

impl fmt::Display for MigrationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target == self.table {
            write!(f, "{} {}", self.kind, self.table)
        } else {
            write!(f, "{} {}.{}", self.kind, self.table, self.target)
        }
    }
}

/// The ordered result of one diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    operations: Vec<MigrationOperation>,
}

impl MigrationPlan {
    /// Creates a plan from operations in execution order.
    #[must_use]
    pub fn new(operations: Vec<MigrationOperation>) -> Self {
        Self { operations }
    }

    /// Returns every operation.
    #[must_use]
    pub fn operations(&self) -> &[MigrationOperation] {
        &self.operations
    }

    /// Returns the safe operations.
    #[must_use]
    pub fn safe_operations(&self) -> Vec<&MigrationOperation> {
        self.operations.iter().filter(|op| op.is_safe()).collect()
    }

    /// Returns the full list, but only when there is nothing safe to apply.
    ///
    /// Applying safe operations can make unsafe ones obsolete (a created
    /// column no longer needs to be altered), so callers apply the safe
    /// part, diff again, and only then look at this.
    #[must_use]
    pub fn unsafe_operations(&self) -> Vec<&MigrationOperation> {
        if self.operations.iter().any(MigrationOperation::is_safe) {
            Vec::new()
        } else {
            self.operations.iter().collect()
        }
    }

    /// Returns true if the live schema already matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Consumes the plan, returning its operations.
    #[must_use]
    pub fn into_operations(self) -> Vec<MigrationOperation> {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OperationKind) -> MigrationOperation {
        MigrationOperation::new(kind, "post", "title", vec!["SQL".to_string()])
    }

    #[test]
    fn classification() {
        assert!(OperationKind::CreateTable.is_safe());
        assert!(OperationKind::CreateIndex.is_safe());
        assert!(OperationKind::UpsertEntityMetadata.is_safe());
        assert!(!OperationKind::AlterColumn.is_safe());
        assert!(!OperationKind::DropIndex.is_safe());
        assert_eq!(OperationKind::UpsertEntityMetadata.as_str(), "upsert-entity-metadata");
    }

    #[test]
    fn unsafe_operations_wait_for_safe_ones() {
        let plan = MigrationPlan::new(vec![
            op(OperationKind::CreateColumn),
            op(OperationKind::AlterColumn),
            op(OperationKind::DropColumn),
        ]);
        assert_eq!(plan.safe_operations().len(), 1);
        assert!(plan.unsafe_operations().is_empty());

        let plan = MigrationPlan::new(vec![
            op(OperationKind::AlterColumn),
            op(OperationKind::DropColumn),
        ]);
        assert!(plan.safe_operations().is_empty());
        assert_eq!(plan.unsafe_operations().len(), 2);
    }

    #[test]
    fn safe_partition_holds_for_every_mix() {
        let kinds = [
            OperationKind::CreateTable,
            OperationKind::CreateColumn,
            OperationKind::AlterColumn,
            OperationKind::CreateIndex,
            OperationKind::DropColumn,
            OperationKind::DropIndex,
            OperationKind::DropTable,
            OperationKind::UpsertEntityMetadata,
        ];
        for mask in 0u32..(1 << kinds.len()) {
            let ops: Vec<_> = kinds
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, kind)| op(*kind))
                .collect();
            let plan = MigrationPlan::new(ops);
            let safe = plan.safe_operations();
            assert!(safe.iter().all(|op| op.is_safe()));
            assert!(safe.len() <= plan.len());
            assert!(plan.unsafe_operations().is_empty() || safe.is_empty());
        }
    }

    #[test]
    fn display_names_the_target() {
        assert_eq!(op(OperationKind::AlterColumn).to_string(), "alter-column post.title");
        let table = MigrationOperation::new(OperationKind::CreateTable, "post", "post", vec![]);
        assert_eq!(table.to_string(), "create-table post");
    }
}
