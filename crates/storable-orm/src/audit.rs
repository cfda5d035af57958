//! Audit events emitted by `store` and `delete`.

use std::fmt;

use tracing::info;

/// What happened to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// First store.
    Created,
    /// Store of changed columns.
    Updated,
    /// Delete.
    Deleted,
}

impl AuditAction {
    /// Returns the action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// What happened.
    pub action: AuditAction,
    /// Entity name.
    pub entity: String,
    /// Id of the instance (the former id for deletes).
    pub id: i64,
    /// Connection the change went to.
    pub connection: String,
    /// Columns written, empty for deletes.
    pub changed: Vec<String>,
}

/// Receives audit events.
pub trait AuditSink {
    /// Records one event. Failures are the sink's own business.
    fn record(&self, event: &AuditEvent);
}

/// Logs audit events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        info!(
            target: "storable::audit",
            action = event.action.as_str(),
            entity = %event.entity,
            id = event.id,
            connection = %event.connection,
            changed = ?event.changed,
            "entity {}",
            event.action
        );
    }
}

impl<F: Fn(&AuditEvent)> AuditSink for F {
    fn record(&self, event: &AuditEvent) {
        self(event);
    }
}
