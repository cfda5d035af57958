//! Shared blocking facade over an async sqlx connection.

use std::cell::{Cell, RefCell};
use std::future::Future;

use storable_core::{Error, Result};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// One lazily opened sqlx connection plus the runtime that drives it.
pub(crate) struct Blocking<C> {
    runtime: Runtime,
    conn: RefCell<Option<C>>,
    last_insert_id: Cell<Option<i64>>,
    dev_mode: bool,
}

impl<C> Blocking<C> {
    pub(crate) fn new(dev_mode: bool) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Connection(format!("cannot start runtime: {e}")))?;
        Ok(Self {
            runtime,
            conn: RefCell::new(None),
            last_insert_id: Cell::new(None),
            dev_mode,
        })
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.conn.borrow().is_some()
    }

    /// Opens the connection with `open` unless it is already open.
    pub(crate) fn ensure_open<F>(&self, open: impl FnOnce() -> F) -> Result<()>
    where
        F: Future<Output = std::result::Result<C, sqlx::Error>>,
    {
        if self.is_connected() {
            return Ok(());
        }
        let conn = self
            .runtime
            .block_on(open())
            .map_err(|e| Error::Connection(e.to_string()))?;
        *self.conn.borrow_mut() = Some(conn);
        Ok(())
    }

    /// Takes the connection out, leaving the facade disconnected.
    pub(crate) fn take(&self) -> Option<C> {
        self.conn.borrow_mut().take()
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Runs one statement against the open connection.
    pub(crate) fn run<T>(
        &self,
        sql: &str,
        f: impl FnOnce(&Runtime, &mut C) -> std::result::Result<T, sqlx::Error>,
    ) -> Result<T> {
        debug!(sql = %sql, "executing statement");
        let mut guard = self.conn.borrow_mut();
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::Connection("not connected".to_string()))?;
        f(&self.runtime, conn).map_err(|e| self.query_error(e, sql))
    }

    pub(crate) fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id.get()
    }

    pub(crate) fn set_last_insert_id(&self, id: i64) {
        self.last_insert_id.set(Some(id));
    }

    fn query_error(&self, err: sqlx::Error, sql: &str) -> Error {
        let message = match &err {
            sqlx::Error::Database(db) => db.message().to_string(),
            other => other.to_string(),
        };
        Error::query(message, sql, self.dev_mode)
    }
}
