//! # storable-sqlx
//!
//! Blocking [`SqlConnection`] drivers backed by sqlx.
//!
//! Each driver owns one sqlx connection and a current-thread tokio runtime,
//! and blocks on every statement. The connection is opened lazily on first
//! use.
//!
//! ```
//! use storable_core::{ConnectionConfig, SqlConnection};
//!
//! let conn = storable_sqlx::connect(&ConnectionConfig::sqlite_memory()).unwrap();
//! conn.execute("CREATE TABLE note (id INTEGER PRIMARY KEY, body TEXT)").unwrap();
//! conn.execute("INSERT INTO note (body) VALUES ('hello')").unwrap();
//! assert_eq!(conn.last_insert_id(), Some(1));
//! assert_eq!(conn.tables().unwrap(), ["note"]);
//! ```

mod blocking;
mod mysql;
mod sqlite;

pub use mysql::MySqlConnection;
pub use sqlite::SqliteConnection;

use storable_core::{ConnectionConfig, Engine, Result, SqlConnection};

/// Creates a driver for `config`. The connection opens on first use.
///
/// # Errors
///
/// Returns a connection error if the runtime cannot be created.
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn SqlConnection>> {
    Ok(match config.engine {
        Engine::Sqlite => Box::new(SqliteConnection::new(config.clone())?),
        Engine::MySql => Box::new(MySqlConnection::new(config.clone())?),
    })
}
