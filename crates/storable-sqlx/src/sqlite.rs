//! SQLite driver.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row as _, TypeInfo, ValueRef};
use storable_core::{
    ColumnInfo, ColumnType, ConnectionConfig, Engine, Error, IndexInfo, Params, Result, Row,
    SqlConnection, SqlValue,
};

use crate::blocking::Blocking;

/// A blocking connection to a single-file (or in-memory) SQLite database.
pub struct SqliteConnection {
    config: ConnectionConfig,
    inner: Blocking<sqlx::SqliteConnection>,
}

impl SqliteConnection {
    /// Creates a driver; the database file is created on first connect.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Ok(Self {
            inner: Blocking::new(config.dev_mode)?,
            config,
        })
    }

    /// Creates a driver for a private in-memory database.
    pub fn memory() -> Result<Self> {
        Self::new(ConnectionConfig::sqlite_memory())
    }

    fn options(&self) -> Result<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&self.config.url)
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(options
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms)))
    }

    fn table_sql(&self, table: &str) -> Result<String> {
        let sql = self.fetch_one(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = {0}",
            &Params::positional([table]),
        )?;
        Ok(sql.and_then(|v| v.to_text()).unwrap_or_default())
    }
}

fn decode_row(row: &SqliteRow) -> std::result::Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => SqlValue::Float(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?),
                _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

fn int(row: &Row, name: &str) -> i64 {
    row.get(name).and_then(SqlValue::as_i64).unwrap_or(0)
}

fn text(row: &Row, name: &str) -> String {
    row.get(name).and_then(SqlValue::to_text).unwrap_or_default()
}

impl SqlConnection for SqliteConnection {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn connect(&self) -> Result<()> {
        let options = self.options()?;
        self.inner.ensure_open(|| async move { options.connect().await })
    }

    fn disconnect(&self) -> Result<()> {
        if let Some(conn) = self.inner.take() {
            self.inner
                .runtime()
                .block_on(conn.close())
                .map_err(|e| Error::Connection(e.to_string()))?;
        }
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<u64> {
        self.connect()?;
        let result = self
            .inner
            .run(sql, |rt, conn| rt.block_on(conn.execute(sql)))?;
        if result.rows_affected() > 0 {
            self.inner.set_last_insert_id(result.last_insert_rowid());
        }
        Ok(result.rows_affected())
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.connect()?;
        self.inner.run(sql, |rt, conn| {
            let rows = rt.block_on(conn.fetch_all(sql))?;
            rows.iter().map(decode_row).collect()
        })
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.inner.last_insert_id()
    }

    fn tables(&self) -> Result<Vec<String>> {
        let names = self.fetch_column(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &Params::new(),
            None,
        )?;
        Ok(names.iter().filter_map(SqlValue::to_text).collect())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let autoincrement = self.table_sql(table)?.to_ascii_uppercase().contains("AUTOINCREMENT");
        let sql = format!("PRAGMA table_info({})", self.quote_identifier(&[table]));
        let rows = self.query(&sql)?;
        Ok(rows
            .iter()
            .map(|row| {
                let ty = ColumnType::parse(&text(row, "type"));
                let primary = int(row, "pk") > 0;
                ColumnInfo {
                    name: text(row, "name"),
                    auto_increment: primary && autoincrement && ty.base == "INTEGER",
                    type_name: ty.base,
                    length: ty.length,
                    decimals: ty.decimals,
                    unsigned: ty.unsigned,
                    nullable: int(row, "notnull") == 0 && !primary,
                    comment: None,
                }
            })
            .collect())
    }

    fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let sql = format!("PRAGMA index_list({})", self.quote_identifier(&[table]));
        let mut indexes = Vec::new();
        for row in self.query(&sql)? {
            let name = text(&row, "name");
            let info_sql = format!("PRAGMA index_info({})", self.quote_identifier(&[name.as_str()]));
            let mut parts: Vec<(i64, String)> = self
                .query(&info_sql)?
                .iter()
                .map(|part| (int(part, "seqno"), text(part, "name")))
                .collect();
            parts.sort_by_key(|(seqno, _)| *seqno);
            indexes.push(IndexInfo {
                primary: text(&row, "origin") == "pk" || name.starts_with("sqlite_autoindex"),
                unique: int(&row, "unique") != 0,
                fulltext: false,
                columns: parts.into_iter().map(|(_, column)| column).collect(),
                name,
            });
        }
        Ok(indexes)
    }
}
