//! MySQL / MariaDB driver.
//!
//! Statements go over the text protocol, so every value arrives as text and
//! is converted according to the column type reported by the server.

use std::str::FromStr;

use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row as _, TypeInfo, ValueRef};
use storable_core::{
    ColumnInfo, ColumnType, ConnectionConfig, Engine, Error, IndexInfo, Params, Result, Row,
    SqlConnection, SqlValue,
};

use crate::blocking::Blocking;

/// A blocking connection to a MySQL-compatible server.
pub struct MySqlConnection {
    config: ConnectionConfig,
    inner: Blocking<sqlx::MySqlConnection>,
}

impl MySqlConnection {
    /// Creates a driver; nothing is opened until the first statement.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Ok(Self {
            inner: Blocking::new(config.dev_mode)?,
            config,
        })
    }

    fn options(&self) -> Result<MySqlConnectOptions> {
        let options = MySqlConnectOptions::from_str(&self.config.url)
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(options.charset("utf8mb4"))
    }
}

/// Converts the raw text of a value according to its column type.
pub(crate) fn convert_text_value(type_name: &str, bytes: Vec<u8>) -> SqlValue {
    let upper = type_name.to_ascii_uppercase();
    let text = || String::from_utf8_lossy(&bytes).into_owned();
    if upper.contains("BLOB") || upper.contains("BINARY") {
        return SqlValue::Blob(bytes);
    }
    if upper.contains("INT") || upper == "YEAR" || upper == "BOOLEAN" {
        let text = text();
        return text
            .trim()
            .parse::<i64>()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Text(text));
    }
    if upper == "FLOAT" || upper == "DOUBLE" {
        let text = text();
        return text
            .trim()
            .parse::<f64>()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Text(text));
    }
    match String::from_utf8(bytes) {
        Ok(text) => SqlValue::Text(text),
        Err(err) => SqlValue::Blob(err.into_bytes()),
    }
}

fn decode_row(row: &MySqlRow) -> std::result::Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            convert_text_value(&type_name, row.try_get_unchecked::<Vec<u8>, _>(i)?)
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

fn text(row: &Row, name: &str) -> String {
    row.get(name).and_then(SqlValue::to_text).unwrap_or_default()
}

impl SqlConnection for MySqlConnection {
    fn engine(&self) -> Engine {
        Engine::MySql
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
        if result.last_insert_id() > 0 {
            self.inner
                .set_last_insert_id(i64::try_from(result.last_insert_id()).unwrap_or(i64::MAX));
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
            "SELECT TABLE_NAME AS name FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
            &Params::new(),
            None,
        )?;
        Ok(names.iter().filter_map(SqlValue::to_text).collect())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self.fetch_assoc(
            "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS type, IS_NULLABLE AS nullable, \
             EXTRA AS extra, COLUMN_COMMENT AS comment FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {0} ORDER BY ORDINAL_POSITION",
            &Params::positional([table]),
            None,
        )?;
        Ok(rows
            .iter()
            .map(|row| {
                let ty = ColumnType::parse(&text(row, "type"));
                let comment = text(row, "comment");
                ColumnInfo {
                    name: text(row, "name"),
                    type_name: ty.base,
                    length: ty.length,
                    decimals: ty.decimals,
                    unsigned: ty.unsigned,
                    nullable: text(row, "nullable").eq_ignore_ascii_case("YES"),
                    auto_increment: text(row, "extra")
                        .to_ascii_lowercase()
                        .contains("auto_increment"),
                    comment: (!comment.is_empty()).then_some(comment),
                }
            })
            .collect())
    }

    fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows = self.fetch_assoc(
            "SELECT INDEX_NAME AS name, COLUMN_NAME AS column_name, NON_UNIQUE AS non_unique, \
             INDEX_TYPE AS index_type FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = {0} ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            &Params::positional([table]),
            None,
        )?;
        let mut indexes: Vec<IndexInfo> = Vec::new();
        for row in &rows {
            let name = text(row, "name");
            let column = text(row, "column_name");
            if let Some(index) = indexes.iter_mut().find(|index| index.name == name) {
                index.columns.push(column);
                continue;
            }
            indexes.push(IndexInfo {
                primary: name == "PRIMARY",
                unique: row.get("non_unique").and_then(SqlValue::as_i64) == Some(0),
                fulltext: text(row, "index_type").eq_ignore_ascii_case("FULLTEXT"),
                columns: vec![column],
                name,
            });
        }
        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_values_follow_column_type() {
        assert_eq!(convert_text_value("BIGINT UNSIGNED", b"42".to_vec()), SqlValue::Int(42));
        assert_eq!(convert_text_value("TINYINT", b"1".to_vec()), SqlValue::Int(1));
        assert_eq!(convert_text_value("DOUBLE", b"2.5".to_vec()), SqlValue::Float(2.5));
        assert_eq!(
            convert_text_value("VARCHAR", b"hello".to_vec()),
            SqlValue::Text("hello".into())
        );
        assert_eq!(
            convert_text_value("DECIMAL", b"10.20".to_vec()),
            SqlValue::Text("10.20".into())
        );
        assert_eq!(
            convert_text_value("BLOB", vec![0xff, 0x00]),
            SqlValue::Blob(vec![0xff, 0x00])
        );
    }

    #[test]
    fn driver_is_lazy() {
        let config = ConnectionConfig::new(Engine::MySql, "mysql://nobody@127.0.0.1:1/none");
        let conn = MySqlConnection::new(config).unwrap();
        assert_eq!(conn.engine(), Engine::MySql);
        assert_eq!(conn.last_insert_id(), None);
        assert_eq!(conn.escape_value(&SqlValue::Text("a'b".into())), "'a\\'b'");
    }
}
