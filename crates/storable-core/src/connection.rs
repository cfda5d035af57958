//! The blocking SQL connection boundary.
//!
//! Drivers implement the handful of required methods on [`SqlConnection`];
//! parameter substitution, fetch helpers and simple DML builders are provided
//! on top of them.

use std::rc::Rc;

use crate::dialect::Engine;
use crate::error::Result;
use crate::params::{prepare_query, Params};
use crate::value::SqlValue;

/// One result row: column names paired with their raw values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    pub fn push(&mut self, name: impl Into<String>, value: SqlValue) {
        self.columns.push((name.into(), value));
    }

    /// Adds a column, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: SqlValue) -> Self {
        self.push(name, value);
        self
    }

    /// Returns the value of the named column.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Returns the value at `index`.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.columns.get(index).map(|(_, value)| value)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Consumes the row, returning only the values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.columns.into_iter().map(|(_, value)| value).collect()
    }
}

/// A column as reported by the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Base type name, uppercased (`VARCHAR`, `BIGINT`, ...).
    pub type_name: String,
    /// Declared length, if any.
    pub length: Option<u32>,
    /// Declared decimals, if any.
    pub decimals: Option<u32>,
    /// Whether the column is unsigned.
    pub unsigned: bool,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Column comment, if any.
    pub comment: Option<String>,
}

/// An index as reported by the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Physical index name.
    pub name: String,
    /// Indexed columns, in index order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether this is the primary key.
    pub primary: bool,
    /// Whether this is a full-text index.
    pub fulltext: bool,
}

/// A blocking connection to one database.
///
/// All methods take `&self`; drivers keep their handle behind interior
/// mutability and connect lazily on first use.
pub trait SqlConnection {
    /// Returns the engine behind this connection.
    fn engine(&self) -> Engine;

    /// Opens the underlying handle if it is not open yet.
    fn connect(&self) -> Result<()>;

    /// Closes the underlying handle. The next statement reconnects.
    fn disconnect(&self) -> Result<()>;

    /// Executes a statement, returning the number of affected rows.
    fn execute(&self, sql: &str) -> Result<u64>;

    /// Runs a query and returns all rows.
    fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Returns the id generated by the last insert.
    fn last_insert_id(&self) -> Option<i64>;

    /// Lists the user tables of the current database.
    fn tables(&self) -> Result<Vec<String>>;

    /// Lists the columns of `table` in declaration order.
    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Lists the indexes of `table`.
    fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>>;

    /// Renders `value` as an escaped literal.
    fn escape_value(&self, value: &SqlValue) -> String {
        self.engine().escape_value(value)
    }

    /// Quotes and joins identifier parts (`table.column`).
    fn quote_identifier(&self, parts: &[&str]) -> String {
        self.engine().quote_path(parts)
    }

    /// Substitutes parameters and normalizes `sql` for this engine.
    fn prepare(&self, sql: &str, params: &Params) -> Result<String> {
        prepare_query(self.engine(), sql, params)
    }

    /// Fetches rows as name/value maps, keeping at most `limit` rows.
    fn fetch_assoc(&self, sql: &str, params: &Params, limit: Option<usize>) -> Result<Vec<Row>> {
        let sql = self.prepare(sql, params)?;
        let mut rows = self.query(&sql)?;
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    /// Fetches rows as positional value lists.
    fn fetch_array(
        &self,
        sql: &str,
        params: &Params,
        limit: Option<usize>,
    ) -> Result<Vec<Vec<SqlValue>>> {
        Ok(self
            .fetch_assoc(sql, params, limit)?
            .into_iter()
            .map(Row::into_values)
            .collect())
    }

    /// Fetches the first column of the first row.
    fn fetch_one(&self, sql: &str, params: &Params) -> Result<Option<SqlValue>> {
        let rows = self.fetch_assoc(sql, params, Some(1))?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// Fetches the first column of every row.
    fn fetch_column(
        &self,
        sql: &str,
        params: &Params,
        limit: Option<usize>,
    ) -> Result<Vec<SqlValue>> {
        Ok(self
            .fetch_assoc(sql, params, limit)?
            .into_iter()
            .filter_map(|row| row.into_values().into_iter().next())
            .collect())
    }

    /// Inserts one row into `table`.
    fn insert(&self, table: &str, values: &[(String, SqlValue)]) -> Result<u64> {
        let table = self.quote_identifier(&[table]);
        let sql = if values.is_empty() {
            match self.engine() {
                Engine::MySql => format!("INSERT INTO {table} () VALUES ()"),
                Engine::Sqlite => format!("INSERT INTO {table} DEFAULT VALUES"),
            }
        } else {
            let columns: Vec<String> = values
                .iter()
                .map(|(name, _)| self.quote_identifier(&[name]))
                .collect();
            let literals: Vec<String> = values
                .iter()
                .map(|(_, value)| self.escape_value(value))
                .collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                literals.join(", ")
            )
        };
        self.execute(&sql)
    }

    /// Updates rows of `table` matching `condition`.
    fn update(
        &self,
        table: &str,
        values: &[(String, SqlValue)],
        condition: &str,
        params: &Params,
    ) -> Result<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = values
            .iter()
            .map(|(name, value)| {
                format!(
                    "{} = {}",
                    self.quote_identifier(&[name]),
                    self.escape_value(value)
                )
            })
            .collect();
        let condition = self.prepare(condition, params)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {condition}",
            self.quote_identifier(&[table]),
            assignments.join(", ")
        );
        self.execute(&sql)
    }

    /// Deletes rows of `table` matching `condition`.
    fn delete(&self, table: &str, condition: &str, params: &Params) -> Result<u64> {
        let condition = self.prepare(condition, params)?;
        let sql = format!(
            "DELETE FROM {} WHERE {condition}",
            self.quote_identifier(&[table])
        );
        self.execute(&sql)
    }
}

macro_rules! forward_connection {
    ($($wrapper:ty),*) => {$(
        impl<C: SqlConnection + ?Sized> SqlConnection for $wrapper {
            fn engine(&self) -> Engine {
                (**self).engine()
            }

            fn connect(&self) -> Result<()> {
                (**self).connect()
            }

            fn disconnect(&self) -> Result<()> {
                (**self).disconnect()
            }

            fn execute(&self, sql: &str) -> Result<u64> {
                (**self).execute(sql)
            }

            fn query(&self, sql: &str) -> Result<Vec<Row>> {
                (**self).query(sql)
            }

            fn last_insert_id(&self) -> Option<i64> {
                (**self).last_insert_id()
            }

            fn tables(&self) -> Result<Vec<String>> {
                (**self).tables()
            }

            fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
                (**self).table_columns(table)
            }

            fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
                (**self).table_indexes(table)
            }
        }
    )*};
}

forward_connection!(Box<C>, Rc<C>, &C);
