//! Query parameters and placeholder substitution.
//!
//! Statements carry `{name}` or positional `{0}`, `{1}`, ... placeholders.
//! [`prepare_query`] replaces each with the escaped literal of its value,
//! normalizes `&&` / `||`, and rewrites backtick identifiers to the engine's
//! native quoting. The rewrite walks the [`Lexer`] token stream, so string
//! literals and double-quoted tokens pass through untouched.

use std::collections::BTreeMap;

use crate::dialect::Engine;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, TokenKind};
use crate::schema::{is_qualified_name, table_name};
use crate::value::{SqlValue, ToSqlValue};

/// Named and positional values for a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, SqlValue>,
    next_position: usize,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates positional parameters `{0}`, `{1}`, ... from `values`.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToSqlValue,
    {
        let mut params = Self::new();
        for value in values {
            params.push(value);
        }
        params
    }

    /// Adds a named parameter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a named parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl ToSqlValue) {
        self.values.insert(name.into(), value.to_sql_value());
    }

    /// Appends the next positional parameter.
    pub fn push(&mut self, value: impl ToSqlValue) {
        let position = self.next_position.to_string();
        self.next_position += 1;
        self.values.insert(position, value.to_sql_value());
    }

    /// Returns the value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    /// Returns true when no parameters are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<SqlValue>> for Params {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::positional(values)
    }
}

/// Rewrites `sql` for `engine`, substituting placeholders from `params`.
///
/// # Errors
///
/// Returns [`Error::MissingParameter`] when a placeholder has no value.
pub fn prepare_query(engine: Engine, sql: &str, params: &Params) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    for token in Lexer::for_engine(sql, engine) {
        match &token.kind {
            TokenKind::Placeholder(name) => {
                let value = params
                    .get(name)
                    .ok_or_else(|| Error::MissingParameter(name.clone()))?;
                out.push_str(&engine.escape_value(value));
            }
            TokenKind::And => out.push_str("AND"),
            TokenKind::Or => out.push_str("OR"),
            TokenKind::Backtick(name) if is_qualified_name(name) => {
                out.push_str(&engine.quote_identifier(&table_name(name)));
            }
            TokenKind::Backtick(name) => out.push_str(&engine.quote_identifier(name)),
            _ => out.push_str(token.text(sql)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_named_and_positional() {
        let params = Params::new().with("email", "x@y.com").with("min", 3);
        let sql = prepare_query(
            Engine::Sqlite,
            "email = {email} AND score > {min}",
            &params,
        )
        .unwrap();
        assert_eq!(sql, "email = 'x@y.com' AND score > 3");

        let params = Params::positional(["a", "b"]);
        let sql = prepare_query(Engine::Sqlite, "x IN ({0}, {1})", &params).unwrap();
        assert_eq!(sql, "x IN ('a', 'b')");
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let err = prepare_query(Engine::Sqlite, "id = {id}", &Params::new()).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(name) if name == "id"));
    }

    #[test]
    fn literals_are_left_alone() {
        let params = Params::positional([1]);
        let sql = prepare_query(
            Engine::Sqlite,
            "a = '{0} && b' && c = {0} || \"x||y\" = 1",
            &params,
        )
        .unwrap();
        assert_eq!(sql, "a = '{0} && b' AND c = 1 OR \"x||y\" = 1");
    }

    #[test]
    fn sqlite_backslash_literal_does_not_hide_placeholders() {
        let params = Params::positional(["50%", "ann"]);
        let sql = prepare_query(
            Engine::Sqlite,
            r"title LIKE {0} ESCAPE '\' && author = {1}",
            &params,
        )
        .unwrap();
        assert_eq!(sql, r"title LIKE '50%' ESCAPE '\' AND author = 'ann'");

        let sql = prepare_query(Engine::MySql, r"a = 'x\' {0}' AND b = {1}", &params).unwrap();
        assert_eq!(sql, r"a = 'x\' {0}' AND b = 'ann'");
    }

    #[test]
    fn backticks_use_native_quoting() {
        let sql = prepare_query(Engine::Sqlite, "SELECT `id` FROM `user`", &Params::new()).unwrap();
        assert_eq!(sql, "SELECT \"id\" FROM \"user\"");
        let sql = prepare_query(Engine::MySql, "SELECT `id` FROM `user`", &Params::new()).unwrap();
        assert_eq!(sql, "SELECT `id` FROM `user`");
    }

    #[test]
    fn qualified_entity_names_become_table_names() {
        let sql = prepare_query(
            Engine::Sqlite,
            "SELECT * FROM `Blog\\Post` WHERE id = 1",
            &Params::new(),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM \"blog_post\" WHERE id = 1");
    }

    #[test]
    fn string_parameters_are_escaped() {
        let params = Params::positional(["O'Brien"]);
        let sql = prepare_query(Engine::Sqlite, "name = {0}", &params).unwrap();
        assert_eq!(sql, "name = 'O''Brien'");
        let sql = prepare_query(Engine::MySql, "name = {0}", &params).unwrap();
        assert_eq!(sql, "name = 'O\\'Brien'");
    }
}
