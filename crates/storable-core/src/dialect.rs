//! Engine-specific quoting and escaping.
//!
//! Two engines are supported: a MySQL-like server and the embedded SQLite
//! engine. Everything else the core needs from an engine goes through
//! [`crate::SqlConnection`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::SqlValue;

/// The database engine behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// MySQL / MariaDB.
    MySql,
    /// Embedded single-file SQLite.
    Sqlite,
}

impl Engine {
    /// Returns the engine name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the native identifier quote character.
    #[must_use]
    pub const fn identifier_quote(self) -> char {
        match self {
            Self::MySql => '`',
            Self::Sqlite => '"',
        }
    }

    /// Quotes a single identifier.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        let quote = self.identifier_quote();
        let doubled = format!("{quote}{quote}");
        format!("{quote}{}{quote}", name.replace(quote, &doubled))
    }

    /// Quotes each part and joins them with `.` (e.g. `table.column`).
    #[must_use]
    pub fn quote_path(self, parts: &[&str]) -> String {
        parts
            .iter()
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Escapes a string into a quoted literal.
    #[must_use]
    pub fn escape_string(self, value: &str) -> String {
        match self {
            Self::MySql => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push('\'');
                for c in value.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        '"' => out.push_str("\\\""),
                        '\0' => out.push_str("\\0"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\x1a' => out.push_str("\\Z"),
                        other => out.push(other),
                    }
                }
                out.push('\'');
                out
            }
            Self::Sqlite => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Renders a value as an inline SQL literal.
    #[must_use]
    pub fn escape_value(self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::Float(f) if f.is_finite() => {
                let text = f.to_string();
                if text.contains(['.', 'e', 'E']) {
                    text
                } else {
                    format!("{text}.0")
                }
            }
            SqlValue::Float(_) => "NULL".to_string(),
            SqlValue::Text(s) => self.escape_string(s),
            SqlValue::Blob(bytes) => {
                let hex: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_quoting() {
        assert_eq!(Engine::MySql.quote_identifier("user"), "`user`");
        assert_eq!(Engine::Sqlite.quote_identifier("user"), "\"user\"");
        assert_eq!(Engine::MySql.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(Engine::Sqlite.quote_path(&["t1", "email"]), "\"t1\".\"email\"");
    }

    #[test]
    fn string_escaping_per_engine() {
        assert_eq!(Engine::Sqlite.escape_string("it's"), "'it''s'");
        assert_eq!(Engine::MySql.escape_string("it's"), "'it\\'s'");
        assert_eq!(Engine::MySql.escape_string("a\\b\n"), "'a\\\\b\\n'");
        assert_eq!(Engine::Sqlite.escape_string("a\\b"), "'a\\b'");
    }

    #[test]
    fn value_literals() {
        let engine = Engine::Sqlite;
        assert_eq!(engine.escape_value(&SqlValue::Null), "NULL");
        assert_eq!(engine.escape_value(&SqlValue::Bool(true)), "1");
        assert_eq!(engine.escape_value(&SqlValue::Int(-3)), "-3");
        assert_eq!(engine.escape_value(&SqlValue::Float(2.0)), "2.0");
        assert_eq!(engine.escape_value(&SqlValue::Float(2.5)), "2.5");
        assert_eq!(engine.escape_value(&SqlValue::Float(f64::NAN)), "NULL");
        assert_eq!(engine.escape_value(&SqlValue::Float(f64::INFINITY)), "NULL");
        assert_eq!(engine.escape_value(&SqlValue::Blob(vec![0x48, 0x49])), "X'4849'");
    }

    #[test]
    fn engine_deserializes_lowercase() {
        let engine: Engine = serde_json::from_str("\"mysql\"").unwrap();
        assert_eq!(engine, Engine::MySql);
        let engine: Engine = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(engine, Engine::Sqlite);
    }
}
