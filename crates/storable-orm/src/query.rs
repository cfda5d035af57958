//! Fetch options and the SELECT builder.
//!
//! Conditions and sort fields are written against property names. Dotted
//! paths such as `author.email` follow references: each distinct path prefix
//! becomes one `LEFT JOIN` aliased `t1`, `t2`, ... while the root table is
//! `t0`. Bare root property names are qualified with `t0`; everything else in
//! the condition passes through the lexer untouched, so string literals and
//! placeholders survive as written.

use std::rc::Rc;

use storable_core::lexer::{Lexer, TokenKind};
use storable_core::{EntityIntrospector, Engine, Params, SchemaDescriptor, ToSqlValue};

use crate::error::{OrmError, Result};

const ROOT_ALIAS: &str = "t0";

/// Where and how instances are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    /// Connection id; the session default when `None`.
    pub connection: Option<String>,
    /// Also return instances of concrete subtypes.
    pub include_subtypes: bool,
    /// Drop instances failing the readability check.
    pub readable_only: bool,
}

impl Default for Fetch {
    fn default() -> Self {
        Self {
            connection: None,
            include_subtypes: false,
            readable_only: true,
        }
    }
}

impl Fetch {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches from the connection registered as `id`.
    #[must_use]
    pub fn on(mut self, id: impl Into<String>) -> Self {
        self.connection = Some(id.into());
        self
    }

    /// Includes concrete subtypes.
    #[must_use]
    pub fn with_subtypes(mut self) -> Self {
        self.include_subtypes = true;
        self
    }

    /// Skips the readability check.
    #[must_use]
    pub fn unchecked(mut self) -> Self {
        self.readable_only = false;
        self
    }
}

/// A condition-based fetch.
///
/// ```
/// use storable_orm::Query;
///
/// let query = Query::new()
///     .filter("author.email = {email}")
///     .param("email", "ann@example.com")
///     .sort("-id")
///     .limit(10);
/// assert_eq!(query.sort, ["-id"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Condition over property names and dotted reference paths.
    pub condition: Option<String>,
    /// Values for the condition's placeholders.
    pub params: Params,
    /// Sort fields, each `+path` or `-path`.
    pub sort: Vec<String>,
    /// Maximum number of instances.
    pub limit: Option<usize>,
    /// Number of rows skipped.
    pub offset: Option<usize>,
    /// Connection and type options.
    pub fetch: Fetch,
}

impl Query {
    /// Matches every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the condition.
    #[must_use]
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Replaces all parameters.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Binds one named parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Appends a sort field.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>) -> Self {
        self.sort.push(field.into());
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the fetch options.
    #[must_use]
    pub fn fetch(mut self, fetch: Fetch) -> Self {
        self.fetch = fetch;
        self
    }
}

#[derive(Debug)]
struct Join {
    path: String,
    alias: String,
    table: String,
    parent_alias: String,
    column: String,
}

/// Builds one SELECT over a concrete entity table.
pub(crate) struct SelectBuilder<'a> {
    engine: Engine,
    introspector: &'a EntityIntrospector,
    root: Rc<SchemaDescriptor>,
    joins: Vec<Join>,
}

impl<'a> SelectBuilder<'a> {
    pub(crate) fn new(
        engine: Engine,
        introspector: &'a EntityIntrospector,
        root: Rc<SchemaDescriptor>,
    ) -> Self {
        Self {
            engine,
            introspector,
            root,
            joins: Vec::new(),
        }
    }

    fn invalid_path(&self, path: &str, reason: impl Into<String>) -> OrmError {
        OrmError::InvalidPath {
            entity: self.root.entity_name.clone(),
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Rewrites a dotted path into an aliased column, adding joins.
    fn resolve_path(&mut self, path: &str) -> Result<String> {
        let segments: Vec<&str> = path.split('.').collect();
        let (column, hops) = segments
            .split_last()
            .ok_or_else(|| self.invalid_path(path, "empty path"))?;

        let mut descriptor = Rc::clone(&self.root);
        let mut alias = ROOT_ALIAS.to_string();
        let mut prefix = String::new();
        for hop in hops {
            let property = descriptor
                .property(hop)
                .ok_or_else(|| self.invalid_path(path, format!("no property '{hop}'")))?;
            let Some(target) = property.referenced_entity.clone() else {
                return Err(self.invalid_path(path, format!("'{hop}' is not a reference")));
            };
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(hop);

            let next = self.introspector.describe(&target)?;
            if next.is_abstract {
                return Err(self.invalid_path(path, format!("'{target}' is abstract")));
            }
            alias = match self.joins.iter().find(|join| join.path == prefix) {
                Some(join) => join.alias.clone(),
                None => {
                    let joined = format!("t{}", self.joins.len() + 1);
                    self.joins.push(Join {
                        path: prefix.clone(),
                        alias: joined.clone(),
                        table: next.table_name.clone(),
                        parent_alias: alias,
                        column: (*hop).to_string(),
                    });
                    joined
                }
            };
            descriptor = next;
        }

        if descriptor.property(column).is_none() {
            return Err(self.invalid_path(path, format!("no property '{column}'")));
        }
        Ok(self.engine.quote_path(&[alias.as_str(), *column]))
    }

    fn is_alias(word: &str) -> bool {
        word.strip_prefix('t')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Rewrites property references in a condition.
    pub(crate) fn condition(&mut self, condition: &str) -> Result<String> {
        let tokens = Lexer::for_engine(condition, self.engine).tokenize();
        let mut out = String::with_capacity(condition.len() + 16);
        for (position, token) in tokens.iter().enumerate() {
            match &token.kind {
                TokenKind::Word(word) if word.contains('.') => {
                    let first = word.split('.').next().unwrap_or_default();
                    if !Self::is_alias(first) && self.root.property(first).is_some() {
                        out.push_str(&self.resolve_path(word)?);
                    } else {
                        out.push_str(token.text(condition));
                    }
                }
                TokenKind::Word(word) if self.root.property(word).is_some() => {
                    let call = tokens[position + 1..]
                        .iter()
                        .find(|t| t.kind != TokenKind::Whitespace)
                        .is_some_and(|t| t.kind == TokenKind::Symbol('('));
                    if call {
                        out.push_str(token.text(condition));
                    } else {
                        out.push_str(&self.engine.quote_path(&[ROOT_ALIAS, word.as_str()]));
                    }
                }
                TokenKind::Backtick(name) if self.root.property(name).is_some() => {
                    out.push_str(&self.engine.quote_path(&[ROOT_ALIAS, name.as_str()]));
                }
                _ => out.push_str(token.text(condition)),
            }
        }
        Ok(out)
    }

    /// Rewrites one `+path` / `-path` sort field into an ORDER BY term.
    pub(crate) fn sort_term(&mut self, field: &str) -> Result<String> {
        let field = field.trim();
        let (direction, path) = if let Some(path) = field.strip_prefix('+') {
            ("ASC", path)
        } else if let Some(path) = field.strip_prefix('-') {
            ("DESC", path)
        } else {
            return Err(OrmError::InvalidSort(field.to_string()));
        };
        if path.is_empty() {
            return Err(OrmError::InvalidSort(field.to_string()));
        }
        let first = path.split('.').next().unwrap_or_default();
        if self.root.property(first).is_none() {
            return Err(OrmError::InvalidSort(field.to_string()));
        }
        Ok(format!("{} {direction}", self.resolve_path(path)?))
    }

    /// Renders the statement. Lazy properties are left out of the
    /// projection.
    pub(crate) fn build(
        &mut self,
        condition: Option<&str>,
        sort: &[String],
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<String> {
        let condition = condition
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| self.condition(c))
            .transpose()?;
        let order = sort
            .iter()
            .map(|field| self.sort_term(field))
            .collect::<Result<Vec<_>>>()?;

        let columns: Vec<String> = self
            .root
            .properties()
            .iter()
            .filter(|p| !p.lazy)
            .map(|p| self.engine.quote_path(&[ROOT_ALIAS, p.name.as_str()]))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            columns.join(", "),
            self.engine.quote_identifier(&self.root.table_name),
            self.engine.quote_identifier(ROOT_ALIAS)
        );
        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                self.engine.quote_identifier(&join.table),
                self.engine.quote_identifier(&join.alias),
                self.engine.quote_path(&[join.alias.as_str(), "id"]),
                self.engine.quote_path(&[join.parent_alias.as_str(), join.column.as_str()])
            ));
        }
        if let Some(condition) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        sql.push_str(&limit_clause(self.engine, limit, offset));
        Ok(sql)
    }
}

fn limit_clause(engine: Engine, limit: Option<usize>, offset: Option<usize>) -> String {
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(limit), None) => format!(" LIMIT {limit}"),
        (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        (None, Some(offset)) => match engine {
            Engine::Sqlite => format!(" LIMIT -1 OFFSET {offset}"),
            Engine::MySql => format!(" LIMIT 18446744073709551615 OFFSET {offset}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storable_core::{EntityDefinition, EntityRegistry, PropertyDeclaration, PropertyType};

    use super::*;

    fn introspector() -> EntityIntrospector {
        let mut registry = EntityRegistry::new();
        registry
            .register_definition(
                EntityDefinition::new("Org")
                    .property(PropertyDeclaration::new("name", PropertyType::String)),
            )
            .register_definition(
                EntityDefinition::new("User")
                    .property(PropertyDeclaration::new("email", PropertyType::String))
                    .property(PropertyDeclaration::new("bio", PropertyType::String).lazy())
                    .property(PropertyDeclaration::new(
                        "org",
                        PropertyType::Reference("Org".into()),
                    )),
            )
            .register_definition(
                EntityDefinition::new("Blog\\Post")
                    .property(PropertyDeclaration::new("title", PropertyType::String))
                    .property(PropertyDeclaration::new(
                        "author",
                        PropertyType::Reference("User".into()),
                    )),
            );
        EntityIntrospector::new(Arc::new(registry))
    }

    fn builder<'a>(introspector: &'a EntityIntrospector, entity: &str) -> SelectBuilder<'a> {
        let root = introspector.describe(entity).unwrap();
        SelectBuilder::new(Engine::Sqlite, introspector, root)
    }

    #[test]
    fn dotted_path_becomes_one_join() {
        let introspector = introspector();
        let mut select = builder(&introspector, "Blog\\Post");
        let sql = select
            .build(Some("author.email = {0} AND title <> ''"), &[], None, None)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"t0\".\"id\", \"t0\".\"title\", \"t0\".\"author\" FROM \"blog_post\" AS \"t0\" \
             LEFT JOIN \"user\" AS \"t1\" ON \"t1\".\"id\" = \"t0\".\"author\" \
             WHERE \"t1\".\"email\" = {0} AND \"t0\".\"title\" <> ''"
        );
    }

    #[test]
    fn shared_prefixes_reuse_aliases() {
        let introspector = introspector();
        let mut select = builder(&introspector, "Blog\\Post");
        let sql = select
            .build(
                Some("author.org.name = 'x' OR author.email IS NULL"),
                &["+author.org.name".to_string()],
                None,
                None,
            )
            .unwrap();
        assert_eq!(sql.matches("LEFT JOIN").count(), 2);
        assert!(sql.contains("LEFT JOIN \"org\" AS \"t2\" ON \"t2\".\"id\" = \"t1\".\"org\""));
        assert!(sql.contains("WHERE \"t2\".\"name\" = 'x' OR \"t1\".\"email\" IS NULL"));
        assert!(sql.ends_with("ORDER BY \"t2\".\"name\" ASC"));
    }

    #[test]
    fn literals_and_functions_are_untouched() {
        let introspector = introspector();
        let mut select = builder(&introspector, "User");
        let condition = select
            .condition("lower(email) = 'email' AND \"email\" <> `email`")
            .unwrap();
        assert_eq!(
            condition,
            "lower(\"t0\".\"email\") = 'email' AND \"email\" <> \"t0\".\"email\""
        );
    }

    #[test]
    fn sqlite_backslash_literal_ends_at_its_quote() {
        let introspector = introspector();
        let mut select = builder(&introspector, "User");
        let condition = select
            .condition(r"email LIKE {0} ESCAPE '\' AND org.name = {1}")
            .unwrap();
        assert_eq!(
            condition,
            r#""t0"."email" LIKE {0} ESCAPE '\' AND "t1"."name" = {1}"#
        );
    }

    #[test]
    fn lazy_properties_are_not_projected() {
        let introspector = introspector();
        let mut select = builder(&introspector, "User");
        let sql = select.build(None, &[], Some(5), Some(10)).unwrap();
        assert!(!sql.contains("bio"));
        assert!(sql.ends_with(" LIMIT 5 OFFSET 10"));
    }

    #[test]
    fn bad_paths_and_sorts_are_usage_errors() {
        let introspector = introspector();
        let mut select = builder(&introspector, "Blog\\Post");
        assert!(matches!(
            select.condition("title.length = 3"),
            Err(OrmError::InvalidPath { .. })
        ));
        assert!(matches!(
            select.condition("author.nickname = 3"),
            Err(OrmError::InvalidPath { .. })
        ));
        assert!(matches!(select.sort_term("title"), Err(OrmError::InvalidSort(_))));
        assert!(matches!(select.sort_term("+"), Err(OrmError::InvalidSort(_))));
        assert!(matches!(select.sort_term("-missing"), Err(OrmError::InvalidSort(_))));
        assert_eq!(select.sort_term("-id").unwrap(), "\"t0\".\"id\" DESC");
    }

    #[test]
    fn offset_without_limit() {
        assert_eq!(limit_clause(Engine::Sqlite, None, Some(3)), " LIMIT -1 OFFSET 3");
        assert_eq!(
            limit_clause(Engine::MySql, None, Some(3)),
            " LIMIT 18446744073709551615 OFFSET 3"
        );
    }
}
