//! Declarative entity registration.
//!
//! Each entity type describes itself with an [`EntityDefinition`]: name,
//! parent, declared properties and indexes, plus an optional hook that
//! adjusts the derived [`SchemaDescriptor`]. Definitions are collected in an
//! [`EntityRegistry`] and turned into descriptors by
//! [`crate::EntityIntrospector`].

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::schema::{IndexDescriptor, IndexKind, PropertyDescriptor, SchemaDescriptor};
use crate::value::SqlValue;

/// Default prefix of framework-managed tables.
pub const DEFAULT_RESERVED_PREFIX: &str = "storable_";

/// A statically known entity type.
pub trait EntityType: 'static {
    /// Fully-qualified entity name.
    const NAME: &'static str;

    /// Returns the declaration of this entity.
    fn definition() -> EntityDefinition;
}

/// A column type that maps itself to the database.
pub trait CustomColumn: Sized + Clone + 'static {
    /// Name reported as the property's internal type.
    const TYPE_NAME: &'static str;

    /// Adjusts the column description.
    fn setup_column(property: &mut PropertyDescriptor);

    /// Converts the value for storage.
    fn to_sql_value(&self) -> SqlValue;

    /// Converts a stored value back.
    fn from_sql_value(value: &SqlValue) -> Result<Self>;
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn stored_text(value: &SqlValue) -> Result<String> {
    value
        .to_text()
        .ok_or_else(|| Error::Decode("expected a temporal value, found NULL".to_string()))
}

impl CustomColumn for NaiveDateTime {
    const TYPE_NAME: &'static str = "datetime";

    fn setup_column(property: &mut PropertyDescriptor) {
        property.database_type = "DATETIME".to_string();
        property.length = None;
    }

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Text(self.format(DATETIME_FORMAT).to_string())
    }

    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        let text = stored_text(value)?;
        NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%dT%H:%M:%S%.f"))
            .map_err(|e| Error::Decode(format!("invalid datetime '{text}': {e}")))
    }
}

impl CustomColumn for NaiveDate {
    const TYPE_NAME: &'static str = "date";

    fn setup_column(property: &mut PropertyDescriptor) {
        property.database_type = "DATE".to_string();
        property.length = None;
    }

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Text(self.format(DATE_FORMAT).to_string())
    }

    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        let text = stored_text(value)?;
        let date = text.trim().get(..10).unwrap_or(text.trim());
        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|e| Error::Decode(format!("invalid date '{text}': {e}")))
    }
}

/// A custom column type, erased for storage in a definition.
#[derive(Debug, Clone, Copy)]
pub struct CustomType {
    /// Type name.
    pub type_name: &'static str,
    /// Column setup hook.
    pub setup: fn(&mut PropertyDescriptor),
}

impl PartialEq for CustomType {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl Eq for CustomType {}

impl CustomType {
    /// Erases `T`.
    #[must_use]
    pub fn of<T: CustomColumn>() -> Self {
        Self {
            type_name: T::TYPE_NAME,
            setup: T::setup_column,
        }
    }
}

/// The declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    /// `bool`
    Bool,
    /// Any integer.
    Int,
    /// `f64`
    Float,
    /// `String`
    String,
    /// JSON value.
    Mixed,
    /// Reference to the named entity.
    Reference(String),
    /// Array of another type. Never storable directly.
    Array(Box<PropertyType>),
    /// Type implementing [`CustomColumn`].
    Custom(CustomType),
    /// A type name that has no column mapping.
    Unsupported(String),
    /// No type was declared.
    Untyped,
}

/// One declared property of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDeclaration {
    /// Property name.
    pub name: String,
    /// Declared type.
    pub ty: PropertyType,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Length override.
    pub length: Option<u32>,
    /// Decimals override.
    pub decimals: Option<u32>,
    /// Column comment.
    pub comment: Option<String>,
    /// Unsigned modifier.
    pub unsigned: bool,
    /// Leave out of the default projection.
    pub lazy: bool,
    /// Prefetch switch for references.
    pub prefetch: Option<bool>,
    /// Prefetch batch limit for references.
    pub prefetch_limit: Option<usize>,
    /// Single-column index on this property.
    pub index: Option<IndexKind>,
}

impl PropertyDeclaration {
    /// Declares a nullable property.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            length: None,
            decimals: None,
            comment: None,
            unsigned: false,
            lazy: false,
            prefetch: None,
            prefetch_limit: None,
            index: None,
        }
    }

    /// Sets the property as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the nullability.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Overrides the length.
    #[must_use]
    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Overrides the decimals.
    #[must_use]
    pub fn decimals(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets the column as unsigned.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Marks the property as lazy.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Turns prefetching of this reference on or off.
    #[must_use]
    pub fn prefetch(mut self, enabled: bool) -> Self {
        self.prefetch = Some(enabled);
        self
    }

    /// Sets the prefetch batch limit.
    #[must_use]
    pub fn prefetch_limit(mut self, limit: usize) -> Self {
        self.prefetch_limit = Some(limit);
        self
    }

    /// Adds a single-column index named after the property.
    #[must_use]
    pub fn indexed(mut self, kind: IndexKind) -> Self {
        self.index = Some(kind);
        self
    }
}

/// Everything the introspector needs to know about one entity.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    /// Fully-qualified entity name.
    pub name: String,
    /// Parent entity name.
    pub parent: Option<String>,
    /// Abstract entities have no table.
    pub is_abstract: bool,
    /// Own declared properties, in order.
    pub properties: Vec<PropertyDeclaration>,
    /// Multi-column or explicitly named indexes.
    pub indexes: Vec<IndexDescriptor>,
    /// Runs last on the derived descriptor.
    pub customize: Option<fn(&mut SchemaDescriptor)>,
}

impl EntityDefinition {
    /// Starts a concrete entity definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            is_abstract: false,
            properties: Vec::new(),
            indexes: Vec::new(),
            customize: None,
        }
    }

    /// Sets the parent entity.
    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Marks the entity as abstract.
    #[must_use]
    pub fn abstract_entity(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, property: PropertyDeclaration) -> Self {
        self.properties.push(property);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets the descriptor override hook.
    #[must_use]
    pub fn customize(mut self, hook: fn(&mut SchemaDescriptor)) -> Self {
        self.customize = Some(hook);
        self
    }
}

/// All entities known to one application.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    prefix: String,
    definitions: Vec<EntityDefinition>,
    by_name: HashMap<String, usize>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    /// Creates an empty registry with the default reserved prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_RESERVED_PREFIX)
    }

    /// Creates an empty registry with a custom reserved prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            definitions: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Returns the reserved table prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registers `T`.
    pub fn register<T: EntityType>(&mut self) -> &mut Self {
        self.register_definition(T::definition())
    }

    /// Registers a definition, replacing one with the same name.
    pub fn register_definition(&mut self, definition: EntityDefinition) -> &mut Self {
        match self.by_name.get(&definition.name) {
            Some(&position) => self.definitions[position] = definition,
            None => {
                self.by_name
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
        self
    }

    /// Returns the definition named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntityDefinition> {
        self.by_name.get(name).map(|&position| &self.definitions[position])
    }

    /// Returns the definition named `name` or an unknown-entity error.
    pub fn require(&self, name: &str) -> Result<&EntityDefinition> {
        self.get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterates over definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.definitions.iter()
    }

    /// Returns the registered entity names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }
}
