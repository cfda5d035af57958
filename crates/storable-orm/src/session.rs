//! The unit of work: connections, identity cache and property access.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use storable_core::reserved::read_entity_lineage;
use storable_core::{
    EntityIntrospector, EntityRegistry, Params, PropertyDescriptor, Row, SchemaDescriptor,
    SqlConnection, SqlValue,
};
use tracing::{debug, trace};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::error::{OrmError, Result};
use crate::hooks::{hooks_for, Catalog, Entity, HookTable};
use crate::instance::{EntityRef, EntityState, Handle};
use crate::query::{Fetch, Query, SelectBuilder};
use crate::value::{coerce, validate, FieldValue, PropertyValue};

/// Connection id used when none is given.
pub const DEFAULT_CONNECTION: &str = "default";

/// Session-wide switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Batch reference loading; per-property settings apply on top.
    pub prefetch: bool,
    /// Connection used when a fetch or a new instance names none.
    pub default_connection: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prefetch: true,
            default_connection: DEFAULT_CONNECTION.to_string(),
        }
    }
}

type CacheKey = (String, i64);
type Lineage = Rc<BTreeMap<String, Vec<String>>>;

/// Owns connections and the identity cache for one unit of work.
///
/// Every instance fetched through a session is cached by connection and
/// id, so fetching the same row twice yields the same shared instance.
/// Sessions are single-threaded.
pub struct Session {
    introspector: EntityIntrospector,
    hooks: HashMap<String, HookTable>,
    connections: BTreeMap<String, Box<dyn SqlConnection>>,
    options: SessionOptions,
    cache: RefCell<BTreeMap<CacheKey, EntityRef>>,
    lineage: RefCell<HashMap<String, Lineage>>,
    audit: Option<Box<dyn AuditSink>>,
}

impl Session {
    /// Opens a session over `catalog` with one default connection.
    #[must_use]
    pub fn new(catalog: Catalog, connection: Box<dyn SqlConnection>) -> Self {
        Self::with_options(catalog, connection, SessionOptions::default())
    }

    /// Opens a session with explicit options.
    #[must_use]
    pub fn with_options(
        catalog: Catalog,
        connection: Box<dyn SqlConnection>,
        options: SessionOptions,
    ) -> Self {
        let (registry, hooks) = catalog.into_parts();
        let mut connections = BTreeMap::new();
        connections.insert(options.default_connection.clone(), connection);
        Self {
            introspector: EntityIntrospector::new(Arc::new(registry)),
            hooks,
            connections,
            options,
            cache: RefCell::new(BTreeMap::new()),
            lineage: RefCell::new(HashMap::new()),
            audit: None,
        }
    }

    /// Registers another connection under `id`.
    pub fn add_connection(&mut self, id: impl Into<String>, connection: Box<dyn SqlConnection>) {
        self.connections.insert(id.into(), connection);
    }

    /// Sends audit events to `sink`.
    pub fn set_audit_sink(&mut self, sink: impl AuditSink + 'static) {
        self.audit = Some(Box::new(sink));
    }

    /// Logs audit events through `tracing`.
    pub fn enable_audit(&mut self) {
        self.set_audit_sink(TracingAuditSink);
    }

    /// Returns the session options.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns the entity registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        self.introspector.registry()
    }

    /// Describes the entity named `name`.
    pub fn describe(&self, name: &str) -> Result<Rc<SchemaDescriptor>> {
        Ok(self.introspector.describe(name)?)
    }

    /// Returns the connection registered as `id`, or the default one.
    pub fn connection(&self, id: Option<&str>) -> Result<&dyn SqlConnection> {
        let id = id.unwrap_or(self.options.default_connection.as_str());
        self.connections
            .get(id)
            .map(|conn| &**conn)
            .ok_or_else(|| OrmError::UnknownConnection(id.to_string()))
    }

    pub(crate) fn introspector(&self) -> &EntityIntrospector {
        &self.introspector
    }

    pub(crate) fn hooks(&self, entity: &EntityRef) -> HookTable {
        let descriptor = Rc::clone(entity.state().descriptor());
        hooks_for(&self.hooks, &descriptor)
    }

    pub(crate) fn audit_sink(&self) -> Option<&dyn AuditSink> {
        self.audit.as_deref()
    }

    /// Forgets every cached instance.
    ///
    /// Handles held by the caller stay valid but are no longer returned by
    /// fetches; the next fetch builds fresh instances.
    pub fn clear_cache(&self) {
        let cached = std::mem::take(&mut *self.cache.borrow_mut());
        for entity in cached.values() {
            entity.release();
        }
        self.lineage.borrow_mut().clear();
    }

    pub(crate) fn cache_insert(&self, entity: &EntityRef) {
        let key = {
            let state = entity.state();
            state.id().map(|id| (state.connection().to_string(), id))
        };
        if let Some(key) = key {
            self.cache.borrow_mut().insert(key, entity.clone());
        }
    }

    pub(crate) fn cache_remove(&self, connection: &str, id: i64) {
        self.cache
            .borrow_mut()
            .remove(&(connection.to_string(), id));
    }

    fn cached(&self, connection: &str, id: i64) -> Option<EntityRef> {
        self.cache
            .borrow()
            .get(&(connection.to_string(), id))
            .cloned()
    }

    /// Creates a transient instance of `T` on the default connection.
    pub fn create<T: Entity>(&self) -> Result<Handle<T>> {
        Ok(Handle::from_ref(self.create_entity(T::NAME, None)?))
    }

    /// Creates a transient instance of the entity named `name`.
    pub fn create_entity(&self, name: &str, connection: Option<&str>) -> Result<EntityRef> {
        let descriptor = self.describe(name)?;
        if descriptor.is_abstract {
            return Err(OrmError::AbstractEntity(name.to_string()));
        }
        let connection = connection.unwrap_or(self.options.default_connection.as_str());
        self.connection(Some(connection))?;
        Ok(EntityRef::new(EntityState::new(descriptor, connection)))
    }

    /// Fetches one `T` (or subtype instance) by id.
    pub fn get_by_id<T: Entity>(&self, id: i64, fetch: Fetch) -> Result<Option<Handle<T>>> {
        Ok(self
            .get_entity_by_id(T::NAME, id, &fetch)?
            .map(Handle::from_ref))
    }

    /// Fetches several `T` by id, in input order.
    pub fn get_by_ids<T: Entity>(&self, ids: &[i64], fetch: Fetch) -> Result<Vec<Handle<T>>> {
        Ok(self
            .get_entities_by_ids(T::NAME, ids, &fetch)?
            .into_iter()
            .map(Handle::from_ref)
            .collect())
    }

    /// Fetches every `T` matching `query`.
    pub fn get_by_condition<T: Entity>(&self, query: &Query) -> Result<Vec<Handle<T>>> {
        Ok(self
            .get_entities_by_condition(T::NAME, query)?
            .into_iter()
            .map(Handle::from_ref)
            .collect())
    }

    /// Untyped [`Session::get_by_id`].
    pub fn get_entity_by_id(&self, name: &str, id: i64, fetch: &Fetch) -> Result<Option<EntityRef>> {
        Ok(self.get_entities_by_ids(name, &[id], fetch)?.into_iter().next())
    }

    /// Untyped [`Session::get_by_ids`].
    ///
    /// Non-positive and unknown ids are dropped, duplicates collapse to the
    /// first occurrence. Only ids missing from the cache are queried.
    pub fn get_entities_by_ids(
        &self,
        name: &str,
        ids: &[i64],
        fetch: &Fetch,
    ) -> Result<Vec<EntityRef>> {
        let mut seen = HashSet::new();
        let ids: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|&id| id > 0 && seen.insert(id))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let connection = fetch
            .connection
            .clone()
            .unwrap_or_else(|| self.options.default_connection.clone());
        let missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|&id| self.cached(&connection, id).is_none())
            .collect();
        if !missing.is_empty() {
            let list: Vec<String> = missing.iter().map(ToString::to_string).collect();
            let query = Query::new()
                .filter(format!("id IN ({})", list.join(", ")))
                .fetch(Fetch {
                    connection: Some(connection.clone()),
                    include_subtypes: fetch.include_subtypes,
                    readable_only: false,
                });
            self.select(name, &query)?;
        }

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(entity) = self.cached(&connection, id) else {
                continue;
            };
            if !entity.state().is_a(name) {
                continue;
            }
            if fetch.readable_only && !self.is_readable(&entity) {
                continue;
            }
            found.push(entity);
        }
        Ok(found)
    }

    /// Untyped [`Session::get_by_condition`].
    pub fn get_entities_by_condition(&self, name: &str, query: &Query) -> Result<Vec<EntityRef>> {
        let found = self.select(name, query)?;
        if !query.fetch.readable_only {
            return Ok(found);
        }
        Ok(found
            .into_iter()
            .filter(|entity| self.is_readable(entity))
            .collect())
    }

    fn is_readable(&self, entity: &EntityRef) -> bool {
        (self.hooks(entity).readable)(entity, self)
    }

    /// Concrete types a fetch of `name` covers.
    fn concrete_types(&self, name: &str, connection: &str, subtypes: bool) -> Result<Vec<String>> {
        let descriptor = self.describe(name)?;
        if !descriptor.is_abstract && !subtypes {
            return Ok(vec![name.to_string()]);
        }

        let lineage = self.lineage(connection)?;
        let mut types = Vec::new();
        if !descriptor.is_abstract {
            types.push(name.to_string());
        }
        for (entity, parents) in lineage.iter() {
            if !parents.iter().any(|parent| parent == name) {
                continue;
            }
            if self.registry().contains(entity) {
                types.push(entity.clone());
            } else {
                debug!(entity = %entity, "skipping unregistered entity from metadata");
            }
        }
        Ok(types)
    }

    fn lineage(&self, connection: &str) -> Result<Lineage> {
        if let Some(lineage) = self.lineage.borrow().get(connection) {
            return Ok(Rc::clone(lineage));
        }
        let conn = self.connection(Some(connection))?;
        let lineage = Rc::new(read_entity_lineage(conn, self.registry().prefix())?);
        self.lineage
            .borrow_mut()
            .insert(connection.to_string(), Rc::clone(&lineage));
        Ok(lineage)
    }

    /// Runs `query` over every concrete type of `name`, without the
    /// readability filter.
    fn select(&self, name: &str, query: &Query) -> Result<Vec<EntityRef>> {
        let connection = query
            .fetch
            .connection
            .as_deref()
            .unwrap_or(self.options.default_connection.as_str());
        let conn = self.connection(Some(connection))?;
        let types = self.concrete_types(name, connection, query.fetch.include_subtypes)?;

        let mut found = Vec::new();
        for entity in &types {
            let descriptor = self.describe(entity)?;
            let sql = SelectBuilder::new(conn.engine(), &self.introspector, Rc::clone(&descriptor))
                .build(
                    query.condition.as_deref(),
                    &query.sort,
                    query.limit,
                    query.offset,
                )?;
            debug!(entity = %entity, sql = %sql, "fetching");
            for row in conn.fetch_assoc(&sql, &query.params, None)? {
                found.push(self.hydrate(&descriptor, connection, &row)?);
            }
        }
        if types.len() > 1 {
            if let Some(limit) = query.limit {
                found.truncate(limit);
            }
        }
        Ok(found)
    }

    /// Returns the cached instance for `row`, or builds and caches one.
    fn hydrate(
        &self,
        descriptor: &Rc<SchemaDescriptor>,
        connection: &str,
        row: &Row,
    ) -> Result<EntityRef> {
        let id = row.get("id").and_then(SqlValue::as_i64).ok_or_else(|| {
            storable_core::Error::Decode(format!("row of '{}' has no id", descriptor.entity_name))
        })?;
        if let Some(cached) = self.cached(connection, id) {
            return Ok(cached);
        }

        let mut state = EntityState::new(Rc::clone(descriptor), connection);
        state.id = Some(id);
        for (column, value) in row.iter() {
            if column != "id" && descriptor.property(column).is_some() {
                state.db_values.insert(column.to_string(), value.clone());
            }
        }
        let entity = EntityRef::new(state);
        self.cache_insert(&entity);
        trace!(entity = %descriptor.entity_name, id, "cached instance");
        Ok(entity)
    }

    /// Reads a property of `entity` as `V`.
    pub fn get<T: Entity, V: FieldValue>(&self, entity: &Handle<T>, property: &str) -> Result<V> {
        let value = self.get_value(entity.entity_ref(), property)?;
        let found = value.type_name();
        V::from_value(value).ok_or_else(|| OrmError::TypeMismatch {
            entity: entity.entity_name(),
            property: property.to_string(),
            expected: V::type_name().to_string(),
            found: found.to_string(),
        })
    }

    /// Sets a property of `entity`.
    pub fn set<T: Entity, V: FieldValue>(
        &self,
        entity: &Handle<T>,
        property: &str,
        value: V,
    ) -> Result<()> {
        self.set_value(entity.entity_ref(), property, value.into_value())
    }

    fn property(&self, entity: &EntityRef, name: &str) -> Result<(Rc<SchemaDescriptor>, usize)> {
        let descriptor = Rc::clone(entity.state().descriptor());
        let position = descriptor
            .properties()
            .iter()
            .position(|p| p.name == name && name != "id")
            .ok_or_else(|| OrmError::UnknownProperty {
                entity: descriptor.entity_name.clone(),
                property: name.to_string(),
            })?;
        Ok((descriptor, position))
    }

    /// Reads a property, resolving references and lazy columns on first
    /// access. `id` reads as an integer (or null before the first store).
    pub fn get_value(&self, entity: &EntityRef, property: &str) -> Result<PropertyValue> {
        if property == "id" {
            return Ok(entity.id().map_or(PropertyValue::Null, PropertyValue::Int));
        }
        let (descriptor, position) = self.property(entity, property)?;
        let declared = &descriptor.properties()[position];

        if let Some(value) = entity.state().values.get(property) {
            return Ok(value.clone());
        }

        let raw = entity.state().db_values.get(property).cloned();
        let raw = match raw {
            Some(raw) => raw,
            None if declared.lazy && entity.id().is_some() => self.load_lazy(entity, declared)?,
            None => return Ok(PropertyValue::Null),
        };

        let value = if declared.is_reference() {
            match raw.as_i64() {
                Some(id) if id > 0 => self.resolve_reference(entity, declared, id)?,
                _ => PropertyValue::Null,
            }
        } else {
            coerce(declared, &raw).map_err(|err| match err {
                OrmError::TypeMismatch {
                    property,
                    expected,
                    found,
                    ..
                } => OrmError::TypeMismatch {
                    entity: descriptor.entity_name.clone(),
                    property,
                    expected,
                    found,
                },
                other => other,
            })?
        };
        entity
            .state_mut()
            .values
            .insert(property.to_string(), value.clone());
        Ok(value)
    }

    /// Sets a property after checking the value against its declared type.
    pub fn set_value(&self, entity: &EntityRef, property: &str, value: PropertyValue) -> Result<()> {
        let (descriptor, position) = self.property(entity, property)?;
        let value = validate(
            &descriptor.entity_name,
            &descriptor.properties()[position],
            value,
        )?;
        let mut state = entity.state_mut();
        state.values.insert(property.to_string(), value);
        state.modified.insert(property.to_string());
        Ok(())
    }

    pub(crate) fn load_lazy(
        &self,
        entity: &EntityRef,
        property: &PropertyDescriptor,
    ) -> Result<SqlValue> {
        let (connection, table, id) = {
            let state = entity.state();
            (
                state.connection().to_string(),
                state.descriptor().table_name.clone(),
                state.id(),
            )
        };
        let conn = self.connection(Some(&connection))?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {{0}}",
            conn.quote_identifier(&[property.name.as_str()]),
            conn.quote_identifier(&[table.as_str()]),
            conn.quote_identifier(&["id"])
        );
        let raw = conn
            .fetch_one(&sql, &Params::positional(id))?
            .unwrap_or(SqlValue::Null);
        entity
            .state_mut()
            .db_values
            .insert(property.name.clone(), raw.clone());
        Ok(raw)
    }

    /// Resolves reference `property` of `entity`, batching the load with
    /// other cached instances of the same runtime type when prefetch is on.
    fn resolve_reference(
        &self,
        entity: &EntityRef,
        property: &PropertyDescriptor,
        id: i64,
    ) -> Result<PropertyValue> {
        let target = property.referenced_entity.as_deref().unwrap_or_default();
        let (connection, runtime) = {
            let state = entity.state();
            (state.connection().to_string(), state.entity_name().to_string())
        };
        let fetch = Fetch::new().on(connection.clone());

        let mut ids = vec![id];
        let mut holders: Vec<(EntityRef, i64)> = Vec::new();
        if self.options.prefetch && property.prefetch_enabled {
            let limit = property.prefetch_batch_limit.max(1);
            for other in self.cache.borrow().values() {
                if ids.len() >= limit {
                    break;
                }
                if other.ptr_eq(entity) {
                    continue;
                }
                let state = other.state();
                if state.connection() != connection
                    || state.entity_name() != runtime
                    || state.values.contains_key(&property.name)
                {
                    continue;
                }
                if let Some(raw) = state.db_values.get(&property.name).and_then(SqlValue::as_i64) {
                    if raw > 0 {
                        ids.push(raw);
                        holders.push((other.clone(), raw));
                    }
                }
            }
        }
        if ids.len() > 1 {
            debug!(
                entity = %runtime,
                property = %property.name,
                count = ids.len(),
                "prefetching references"
            );
        }

        let found: HashMap<i64, EntityRef> = self
            .get_entities_by_ids(target, &ids, &fetch)?
            .into_iter()
            .filter_map(|e| e.id().map(|id| (id, e)))
            .collect();
        for (holder, raw) in holders {
            if let Some(resolved) = found.get(&raw) {
                holder
                    .state_mut()
                    .values
                    .insert(property.name.clone(), PropertyValue::Entity(resolved.clone()));
            }
        }
        Ok(found
            .get(&id)
            .map_or(PropertyValue::Null, |e| PropertyValue::Entity(e.clone())))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for entity in self.cache.get_mut().values() {
            entity.release();
        }
    }
}
