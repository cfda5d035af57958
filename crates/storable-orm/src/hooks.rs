//! Per-entity access checks and lifecycle hooks.

use std::collections::HashMap;

use storable_core::{EntityDefinition, EntityRegistry, EntityType, SchemaDescriptor};

use crate::instance::{EntityRef, Handle};
use crate::session::Session;

/// An entity type known to the store.
///
/// Every method has a permissive default; `#[derive(Entity)]` writes the
/// empty impl unless told `hooks = "manual"`.
pub trait Entity: EntityType + Sized {
    /// Whether `entity` may be returned by a fetch.
    fn is_readable(_entity: &Handle<Self>, _session: &Session) -> bool {
        true
    }

    /// Whether `entity` may be stored without `force`.
    fn is_editable(_entity: &Handle<Self>, _session: &Session) -> bool {
        true
    }

    /// Whether `entity` may be deleted without `force`.
    fn is_deletable(_entity: &Handle<Self>, _session: &Session) -> bool {
        true
    }

    /// Called after every successful store.
    fn on_stored(_entity: &Handle<Self>, _session: &Session) {}

    /// Called after a successful delete. The handle no longer has an id.
    fn on_deleted(_entity: &Handle<Self>, _session: &Session) {}
}

type Check = fn(&EntityRef, &Session) -> bool;
type Notify = fn(&EntityRef, &Session);

/// Type-erased [`Entity`] hooks.
#[derive(Clone, Copy)]
pub(crate) struct HookTable {
    pub(crate) readable: Check,
    pub(crate) editable: Check,
    pub(crate) deletable: Check,
    pub(crate) stored: Notify,
    pub(crate) deleted: Notify,
}

impl HookTable {
    fn of<T: Entity>() -> Self {
        Self {
            readable: readable::<T>,
            editable: editable::<T>,
            deletable: deletable::<T>,
            stored: stored::<T>,
            deleted: deleted::<T>,
        }
    }

    /// Hooks of entities registered without a Rust type.
    pub(crate) fn permissive() -> Self {
        Self {
            readable: allow,
            editable: allow,
            deletable: allow,
            stored: ignore,
            deleted: ignore,
        }
    }
}

fn allow(_: &EntityRef, _: &Session) -> bool {
    true
}

fn ignore(_: &EntityRef, _: &Session) {}

fn readable<T: Entity>(entity: &EntityRef, session: &Session) -> bool {
    Handle::<T>::try_from_ref(entity.clone()).map_or(true, |h| T::is_readable(&h, session))
}

fn editable<T: Entity>(entity: &EntityRef, session: &Session) -> bool {
    Handle::<T>::try_from_ref(entity.clone()).map_or(true, |h| T::is_editable(&h, session))
}

fn deletable<T: Entity>(entity: &EntityRef, session: &Session) -> bool {
    Handle::<T>::try_from_ref(entity.clone()).map_or(true, |h| T::is_deletable(&h, session))
}

// A deleted instance has lost the id but keeps its type, so the cast holds.
fn stored<T: Entity>(entity: &EntityRef, session: &Session) {
    if let Some(handle) = Handle::<T>::try_from_ref(entity.clone()) {
        T::on_stored(&handle, session);
    }
}

fn deleted<T: Entity>(entity: &EntityRef, session: &Session) {
    if let Some(handle) = Handle::<T>::try_from_ref(entity.clone()) {
        T::on_deleted(&handle, session);
    }
}

/// The entities of one application, with their hooks.
///
/// ```
/// use storable_orm::{Catalog, EntityDefinition, PropertyDeclaration, PropertyType};
///
/// let mut catalog = Catalog::new();
/// catalog.register_definition(
///     EntityDefinition::new("Tag").property(PropertyDeclaration::new("label", PropertyType::String)),
/// );
/// assert!(catalog.registry().contains("Tag"));
/// ```
pub struct Catalog {
    registry: EntityRegistry,
    hooks: HashMap<String, HookTable>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Creates an empty catalog with the default reserved prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::from_registry(EntityRegistry::new())
    }

    /// Creates an empty catalog with a custom reserved prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::from_registry(EntityRegistry::with_prefix(prefix))
    }

    /// Wraps an existing registry. Its entities get permissive hooks.
    #[must_use]
    pub fn from_registry(registry: EntityRegistry) -> Self {
        Self {
            registry,
            hooks: HashMap::new(),
        }
    }

    /// Registers `T` along with its hooks.
    pub fn register<T: Entity>(&mut self) -> &mut Self {
        self.registry.register::<T>();
        self.hooks.insert(T::NAME.to_string(), HookTable::of::<T>());
        self
    }

    /// Registers an entity that has no Rust type.
    pub fn register_definition(&mut self, definition: EntityDefinition) -> &mut Self {
        self.registry.register_definition(definition);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub(crate) fn into_parts(self) -> (EntityRegistry, HashMap<String, HookTable>) {
        (self.registry, self.hooks)
    }
}

/// Finds the hooks of `descriptor`, falling back to the nearest typed
/// ancestor.
pub(crate) fn hooks_for(
    hooks: &HashMap<String, HookTable>,
    descriptor: &SchemaDescriptor,
) -> HookTable {
    if let Some(table) = hooks.get(&descriptor.entity_name) {
        return *table;
    }
    descriptor
        .parent_descriptors()
        .iter()
        .rev()
        .find_map(|parent| hooks.get(&parent.entity_name).copied())
        .unwrap_or_else(HookTable::permissive)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn marker(_: &EntityRef, _: &Session) -> bool {
        false
    }

    #[test]
    fn hooks_fall_back_to_the_nearest_ancestor() {
        let mut table = HookTable::permissive();
        table.readable = marker;
        let hooks = HashMap::from([("Content".to_string(), table)]);

        let content = Rc::new(SchemaDescriptor::new("Content"));
        let mut post = SchemaDescriptor::new("Post");
        post.set_parent_descriptors(vec![content]);

        let found = hooks_for(&hooks, &post);
        assert!(found.readable as usize == marker as usize);

        let other = SchemaDescriptor::new("Tag");
        let found = hooks_for(&hooks, &other);
        assert!(found.readable as usize == allow as usize);
    }
}
