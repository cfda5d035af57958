//! In-memory entity instances.
//!
//! An instance is shared: the session's identity cache and every handle the
//! caller holds point at the same [`EntityState`], so a change made through
//! one handle is visible through all of them.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use storable_core::{EntityType, SchemaDescriptor, SqlValue};

use crate::value::PropertyValue;

/// Per-instance state.
#[derive(Debug)]
pub struct EntityState {
    pub(crate) descriptor: Rc<SchemaDescriptor>,
    pub(crate) connection: String,
    pub(crate) id: Option<i64>,
    /// Raw values as last read or written; absent for unloaded lazy
    /// properties. Kept after a delete so the instance can be stored again.
    pub(crate) db_values: HashMap<String, SqlValue>,
    /// Resolved values; absent until first read or set.
    pub(crate) values: HashMap<String, PropertyValue>,
    pub(crate) modified: BTreeSet<String>,
}

impl EntityState {
    pub(crate) fn new(descriptor: Rc<SchemaDescriptor>, connection: impl Into<String>) -> Self {
        Self {
            descriptor,
            connection: connection.into(),
            id: None,
            db_values: HashMap::new(),
            values: HashMap::new(),
            modified: BTreeSet::new(),
        }
    }

    /// Returns the runtime entity name.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.descriptor.entity_name
    }

    /// Returns the descriptor of the runtime type.
    #[must_use]
    pub fn descriptor(&self) -> &Rc<SchemaDescriptor> {
        &self.descriptor
    }

    /// Returns the connection the instance belongs to.
    #[must_use]
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Returns the id, once stored.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Returns the properties changed since the last store.
    #[must_use]
    pub fn modified(&self) -> &BTreeSet<String> {
        &self.modified
    }

    /// Returns the raw value of `property` as last read or written.
    #[must_use]
    pub fn db_value(&self, property: &str) -> Option<&SqlValue> {
        self.db_values.get(property)
    }

    /// Returns true if the runtime type is `entity` or inherits from it.
    #[must_use]
    pub fn is_a(&self, entity: &str) -> bool {
        self.descriptor.entity_name == entity
            || self
                .descriptor
                .parent_descriptors()
                .iter()
                .any(|parent| parent.entity_name == entity)
    }

    /// `Entity#id` or `Entity (new)`, for messages.
    pub(crate) fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{}#{id}", self.entity_name()),
            None => format!("{} (new)", self.entity_name()),
        }
    }
}

/// A shared, untyped entity instance.
#[derive(Clone)]
pub struct EntityRef(Rc<RefCell<EntityState>>);

impl EntityRef {
    pub(crate) fn new(state: EntityState) -> Self {
        Self(Rc::new(RefCell::new(state)))
    }

    /// Borrows the state.
    ///
    /// # Panics
    ///
    /// Panics if the state is mutably borrowed, which the session never
    /// leaves behind between calls.
    #[must_use]
    pub fn state(&self) -> Ref<'_, EntityState> {
        self.0.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, EntityState> {
        self.0.borrow_mut()
    }

    /// Returns the id, once stored.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.state().id
    }

    /// Returns the runtime entity name.
    #[must_use]
    pub fn entity_name(&self) -> String {
        self.state().entity_name().to_string()
    }

    /// Returns true if both refer to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Drops resolved values so instances referencing each other can be
    /// freed.
    pub(crate) fn release(&self) {
        if let Ok(mut state) = self.0.try_borrow_mut() {
            state.values.clear();
        }
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may point back at this instance; print the label only.
        match self.0.try_borrow() {
            Ok(state) => write!(f, "EntityRef({})", state.label()),
            Err(_) => f.write_str("EntityRef(<borrowed>)"),
        }
    }
}

/// A typed handle on an instance of `T` or of one of its subtypes.
pub struct Handle<T> {
    inner: EntityRef,
    _marker: PhantomData<T>,
}

impl<T> Handle<T> {
    pub(crate) fn from_ref(inner: EntityRef) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped instance.
    #[must_use]
    pub fn entity_ref(&self) -> &EntityRef {
        &self.inner
    }

    /// Consumes the handle, returning the untyped instance.
    #[must_use]
    pub fn into_entity_ref(self) -> EntityRef {
        self.inner
    }

    /// Returns the id, once stored.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.inner.id()
    }

    /// Returns true once the instance has an id.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.id().is_some()
    }

    /// Returns the runtime entity name, which may be a subtype of `T`.
    #[must_use]
    pub fn entity_name(&self) -> String {
        self.inner.entity_name()
    }

    /// Returns true if both handles point at the same instance.
    #[must_use]
    pub fn is_same<U>(&self, other: &Handle<U>) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// Reinterprets the handle as `U` if the runtime type is `U` or a subtype.
    #[must_use]
    pub fn cast<U: EntityType>(&self) -> Option<Handle<U>> {
        self.inner
            .state()
            .is_a(U::NAME)
            .then(|| Handle::from_ref(self.inner.clone()))
    }
}

impl<T: EntityType> Handle<T> {
    /// Wraps `entity` if its runtime type is `T` or a subtype.
    #[must_use]
    pub fn try_from_ref(entity: EntityRef) -> Option<Self> {
        let matches = entity.state().is_a(T::NAME);
        matches.then(|| Self::from_ref(entity))
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self::from_ref(self.inner.clone())
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T> AsRef<EntityRef> for Handle<T> {
    fn as_ref(&self) -> &EntityRef {
        &self.inner
    }
}

impl AsRef<EntityRef> for EntityRef {
    fn as_ref(&self) -> &EntityRef {
        self
    }
}
