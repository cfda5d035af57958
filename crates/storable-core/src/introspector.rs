//! Turns entity definitions into schema descriptors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use crate::entity::{EntityDefinition, EntityRegistry, PropertyDeclaration, PropertyType};
use crate::error::{Error, Result};
use crate::schema::{IndexDescriptor, InternalType, PropertyDescriptor, SchemaDescriptor};

/// Builds and memoizes [`SchemaDescriptor`]s for registered entities.
///
/// One introspector lives as long as a session or a sync run; the schema is
/// assumed not to change while it is alive.
#[derive(Debug)]
pub struct EntityIntrospector {
    registry: Arc<EntityRegistry>,
    cache: RefCell<HashMap<String, Rc<SchemaDescriptor>>>,
    in_progress: RefCell<Vec<String>>,
}

impl EntityIntrospector {
    /// Creates an introspector over `registry`.
    #[must_use]
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            registry,
            cache: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(Vec::new()),
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Describes the entity named `name`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownEntity`] if `name` is not registered, and
    /// [`Error::Configuration`] for declarations that cannot be stored.
    pub fn describe(&self, name: &str) -> Result<Rc<SchemaDescriptor>> {
        if let Some(descriptor) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(descriptor));
        }
        if self.in_progress.borrow().iter().any(|n| n == name) {
            return Err(Error::configuration(name, "inheritance cycle"));
        }

        self.in_progress.borrow_mut().push(name.to_string());
        let built = self.build(name);
        self.in_progress.borrow_mut().retain(|n| n != name);

        let descriptor = Rc::new(built?);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Describes every registered entity, in registration order.
    pub fn describe_all(&self) -> Result<Vec<Rc<SchemaDescriptor>>> {
        self.registry
            .names()
            .into_iter()
            .map(|name| self.describe(name))
            .collect()
    }

    /// Returns the names of all registered entities whose lineage contains
    /// `ancestor`, concrete ones only.
    pub fn concrete_descendants(&self, ancestor: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for descriptor in self.describe_all()? {
            if !descriptor.is_abstract && descriptor.lineage().iter().any(|n| n == ancestor) {
                names.push(descriptor.entity_name.clone());
            }
        }
        Ok(names)
    }

    fn build(&self, name: &str) -> Result<SchemaDescriptor> {
        let definition = self.registry.require(name)?;
        trace!(entity = name, "describing entity");

        let mut descriptor = SchemaDescriptor::new(&definition.name);
        descriptor.is_abstract = definition.is_abstract;

        if let Some(parent) = &definition.parent {
            let parent = self.describe(parent)?;
            let mut chain = parent.parent_descriptors().to_vec();
            chain.push(Rc::clone(&parent));
            descriptor.merge_from(&parent);
            descriptor.set_parent_descriptors(chain);
        }

        if !definition.is_abstract {
            descriptor.ensure_id_first();
        }

        for declaration in &definition.properties {
            let property = self.map_property(definition, declaration)?;
            if property.is_reference() {
                descriptor.add_index(IndexDescriptor::plain(&property.name, [&property.name]));
            }
            if let Some(kind) = declaration.index {
                descriptor.add_index(IndexDescriptor::new(
                    &property.name,
                    kind,
                    [&property.name],
                ));
            }
            descriptor.add_property(property);
        }

        for index in &definition.indexes {
            if let Some(missing) = index
                .properties
                .iter()
                .find(|p| descriptor.property(p).is_none())
            {
                return Err(Error::configuration(
                    name,
                    format!("index '{}' names unknown property '{missing}'", index.name),
                ));
            }
            descriptor.add_index(index.clone());
        }

        if let Some(customize) = definition.customize {
            customize(&mut descriptor);
        }

        if !descriptor.is_abstract {
            descriptor.ensure_id_first();
        }
        descriptor.link_properties();
        Ok(descriptor)
    }

    fn map_property(
        &self,
        definition: &EntityDefinition,
        declaration: &PropertyDeclaration,
    ) -> Result<PropertyDescriptor> {
        let name = declaration.name.as_str();
        let mut property = match &declaration.ty {
            PropertyType::Bool => {
                PropertyDescriptor::new(name, InternalType::Bool, "TINYINT").length(1)
            }
            PropertyType::Int => PropertyDescriptor::new(name, InternalType::Int, "INT").length(11),
            PropertyType::Float => PropertyDescriptor::new(name, InternalType::Float, "DOUBLE"),
            PropertyType::String => {
                PropertyDescriptor::new(name, InternalType::String, "VARCHAR").length(191)
            }
            PropertyType::Mixed => PropertyDescriptor::new(name, InternalType::Mixed, "LONGTEXT"),
            PropertyType::Reference(target) => {
                if !self.registry.contains(target) {
                    return Err(Error::configuration(
                        &definition.name,
                        format!("property '{name}' references unknown entity '{target}'"),
                    ));
                }
                PropertyDescriptor::new(name, InternalType::Entity, "BIGINT")
                    .length(18)
                    .unsigned()
                    .references(target)
            }
            PropertyType::Custom(custom) => {
                let mut property = PropertyDescriptor::new(
                    name,
                    InternalType::Custom(custom.type_name.to_string()),
                    "VARCHAR",
                )
                .length(191);
                (custom.setup)(&mut property);
                property
            }
            PropertyType::Array(_) => {
                return Err(Error::configuration(
                    &definition.name,
                    format!("array property '{name}' cannot be stored in a column; use a side table"),
                ));
            }
            PropertyType::Unsupported(type_name) => {
                return Err(Error::configuration(
                    &definition.name,
                    format!("property '{name}' has unsupported type '{type_name}'"),
                ));
            }
            PropertyType::Untyped => {
                return Err(Error::configuration(
                    &definition.name,
                    format!("property '{name}' has no declared type"),
                ));
            }
        };

        property.allow_null = declaration.nullable;
        if let Some(length) = declaration.length {
            property.length = Some(length);
        }
        if let Some(decimals) = declaration.decimals {
            property.decimals = Some(decimals);
        }
        if let Some(comment) = &declaration.comment {
            property.db_comment = Some(comment.clone());
        }
        property.unsigned |= declaration.unsigned;
        property.lazy = declaration.lazy;
        if let Some(enabled) = declaration.prefetch {
            property.prefetch_enabled = enabled;
        }
        if let Some(limit) = declaration.prefetch_limit {
            property.prefetch_batch_limit = limit.max(1);
        }
        Ok(property)
    }
}
