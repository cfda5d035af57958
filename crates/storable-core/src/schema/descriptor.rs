//! Table descriptors.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::{table_name, IndexDescriptor, PropertyDescriptor};

/// The shape of one entity's table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    /// Fully-qualified entity name.
    pub entity_name: String,
    /// Table name.
    pub table_name: String,
    /// Abstract entities never get a table.
    pub is_abstract: bool,
    properties: Vec<PropertyDescriptor>,
    indexes: BTreeMap<String, IndexDescriptor>,
    parents: Vec<Rc<SchemaDescriptor>>,
}

impl SchemaDescriptor {
    /// Creates an empty descriptor for `entity_name`.
    #[must_use]
    pub fn new(entity_name: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        Self {
            table_name: table_name(&entity_name),
            entity_name,
            is_abstract: false,
            properties: Vec::new(),
            indexes: BTreeMap::new(),
            parents: Vec::new(),
        }
    }

    /// Creates an empty descriptor for a table that is not an entity.
    #[must_use]
    pub fn for_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            entity_name: table.clone(),
            table_name: table,
            is_abstract: false,
            properties: Vec::new(),
            indexes: BTreeMap::new(),
            parents: Vec::new(),
        }
    }

    /// Adds a property, replacing a same-named one in place.
    pub fn add_property(&mut self, property: PropertyDescriptor) {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    /// Adds a property, builder style.
    #[must_use]
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.add_property(property);
        self
    }

    /// Removes a property and returns it.
    pub fn remove_property(&mut self, name: &str) -> Option<PropertyDescriptor> {
        let position = self.properties.iter().position(|p| p.name == name)?;
        Some(self.properties.remove(position))
    }

    /// Returns the named property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the named property mutably.
    pub fn property_mut(&mut self, name: &str) -> Option<&mut PropertyDescriptor> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// Returns the properties in column order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Adds an index.
    ///
    /// A same-named index with another composition is replaced; an index
    /// with an equal signature is overwritten.
    pub fn add_index(&mut self, index: IndexDescriptor) {
        self.indexes.retain(|_, existing| existing.name != index.name);
        self.indexes.insert(index.signature(), index);
    }

    /// Adds an index, builder style.
    #[must_use]
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.add_index(index);
        self
    }

    /// Removes the index named `name` and returns it.
    pub fn remove_index(&mut self, name: &str) -> Option<IndexDescriptor> {
        let signature = self.index(name)?.signature();
        self.indexes.remove(&signature)
    }

    /// Returns the index named `name`.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.values().find(|index| index.name == name)
    }

    /// Returns the index with the given signature.
    #[must_use]
    pub fn index_by_signature(&self, signature: &str) -> Option<&IndexDescriptor> {
        self.indexes.get(signature)
    }

    /// Iterates over the indexes, ordered by signature.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexDescriptor> {
        self.indexes.values()
    }

    /// Returns the ancestor descriptors, root first.
    #[must_use]
    pub fn parent_descriptors(&self) -> &[Rc<SchemaDescriptor>] {
        &self.parents
    }

    /// Sets the ancestor descriptors, root first.
    pub fn set_parent_descriptors(&mut self, parents: Vec<Rc<SchemaDescriptor>>) {
        self.parents = parents;
    }

    /// Returns the ancestor entity names, root first, excluding this entity.
    #[must_use]
    pub fn lineage(&self) -> Vec<String> {
        self.parents.iter().map(|p| p.entity_name.clone()).collect()
    }

    /// Copies the properties and indexes of `parent` into this descriptor.
    ///
    /// Same-named entries already present are overridden by the parent's.
    /// Call before adding the entity's own properties so those win.
    pub fn merge_from(&mut self, parent: &SchemaDescriptor) {
        for property in &parent.properties {
            self.add_property(property.clone());
        }
        for index in parent.indexes.values() {
            self.add_index(index.clone());
        }
    }

    /// Moves (or inserts) the `id` primary key to the first position.
    pub fn ensure_id_first(&mut self) {
        let id = self
            .remove_property("id")
            .unwrap_or_else(PropertyDescriptor::id);
        self.properties.insert(0, id);
    }

    /// Recomputes the `after` links from the current property order.
    pub fn link_properties(&mut self) {
        let mut previous: Option<String> = None;
        for property in &mut self.properties {
            property.after = previous.replace(property.name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InternalType;

    fn string(name: &str) -> PropertyDescriptor {
        PropertyDescriptor::new(name, InternalType::String, "VARCHAR").length(191)
    }

    #[test]
    fn properties_replace_in_place() {
        let mut d = SchemaDescriptor::new("Blog\\Post")
            .with_property(string("title"))
            .with_property(string("body"));
        d.add_property(string("title").length(100));

        let names: Vec<_> = d.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["title", "body"]);
        assert_eq!(d.property("title").unwrap().length, Some(100));
        assert_eq!(d.table_name, "blog_post");
    }

    #[test]
    fn indexes_are_keyed_by_signature() {
        let mut d = SchemaDescriptor::new("Post");
        d.add_index(IndexDescriptor::plain("ab", ["a", "b"]));
        d.add_index(IndexDescriptor::plain("ba", ["b", "a"]));
        assert_eq!(d.indexes().count(), 1);
        assert_eq!(d.index_by_signature("a,b").unwrap().name, "ba");

        d.add_index(IndexDescriptor::plain("ba", ["c"]));
        assert_eq!(d.indexes().count(), 1);
        assert!(d.index_by_signature("a,b").is_none());
        assert!(d.remove_index("ba").is_some());
        assert_eq!(d.indexes().count(), 0);
    }

    #[test]
    fn id_first_and_after_links() {
        let mut d = SchemaDescriptor::new("Post")
            .with_property(string("title"))
            .with_property(string("body"));
        d.ensure_id_first();
        d.link_properties();

        let props = d.properties();
        assert_eq!(props[0].name, "id");
        assert_eq!(props[0].after, None);
        assert_eq!(props[1].after.as_deref(), Some("id"));
        assert_eq!(props[2].after.as_deref(), Some("title"));
    }

    #[test]
    fn lineage_is_root_first() {
        let root = Rc::new(SchemaDescriptor::new("Shape"));
        let mid = Rc::new(SchemaDescriptor::new("Polygon"));
        let mut leaf = SchemaDescriptor::new("Square");
        leaf.set_parent_descriptors(vec![root, mid]);
        assert_eq!(leaf.lineage(), ["Shape", "Polygon"]);
    }
}
