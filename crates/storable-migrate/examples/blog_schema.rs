//! Keeps a small blog schema in sync.
//!
//! ```bash
//! cargo run -p storable-migrate --example blog_schema -- --database sqlite://blog.db plan
//! cargo run -p storable-migrate --example blog_schema -- --database sqlite://blog.db apply
//! ```

use storable_core::{
    EntityDefinition, EntityRegistry, IndexDescriptor, IndexKind, PropertyDeclaration,
    PropertyType,
};

fn main() -> anyhow::Result<()> {
    let mut registry = EntityRegistry::new();
    registry
        .register_definition(
            EntityDefinition::new("Blog\\User")
                .property(
                    PropertyDeclaration::new("email", PropertyType::String)
                        .not_null()
                        .indexed(IndexKind::Unique),
                )
                .property(PropertyDeclaration::new("active", PropertyType::Bool).not_null()),
        )
        .register_definition(
            EntityDefinition::new("Blog\\Content")
                .abstract_entity()
                .property(PropertyDeclaration::new("title", PropertyType::String).not_null())
                .property(PropertyDeclaration::new(
                    "author",
                    PropertyType::Reference("Blog\\User".into()),
                )),
        )
        .register_definition(
            EntityDefinition::new("Blog\\Post")
                .parent("Blog\\Content")
                .property(PropertyDeclaration::new("body", PropertyType::Mixed).lazy())
                .property(PropertyDeclaration::new("slug", PropertyType::String).length(100))
                .index(IndexDescriptor::unique("title_slug", ["title", "slug"])),
        );

    storable_migrate::cli::run(registry)
}
