//! In-memory table descriptions.
//!
//! A [`SchemaDescriptor`] is the desired (or, when rebuilt from the live
//! database, the actual) shape of one table: ordered properties and indexes
//! keyed by their structural signature.

mod descriptor;
mod index;
mod property;

pub use descriptor::SchemaDescriptor;
pub use index::{IndexDescriptor, IndexKind};
pub use property::{InternalType, PropertyDescriptor};

const NAMESPACE_SEPARATORS: [&str; 3] = ["\\", "::", "/"];

/// Returns true if `name` contains a namespace separator.
#[must_use]
pub fn is_qualified_name(name: &str) -> bool {
    NAMESPACE_SEPARATORS.iter().any(|sep| name.contains(sep))
}

/// Derives the table name of an entity.
///
/// The name is lowercased and every run of namespace separators collapses
/// into a single underscore: `Blog\Post` becomes `blog_post`.
#[must_use]
pub fn table_name(entity_name: &str) -> String {
    let mut out = String::with_capacity(entity_name.len());
    let mut rest = entity_name;
    let mut in_separator = false;
    while let Some(c) = rest.chars().next() {
        let separator = NAMESPACE_SEPARATORS
            .iter()
            .find(|sep| rest.starts_with(**sep));
        if let Some(sep) = separator {
            if !in_separator {
                out.push('_');
                in_separator = true;
            }
            rest = &rest[sep.len()..];
            continue;
        }
        in_separator = false;
        out.extend(c.to_lowercase());
        rest = &rest[c.len_utf8()..];
    }
    out
}
