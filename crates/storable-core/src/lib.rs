//! # storable-core
//!
//! The driver-agnostic half of Storable: the blocking [`SqlConnection`]
//! boundary, value escaping, parameter substitution, schema descriptors and
//! the [`EntityIntrospector`] that derives a table description from each
//! registered entity.
//!
//! ```
//! use std::sync::Arc;
//! use storable_core::{
//!     EntityDefinition, EntityIntrospector, EntityRegistry, PropertyDeclaration, PropertyType,
//! };
//!
//! let mut registry = EntityRegistry::new();
//! registry
//!     .register_definition(
//!         EntityDefinition::new("User")
//!             .property(PropertyDeclaration::new("email", PropertyType::String)),
//!     )
//!     .register_definition(
//!         EntityDefinition::new("Blog\\Post")
//!             .property(PropertyDeclaration::new("title", PropertyType::String))
//!             .property(PropertyDeclaration::new(
//!                 "author",
//!                 PropertyType::Reference("User".into()),
//!             )),
//!     );
//!
//! let introspector = EntityIntrospector::new(Arc::new(registry));
//! let post = introspector.describe("Blog\\Post").unwrap();
//! assert_eq!(post.table_name, "blog_post");
//! assert!(post.index("author").is_some());
//! ```

pub mod column_type;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod introspector;
pub mod lexer;
pub mod params;
pub mod reserved;
pub mod schema;
pub mod value;

pub use column_type::ColumnType;
pub use config::ConnectionConfig;
pub use connection::{ColumnInfo, IndexInfo, Row, SqlConnection};
pub use dialect::Engine;
pub use entity::{
    CustomColumn, CustomType, EntityDefinition, EntityRegistry, EntityType, PropertyDeclaration,
    PropertyType, DEFAULT_RESERVED_PREFIX,
};
pub use error::{Error, Result};
pub use introspector::EntityIntrospector;
pub use params::{prepare_query, Params};
pub use schema::{
    table_name, IndexDescriptor, IndexKind, InternalType, PropertyDescriptor, SchemaDescriptor,
};
pub use value::{SqlValue, ToSqlValue};
