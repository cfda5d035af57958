//! # storable-orm
//!
//! A blocking entity store on top of `storable-core`.
//!
//! This crate provides:
//! - [`Session`], the unit of work owning connections and the identity cache
//! - [`Handle`] and [`EntityRef`], shared references to entity instances
//! - [`Query`] and [`Fetch`] for condition, sort and polymorphic fetches
//! - the [`Entity`] trait with access checks and lifecycle hooks
//! - `#[derive(Entity)]` for declaring entities as plain structs
//!
//! ## Quick Start
//!
//! ```ignore
//! use storable_orm::{Catalog, Entity, Fetch, Handle, Query, Session};
//!
//! #[derive(Entity)]
//! struct User {
//!     email: String,
//! }
//!
//! #[derive(Entity)]
//! #[entity(name = "Blog\\Post")]
//! struct Post {
//!     #[entity(length = 191)]
//!     title: String,
//!     author: Option<Handle<User>>,
//! }
//!
//! let mut catalog = Catalog::new();
//! catalog.register::<User>().register::<Post>();
//! let session = Session::new(catalog, storable_sqlx::connect(&config)?);
//!
//! let posts = session.get_by_condition::<Post>(
//!     &Query::new()
//!         .filter("author.email = {0}")
//!         .params(Params::positional(["ann@example.com"]))
//!         .sort("-id")
//!         .limit(10),
//! )?;
//! for post in &posts {
//!     let title: String = post.title(&session)?;
//!     let author: Option<Handle<User>> = post.author(&session)?;
//! }
//! ```
//!
//! ## References and prefetch
//!
//! Reading a reference resolves it through the identity cache. When the
//! referenced instance is not cached yet, the ids held by every other cached
//! instance of the same type are loaded in the same query, so walking a list
//! of fifty posts costs one query for their authors instead of fifty.
//! Prefetch can be turned off per property (`#[entity(prefetch = false)]`)
//! or for the whole session ([`SessionOptions::prefetch`]).

pub mod audit;
pub mod error;
pub mod hooks;
pub mod instance;
mod persist;
pub mod query;
pub mod session;
pub mod value;

pub use storable_core;
pub use storable_core::{
    CustomColumn, EntityDefinition, EntityRegistry, EntityType, IndexDescriptor, IndexKind,
    Params, PropertyDeclaration, PropertyType, SchemaDescriptor, SqlConnection, SqlValue,
};
pub use storable_derive::Entity;

pub use audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
pub use error::{OrmError, Result};
pub use hooks::{Catalog, Entity};
pub use instance::{EntityRef, EntityState, Handle};
pub use query::{Fetch, Query};
pub use session::{Session, SessionOptions, DEFAULT_CONNECTION};
pub use value::{FieldValue, PropertyValue};
