//! Sisma – an object-relational persistence core over SQLite.
//!
//! Sisma maps in-memory domain objects, *entities*, to rows of a relational
//! store. Entities are plain property bags shaped by an explicit
//! [`schema::EntitySchema`]:
//! * A [`schema::FieldSchema`] gives a property its [`schema::FieldKind`],
//!   nullability, default value and the `encrypted` / `searchable` flags.
//! * Properties typed as another entity hold a [`entity::Reference`] that is
//!   loaded on first access.
//! * Reverse ("has many") relations are declared once on the
//!   [`schema::SchemaRegistry`] and surface as typed
//!   [`collection::SismaCollection`]s.
//! * Self-referencing types get a parent property and a `sonCollection`, and
//!   can be read and deleted as trees (see [`tree`]).
//!
//! ## Modules
//! * [`adapter`] – The connection owner: executes, binds, escapes and runs transactions.
//! * [`query`] – Select, count and delete commands rendered through the adapter.
//! * [`result_set`] – A buffered, seekable cursor over a select.
//! * [`datatype`] – Property values, data type tags and their driver parameter kinds.
//! * [`hydrator`] – Rows to entities, decrypting encrypted properties on the way.
//! * [`mapper`] – Insert, update, delete and find, with cascading transactional saves.
//! * [`model`] – The per entity type query surface, including reverse collections.
//! * [`relation`] – `getX` / `setX` / `addX` / `getByX` names mapped onto the explicit API.
//! * [`session`] – The request-scoped context: adapter, registry, cipher, identity cache.
//! * [`cipher`] – ChaCha20-Poly1305 property encryption with a shared initialization vector.
//! * [`settings`] – Layered configuration (file plus `SISMA_` environment).
//!
//! ## Sessions
//! Nothing in the crate is global. A [`session::Session`] owns one
//! [`adapter::Adapter`] and is shared as `Rc<Session>` by the models, mappers
//! and entities of one unit of work. Entities are `Rc<RefCell<Entity>>` and
//! compare by identity; within one session a row is hydrated into at most one
//! live instance.
//!
//! ## Quick Start
//! ```
//! use sisma::adapter::Adapter;
//! use sisma::entity::ReferencedEntity;
//! use sisma::schema::{EntitySchema, FieldKind, FieldSchema, SchemaRegistry};
//! use sisma::session::Session;
//! use sisma::settings::ConnectionOptions;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(
//!     EntitySchema::builder("Blog::Entities::Author")
//!         .field(FieldSchema::new("name", FieldKind::Text))
//!         .build()
//!         .unwrap(),
//! ).unwrap();
//! registry.register(
//!     EntitySchema::builder("Blog::Entities::Post")
//!         .field(FieldSchema::new("title", FieldKind::Text).searchable())
//!         .field(FieldSchema::new("author", FieldKind::Entity("Blog::Entities::Author".into())))
//!         .build()
//!         .unwrap(),
//! ).unwrap();
//! registry
//!     .add_collection_data("Blog::Entities::Author", "postCollection", "Blog::Entities::Post", "author")
//!     .unwrap();
//!
//! let adapter = Adapter::new();
//! adapter.connect(&ConnectionOptions::in_memory()).unwrap();
//! adapter.execute_batch(
//!     "create table author (id integer primary key, name text not null);
//!      create table post (id integer primary key, title text not null,
//!                         author integer not null references author(id));",
//! ).unwrap();
//! let session = Session::new(adapter, registry);
//!
//! let author = session.create_entity("Blog::Entities::Author").unwrap();
//! author.borrow_mut().set("name", "Ada").unwrap();
//! let post = session.create_entity("Blog::Entities::Post").unwrap();
//! post.borrow_mut().set("title", "Engines").unwrap();
//! author.add_to_collection("postCollection", &post).unwrap();
//! session.mapper().save(&author).unwrap();
//!
//! session.clear_cache();
//! let author = session.find_entity("Blog::Entities::Author", 1).unwrap().unwrap();
//! assert_eq!(author.count_collection("postCollection").unwrap(), 1);
//! ```
//!
//! ## Logging
//! Everything logs through `tracing`; [`init_tracing`] installs a formatting
//! subscriber filtered by `RUST_LOG` for binaries and tests that want output.

pub mod adapter;
pub mod cipher;
pub mod collection;
pub mod datatype;
pub mod entity;
pub mod error;
pub mod hydrator;
pub mod mapper;
pub mod model;
pub mod naming;
pub mod query;
pub mod relation;
pub mod result_set;
pub mod schema;
pub mod session;
pub mod settings;
pub mod tree;

pub use crate::collection::SismaCollection;
pub use crate::datatype::Value;
pub use crate::entity::{Entity, EntityRef, ReferencedEntity};
pub use crate::error::{Result, SismaError};
pub use crate::session::Session;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber honouring `RUST_LOG`. Calling it again is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
