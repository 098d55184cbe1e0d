#![allow(dead_code)]

use std::rc::Rc;

use sisma::adapter::Adapter;
use sisma::cipher::PropertyCipher;
use sisma::schema::{EntitySchema, EnumSchema, FieldKind, FieldSchema, SchemaRegistry};
use sisma::session::Session;
use sisma::settings::{ConnectionOptions, SessionOptions};

pub const AUTHOR: &str = "Blog::Entities::Author";
pub const POST: &str = "Blog::Entities::Post";
pub const CATEGORY: &str = "Blog::Entities::Category";
pub const ACCOUNT: &str = "Blog::Entities::Account";
pub const PASSPHRASE: &str = "correct horse battery staple";

pub const TABLES: &str = "
    create table author (
        id integer primary key,
        name text not null
    );
    create table post (
        id integer primary key,
        title text not null,
        body text,
        status text not null,
        published text,
        rating text,
        views integer not null,
        author integer not null references author(id),
        reviewer integer references author(id)
    );
    create table category (
        id integer primary key,
        name text not null,
        parent_category integer references category(id)
    );
    create table account (
        id integer primary key,
        secret text not null,
        pin text,
        avatar blob,
        active integer not null,
        initialization_vector text
    );
";

pub fn status() -> Rc<EnumSchema> {
    EnumSchema::new(
        "Blog::Enumerations::Status",
        &[("Draft", "D"), ("Published", "P"), ("Archived", "A")],
    )
}

pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            EntitySchema::builder(AUTHOR)
                .field(FieldSchema::new("name", FieldKind::Text).searchable())
                .build()
                .expect("author schema"),
        )
        .expect("author");
    registry
        .register(
            EntitySchema::builder(POST)
                .field(FieldSchema::new("title", FieldKind::Text).searchable())
                .field(FieldSchema::new("body", FieldKind::Text).nullable().searchable())
                .field(
                    FieldSchema::new("status", FieldKind::Enumeration(status()))
                        .default(status().case("Draft").expect("draft")),
                )
                .field(FieldSchema::new("published", FieldKind::Date).nullable())
                .field(FieldSchema::new("rating", FieldKind::Decimal).nullable())
                .field(FieldSchema::new("views", FieldKind::Integer).default(0))
                .field(FieldSchema::new("author", FieldKind::Entity(AUTHOR.to_string())))
                .field(FieldSchema::new("reviewer", FieldKind::Entity(AUTHOR.to_string())).nullable())
                .build()
                .expect("post schema"),
        )
        .expect("post");
    registry
        .register(
            EntitySchema::builder(CATEGORY)
                .field(FieldSchema::new("name", FieldKind::Text))
                .self_referenced()
                .build()
                .expect("category schema"),
        )
        .expect("category");
    registry
        .register(
            EntitySchema::builder(ACCOUNT)
                .field(FieldSchema::new("secret", FieldKind::Text).encrypted())
                .field(FieldSchema::new("pin", FieldKind::Integer).nullable().encrypted())
                .field(FieldSchema::new("avatar", FieldKind::Binary).nullable().encrypted())
                .field(FieldSchema::new("active", FieldKind::Boolean).default(true))
                .build()
                .expect("account schema"),
        )
        .expect("account");
    registry
        .add_collection_data(AUTHOR, "postCollection", POST, "author")
        .expect("post collection");
    registry
}

pub fn adapter() -> Adapter {
    sisma::init_tracing();
    let adapter = Adapter::new();
    adapter
        .connect(&ConnectionOptions::in_memory())
        .expect("connect");
    adapter.execute_batch(TABLES).expect("tables");
    adapter
}

pub fn session() -> Rc<Session> {
    Session::builder(adapter(), registry())
        .cipher(PropertyCipher::from_passphrase(PASSPHRASE))
        .build()
}

pub fn session_with_depth(max_tree_depth: usize) -> Rc<Session> {
    Session::builder(adapter(), registry())
        .options(SessionOptions { max_tree_depth })
        .build()
}
