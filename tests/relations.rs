mod common;

use std::rc::Rc;

use common::{AUTHOR, CATEGORY, POST, registry, session};
use sisma::datatype::Value;
use sisma::entity::{EntityRef, ReferencedEntity};
use sisma::relation::{
    self, ModelCall, ModelResult, RelationArgument, RelationCall, RelationResult,
};
use sisma::schema::{CollectionInfo, EntitySchema, FieldKind, FieldSchema, SON_COLLECTION};
use sisma::session::Session;
use sisma::{SismaCollection, SismaError};

fn saved_author(session: &Rc<Session>, name: &str) -> EntityRef {
    let author = session.create_entity(AUTHOR).unwrap();
    author.borrow_mut().set("name", name).unwrap();
    session.mapper().save(&author).unwrap();
    author
}

fn new_post(session: &Rc<Session>, title: &str) -> EntityRef {
    let post = session.create_entity(POST).unwrap();
    post.borrow_mut().set("title", title).unwrap();
    post
}

fn titles(collection: &SismaCollection) -> Vec<Value> {
    collection
        .iter()
        .map(|p| p.borrow_mut().get("title").unwrap())
        .collect()
}

#[test]
fn collection_registration_fails_fast() {
    let mut registry = registry();
    // no such property
    assert!(matches!(
        registry.add_collection_data(AUTHOR, "reviewCollection", POST, "critic"),
        Err(SismaError::InvalidArgument(_))
    ));
    // the property exists but is not a reference to the owner
    assert!(matches!(
        registry.add_collection_data(AUTHOR, "titleCollection", POST, "title"),
        Err(SismaError::InvalidArgument(_))
    ));
    assert!(matches!(
        registry.add_collection_data(CATEGORY, "postCollection", POST, "author"),
        Err(SismaError::InvalidArgument(_))
    ));
    // the same name twice
    assert!(matches!(
        registry.add_collection_data(AUTHOR, "postCollection", POST, "reviewer"),
        Err(SismaError::InvalidArgument(_))
    ));
    registry
        .add_collection_data(AUTHOR, "reviewedCollection", POST, "reviewer")
        .unwrap();
    assert_eq!(
        registry
            .collection_data_information(AUTHOR, "reviewedCollection", CollectionInfo::ForeignKeyType)
            .unwrap(),
        POST
    );
    assert_eq!(
        registry
            .collection_data_information(AUTHOR, "reviewedCollection", CollectionInfo::ForeignKeyName)
            .unwrap(),
        "reviewer"
    );
    assert_eq!(
        registry.model_name(AUTHOR).unwrap(),
        "Blog::Models::AuthorModel"
    );
}

#[test]
fn schema_builder_validation() {
    assert!(
        EntitySchema::builder("Shop::Entities::Item")
            .field(FieldSchema::new("name", FieldKind::Text))
            .field(FieldSchema::new("name", FieldKind::Integer))
            .build()
            .is_err()
    );
    assert!(
        EntitySchema::builder("Shop::Entities::Item")
            .field(FieldSchema::new("owner", FieldKind::Entity("Shop::Entities::User".into())).encrypted())
            .build()
            .is_err()
    );
    assert!(
        EntitySchema::builder("Shop::Entities::Item")
            .field(FieldSchema::new("price", FieldKind::Decimal).default("cheap"))
            .build()
            .is_err()
    );
    let item = EntitySchema::builder("Shop\\Entities\\StockItem")
        .field(FieldSchema::new("code", FieldKind::Text).encrypted())
        .self_referenced()
        .build()
        .unwrap();
    assert_eq!(item.table(), "stock_item");
    assert_eq!(item.initialization_vector(), Some("initializationVector"));
    assert_eq!(item.parent_property(), Some("parentStockItem"));
    assert!(item.field("parentStockItem").unwrap().is_nullable());
}

#[test]
fn self_referenced_schemas_get_a_son_collection() {
    let registry = registry();
    let category = registry.schema(CATEGORY).unwrap();
    let sons = category.collection_data(SON_COLLECTION).unwrap();
    assert_eq!(sons.referencing_type(), CATEGORY);
    assert_eq!(sons.referencing_property(), "parentCategory");
}

#[test]
fn collections_load_lazily() {
    let session = session();
    let ada = saved_author(&session, "Ada");
    let grace = saved_author(&session, "Grace");
    for (title, author) in [("One", &ada), ("Two", &grace), ("Three", &ada)] {
        let post = new_post(&session, title);
        post.borrow_mut().set("author", author).unwrap();
        session.mapper().save(&post).unwrap();
    }
    session.clear_cache();
    let ada_id = ada.borrow().id().unwrap();
    drop(ada);
    let ada = session.find_entity(AUTHOR, ada_id).unwrap().unwrap();
    assert_eq!(ada.count_collection("postCollection").unwrap(), 2);

    let posts = ada.collection("postCollection").unwrap();
    assert_eq!(posts.restrictive_type(), POST);
    assert_eq!(titles(&posts), vec![Value::from("One"), Value::from("Three")]);
    // members point back at the very same owner instance
    for post in posts.iter() {
        let owner = post.borrow_mut().related("author").unwrap().unwrap();
        assert!(Rc::ptr_eq(&owner, &ada));
    }
    assert!(matches!(
        ada.collection("commentCollection"),
        Err(SismaError::InvalidArgument(_))
    ));
}

#[test]
fn adding_to_an_unsaved_owner_saves_everything() {
    let session = session();
    let ada = session.create_entity(AUTHOR).unwrap();
    ada.borrow_mut().set("name", "Ada").unwrap();
    let one = new_post(&session, "One");
    let two = new_post(&session, "Two");
    ada.add_to_collection("postCollection", &one).unwrap();
    ada.add_to_collection("postCollection", &two).unwrap();
    assert_eq!(ada.count_collection("postCollection").unwrap(), 2);

    assert!(session.mapper().save(&ada).unwrap());
    let ada_id = ada.borrow().id().unwrap();
    assert!(one.borrow().id().is_some());
    assert!(two.borrow().id().is_some());

    let model = session.model(POST).unwrap();
    assert_eq!(model.count_by("author", Some(&ada)).unwrap(), 2);
    let reloaded = model.get_by("author", Some(&ada)).unwrap();
    assert!(reloaded.has(&one));
    assert_eq!(
        one.borrow().value("author").and_then(Value::as_reference).and_then(|r| r.id()),
        Some(ada_id)
    );
}

#[test]
fn set_collection_rewrites_back_references() {
    let session = session();
    let ada = saved_author(&session, "Ada");
    let grace = saved_author(&session, "Grace");
    let post = new_post(&session, "Moved");
    post.borrow_mut().set("author", &ada).unwrap();
    session.mapper().save(&post).unwrap();

    let mut posts = SismaCollection::new(POST);
    posts.append(Rc::clone(&post)).unwrap();
    grace.set_collection("postCollection", Some(posts)).unwrap();
    assert!(post.borrow().is_modified());
    session.mapper().save(&grace).unwrap();

    let model = session.model(POST).unwrap();
    assert_eq!(model.count_by("author", Some(&grace)).unwrap(), 1);
    assert_eq!(model.count_by("author", Some(&ada)).unwrap(), 0);

    let mut authors = SismaCollection::new(AUTHOR);
    authors.append(Rc::clone(&ada)).unwrap();
    assert!(matches!(
        grace.set_collection("postCollection", Some(authors)),
        Err(SismaError::InvalidType { .. })
    ));
}

#[test]
fn name_driven_entity_calls() {
    let session = session();
    let ada = saved_author(&session, "Ada");
    let schema = Rc::clone(ada.borrow().schema());
    assert_eq!(
        RelationCall::parse("getPostCollection", &schema).unwrap(),
        RelationCall::Get("postCollection".into())
    );
    assert_eq!(
        RelationCall::parse("addPost", &schema).unwrap(),
        RelationCall::Add("postCollection".into())
    );
    assert!(RelationCall::parse("getCommentCollection", &schema).is_err());
    assert!(RelationCall::parse("frobnicate", &schema).is_err());

    let post = new_post(&session, "Dynamic");
    relation::call(&ada, "addPost", RelationArgument::Entity(Rc::clone(&post))).unwrap();
    session.mapper().save(&ada).unwrap();
    match relation::call(&ada, "countPostCollection", RelationArgument::None).unwrap() {
        RelationResult::Count(count) => assert_eq!(count, 1),
        other => panic!("unexpected {:?}", other),
    }
    match relation::call(&ada, "getPostCollection", RelationArgument::None).unwrap() {
        RelationResult::Collection(posts) => assert!(posts.has(&post)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        relation::call(&ada, "addPost", RelationArgument::None),
        Err(SismaError::InvalidArgument(_))
    ));
}

#[test]
fn name_driven_model_calls() {
    let session = session();
    let ada = saved_author(&session, "Ada");
    for title in ["One", "Two"] {
        let post = new_post(&session, title);
        post.borrow_mut().set("author", &ada).unwrap();
        session.mapper().save(&post).unwrap();
    }
    let model = session.model(POST).unwrap();
    assert_eq!(
        ModelCall::parse("getByAuthor", model.schema()).unwrap(),
        ModelCall::GetBy("author".into())
    );
    assert!(ModelCall::parse("getByTitle", model.schema()).is_err());

    match relation::call_model(&model, "countByAuthor", Some(&ada)).unwrap() {
        ModelResult::Count(count) => assert_eq!(count, 2),
        other => panic!("unexpected {:?}", other),
    }
    match relation::call_model(&model, "getByReviewer", None).unwrap() {
        ModelResult::Collection(posts) => assert_eq!(posts.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
    match relation::call_model(&model, "deleteByAuthor", Some(&ada)).unwrap() {
        ModelResult::Deleted(deleted) => assert!(deleted),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(model.count_by("author", Some(&ada)).unwrap(), 0);
}

#[test]
fn filters_on_unsaved_entities_match_nothing() {
    let session = session();
    let ghost = session.create_entity(AUTHOR).unwrap();
    let model = session.model(POST).unwrap();
    assert!(model.get_by("author", Some(&ghost)).unwrap().is_empty());
    assert_eq!(model.count_by("author", Some(&ghost)).unwrap(), 0);
    assert!(matches!(
        model.get_by("title", None),
        Err(SismaError::InvalidArgument(_))
    ));
}
