mod common;

use std::rc::Rc;

use common::{AUTHOR, POST, registry};
use sisma::datatype::Value;
use sisma::entity::{Entity, EntityRef};
use sisma::{SismaCollection, SismaError};

fn author(name: &str) -> EntityRef {
    let registry = registry();
    let author = Entity::create(registry.schema(AUTHOR).unwrap());
    author.borrow_mut().set("name", name).unwrap();
    author
}

fn post(title: &str) -> EntityRef {
    let registry = registry();
    let post = Entity::create(registry.schema(POST).unwrap());
    post.borrow_mut().set("title", title).unwrap();
    post
}

#[test]
fn append_rejects_foreign_types() {
    let mut authors = SismaCollection::new(AUTHOR);
    authors.append(author("Ada")).unwrap();
    let err = authors.append(post("Engines")).unwrap_err();
    assert!(matches!(err, SismaError::InvalidType { .. }));
    assert_eq!(authors.len(), 1);
}

#[test]
fn exchange_array_is_all_or_nothing() {
    let mut authors = SismaCollection::new(AUTHOR);
    let ada = author("Ada");
    authors.append(Rc::clone(&ada)).unwrap();
    // one bad element leaves the collection untouched
    let err = authors
        .exchange_array(vec![author("Grace"), post("Engines")])
        .unwrap_err();
    assert!(matches!(err, SismaError::InvalidType { .. }));
    assert_eq!(authors.len(), 1);
    assert!(authors.has(&ada));

    let grace = author("Grace");
    let previous = authors.exchange_array(vec![Rc::clone(&grace)]).unwrap();
    assert_eq!(previous.len(), 1);
    assert!(Rc::ptr_eq(&previous[0], &ada));
    assert!(authors.has(&grace));
    assert!(!authors.has(&ada));
}

#[test]
fn merge_requires_the_same_restrictive_type() {
    let mut authors = SismaCollection::new(AUTHOR);
    authors.append(author("Ada")).unwrap();
    let mut more = SismaCollection::new(AUTHOR);
    more.append(author("Grace")).unwrap();
    more.append(author("Barbara")).unwrap();
    assert_eq!(authors.merge_with(&more).unwrap().len(), 3);
    // the other side is left as it was
    assert_eq!(more.len(), 2);

    let posts = SismaCollection::new(POST);
    assert!(matches!(
        authors.merge_with(&posts),
        Err(SismaError::InvalidType { .. })
    ));
}

#[test]
fn find_entity_from_property_returns_the_last_match() {
    let mut authors = SismaCollection::new(AUTHOR);
    let first = author("Ada");
    let second = author("Ada");
    authors.append(Rc::clone(&first)).unwrap();
    authors.append(author("Grace")).unwrap();
    authors.append(Rc::clone(&second)).unwrap();
    let found = authors
        .find_entity_from_property("name", &Value::from("Ada"))
        .unwrap();
    assert!(Rc::ptr_eq(&found, &second));
    assert!(
        authors
            .find_entity_from_property("name", &Value::from("Barbara"))
            .is_none()
    );
}

#[test]
fn find_entity_from_property_matches_primary_keys() {
    let mut authors = SismaCollection::new(AUTHOR);
    let ada = author("Ada");
    ada.borrow_mut().set_id(Some(7));
    authors.append(author("Grace")).unwrap();
    authors.append(Rc::clone(&ada)).unwrap();
    let found = authors.find_entity_from_property("id", &Value::from(7)).unwrap();
    assert!(Rc::ptr_eq(&found, &ada));
}

#[test]
fn slice_mutates_in_place() {
    let mut authors = SismaCollection::new(AUTHOR);
    let names = ["Ada", "Grace", "Barbara", "Frances"];
    let entities: Vec<EntityRef> = names.iter().map(|n| author(n)).collect();
    for entity in &entities {
        authors.append(Rc::clone(entity)).unwrap();
    }
    authors.slice(1, Some(2));
    assert_eq!(authors.len(), 2);
    assert!(authors.is_first(&entities[1]));
    assert!(authors.is_last(&entities[2]));

    // past the end just empties it
    authors.slice(5, None);
    assert!(authors.is_empty());
}

#[test]
fn first_and_last_compare_identity() {
    let mut authors = SismaCollection::new(AUTHOR);
    let ada = author("Ada");
    let twin = author("Ada");
    authors.append(Rc::clone(&ada)).unwrap();
    assert!(authors.is_first(&ada));
    assert!(authors.is_last(&ada));
    // equal contents, different instance
    assert!(!authors.is_first(&twin));
    assert!(!authors.has(&twin));
}

#[test]
fn iterates_in_insertion_order() {
    let mut authors = SismaCollection::new(AUTHOR);
    for name in ["Ada", "Grace", "Barbara"] {
        authors.append(author(name)).unwrap();
    }
    let names: Vec<Value> = authors
        .iter()
        .map(|a| a.borrow().value("name").cloned().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![Value::from("Ada"), Value::from("Grace"), Value::from("Barbara")]
    );
    assert_eq!(authors.into_iter().count(), 3);
}
