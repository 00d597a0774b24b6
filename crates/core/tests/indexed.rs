mod common;

use common::*;
use modelsync_api::{FileKey, ModelElement, PropertyValue};
use modelsync_core::{SyncConfig, SyncError};

#[test]
fn lookups_follow_synced_values() {
    let mut engine = engine_with(SyncConfig::time_aware());
    engine
        .sync(
            &change("/books.model", "1"),
            &resource(vec![
                book("b0", "Dune", 412),
                book("b1", "Emma", 320),
                person("p", "Dune"),
            ]),
        )
        .unwrap();

    // `name` is declared on Named, so persons are written into the index too
    assert_eq!(engine.register_indexed_attribute(LIB, "Book", "name").unwrap(), 3);
    assert_eq!(engine.register_indexed_attribute(LIB, "Book", "name").unwrap(), 0);

    let books = FileKey::new(REPO, "/books.model");
    let b0 = engine.element(&books, "b0").unwrap().unwrap();
    let dune = PropertyValue::from("Dune");
    assert_eq!(engine.find_by_attribute(&ty("Book"), "name", &dune).unwrap(), vec![b0]);
    assert_eq!(engine.find_by_attribute(&ty("Named"), "name", &dune).unwrap().len(), 2);

    engine
        .sync(&change("/more.model", "1"), &resource(vec![book("b9", "Dune", 99)]))
        .unwrap();
    assert_eq!(engine.find_by_attribute(&ty("Book"), "name", &dune).unwrap().len(), 2);

    engine
        .sync(
            &change("/books.model", "2"),
            &resource(vec![
                book("b0", "Dune Messiah", 256),
                book("b1", "Emma", 320),
                person("p", "Dune"),
            ]),
        )
        .unwrap();
    let b9 = engine
        .element(&FileKey::new(REPO, "/more.model"), "b9")
        .unwrap()
        .unwrap();
    assert_eq!(engine.find_by_attribute(&ty("Book"), "name", &dune).unwrap(), vec![b9]);
    assert_eq!(
        engine
            .find_by_attribute(&ty("Book"), "name", &"Dune Messiah".into())
            .unwrap(),
        vec![b0]
    );
}

#[test]
fn list_values_are_indexed_per_member() {
    let mut engine = engine();
    engine.register_indexed_attribute(LIB, "Library", "tags").unwrap();
    let lib = ModelElement::builder("lib", ty("Library"))
        .attr("name", "Central")
        .attr("tags", vec!["sf", "classics", "sf"])
        .build();
    engine
        .sync(&change("/lib.model", "1"), &resource(vec![lib]))
        .unwrap();

    let node = engine
        .element(&FileKey::new(REPO, "/lib.model"), "lib")
        .unwrap()
        .unwrap();
    assert_eq!(
        engine
            .find_by_attribute(&ty("Library"), "tags", &"classics".into())
            .unwrap(),
        vec![node]
    );
    assert!(engine
        .find_by_attribute(&ty("Library"), "tags", &"poetry".into())
        .unwrap()
        .is_empty());
}

#[test]
fn unknown_or_unindexed_attributes_are_rejected() {
    let mut engine = engine();
    assert!(matches!(
        engine.register_indexed_attribute(LIB, "Book", "isbn"),
        Err(SyncError::NotFound(_))
    ));
    assert!(matches!(
        engine.find_by_attribute(&ty("Book"), "pages", &PropertyValue::Int(1)),
        Err(SyncError::NotFound(_))
    ));
}
