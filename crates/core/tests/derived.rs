mod common;

use common::*;
use modelsync_api::{
    DerivedDeclaration, FileKey, ModelElement, PropertyValue, ReferenceSlot, ReferenceTarget,
};
use modelsync_core::{DerivedState, PATH_LANGUAGE, SyncConfig, SyncError};

fn declaration(type_name: &str, attribute: &str, language: &str, logic: &str) -> DerivedDeclaration {
    DerivedDeclaration {
        metamodel: LIB.into(),
        type_name: type_name.into(),
        attribute: attribute.into(),
        many: false,
        ordered: false,
        unique: false,
        value_type: "int".into(),
        language: language.into(),
        logic: logic.to_string(),
    }
}

fn lib_file() -> FileKey {
    FileKey::new(REPO, "/lib.model")
}

#[test]
fn derived_value_follows_the_model() {
    let mut engine = engine_with(SyncConfig::time_aware());
    engine
        .sync(
            &change("/lib.model", "1"),
            &resource(vec![
                library("lib", &["b0", "b1"]),
                book("b0", "Dune", 412),
                book("b1", "Emma", 320),
            ]),
        )
        .unwrap();

    let report = engine
        .register_derived_attribute(&declaration(
            "Library",
            "bookCount",
            PATH_LANGUAGE,
            "count(self.books)",
        ))
        .unwrap();
    assert_eq!(report.computed, 1);
    assert_eq!(report.remaining, 0);

    let lib = engine.element(&lib_file(), "lib").unwrap().unwrap();
    assert_eq!(
        engine.derived(lib, "bookCount").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(2)))
    );

    let log = engine
        .sync(
            &change("/lib.model", "2"),
            &resource(vec![
                library("lib", &["b0", "b1", "b2"]),
                book("b0", "Dune", 412),
                book("b1", "Emma", 320),
                book("b2", "Persuasion", 249),
            ]),
        )
        .unwrap();
    assert_eq!(log.stats.derived_invalidated, 1);
    assert_eq!(
        engine.derived(lib, "bookCount").unwrap().map(|(state, _)| state),
        Some(DerivedState::Dirty)
    );

    assert_eq!(engine.recompute_derived(PATH_LANGUAGE).unwrap(), 0);
    assert_eq!(
        engine.derived(lib, "bookCount").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(3)))
    );
}

#[test]
fn attribute_change_in_another_file_invalidates() {
    let mut engine = engine_with(SyncConfig::time_aware());
    engine
        .sync(&change("/books.model", "1"), &resource(vec![book("b0", "Dune", 412)]))
        .unwrap();
    let fan = ModelElement::builder("p", ty("Person"))
        .attr("name", "Frank")
        .reference(
            "favourite",
            ReferenceSlot::to([ReferenceTarget::in_file(
                "b0",
                FileKey::new(REPO, "/books.model"),
            )]),
        )
        .build();
    engine
        .sync(&change("/people.model", "1"), &resource(vec![fan]))
        .unwrap();
    engine
        .register_derived_attribute(&declaration(
            "Person",
            "favouritePages",
            PATH_LANGUAGE,
            "sum(self.favourite.pages)",
        ))
        .unwrap();
    let p = engine
        .element(&FileKey::new(REPO, "/people.model"), "p")
        .unwrap()
        .unwrap();
    assert_eq!(
        engine.derived(p, "favouritePages").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(412)))
    );

    let log = engine
        .sync(&change("/books.model", "2"), &resource(vec![book("b0", "Dune", 600)]))
        .unwrap();
    assert_eq!(log.stats.derived_invalidated, 1);
    engine.recompute_derived(PATH_LANGUAGE).unwrap();
    assert_eq!(
        engine.derived(p, "favouritePages").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(600)))
    );
}

#[test]
fn unread_attribute_change_keeps_the_value_fresh() {
    let mut engine = engine_with(SyncConfig::time_aware());
    engine
        .sync(&change("/books.model", "1"), &resource(vec![book("b0", "Dune", 412)]))
        .unwrap();
    let fan = ModelElement::builder("p", ty("Person"))
        .attr("name", "Frank")
        .reference(
            "favourite",
            ReferenceSlot::to([ReferenceTarget::in_file(
                "b0",
                FileKey::new(REPO, "/books.model"),
            )]),
        )
        .build();
    engine
        .sync(&change("/people.model", "1"), &resource(vec![fan]))
        .unwrap();
    engine
        .register_derived_attribute(&declaration(
            "Person",
            "favouritePages",
            PATH_LANGUAGE,
            "sum(self.favourite.pages)",
        ))
        .unwrap();
    let p = engine
        .element(&FileKey::new(REPO, "/people.model"), "p")
        .unwrap()
        .unwrap();

    // only `pages` of b0 is read, so renaming it changes nothing
    let log = engine
        .sync(
            &change("/books.model", "2"),
            &resource(vec![book("b0", "Dune Messiah", 412)]),
        )
        .unwrap();
    assert_eq!(log.stats.updated, 1);
    assert_eq!(log.stats.derived_invalidated, 0);
    assert_eq!(
        engine.derived(p, "favouritePages").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(412)))
    );
    assert_eq!(engine.stats().dirty_derived, 0);
}

#[test]
fn new_instances_invalidate_type_wide_queries() {
    let mut engine = engine();
    engine
        .sync(&change("/lib.model", "1"), &resource(vec![library("lib", &[])]))
        .unwrap();
    engine
        .register_derived_attribute(&declaration(
            "Library",
            "catalogue",
            PATH_LANGUAGE,
            "count(instances(http://lib#Book))",
        ))
        .unwrap();
    let lib = engine.element(&lib_file(), "lib").unwrap().unwrap();
    assert_eq!(
        engine.derived(lib, "catalogue").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(0)))
    );

    engine
        .sync(&change("/shelf.model", "1"), &resource(shelf(3)))
        .unwrap();
    assert_eq!(engine.stats().dirty_derived, 1);
    engine.recompute_derived(PATH_LANGUAGE).unwrap();
    assert_eq!(
        engine.derived(lib, "catalogue").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(3)))
    );
}

#[test]
fn unknown_language_stays_dirty() {
    let mut engine = engine();
    engine
        .sync(&change("/lib.model", "1"), &resource(vec![library("lib", &[])]))
        .unwrap();

    let report = engine
        .register_derived_attribute(&declaration("Library", "size", "ocl", "self.books->size()"))
        .unwrap();
    assert_eq!(report.computed, 0);
    assert_eq!(report.remaining, 1);

    let lib = engine.element(&lib_file(), "lib").unwrap().unwrap();
    let (state, _) = engine.derived(lib, "size").unwrap().unwrap();
    assert_eq!(state, DerivedState::Dirty);
    assert!(matches!(
        engine.recompute_derived("ocl"),
        Err(SyncError::UnknownLanguage(_))
    ));
}

#[test]
fn failing_logic_is_reported_and_left_dirty() {
    let mut engine = engine();
    engine
        .sync(&change("/lib.model", "1"), &resource(vec![library("lib", &[])]))
        .unwrap();

    let report = engine
        .register_derived_attribute(&declaration("Library", "broken", PATH_LANGUAGE, "self..x"))
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.computed, 0);
    assert_eq!(report.remaining, 1);
}

#[test]
fn new_elements_get_dirty_derived_values() {
    let mut engine = engine();
    engine
        .register_derived_attribute(&declaration(
            "Book",
            "titleLength",
            PATH_LANGUAGE,
            "size(self.name)",
        ))
        .unwrap();

    engine
        .sync(&change("/shelf.model", "1"), &resource(vec![book("b0", "Dune", 412)]))
        .unwrap();
    assert_eq!(engine.stats().derived, 1);
    assert_eq!(engine.recompute_derived(PATH_LANGUAGE).unwrap(), 0);

    let b0 = engine
        .element(&FileKey::new(REPO, "/shelf.model"), "b0")
        .unwrap()
        .unwrap();
    assert_eq!(
        engine.derived(b0, "titleLength").unwrap(),
        Some((DerivedState::Fresh, PropertyValue::Int(4)))
    );
}
