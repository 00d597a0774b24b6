mod common;

use common::*;
use modelsync_api::{ChangeEvent, FileKey, ReferenceTarget};
use modelsync_core::proxy::ProxyDictionary;
use modelsync_core::{SyncConfig, SyncStrategy};

fn people() -> FileKey {
    FileKey::new(REPO, "/people.model")
}

#[test]
fn reference_waits_for_its_target_file() {
    let listener = RecordingListener::new();
    let mut engine = engine().with_listener(listener.clone());

    let log = engine
        .sync(
            &change("/books.model", "1"),
            &resource(vec![book_by("b0", "Dune", 412, ReferenceTarget::in_file("p", people()))]),
        )
        .unwrap();
    assert_eq!(log.stats.proxies_created, 1);
    assert_eq!(log.remaining_proxies, 1);
    listener.clear();

    let log = engine
        .sync(&change("/people.model", "1"), &resource(vec![person("p", "Frank")]))
        .unwrap();
    assert_eq!(log.stats.proxies_resolved, 1);
    assert_eq!(log.remaining_proxies, 0);
    assert!(log.model_events().any(|e| matches!(
        e,
        ChangeEvent::ReferenceAdded { label, transient: false, .. } if label == "author"
    )));
    assert_eq!(listener.count("link author"), 1);
    assert!(snapshot(engine.store())
        .contains("repo||/books.model#b0 -author-> repo||/people.model#p"));
}

#[test]
fn removing_the_target_file_restores_the_proxy() {
    let mut engine = engine();
    engine
        .sync(&change("/people.model", "1"), &resource(vec![person("p", "Frank")]))
        .unwrap();
    engine
        .sync(
            &change("/books.model", "1"),
            &resource(vec![book_by("b0", "Dune", 412, ReferenceTarget::in_file("p", people()))]),
        )
        .unwrap();
    assert_eq!(engine.pending_proxies(), 0);

    let log = engine.remove_file(&people()).unwrap();
    assert_eq!(log.strategy, SyncStrategy::Removal);
    assert_eq!(log.stats.removed, 1);
    assert_eq!(log.stats.proxies_created, 1);
    assert_eq!(log.remaining_proxies, 1);
    assert_eq!(engine.stats().files, 1);
    assert!(!snapshot(engine.store())
        .iter()
        .any(|line| line.contains("-author->")));

    engine
        .sync(&change("/people.model", "2"), &resource(vec![person("p", "Frank")]))
        .unwrap();
    assert_eq!(engine.pending_proxies(), 0);
    assert!(snapshot(engine.store())
        .contains("repo||/books.model#b0 -author-> repo||/people.model#p"));
}

#[test]
fn element_dropped_by_a_patch_leaves_a_proxy_on_its_file() {
    let mut engine = engine_with(SyncConfig::time_aware());
    engine
        .sync(
            &change("/people.model", "1"),
            &resource(vec![person("p", "Frank"), person("q", "Jane")]),
        )
        .unwrap();
    engine
        .sync(
            &change("/books.model", "1"),
            &resource(vec![book_by("b0", "Dune", 412, ReferenceTarget::in_file("p", people()))]),
        )
        .unwrap();
    assert_eq!(engine.pending_proxies(), 0);

    let log = engine
        .sync(&change("/people.model", "2"), &resource(vec![person("q", "Jane")]))
        .unwrap();
    assert_eq!(log.strategy, SyncStrategy::Patch);
    assert_eq!(log.stats.removed, 1);
    assert_eq!(log.remaining_proxies, 1);
    let b0 = engine
        .element(&FileKey::new(REPO, "/books.model"), "b0")
        .unwrap()
        .unwrap();
    assert_eq!(
        ProxyDictionary::sources(engine.store(), &people().render()),
        vec![b0]
    );
    assert!(!snapshot(engine.store())
        .iter()
        .any(|line| line.contains("-author->")));

    engine
        .sync(
            &change("/people.model", "3"),
            &resource(vec![person("p", "Frank"), person("q", "Jane")]),
        )
        .unwrap();
    assert_eq!(engine.pending_proxies(), 0);
    assert!(snapshot(engine.store())
        .contains("repo||/books.model#b0 -author-> repo||/people.model#p"));
}

#[test]
fn cancelled_resolution_resumes_after_reset() {
    let mut engine = engine();
    engine.cancel_token().cancel();
    engine
        .sync(
            &change("/books.model", "1"),
            &resource(vec![book_by("b0", "Dune", 412, ReferenceTarget::in_file("p", people()))]),
        )
        .unwrap();
    let log = engine
        .sync(&change("/people.model", "1"), &resource(vec![person("p", "Frank")]))
        .unwrap();
    assert!(log.cancelled);
    assert_eq!(log.remaining_proxies, 1);
    assert_eq!(engine.resolve_proxies().unwrap(), 1);

    engine.reset_cancel();
    assert!(!engine.is_cancelled());
    assert_eq!(engine.resolve_proxies().unwrap(), 0);
    assert!(snapshot(engine.store())
        .contains("repo||/books.model#b0 -author-> repo||/people.model#p"));
}

#[test]
fn removing_an_unknown_file_fails() {
    let mut engine = engine();
    assert!(engine.remove_file(&people()).is_err());
}

#[test]
fn wildcard_targets_resolve_in_any_file() {
    let mut engine = engine();
    engine
        .sync(
            &change("/books.model", "1"),
            &resource(vec![book_by("b0", "Dune", 412, ReferenceTarget::anywhere("p"))]),
        )
        .unwrap();
    assert_eq!(engine.pending_proxies(), 1);

    engine
        .sync(&change("/elsewhere.model", "1"), &resource(vec![person("p", "Frank")]))
        .unwrap();
    assert_eq!(engine.pending_proxies(), 0);
    assert!(snapshot(engine.store())
        .contains("repo||/books.model#b0 -author-> repo||/elsewhere.model#p"));
}

#[test]
fn deferred_resolution_links_everything_at_once() {
    let config = SyncConfig {
        resolve_on_sync: false,
        ..SyncConfig::default()
    };
    let mut engine = engine_with(config);
    engine
        .sync(
            &change("/books.model", "1"),
            &resource(vec![
                book_by("b0", "Dune", 412, ReferenceTarget::in_file("p", people())),
                book_by("b1", "Emma", 320, ReferenceTarget::local("b0")),
            ]),
        )
        .unwrap();
    engine
        .sync(&change("/people.model", "1"), &resource(vec![person("p", "Frank")]))
        .unwrap();
    assert_eq!(engine.pending_proxies(), 2);

    let report = engine.resolve_proxies_report().unwrap();
    assert_eq!(report.resolved, 2);
    assert_eq!(report.remaining, 0);
    assert!(!report.cancelled);
}

#[test]
fn missing_local_target_is_linked_once_it_appears() {
    let mut engine = engine();
    let dangling = book_by("b0", "Dune", 412, ReferenceTarget::local("p"));
    engine
        .sync(&change("/lib.model", "1"), &resource(vec![dangling.clone()]))
        .unwrap();
    assert_eq!(engine.pending_proxies(), 1);

    engine
        .sync(
            &change("/lib.model", "2"),
            &resource(vec![dangling, person("p", "Frank")]),
        )
        .unwrap();
    assert_eq!(engine.pending_proxies(), 0);
    assert!(snapshot(engine.store()).contains("repo||/lib.model#b0 -author-> repo||/lib.model#p"));
}
