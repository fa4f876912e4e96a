//! Collection inheritance and diffing across a chain.

use std::rc::Rc;

use strata::sections::{insert, lookup, remove};
use strata::{CollectionKey, ConfigError, MemoryHost, SaveMode, Value};

use super::test_utils::{open_machine_app, SETTINGS_DECLARATION};

#[test]
fn inherited_and_local_items_merge() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(
            r#"<configuration>{SETTINGS_DECLARATION}<appSettings><add key="k1" value="v1"/></appSettings></configuration>"#
        ),
        r#"<configuration><appSettings><add key="k2" value="v2"/></appSettings></configuration>"#,
    )
    .unwrap();

    let section = cfg.section("appSettings").unwrap().unwrap();
    let section = section.borrow();
    let element = section.element().unwrap();
    assert_eq!(lookup(element, "k1").as_deref(), Some("v1"));
    assert_eq!(lookup(element, "k2").as_deref(), Some("v2"));
    assert_eq!(element.item_count(), 2);
    assert_eq!(element.inherited_item_count(), 1);
}

#[test]
fn file_remove_drops_an_inherited_item() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(
            r#"<configuration>{SETTINGS_DECLARATION}<appSettings><add key="k1" value="v1"/></appSettings></configuration>"#
        ),
        r#"<configuration><appSettings><remove key="k1"/><add key="k2" value="v2"/></appSettings></configuration>"#,
    )
    .unwrap();

    let section = cfg.section("appSettings").unwrap().unwrap();
    let section = section.borrow();
    let element = section.element().unwrap();
    assert_eq!(lookup(element, "k1"), None, "removed by this file");
    assert_eq!(lookup(element, "k2").as_deref(), Some("v2"));
}

#[test]
fn file_remove_is_persisted_on_save() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(
            r#"<configuration>{SETTINGS_DECLARATION}<appSettings><add key="k1" value="v1"/></appSettings></configuration>"#
        ),
        r#"<configuration><appSettings><remove key="k1"/></appSettings></configuration>"#,
    )
    .unwrap();

    cfg.section("appSettings").unwrap().unwrap();
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"<remove key="k1"/>"#), "{saved}");
    assert!(!saved.contains("<add"), "{saved}");
}

#[test]
fn api_removal_of_inherited_item_is_rejected() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(
            r#"<configuration>{SETTINGS_DECLARATION}<appSettings><add key="k1" value="v1"/></appSettings></configuration>"#
        ),
        r#"<configuration><appSettings><add key="k2" value="v2"/></appSettings></configuration>"#,
    )
    .unwrap();

    let section = cfg.section("appSettings").unwrap().unwrap();
    let mut section = section.borrow_mut();
    let element = section.element_mut().unwrap();

    let err = remove(element, "k1").unwrap_err();
    assert!(matches!(err, ConfigError::InheritedItemRemoval { .. }));

    // An item added at this level removes fine.
    remove(element, "k2").unwrap();
    assert_eq!(lookup(element, "k2"), None);
}

#[test]
fn duplicate_keys_are_rejected() {
    let host = Rc::new(MemoryHost::new());
    let err = open_machine_app(
        &host,
        &format!(r#"<configuration>{SETTINGS_DECLARATION}</configuration>"#),
        r#"<configuration><appSettings><add key="k" value="a"/><add key="k" value="b"/></appSettings></configuration>"#,
    )
    .unwrap_err();
    match err {
        ConfigError::Positioned { source, .. } => {
            assert!(matches!(*source, ConfigError::DuplicateKey { .. }))
        }
        other => panic!("expected duplicate-key error, got {other:?}"),
    }
}

#[test]
fn value_equal_duplicate_is_tolerated() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{SETTINGS_DECLARATION}</configuration>"#),
        r#"<configuration><appSettings><add key="k" value="a"/><add key="k" value="a"/></appSettings></configuration>"#,
    )
    .unwrap();
    let section = cfg.section("appSettings").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().item_count(), 1);
}

#[test]
fn clear_discards_inherited_items_and_round_trips() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(
            r#"<configuration>{SETTINGS_DECLARATION}<appSettings><add key="k1" value="v1"/></appSettings></configuration>"#
        ),
        r#"<configuration><appSettings><clear/><add key="k2" value="v2"/></appSettings></configuration>"#,
    )
    .unwrap();

    {
        let section = cfg.section("appSettings").unwrap().unwrap();
        let section = section.borrow();
        let element = section.element().unwrap();
        assert_eq!(lookup(element, "k1"), None);
        assert_eq!(lookup(element, "k2").as_deref(), Some("v2"));
        assert_eq!(element.inherited_item_count(), 0);
    }

    cfg.save(SaveMode::Modified).unwrap();
    let saved = host.get("app.config").unwrap();
    let clear_at = saved.find("<clear/>").expect("clear survives the save");
    let add_at = saved.find("<add").expect("local item survives the save");
    assert!(clear_at < add_at, "clear precedes adds: {saved}");
}

#[test]
fn programmatic_edits_diff_against_the_chain() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(
            r#"<configuration>{SETTINGS_DECLARATION}<appSettings><add key="base" value="1"/></appSettings></configuration>"#
        ),
        r#"<configuration/>"#,
    )
    .unwrap();

    {
        let section = cfg.section("appSettings").unwrap().unwrap();
        let mut section = section.borrow_mut();
        insert(section.element_mut().unwrap(), "extra", "2").unwrap();
    }
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"key="extra""#), "{saved}");
    assert!(
        !saved.contains(r#"key="base""#),
        "inherited item not re-emitted: {saved}"
    );
}

#[test]
fn overriding_an_inherited_item_emits_the_override_only() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(
            r#"<configuration>{SETTINGS_DECLARATION}<appSettings><add key="k" value="old"/></appSettings></configuration>"#
        ),
        r#"<configuration><appSettings><add key="k" value="new"/></appSettings></configuration>"#,
    )
    .unwrap();

    {
        let section = cfg.section("appSettings").unwrap().unwrap();
        let section = section.borrow();
        assert_eq!(lookup(section.element().unwrap(), "k").as_deref(), Some("new"));
    }

    cfg.save(SaveMode::Modified).unwrap();
    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"value="new""#), "{saved}");
    assert!(!saved.contains(r#"value="old""#), "{saved}");
}

#[test]
fn collection_key_lookup_is_by_key_properties() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{SETTINGS_DECLARATION}</configuration>"#),
        r#"<configuration><appSettings><add key="k" value="v"/></appSettings></configuration>"#,
    )
    .unwrap();
    let section = cfg.section("appSettings").unwrap().unwrap();
    let section = section.borrow();
    let element = section.element().unwrap();
    let key = CollectionKey::of(&[("key", Value::from("k"))]);
    assert!(element.find_item(&key).is_some());
    let missing = CollectionKey::of(&[("key", Value::from("other"))]);
    assert!(element.find_item(&missing).is_none());
}
