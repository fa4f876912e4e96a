//! Chain inheritance: parent values seed child sections, local data
//! overrides them, and modified-mode saves emit only the local delta.

use std::rc::Rc;

use strata::{ConfigLevel, MemoryHost, SaveMode};

use super::test_utils::{open_chain, open_machine_app, X_DECLARATION};

#[test]
fn child_overrides_one_property_and_inherits_the_rest() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}<x a="0" b="2"/></configuration>"#),
        r#"<configuration><x a="1"/></configuration>"#,
    )
    .unwrap();

    let section = cfg.section("x").unwrap().unwrap();
    let section = section.borrow();
    let element = section.element().unwrap();
    assert_eq!(element.get_int("a").unwrap(), 1, "overridden locally");
    assert_eq!(element.get_int("b").unwrap(), 2, "inherited from machine");

    // The machine level still sees its own values.
    let parent = cfg.parent().unwrap();
    let parent_section = parent.section("x").unwrap().unwrap();
    assert_eq!(
        parent_section.borrow().element().unwrap().get_int("a").unwrap(),
        0
    );
}

#[test]
fn modified_save_emits_only_the_local_delta() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}<x a="0" b="2"/></configuration>"#),
        r#"<configuration><x a="1"/></configuration>"#,
    )
    .unwrap();

    // Materialize, then save without further changes.
    cfg.section("x").unwrap().unwrap();
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"a="1""#), "local override kept: {saved}");
    assert!(!saved.contains("b="), "inherited value not re-emitted: {saved}");
    assert!(
        !saved.contains("configSections"),
        "declarations belong to the machine file: {saved}"
    );
}

#[test]
fn programmatic_change_joins_the_delta() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}<x a="0" b="2"/></configuration>"#),
        r#"<configuration><x a="1"/></configuration>"#,
    )
    .unwrap();

    {
        let section = cfg.section("x").unwrap().unwrap();
        let mut section = section.borrow_mut();
        section.element_mut().unwrap().set("b", 5i64).unwrap();
    }
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"a="1""#));
    assert!(saved.contains(r#"b="5""#));
}

#[test]
fn level_without_backing_file_still_inherits() {
    let host = Rc::new(MemoryHost::new());
    host.put(
        "machine.config",
        format!(r#"<configuration>{X_DECLARATION}<x a="7"/></configuration>"#),
    );
    // No app.config or user.config exist.
    let cfg = open_chain(
        &host,
        &[
            (ConfigLevel::Machine, "machine.config"),
            (ConfigLevel::Application, "app.config"),
            (ConfigLevel::LocalUser, "user.config"),
        ],
    )
    .unwrap();

    assert!(!cfg.has_file());
    let section = cfg.section("x").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().get_int("a").unwrap(), 7);
}

#[test]
fn unchanged_child_saves_no_section_data() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}<x a="3"/></configuration>"#),
        r#"<configuration/>"#,
    )
    .unwrap();

    cfg.section("x").unwrap().unwrap();
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(!saved.contains("<x"), "no delta, no element: {saved}");
}

#[test]
fn full_save_emits_the_entire_effective_tree() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}<x a="0" b="2"/></configuration>"#),
        r#"<configuration><x a="1"/></configuration>"#,
    )
    .unwrap();

    cfg.section("x").unwrap().unwrap();
    cfg.save(SaveMode::Full).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"a="1""#));
    assert!(saved.contains(r#"b="2""#), "full mode emits inherited values: {saved}");
}
