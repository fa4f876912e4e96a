//! `<location>` block resolution, override semantics, and passthrough.

use std::rc::Rc;

use strata::{MemoryHost, SaveMode};

use super::test_utils::{open_machine_app, X_DECLARATION};

fn machine_with_x() -> String {
    format!(r#"<configuration>{X_DECLARATION}</configuration>"#)
}

#[test]
fn location_overrides_apply_to_their_sub_path() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &machine_with_x(),
        r#"<configuration>
             <x a="1"/>
             <location path="api">
               <x a="9"/>
             </location>
           </configuration>"#,
    )
    .unwrap();

    let api = cfg.find_location_configuration("api").unwrap();
    assert_eq!(api.location_subpath().as_deref(), Some("api"));

    let section = api.section("x").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().get_int("a").unwrap(), 9);

    // The root value is visible through the location's parent chain.
    let parent = api.parent().unwrap();
    let parent_section = parent.section("x").unwrap().unwrap();
    assert_eq!(
        parent_section.borrow().element().unwrap().get_int("a").unwrap(),
        1
    );
}

#[test]
fn longest_prefix_wins_and_must_be_segment_aligned() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &machine_with_x(),
        r#"<configuration>
             <location path="admin"><x a="1"/></location>
             <location path="admin/users"><x a="2"/></location>
           </configuration>"#,
    )
    .unwrap();

    let resolved = cfg.find_location_configuration("admin/users/profile").unwrap();
    assert_eq!(resolved.location_subpath().as_deref(), Some("admin/users"));

    let resolved = cfg.find_location_configuration("admin/other").unwrap();
    assert_eq!(resolved.location_subpath().as_deref(), Some("admin"));

    // "administration" is not under "admin": the lookup falls back to the
    // configuration itself.
    let resolved = cfg.find_location_configuration("administration").unwrap();
    assert_eq!(resolved.location_subpath(), None);
}

#[test]
fn exact_match_lookup_is_case_insensitive() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &machine_with_x(),
        r#"<configuration><location path="Admin"><x a="3"/></location></configuration>"#,
    )
    .unwrap();
    let opened = cfg.open_location("admin").unwrap().unwrap();
    let section = opened.section("x").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().get_int("a").unwrap(), 3);
    assert!(cfg.open_location("other").unwrap().is_none());
}

#[test]
fn unopened_location_passes_through_a_save_verbatim() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &machine_with_x(),
        r#"<configuration>
             <x a="1"/>
             <location path="api" allowOverride="false">
               <x a="9" b="4"/>
             </location>
           </configuration>"#,
    )
    .unwrap();

    cfg.section("x").unwrap().unwrap();
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"<location path="api" allowOverride="false">"#), "{saved}");
    assert!(saved.contains(r#"<x a="9" b="4"/>"#), "location content verbatim: {saved}");
}

#[test]
fn opened_location_is_reserialized_as_a_delta() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &machine_with_x(),
        r#"<configuration>
             <x a="1" b="7"/>
             <location path="api">
               <x a="9" b="7"/>
             </location>
           </configuration>"#,
    )
    .unwrap();

    // Open the location, change nothing, save.
    cfg.find_location_configuration("api").unwrap();
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"<location path="api">"#), "{saved}");
    // Values read from the location block itself are preserved.
    assert!(saved.contains(r#"a="9""#), "{saved}");

    // Mutate through the opened location and save again.
    let api = cfg.find_location_configuration("api").unwrap();
    {
        let section = api.section("x").unwrap().unwrap();
        let mut section = section.borrow_mut();
        section.element_mut().unwrap().set("b", 8i64).unwrap();
    }
    cfg.save(SaveMode::Modified).unwrap();
    let saved = host.get("app.config").unwrap();
    assert!(saved.contains(r#"b="8""#), "{saved}");
}

#[test]
fn duplicate_location_paths_are_rejected() {
    let host = Rc::new(MemoryHost::new());
    let err = open_machine_app(
        &host,
        &machine_with_x(),
        r#"<configuration>
             <location path="api"><x a="1"/></location>
             <location path="API"><x a="2"/></location>
           </configuration>"#,
    )
    .unwrap_err();
    assert!(matches!(err, strata::ConfigError::DuplicateMember { .. }), "{err}");
}

#[test]
fn location_paths_reject_leading_separators() {
    let host = Rc::new(MemoryHost::new());
    let err = open_machine_app(
        &host,
        &machine_with_x(),
        r#"<configuration><location path="/api"><x a="1"/></location></configuration>"#,
    )
    .unwrap_err();
    assert!(matches!(err, strata::ConfigError::Format { .. }), "{err}");
}

#[test]
fn location_sections_honor_allow_location_policy() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        r#"<configuration>
             <configSections>
               <section name="x" type="tests.XSection" allowLocation="false"/>
             </configSections>
           </configuration>"#,
        r#"<configuration><location path="api"><x a="9"/></location></configuration>"#,
    )
    .unwrap();

    // The violation surfaces when the location content is parsed.
    let err = cfg.find_location_configuration("api").unwrap_err();
    assert!(matches!(err, strata::ConfigError::SectionPlacement { .. }), "{err}");
}
