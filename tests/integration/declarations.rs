//! Declaration-tree behavior across chain files.

use std::rc::Rc;

use strata::{ConfigError, ConfigLevel, MemoryHost, SaveMode};

use super::test_utils::{open_chain, open_machine_app, X_DECLARATION};

#[test]
fn undeclared_section_data_fails() {
    let host = Rc::new(MemoryHost::new());
    let err = open_machine_app(
        &host,
        r#"<configuration/>"#,
        r#"<configuration><mystery a="1"/></configuration>"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UndeclaredSection { .. }), "{err}");
}

#[test]
fn declarations_flow_down_the_chain() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}</configuration>"#),
        r#"<configuration><x a="4"/></configuration>"#,
    )
    .unwrap();
    let section = cfg.section("x").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().get_int("a").unwrap(), 4);
}

#[test]
fn child_file_can_remove_an_inherited_declaration() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}</configuration>"#),
        r#"<configuration><configSections><remove name="x"/></configSections></configuration>"#,
    )
    .unwrap();
    // Gone at the app level…
    assert!(cfg.section("x").unwrap().is_none());
    // …but untouched at the machine level (copy-on-first-declare).
    assert!(cfg.parent().unwrap().section("x").unwrap().is_some());
}

#[test]
fn redeclaring_with_a_different_type_fails() {
    let host = Rc::new(MemoryHost::new());
    let err = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}</configuration>"#),
        r#"<configuration><configSections><section name="x" type="another.Type"/></configSections></configuration>"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, ConfigError::DuplicateSectionDeclaration { .. }),
        "{err}"
    );
}

#[test]
fn config_sections_must_precede_data() {
    let host = Rc::new(MemoryHost::new());
    let err = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}</configuration>"#),
        &format!(r#"<configuration><x a="1"/>{X_DECLARATION}</configuration>"#),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Format { .. }), "{err}");
}

#[test]
fn grouped_sections_resolve_by_path() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        r#"<configuration>
             <configSections>
               <sectionGroup name="system">
                 <section name="x" type="tests.XSection"/>
               </sectionGroup>
             </configSections>
             <system><x a="11"/></system>
           </configuration>"#,
        r#"<configuration/>"#,
    )
    .unwrap();
    let section = cfg.section("system/x").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().get_int("a").unwrap(), 11);
    assert_eq!(section.borrow().name(), "x");
}

#[test]
fn group_wrapper_is_reproduced_on_save() {
    let host = Rc::new(MemoryHost::new());
    host.put(
        "machine.config",
        r#"<configuration>
             <configSections>
               <sectionGroup name="system">
                 <section name="x" type="tests.XSection"/>
               </sectionGroup>
             </configSections>
           </configuration>"#,
    );
    host.put(
        "app.config",
        r#"<configuration><system><x a="5"/></system></configuration>"#,
    );
    let cfg = open_chain(
        &host,
        &[
            (ConfigLevel::Machine, "machine.config"),
            (ConfigLevel::Application, "app.config"),
        ],
    )
    .unwrap();

    cfg.section("system/x").unwrap().unwrap();
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains("<system>"), "{saved}");
    assert!(saved.contains(r#"a="5""#), "{saved}");
}

#[test]
fn placement_policy_rejects_data_below_machine() {
    let host = Rc::new(MemoryHost::new());
    let err = open_machine_app(
        &host,
        r#"<configuration>
             <configSections>
               <section name="x" type="tests.XSection" allowExeDefinition="MachineOnly"/>
             </configSections>
           </configuration>"#,
        r#"<configuration><x a="1"/></configuration>"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::SectionPlacement { .. }), "{err}");
}

#[test]
fn machine_only_data_is_fine_at_machine_level() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        r#"<configuration>
             <configSections>
               <section name="x" type="tests.XSection" allowExeDefinition="MachineOnly"/>
             </configSections>
             <x a="2"/>
           </configuration>"#,
        r#"<configuration/>"#,
    )
    .unwrap();
    let section = cfg.section("x").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().get_int("a").unwrap(), 2);
}

#[test]
fn declarations_are_written_back_by_their_owner() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(
        &host,
        &format!(r#"<configuration>{X_DECLARATION}<x a="1"/></configuration>"#),
        r#"<configuration/>"#,
    )
    .unwrap();

    let machine = cfg.parent().unwrap();
    machine.section("x").unwrap().unwrap();
    machine.save(SaveMode::Modified).unwrap();

    let saved = host.get("machine.config").unwrap();
    assert!(saved.contains("<configSections>"), "{saved}");
    assert!(
        saved.contains(r#"<section name="x" type="tests.XSection"/>"#),
        "{saved}"
    );
    assert!(saved.contains(r#"a="1""#), "{saved}");
}

#[test]
fn declaring_a_section_programmatically() {
    let host = Rc::new(MemoryHost::new());
    let cfg = open_machine_app(&host, "<configuration/>", "<configuration/>").unwrap();

    let handle = cfg.declare_section("", "x", "tests.XSection").unwrap();
    {
        let mut section = handle.borrow_mut();
        section.element_mut().unwrap().set("a", 9i64).unwrap();
    }
    cfg.save(SaveMode::Modified).unwrap();

    let saved = host.get("app.config").unwrap();
    assert!(saved.contains("<configSections>"), "{saved}");
    assert!(saved.contains(r#"a="9""#), "{saved}");

    // Reload the chain and read the value back.
    let reloaded = open_machine_app(
        &host,
        &host.get("machine.config").unwrap(),
        &host.get("app.config").unwrap(),
    )
    .unwrap();
    let section = reloaded.section("x").unwrap().unwrap();
    assert_eq!(section.borrow().element().unwrap().get_int("a").unwrap(), 9);
}
