//! Shared fixtures for the integration tests.

use std::rc::Rc;
use std::sync::Arc;

use strata::sections::register_builtins;
use strata::{
    ConfigHost, ConfigLevel, Configuration, ElementType, LevelStream, MemoryHost, PropertySchema,
    TypeRegistry,
};

/// Registry with the built-in key/value section plus a small typed section
/// used across the scenarios: `<x a=".." b=".."/>`.
pub fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    register_builtins(&mut registry).unwrap();
    let x = ElementType::builder("tests.XSection")
        .property(PropertySchema::int("a").default_value(0i64))
        .property(PropertySchema::int("b").default_value(0i64))
        .build()
        .unwrap();
    registry.register(x);
    Arc::new(registry)
}

/// Open a chain over an in-memory host. Streams are given outermost first.
pub fn open_chain(
    host: &Rc<MemoryHost>,
    levels: &[(ConfigLevel, &str)],
) -> Result<Configuration, strata::ConfigError> {
    let streams: Vec<LevelStream> = levels
        .iter()
        .map(|(level, stream)| LevelStream::new(*level, *stream))
        .collect();
    let dyn_host: Rc<dyn ConfigHost> = Rc::clone(host) as Rc<dyn ConfigHost>;
    Configuration::open(dyn_host, registry(), &streams)
}

/// Shorthand for the common two-level machine + application chain.
pub fn open_machine_app(
    host: &Rc<MemoryHost>,
    machine: &str,
    app: &str,
) -> Result<Configuration, strata::ConfigError> {
    host.put("machine.config", machine);
    host.put("app.config", app);
    open_chain(
        host,
        &[
            (ConfigLevel::Machine, "machine.config"),
            (ConfigLevel::Application, "app.config"),
        ],
    )
}

pub const X_DECLARATION: &str =
    r#"<configSections><section name="x" type="tests.XSection"/></configSections>"#;

pub const SETTINGS_DECLARATION: &str =
    r#"<configSections><section name="appSettings" type="Strata.KeyValueSection"/></configSections>"#;
