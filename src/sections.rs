//! Built-in section types.
//!
//! The key/value section is the workhorse concrete section: an
//! add/remove/clear collection of `{key, value}` items, registered under
//! [`KEY_VALUE_SECTION`]. The CLI registers it by default and tests use it
//! as the canonical section shape.

use crate::activation::{CollectionSpec, ElementType, TypeRegistry};
use crate::element::collection::CollectionKey;
use crate::element::ConfigElement;
use crate::error::{ConfigError, SchemaError};
use crate::schema::PropertySchema;
use crate::value::Value;

/// Registered type name of the key/value section.
pub const KEY_VALUE_SECTION: &str = "Strata.KeyValueSection";

/// Registered type name of its items.
pub const KEY_VALUE_ITEM: &str = "Strata.KeyValueItem";

/// Register the built-in element types.
pub fn register_builtins(registry: &mut TypeRegistry) -> Result<(), SchemaError> {
    let item = ElementType::builder(KEY_VALUE_ITEM)
        .property(PropertySchema::text("key").key().required())
        .property(PropertySchema::text("value"))
        .build()?;
    let section = ElementType::builder(KEY_VALUE_SECTION)
        .collection(CollectionSpec::add_remove_clear(KEY_VALUE_ITEM))
        .build()?;
    registry.register(item);
    registry.register(section);
    Ok(())
}

/// Look up a key's value in a key/value section element.
pub fn lookup(section: &ConfigElement, key: &str) -> Option<String> {
    let key = CollectionKey::of(&[("key", Value::from(key))]);
    section
        .find_item(&key)
        .and_then(|item| item.get_text("value").ok())
}

/// Insert or replace a key/value pair.
pub fn insert(section: &mut ConfigElement, key: &str, value: &str) -> Result<(), ConfigError> {
    let mut item = section.new_item()?;
    item.set("key", key)?;
    item.set("value", value)?;
    section.add_or_replace_item(item)
}

/// Remove a key, failing if it was inherited from a parent configuration.
pub fn remove(section: &mut ConfigElement, key: &str) -> Result<(), ConfigError> {
    let key = CollectionKey::of(&[("key", Value::from(key))]);
    section.remove_item(&key)
}
