//! Element type descriptors and the type activation registry.
//!
//! The registry is the injected activation collaborator: the embedding
//! application registers every element, section, and section-group type it
//! knows under a string name, and the store activates instances by the type
//! names found in section declarations. An unknown name is distinguishable
//! from a construction failure: the former degrades to an ignore
//! placeholder section, the latter is fatal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::element::ConfigElement;
use crate::error::{ConfigError, SchemaError};
use crate::schema::property::{PropertySchema, PropertySchemaBuilder};
use crate::schema::type_map::{shared_type_map, ElementTypeMap};
use crate::value::Value;

/// How a collection encodes its items in XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionShape {
    /// Explicit `<add>`/`<remove>`/`<clear>` children. The default.
    AddRemoveClearMap,
    /// As above, but new items are inserted before inherited ones.
    AddRemoveClearMapAlternate,
    /// Children are themselves the items, matched by tag name.
    BasicMap,
    /// As above, with new items before inherited ones.
    BasicMapAlternate,
}

impl CollectionShape {
    /// Whether inherited items sit at the end (local items first).
    pub fn inherited_last(&self) -> bool {
        matches!(
            self,
            CollectionShape::AddRemoveClearMapAlternate | CollectionShape::BasicMapAlternate
        )
    }

    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            CollectionShape::BasicMap | CollectionShape::BasicMapAlternate
        )
    }
}

/// Collection behavior of an element type.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub shape: CollectionShape,
    /// Registered element type of the items.
    pub item_type: String,
    pub add_name: String,
    pub remove_name: String,
    pub clear_name: String,
    /// Item tag for the basic-map shapes.
    pub item_name: String,
    pub allow_duplicates: bool,
}

impl CollectionSpec {
    pub fn add_remove_clear(item_type: impl Into<String>) -> Self {
        CollectionSpec {
            shape: CollectionShape::AddRemoveClearMap,
            item_type: item_type.into(),
            add_name: "add".to_string(),
            remove_name: "remove".to_string(),
            clear_name: "clear".to_string(),
            item_name: "item".to_string(),
            allow_duplicates: false,
        }
    }

    pub fn basic(item_type: impl Into<String>, item_name: impl Into<String>) -> Self {
        CollectionSpec {
            shape: CollectionShape::BasicMap,
            item_type: item_type.into(),
            add_name: "add".to_string(),
            remove_name: "remove".to_string(),
            clear_name: "clear".to_string(),
            item_name: item_name.into(),
            allow_duplicates: false,
        }
    }

    pub fn shape(mut self, shape: CollectionShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn names(
        mut self,
        add: impl Into<String>,
        remove: impl Into<String>,
        clear: impl Into<String>,
    ) -> Self {
        self.add_name = add.into();
        self.remove_name = remove.into();
        self.clear_name = clear.into();
        self
    }

    pub fn duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }
}

/// What a hook decided about an unrecognized member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unrecognized {
    /// Not handled; the deserializer fails.
    Error,
    /// Consumed and ignored.
    Skip,
}

/// Strategy hooks replacing the original's subclass overrides.
///
/// The default implementation rejects everything, which is the behavior of
/// an element with no special handling.
pub trait ElementHooks: Send + Sync {
    fn on_unrecognized_attribute(
        &self,
        _element: &mut ConfigElement,
        _name: &str,
        _value: &str,
    ) -> Result<Unrecognized, ConfigError> {
        Ok(Unrecognized::Error)
    }

    fn on_unrecognized_element(
        &self,
        _element: &mut ConfigElement,
        _name: &str,
    ) -> Result<Unrecognized, ConfigError> {
        Ok(Unrecognized::Error)
    }

    /// Called when a required property is absent after a full read. Return
    /// `Some(value)` to supply a substitute, `None` to fail with the
    /// required-property error.
    fn on_required_missing(
        &self,
        _element: &mut ConfigElement,
        _property: &str,
    ) -> Result<Option<Value>, ConfigError> {
        Ok(None)
    }
}

/// The default hooks: every unrecognized member is an error.
pub struct DefaultHooks;

impl ElementHooks for DefaultHooks {}

/// A registered element type: name, property map, optional collection
/// behavior, and hooks.
pub struct ElementType {
    name: String,
    map: Arc<ElementTypeMap>,
    collection: Option<CollectionSpec>,
    hooks: Arc<dyn ElementHooks>,
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementType")
            .field("name", &self.name)
            .field("properties", &self.map.len())
            .field("collection", &self.collection)
            .finish()
    }
}

impl ElementType {
    pub fn builder(name: impl Into<String>) -> ElementTypeBuilder {
        ElementTypeBuilder {
            name: name.into(),
            properties: Vec::new(),
            collection: None,
            hooks: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map(&self) -> &Arc<ElementTypeMap> {
        &self.map
    }

    pub fn collection(&self) -> Option<&CollectionSpec> {
        self.collection.as_ref()
    }

    pub fn hooks(&self) -> &Arc<dyn ElementHooks> {
        &self.hooks
    }
}

pub struct ElementTypeBuilder {
    name: String,
    properties: Vec<PropertySchemaBuilder>,
    collection: Option<CollectionSpec>,
    hooks: Option<Arc<dyn ElementHooks>>,
}

impl ElementTypeBuilder {
    pub fn property(mut self, builder: PropertySchemaBuilder) -> Self {
        self.properties.push(builder);
        self
    }

    pub fn collection(mut self, spec: CollectionSpec) -> Self {
        self.collection = Some(spec);
        self
    }

    pub fn hooks(mut self, hooks: impl ElementHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn build(self) -> Result<Arc<ElementType>, SchemaError> {
        let mut built: Vec<PropertySchema> = Vec::with_capacity(self.properties.len());
        for builder in self.properties {
            built.push(builder.build()?);
        }
        let map = shared_type_map(&self.name, move || Ok(built))?;
        Ok(Arc::new(ElementType {
            name: self.name,
            map,
            collection: self.collection,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(DefaultHooks)),
        }))
    }
}

/// Kinds of names the registry can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisteredKind {
    Element,
    SectionGroup,
}

/// Type activation registry.
///
/// Built once by the embedding application and shared (immutably) by every
/// configuration chain that uses it.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<ElementType>>,
    groups: HashMap<String, String>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Register an element (or section) type. The last registration of a
    /// name wins, which lets applications shadow built-ins.
    pub fn register(&mut self, ty: Arc<ElementType>) {
        self.types.insert(ty.name().to_string(), ty);
    }

    /// Register a section-group marker type name.
    pub fn register_group(&mut self, type_name: impl Into<String>) {
        let name = type_name.into();
        self.groups.insert(name.clone(), name);
    }

    pub fn lookup(&self, type_name: &str) -> Option<&Arc<ElementType>> {
        self.types.get(type_name)
    }

    pub fn kind_of(&self, type_name: &str) -> Option<RegisteredKind> {
        if self.types.contains_key(type_name) {
            Some(RegisteredKind::Element)
        } else if self.groups.contains_key(type_name) {
            Some(RegisteredKind::SectionGroup)
        } else {
            None
        }
    }

    /// Activate a fresh element of a registered type.
    ///
    /// `None` from [`lookup`](Self::lookup) means "unknown name" and is the
    /// caller's decision point; this method is the "construction failure"
    /// side and returns a hard error when instantiation fails (for example
    /// an unregistered collection item type).
    pub fn instantiate(
        self: &Arc<Self>,
        ty: &Arc<ElementType>,
    ) -> Result<ConfigElement, ConfigError> {
        ConfigElement::new(Arc::clone(ty), Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assembles_type() {
        let ty = ElementType::builder("activation_tests.endpoint")
            .property(PropertySchema::text("name").key().required())
            .property(PropertySchema::int("port").default_value(80i64))
            .build()
            .unwrap();
        assert_eq!(ty.map().len(), 2);
        assert_eq!(ty.map().key_indexes().len(), 1);
    }

    #[test]
    fn registry_distinguishes_unknown_from_failure() {
        let mut registry = TypeRegistry::new();
        let ty = ElementType::builder("activation_tests.simple")
            .property(PropertySchema::text("name"))
            .build()
            .unwrap();
        registry.register(Arc::clone(&ty));
        let registry = Arc::new(registry);

        assert!(registry.lookup("activation_tests.simple").is_some());
        assert!(registry.lookup("no.such.type").is_none());
        assert!(registry.instantiate(&ty).is_ok());
    }

    #[test]
    fn group_markers_are_tracked() {
        let mut registry = TypeRegistry::new();
        registry.register_group("activation_tests.group");
        assert_eq!(
            registry.kind_of("activation_tests.group"),
            Some(RegisteredKind::SectionGroup)
        );
        assert_eq!(registry.kind_of("missing"), None);
    }
}
