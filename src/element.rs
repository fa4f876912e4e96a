//! Configuration Element
//!
//! The generic property bag at the heart of the store. An element is keyed
//! by its type's property schema: values are stored sparsely (absent means
//! "use the default"), child elements are recursed into, and an optional
//! embedded collection state replaces the original's collection subclass.
//!
//! The three algorithms that matter live here: `deserialize` (one XML
//! element into the bag), `reset` (seed inheritance from a parent element),
//! and `unmerge` (the three-way diff that keeps saved files minimal).

pub mod collection;
pub mod locks;
pub mod section;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::activation::{ElementType, TypeRegistry, Unrecognized};
use crate::element::collection::{CollectionKey, CollectionState};
use crate::element::locks::{LockState, PendingLocks};
use crate::error::{ConfigError, ValidationError};
use crate::value::Value;
use crate::xml::{Node, StartTag, XmlSource, XmlWriter};

/// How much of the effective tree a save should persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Only values that differ from the inherited baseline.
    Minimal,
    /// Locally changed values plus everything read from this file.
    #[default]
    Modified,
    /// The entire effective tree, defaults included.
    Full,
}

#[derive(Debug, Clone)]
pub(crate) struct ValueSlot {
    pub value: Value,
    /// Set by programmatic assignment since the last load/save.
    pub modified: bool,
    /// Seeded from a parent element rather than read from this file.
    pub inherited: bool,
}

impl ValueSlot {
    fn local(value: Value) -> Self {
        ValueSlot {
            value,
            modified: false,
            inherited: false,
        }
    }

    fn inherited(value: Value) -> Self {
        ValueSlot {
            value,
            modified: false,
            inherited: true,
        }
    }
}

#[derive(Clone)]
pub struct ConfigElement {
    ty: Arc<ElementType>,
    registry: Arc<TypeRegistry>,
    /// Parallel to the type map's property list.
    values: Vec<Option<ValueSlot>>,
    collection: Option<CollectionState>,
    tag_name: Option<String>,
    read_only: bool,
    modified: bool,
    element_present: bool,
    locks: LockState,
}

impl std::fmt::Debug for ConfigElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigElement")
            .field("type", &self.ty.name())
            .field("values", &self.values.iter().filter(|v| v.is_some()).count())
            .field("collection", &self.collection)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl ConfigElement {
    /// Activate an empty element. Element-typed properties are materialized
    /// eagerly, so element type graphs must be acyclic.
    pub(crate) fn new(
        ty: Arc<ElementType>,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self, ConfigError> {
        let map = Arc::clone(ty.map());
        let mut values: Vec<Option<ValueSlot>> = (0..map.len()).map(|_| None).collect();
        for (idx, prop) in map.iter() {
            if let Some(child_type) = prop.element_type() {
                let child_ty =
                    registry
                        .lookup(child_type)
                        .ok_or_else(|| ConfigError::TypeActivation {
                            type_name: child_type.to_string(),
                            message: "element type is not registered".to_string(),
                        })?;
                let child = ConfigElement::new(Arc::clone(child_ty), Arc::clone(&registry))?;
                values[idx] = Some(ValueSlot::local(Value::Element(Box::new(child))));
            }
        }
        let collection = match ty.collection() {
            Some(spec) => {
                let item_ty = registry.lookup(&spec.item_type).ok_or_else(|| {
                    ConfigError::TypeActivation {
                        type_name: spec.item_type.clone(),
                        message: "collection item type is not registered".to_string(),
                    }
                })?;
                Some(CollectionState::new(
                    spec.clone(),
                    Arc::clone(item_ty),
                    Arc::clone(&registry),
                ))
            }
            None => None,
        };
        Ok(ConfigElement {
            ty,
            registry,
            values,
            collection,
            tag_name: None,
            read_only: false,
            modified: false,
            element_present: false,
            locks: LockState::default(),
        })
    }

    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    pub fn element_type(&self) -> &Arc<ElementType> {
        &self.ty
    }

    /// The tag this element was read with, if it came from a file.
    pub fn tag_name(&self) -> Option<&str> {
        self.tag_name.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Permanently mark the element (and its subtree) read-only.
    pub fn set_read_only(&mut self) {
        self.read_only = true;
        for slot in self.values.iter_mut().flatten() {
            if let Some(child) = slot.value.as_element_mut() {
                child.set_read_only();
            }
        }
        if let Some(col) = &mut self.collection {
            col.set_read_only();
        }
    }

    /// Whether this element was present in the file it was read from.
    pub fn was_present(&self) -> bool {
        self.element_present
    }

    fn lookup(&self, name: &str) -> Result<usize, ConfigError> {
        self.ty
            .map()
            .get(name)
            .map(|(idx, _)| idx)
            .ok_or_else(|| ConfigError::UnknownProperty {
                type_name: self.ty.name().to_string(),
                property: name.to_string(),
            })
    }

    /// Effective value of a property by schema index: the stored value or
    /// the schema default.
    pub(crate) fn effective_by_index(&self, idx: usize) -> Value {
        match &self.values[idx] {
            Some(slot) => slot.value.clone(),
            None => self.ty.map().by_index(idx).default_value(),
        }
    }

    /// Effective value of a named property (default fallback for absent
    /// values).
    pub fn get(&self, name: &str) -> Result<Value, ConfigError> {
        let idx = self.lookup(name)?;
        Ok(self.effective_by_index(idx))
    }

    pub fn get_text(&self, name: &str) -> Result<String, ConfigError> {
        self.typed(name, |v| v.as_text().map(str::to_string), "text")
    }

    pub fn get_int(&self, name: &str) -> Result<i64, ConfigError> {
        self.typed(name, Value::as_int, "int")
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ConfigError> {
        self.typed(name, Value::as_bool, "bool")
    }

    pub fn get_float(&self, name: &str) -> Result<f64, ConfigError> {
        self.typed(name, Value::as_float, "float")
    }

    fn typed<T>(
        &self,
        name: &str,
        extract: impl Fn(&Value) -> Option<T>,
        expected: &str,
    ) -> Result<T, ConfigError> {
        let value = self.get(name)?;
        extract(&value).ok_or_else(|| {
            ValidationError::TypeMismatch {
                property: name.to_string(),
                expected: expected.to_string(),
                found: value.value_type().to_string(),
            }
            .into()
        })
    }

    /// Assign a property. The value is type-checked and validated; a value
    /// equal to the property default is dropped from the bag so that
    /// modified-mode saves stay minimal.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let value = value.into();
        let idx = self.lookup(name)?;
        let prop = Arc::clone(self.ty.map().by_index(idx));
        if self.read_only {
            return Err(ConfigError::ReadOnly {
                what: format!("element '{}'", self.ty.name()),
            });
        }
        if self.locks.attribute_locked(name) {
            return Err(ConfigError::PropertyLocked {
                property: name.to_string(),
            });
        }
        prop.check_assignment(&value)?;
        // Keep the bag minimal: an assignment that changes nothing (the
        // slot already holds this value, or the property sits untouched at
        // its default) leaves the bag alone. A real change is stored even
        // when the new value equals the schema default, because it may be
        // overriding a different inherited value; only unmerge knows the
        // baseline.
        let unchanged = match &self.values[idx] {
            Some(slot) => slot.value == value,
            None => !prop.is_element() && value == prop.default_value(),
        };
        if unchanged {
            return Ok(());
        }
        self.values[idx] = Some(ValueSlot {
            value,
            modified: true,
            inherited: false,
        });
        self.modified = true;
        Ok(())
    }

    /// Borrow the child element of an element-typed property.
    pub fn child(&self, name: &str) -> Result<&ConfigElement, ConfigError> {
        let idx = self.lookup(name)?;
        self.child_by_index(idx)
            .ok_or_else(|| self.not_an_element(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Result<&mut ConfigElement, ConfigError> {
        let idx = self.lookup(name)?;
        let err = self.not_an_element(name);
        self.child_by_index_mut(idx).ok_or(err)
    }

    fn not_an_element(&self, name: &str) -> ConfigError {
        ValidationError::TypeMismatch {
            property: name.to_string(),
            expected: "element".to_string(),
            found: self
                .ty
                .map()
                .get(name)
                .map(|(_, p)| p.value_type().to_string())
                .unwrap_or_default(),
        }
        .into()
    }

    pub(crate) fn child_by_index(&self, idx: usize) -> Option<&ConfigElement> {
        match &self.values[idx] {
            Some(slot) => slot.value.as_element(),
            None => None,
        }
    }

    pub(crate) fn child_by_index_mut(&mut self, idx: usize) -> Option<&mut ConfigElement> {
        match &mut self.values[idx] {
            Some(slot) => slot.value.as_element_mut(),
            None => None,
        }
    }

    /// Whether the element carries anything worth serializing.
    pub(crate) fn has_values(&self) -> bool {
        for (idx, prop) in self.ty.map().iter() {
            if prop.is_element() {
                if self.child_by_index(idx).is_some_and(Self::has_values) {
                    return true;
                }
            } else if self.values[idx].is_some() {
                return true;
            }
        }
        self.collection
            .as_ref()
            .is_some_and(CollectionState::has_content)
    }

    /// Whether this element or any descendant was modified since the last
    /// load or save.
    pub fn is_modified(&self) -> bool {
        if self.modified {
            return true;
        }
        for slot in self.values.iter().flatten() {
            if slot.modified {
                return true;
            }
            if let Some(child) = slot.value.as_element() {
                if child.is_modified() {
                    return true;
                }
            }
        }
        self.collection.as_ref().is_some_and(CollectionState::is_modified)
    }

    pub(crate) fn reset_modified(&mut self) {
        self.modified = false;
        for slot in self.values.iter_mut().flatten() {
            slot.modified = false;
            if let Some(child) = slot.value.as_element_mut() {
                child.reset_modified();
            }
        }
        if let Some(col) = &mut self.collection {
            col.reset_modified();
        }
    }

    // ---- collection facade -------------------------------------------------

    fn collection_ref(&self) -> Result<&CollectionState, ConfigError> {
        self.collection
            .as_ref()
            .ok_or_else(|| ConfigError::UnknownProperty {
                type_name: self.ty.name().to_string(),
                property: "(collection)".to_string(),
            })
    }

    fn collection_mut_checked(&mut self) -> Result<&mut CollectionState, ConfigError> {
        if self.read_only {
            return Err(ConfigError::ReadOnly {
                what: format!("collection '{}'", self.ty.name()),
            });
        }
        let type_name = self.ty.name().to_string();
        self.collection
            .as_mut()
            .ok_or_else(|| ConfigError::UnknownProperty {
                type_name,
                property: "(collection)".to_string(),
            })
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    pub fn items(&self) -> &[ConfigElement] {
        self.collection
            .as_ref()
            .map(CollectionState::items)
            .unwrap_or(&[])
    }

    pub fn item_count(&self) -> usize {
        self.items().len()
    }

    /// Items inherited from a parent configuration, protected from removal.
    pub fn inherited_item_count(&self) -> usize {
        self.collection
            .as_ref()
            .map(CollectionState::inherited_count)
            .unwrap_or(0)
    }

    /// A fresh, empty item suitable for [`add_item`](Self::add_item).
    pub fn new_item(&self) -> Result<ConfigElement, ConfigError> {
        self.collection_ref()?.new_item()
    }

    pub fn item_key(&self, item: &ConfigElement) -> Result<CollectionKey, ConfigError> {
        Ok(self.collection_ref()?.element_key(item))
    }

    pub fn find_item(&self, key: &CollectionKey) -> Option<&ConfigElement> {
        self.collection.as_ref().and_then(|c| c.find_by_key(key))
    }

    pub fn add_item(&mut self, item: ConfigElement) -> Result<(), ConfigError> {
        self.collection_mut_checked()?.add_item(item, true)?;
        self.modified = true;
        Ok(())
    }

    /// Add, replacing any existing item with the same key.
    pub fn add_or_replace_item(&mut self, item: ConfigElement) -> Result<(), ConfigError> {
        self.collection_mut_checked()?.add_item(item, false)?;
        self.modified = true;
        Ok(())
    }

    pub fn remove_item(&mut self, key: &CollectionKey) -> Result<(), ConfigError> {
        self.collection_mut_checked()?.remove_item(key)?;
        self.modified = true;
        Ok(())
    }

    pub fn remove_item_at(&mut self, index: usize) -> Result<(), ConfigError> {
        self.collection_mut_checked()?.remove_item_at(index)?;
        self.modified = true;
        Ok(())
    }

    pub fn clear_items(&mut self) -> Result<(), ConfigError> {
        self.collection_mut_checked()?.clear_items();
        self.modified = true;
        Ok(())
    }

    // ---- inheritance, diffing, serialization --------------------------------

    /// Seed this element from a parent: every property the parent has
    /// explicitly set is copied (child elements recursively, never shared),
    /// collections record their inherited boundary, and lock state flows
    /// down. A `None` parent clears the element to pure defaults.
    pub(crate) fn reset(&mut self, parent: Option<&ConfigElement>) -> Result<(), ConfigError> {
        match parent {
            None => {
                for (idx, prop) in self.ty.map().clone().iter() {
                    if prop.is_element() {
                        if let Some(child) = self.child_by_index_mut(idx) {
                            child.reset(None)?;
                        }
                    } else {
                        self.values[idx] = None;
                    }
                }
                if let Some(col) = &mut self.collection {
                    col.reset(None)?;
                }
                self.locks = LockState::default();
            }
            Some(parent) => {
                for (idx, prop) in self.ty.map().clone().iter() {
                    if prop.is_element() {
                        let parent_child = parent.child_by_index(idx);
                        if let Some(child) = self.child_by_index_mut(idx) {
                            child.reset(parent_child)?;
                        }
                    } else {
                        self.values[idx] = parent.values[idx]
                            .as_ref()
                            .map(|slot| ValueSlot::inherited(slot.value.clone()));
                    }
                }
                if let Some(col) = &mut self.collection {
                    col.reset(parent.collection.as_ref())?;
                }
                self.locks = LockState::default();
                self.locks.inherit_from(&parent.locks);
            }
        }
        self.modified = false;
        Ok(())
    }

    /// Consume one XML element into the bag. `key_only` restricts the read
    /// to key properties (used for collection `<remove>` stubs).
    pub(crate) fn deserialize(
        &mut self,
        src: &mut XmlSource<'_>,
        start: &StartTag,
        key_only: bool,
    ) -> Result<(), ConfigError> {
        let ty = Arc::clone(&self.ty);
        let map = Arc::clone(ty.map());
        let hooks = Arc::clone(ty.hooks());

        if self.locks.item_locked_inherited() {
            return Err(ConfigError::ElementLocked {
                element: start.name.clone(),
                pos: start.pos.clone(),
            });
        }

        self.element_present = true;
        self.tag_name = Some(start.name.clone());
        let mut pending_locks = PendingLocks::default();

        for (attr_name, attr_value) in &start.attributes {
            if pending_locks.capture(attr_name, attr_value, &start.pos)? {
                continue;
            }
            if self.locks.attribute_locked_inherited(attr_name) {
                return Err(ConfigError::PropertyLocked {
                    property: attr_name.clone(),
                }
                .at(start.pos.clone()));
            }
            match map.get(attr_name) {
                Some((_, prop)) if prop.is_element() => {
                    return Err(ConfigError::Format {
                        message: format!(
                            "property '{attr_name}' is an element and cannot appear as an attribute"
                        ),
                        pos: start.pos.clone(),
                    });
                }
                Some((idx, prop)) => {
                    if key_only && !prop.is_key() {
                        return Err(ConfigError::UnrecognizedAttribute {
                            name: attr_name.clone(),
                            pos: start.pos.clone(),
                        });
                    }
                    let value = prop
                        .parse(attr_value)
                        .map_err(|e| e.at(start.pos.clone()))?;
                    self.values[idx] = Some(ValueSlot::local(value));
                }
                None => {
                    if key_only
                        || hooks.on_unrecognized_attribute(self, attr_name, attr_value)?
                            == Unrecognized::Error
                    {
                        return Err(ConfigError::UnrecognizedAttribute {
                            name: attr_name.clone(),
                            pos: start.pos.clone(),
                        });
                    }
                }
            }
        }

        if !start.empty {
            let mut seen_children: HashSet<usize> = HashSet::new();
            loop {
                match src.next_node()? {
                    None => return Err(src.format_err("unexpected end of stream")),
                    Some(Node::End(_)) => break,
                    Some(Node::Text { pos, .. }) => {
                        return Err(ConfigError::Format {
                            message: format!(
                                "element '{}' cannot contain text content",
                                start.name
                            ),
                            pos,
                        });
                    }
                    Some(Node::Start(child_tag)) => {
                        if self.locks.element_locked_inherited(&child_tag.name) {
                            return Err(ConfigError::ElementLocked {
                                element: child_tag.name.clone(),
                                pos: child_tag.pos.clone(),
                            });
                        }
                        self.deserialize_child(src, &child_tag, key_only, &mut seen_children)?;
                    }
                }
            }
        }

        for (idx, prop) in map.iter() {
            if prop.is_element() || self.values[idx].is_some() {
                continue;
            }
            let needed = if key_only {
                prop.is_key()
            } else {
                prop.is_required()
            };
            if !needed {
                continue;
            }
            match hooks.on_required_missing(self, prop.name())? {
                Some(value) => {
                    prop.check_assignment(&value)?;
                    self.values[idx] = Some(ValueSlot::local(value));
                }
                None => {
                    return Err(ConfigError::RequiredPropertyMissing {
                        property: prop.name().to_string(),
                        element: start.name.clone(),
                    }
                    .at(start.pos.clone()));
                }
            }
        }

        pending_locks.apply(&mut self.locks);
        // Content just loaded from disk is not "modified".
        self.reset_modified();
        Ok(())
    }

    fn deserialize_child(
        &mut self,
        src: &mut XmlSource<'_>,
        child_tag: &StartTag,
        key_only: bool,
        seen_children: &mut HashSet<usize>,
    ) -> Result<(), ConfigError> {
        let ty = Arc::clone(&self.ty);
        let map = Arc::clone(ty.map());
        let hooks = Arc::clone(ty.hooks());

        match map.get(&child_tag.name) {
            Some((idx, prop)) if prop.is_element() => {
                if !seen_children.insert(idx) {
                    return Err(ConfigError::DuplicateMember {
                        name: child_tag.name.clone(),
                        pos: child_tag.pos.clone(),
                    });
                }
                match self.child_by_index_mut(idx) {
                    Some(child) => child.deserialize(src, child_tag, key_only),
                    None => Err(ConfigError::Format {
                        message: format!("property '{}' has no element instance", child_tag.name),
                        pos: child_tag.pos.clone(),
                    }),
                }
            }
            Some(_) => Err(ConfigError::Format {
                message: format!(
                    "property '{}' is an attribute and cannot appear as an element",
                    child_tag.name
                ),
                pos: child_tag.pos.clone(),
            }),
            None => {
                if hooks.on_unrecognized_element(self, &child_tag.name)? == Unrecognized::Skip {
                    return src.skip_element(child_tag);
                }
                if self
                    .collection
                    .as_ref()
                    .is_some_and(|c| c.accepts(&child_tag.name))
                {
                    return self
                        .with_collection(|col, src| col.deserialize_child(src, child_tag), src)
                        .map_err(|e| e.at(child_tag.pos.clone()));
                }
                // Route into the default collection property, if any.
                if let Some(dc_idx) = map.default_collection() {
                    let accepted = self
                        .child_by_index(dc_idx)
                        .and_then(|c| c.collection.as_ref())
                        .is_some_and(|c| c.accepts(&child_tag.name));
                    if accepted {
                        if let Some(child) = self.child_by_index_mut(dc_idx) {
                            return child
                                .with_collection(
                                    |col, src| col.deserialize_child(src, child_tag),
                                    src,
                                )
                                .map_err(|e| e.at(child_tag.pos.clone()));
                        }
                    }
                }
                Err(ConfigError::UnrecognizedElement {
                    name: child_tag.name.clone(),
                    pos: child_tag.pos.clone(),
                })
            }
        }
    }

    /// Run a collection operation that also needs the reader, working
    /// around the borrow of `self`.
    fn with_collection<R>(
        &mut self,
        op: impl FnOnce(&mut CollectionState, &mut XmlSource<'_>) -> Result<R, ConfigError>,
        src: &mut XmlSource<'_>,
    ) -> Result<R, ConfigError> {
        let mut col = self.collection.take().ok_or_else(|| ConfigError::Serialize {
            message: "element has no collection".to_string(),
        })?;
        let result = op(&mut col, src);
        self.collection = Some(col);
        result
    }

    /// Three-way diff for save: compute into `self` (a fresh element) the
    /// minimal content that, layered over `parent`, reproduces `source`.
    pub(crate) fn unmerge(
        &mut self,
        source: &ConfigElement,
        parent: Option<&ConfigElement>,
        mode: SaveMode,
    ) -> Result<(), ConfigError> {
        trace!(
            element = source.ty.name(),
            ?mode,
            "unmerging element against parent"
        );
        self.tag_name = source.tag_name.clone();
        self.element_present = source.element_present;
        self.locks = source.locks.clone();

        for (idx, prop) in self.ty.map().clone().iter() {
            if prop.is_element() {
                let parent_child = parent.and_then(|p| p.child_by_index(idx));
                if let (Some(child), Some(source_child)) =
                    (self.child_by_index_mut(idx), source.child_by_index(idx))
                {
                    child.unmerge(source_child, parent_child, mode)?;
                }
                continue;
            }

            let source_slot = &source.values[idx];
            match mode {
                SaveMode::Full => {
                    let value = source_slot
                        .as_ref()
                        .map(|s| s.value.clone())
                        .unwrap_or_else(|| prop.default_value());
                    self.values[idx] = Some(ValueSlot::local(value));
                }
                SaveMode::Minimal | SaveMode::Modified => {
                    let Some(slot) = source_slot else {
                        // Required properties are persisted even when they
                        // sit at their default.
                        if prop.is_required() {
                            self.values[idx] = Some(ValueSlot::local(prop.default_value()));
                        }
                        continue;
                    };
                    let keep = prop.is_required()
                        || match mode {
                            SaveMode::Minimal => {
                                let baseline = parent
                                    .and_then(|p| p.values[idx].as_ref())
                                    .map(|s| s.value.clone())
                                    .unwrap_or_else(|| prop.default_value());
                                slot.value != baseline
                            }
                            SaveMode::Modified => {
                                match parent.and_then(|p| p.values[idx].as_ref()) {
                                    // Parent lacks the value: copy it
                                    // unconditionally.
                                    None => true,
                                    Some(parent_slot) => {
                                        let fresh = slot.modified || !slot.inherited;
                                        fresh || parent_slot.value != slot.value
                                    }
                                }
                            }
                            SaveMode::Full => unreachable!(),
                        };
                    if keep {
                        self.values[idx] = Some(ValueSlot::local(slot.value.clone()));
                    }
                }
            }
        }

        if let (Some(col), Some(source_col)) = (&mut self.collection, &source.collection) {
            col.unmerge(source_col, parent.and_then(|p| p.collection.as_ref()), mode)?;
        }
        Ok(())
    }

    /// Force key-property values in from `source` so collection item diffs
    /// stay addressable on the wire.
    pub(crate) fn copy_key_values_from(&mut self, source: &ConfigElement) {
        for &idx in self.ty.map().clone().key_indexes() {
            self.values[idx] = Some(ValueSlot::local(source.effective_by_index(idx)));
        }
    }

    /// Write the element's content (attributes, then child elements in
    /// schema order, then collection entries) into the currently open
    /// element. Returns whether anything was written.
    pub(crate) fn serialize(
        &self,
        w: &mut XmlWriter,
        key_only: bool,
    ) -> Result<bool, ConfigError> {
        let mark = w.mark();
        for (idx, prop) in self.ty.map().iter() {
            if prop.is_element() || (key_only && !prop.is_key()) {
                continue;
            }
            if let Some(slot) = &self.values[idx] {
                w.attribute(prop.name(), &prop.format(&slot.value))?;
            }
        }
        self.locks.serialize(w)?;
        if !key_only {
            for (idx, prop) in self.ty.map().iter() {
                if !prop.is_element() {
                    continue;
                }
                if let Some(child) = self.child_by_index(idx) {
                    child.serialize_to_element(w, prop.name())?;
                }
            }
            if let Some(col) = &self.collection {
                col.serialize(w)?;
            }
        }
        Ok(w.wrote_since(mark))
    }

    /// Write the element as `<tag …>…</tag>` if it has any content.
    /// Returns whether the element was written at all.
    pub(crate) fn serialize_to_element(
        &self,
        w: &mut XmlWriter,
        tag: &str,
    ) -> Result<bool, ConfigError> {
        if !self.has_values() {
            return Ok(false);
        }
        w.start_element(tag)?;
        self.serialize(w, false)?;
        w.end_element()?;
        Ok(true)
    }

    /// Effective view of the element as JSON (defaults included); used by
    /// tooling output.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (idx, prop) in self.ty.map().iter() {
            if prop.is_element() {
                if let Some(child) = self.child_by_index(idx) {
                    if child.has_values() {
                        obj.insert(prop.name().to_string(), child.to_json());
                    }
                }
            } else {
                let json = match self.effective_by_index(idx) {
                    Value::Bool(b) => serde_json::Value::Bool(b),
                    Value::Int(i) => serde_json::Value::Number(i.into()),
                    Value::Float(v) => serde_json::Number::from_f64(v)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null),
                    Value::Text(s) => serde_json::Value::String(s),
                    Value::Element(_) => continue,
                };
                obj.insert(prop.name().to_string(), json);
            }
        }
        if let Some(col) = &self.collection {
            obj.insert("items".to_string(), col.to_json());
        }
        serde_json::Value::Object(obj)
    }
}

/// Two elements of the same type are equal iff every schema property
/// compares equal by effective value.
impl PartialEq for ConfigElement {
    fn eq(&self, other: &Self) -> bool {
        if self.ty.name() != other.ty.name() {
            return false;
        }
        for (idx, prop) in self.ty.map().iter() {
            if prop.is_element() {
                if self.child_by_index(idx) != other.child_by_index(idx) {
                    return false;
                }
            } else if self.effective_by_index(idx) != other.effective_by_index(idx) {
                return false;
            }
        }
        match (&self.collection, &other.collection) {
            (Some(a), Some(b)) => a.items_equal(b),
            (None, None) => true,
            _ => false,
        }
    }
}
