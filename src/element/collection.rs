//! Collection state embedded in a configuration element.
//!
//! A collection is an ordered, optionally keyed sequence of child elements
//! with add/remove/clear diffing against an inherited baseline. The shape
//! (see [`CollectionShape`](crate::activation::CollectionShape)) decides
//! both the XML encoding and where new items are inserted relative to the
//! inherited block.

use std::fmt;
use std::sync::Arc;

use crate::activation::{CollectionSpec, ElementType, TypeRegistry};
use crate::element::{ConfigElement, SaveMode};
use crate::error::{ConfigError, SourcePos};
use crate::value::Value;
use crate::xml::{StartTag, XmlSource, XmlWriter};

/// The key of one collection item: the tuple of its key-property effective
/// values, in schema order. A pure function of the item, stable across its
/// lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionKey(Vec<(String, Value)>);

impl CollectionKey {
    pub fn of(parts: &[(&str, Value)]) -> Self {
        CollectionKey(
            parts
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    pub fn parts(&self) -> &[(String, Value)] {
        &self.0
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(no key)");
        }
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CollectionState {
    spec: CollectionSpec,
    item_type: Arc<ElementType>,
    registry: Arc<TypeRegistry>,
    items: Vec<ConfigElement>,
    removed: Vec<CollectionKey>,
    inherited_count: usize,
    emit_clear: bool,
    modified: bool,
}

impl fmt::Debug for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionState")
            .field("shape", &self.spec.shape)
            .field("items", &self.items.len())
            .field("removed", &self.removed.len())
            .field("inherited_count", &self.inherited_count)
            .field("emit_clear", &self.emit_clear)
            .finish()
    }
}

impl CollectionState {
    pub(crate) fn new(
        spec: CollectionSpec,
        item_type: Arc<ElementType>,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        CollectionState {
            spec,
            item_type,
            registry,
            items: Vec::new(),
            removed: Vec::new(),
            inherited_count: 0,
            emit_clear: false,
            modified: false,
        }
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn items(&self) -> &[ConfigElement] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn inherited_count(&self) -> usize {
        self.inherited_count
    }

    pub fn is_modified(&self) -> bool {
        self.modified || self.items.iter().any(ConfigElement::is_modified)
    }

    pub(crate) fn reset_modified(&mut self) {
        self.modified = false;
        for item in &mut self.items {
            item.reset_modified();
        }
    }

    pub(crate) fn set_read_only(&mut self) {
        for item in &mut self.items {
            item.set_read_only();
        }
    }

    /// A fresh, empty item of the collection's item type.
    pub fn new_item(&self) -> Result<ConfigElement, ConfigError> {
        self.registry.instantiate(&self.item_type)
    }

    /// The key of an item of this collection.
    pub fn element_key(&self, item: &ConfigElement) -> CollectionKey {
        let map = self.item_type.map();
        CollectionKey(
            map.key_indexes()
                .iter()
                .map(|&idx| {
                    let prop = map.by_index(idx);
                    (prop.name().to_string(), item.effective_by_index(idx))
                })
                .collect(),
        )
    }

    pub fn index_of_key(&self, key: &CollectionKey) -> Option<usize> {
        self.items
            .iter()
            .position(|item| self.element_key(item) == *key)
    }

    pub fn find_by_key(&self, key: &CollectionKey) -> Option<&ConfigElement> {
        self.index_of_key(key).map(|idx| &self.items[idx])
    }

    /// Whether the item at `idx` is part of the inherited block.
    fn is_inherited_index(&self, idx: usize) -> bool {
        if self.spec.shape.inherited_last() {
            idx >= self.items.len() - self.inherited_count
        } else {
            idx < self.inherited_count
        }
    }

    /// Insertion point for a new local item.
    fn insertion_index(&self) -> usize {
        if self.spec.shape.inherited_last() {
            self.items.len() - self.inherited_count
        } else {
            self.items.len()
        }
    }

    pub(crate) fn has_content(&self) -> bool {
        self.emit_clear
            || !self.removed.is_empty()
            || if self.spec.shape.is_basic() {
                (0..self.items.len()).any(|idx| !self.is_inherited_index(idx))
            } else {
                !self.items.is_empty()
            }
    }

    /// Add an item, applying the duplicate policy. Overriding an inherited
    /// item always replaces it in place (that is how a child layer
    /// overrides its parent); a value-equal duplicate is silently
    /// replaced; any other duplicate replaces or fails depending on
    /// `fail_on_duplicate`.
    pub(crate) fn add_item(
        &mut self,
        item: ConfigElement,
        fail_on_duplicate: bool,
    ) -> Result<(), ConfigError> {
        if !self.spec.allow_duplicates {
            let key = self.element_key(&item);
            if let Some(idx) = self.index_of_key(&key) {
                let replaceable = self.is_inherited_index(idx)
                    || self.items[idx] == item
                    || !fail_on_duplicate;
                if !replaceable {
                    return Err(ConfigError::DuplicateKey {
                        key: key.to_string(),
                    });
                }
                self.items[idx] = item;
                self.modified = true;
                return Ok(());
            }
        }
        let at = self.insertion_index();
        self.items.insert(at, item);
        self.modified = true;
        Ok(())
    }

    /// Remove an item by key through the public API. Inherited items are
    /// protected; removing them is only possible in a child file's
    /// `<remove>` entry.
    pub(crate) fn remove_item(&mut self, key: &CollectionKey) -> Result<(), ConfigError> {
        match self.index_of_key(key) {
            Some(idx) if self.is_inherited_index(idx) => Err(ConfigError::InheritedItemRemoval {
                key: key.to_string(),
            }),
            Some(idx) => {
                self.items.remove(idx);
                self.record_removed(key.clone());
                self.modified = true;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub(crate) fn remove_item_at(&mut self, index: usize) -> Result<(), ConfigError> {
        if index >= self.items.len() {
            return Err(ConfigError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        if self.is_inherited_index(index) {
            return Err(ConfigError::InheritedItemRemoval {
                key: self.element_key(&self.items[index]).to_string(),
            });
        }
        let key = self.element_key(&self.items[index]);
        self.items.remove(index);
        self.record_removed(key);
        self.modified = true;
        Ok(())
    }

    pub(crate) fn clear_items(&mut self) {
        self.items.clear();
        self.removed.clear();
        self.inherited_count = 0;
        self.emit_clear = true;
        self.modified = true;
    }

    fn record_removed(&mut self, key: CollectionKey) {
        if !self.removed.contains(&key) {
            self.removed.push(key);
        }
    }

    /// Seed the collection from a parent: every parent item is copied as a
    /// fresh reset element and the inherited boundary recorded.
    pub(crate) fn reset(&mut self, parent: Option<&CollectionState>) -> Result<(), ConfigError> {
        self.items.clear();
        self.removed.clear();
        self.inherited_count = 0;
        self.emit_clear = false;
        self.modified = false;
        if let Some(parent) = parent {
            for parent_item in &parent.items {
                let mut item = self.new_item()?;
                item.reset(Some(parent_item))?;
                self.items.push(item);
            }
            self.inherited_count = self.items.len();
        }
        Ok(())
    }

    /// Whether a child tag belongs to this collection.
    pub(crate) fn accepts(&self, tag: &str) -> bool {
        if self.spec.shape.is_basic() {
            tag == self.spec.item_name
        } else {
            tag == self.spec.add_name || tag == self.spec.remove_name || tag == self.spec.clear_name
        }
    }

    /// Route one collection child element during deserialization.
    pub(crate) fn deserialize_child(
        &mut self,
        src: &mut XmlSource<'_>,
        tag: &StartTag,
    ) -> Result<(), ConfigError> {
        if self.spec.shape.is_basic() {
            let mut item = self.new_item()?;
            item.deserialize(src, tag, false)?;
            return self.add_item(item, !self.spec.allow_duplicates);
        }
        if tag.name == self.spec.clear_name {
            src.skip_element(tag)?;
            self.clear_items();
            self.modified = false;
            return Ok(());
        }
        if tag.name == self.spec.remove_name {
            let mut stub = self.new_item()?;
            stub.deserialize(src, tag, true)?;
            let key = self.element_key(&stub);
            self.remove_for_file(&key, &tag.pos)?;
            self.modified = false;
            return Ok(());
        }
        // add
        let mut item = self.new_item()?;
        item.deserialize(src, tag, false)?;
        self.add_item(item, !self.spec.allow_duplicates)?;
        self.modified = false;
        Ok(())
    }

    /// File-driven removal: unlike the public API this may drop inherited
    /// items; that is what a `<remove>` entry is for.
    fn remove_for_file(
        &mut self,
        key: &CollectionKey,
        _pos: &SourcePos,
    ) -> Result<(), ConfigError> {
        if let Some(idx) = self.index_of_key(key) {
            if self.is_inherited_index(idx) {
                self.inherited_count -= 1;
            }
            self.items.remove(idx);
        }
        self.record_removed(key.clone());
        Ok(())
    }

    /// Compute the for-save delta of `source` against `parent`.
    pub(crate) fn unmerge(
        &mut self,
        source: &CollectionState,
        parent: Option<&CollectionState>,
        mode: SaveMode,
    ) -> Result<(), ConfigError> {
        self.items.clear();
        self.removed.clear();
        self.inherited_count = 0;
        self.emit_clear = false;

        if mode == SaveMode::Full {
            // Full mode re-emits the entire effective sequence behind an
            // explicit clear, so ancestors cannot contribute stale items.
            self.emit_clear = !self.spec.shape.is_basic();
            for source_item in &source.items {
                let mut item = self.new_item()?;
                item.unmerge(source_item, None, SaveMode::Full)?;
                self.items.push(item);
            }
            return Ok(());
        }

        self.emit_clear = source.emit_clear;
        let parent = if source.emit_clear { None } else { parent };

        for source_item in &source.items {
            let key = source.element_key(source_item);
            match parent.and_then(|p| p.find_by_key(&key)) {
                Some(parent_item) => {
                    if source_item == parent_item {
                        // Unchanged inherited item: nothing to persist.
                        continue;
                    }
                    let mut diff = self.new_item()?;
                    diff.unmerge(source_item, Some(parent_item), mode)?;
                    diff.copy_key_values_from(source_item);
                    self.items.push(diff);
                }
                None => {
                    let mut item = self.new_item()?;
                    item.unmerge(source_item, None, mode)?;
                    item.copy_key_values_from(source_item);
                    self.items.push(item);
                }
            }
        }

        if !self.emit_clear {
            if let Some(parent) = parent {
                for parent_item in &parent.items {
                    let key = parent.element_key(parent_item);
                    if source.find_by_key(&key).is_none() {
                        self.record_removed(key);
                    }
                }
            }
            for key in &source.removed {
                if source.find_by_key(key).is_none() {
                    self.record_removed(key.clone());
                }
            }
        }
        Ok(())
    }

    /// Serialize the collection's content into the currently open element.
    pub(crate) fn serialize(&self, w: &mut XmlWriter) -> Result<(), ConfigError> {
        let basic = self.spec.shape.is_basic();
        if self.emit_clear {
            if basic {
                return Err(ConfigError::Serialize {
                    message: format!(
                        "a basic-map collection of '{}' cannot express <{}>",
                        self.spec.item_type, self.spec.clear_name
                    ),
                });
            }
            w.start_element(&self.spec.clear_name)?;
            w.end_element()?;
        }
        if !self.removed.is_empty() && basic {
            return Err(ConfigError::Serialize {
                message: format!(
                    "a basic-map collection of '{}' cannot express <{}>",
                    self.spec.item_type, self.spec.remove_name
                ),
            });
        }
        for key in &self.removed {
            w.start_element(&self.spec.remove_name)?;
            for (name, value) in key.parts() {
                if let Some((_, prop)) = self.item_type.map().get(name) {
                    w.attribute(name, &prop.format(value))?;
                }
            }
            w.end_element()?;
        }
        for (idx, item) in self.items.iter().enumerate() {
            if basic && self.is_inherited_index(idx) {
                continue;
            }
            let tag = if basic {
                &self.spec.item_name
            } else {
                &self.spec.add_name
            };
            w.start_element(tag)?;
            item.serialize(w, false)?;
            w.end_element()?;
        }
        Ok(())
    }

    /// Items compare as an ordered sequence; diff bookkeeping is ignored.
    pub(crate) fn items_equal(&self, other: &CollectionState) -> bool {
        self.items == other.items
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.iter().map(ConfigElement::to_json).collect())
    }
}
