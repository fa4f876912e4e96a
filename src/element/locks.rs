//! Attribute and element lock lists.
//!
//! A parent file can forbid child files from overriding individual
//! attributes (`lockAttributes`, `lockAllAttributesExcept`), child elements
//! (`lockElements`, `lockAllElementsExcept`), or a whole element
//! (`lockItem`). Locking is best-effort: lock state round-trips and blocks
//! writes, but no attempt is made to reproduce every corner case of the
//! original semantics.

use crate::error::{ConfigError, SourcePos};
use crate::xml::XmlWriter;

pub const LOCK_ITEM: &str = "lockItem";
pub const LOCK_ATTRIBUTES: &str = "lockAttributes";
pub const LOCK_ALL_ATTRIBUTES_EXCEPT: &str = "lockAllAttributesExcept";
pub const LOCK_ELEMENTS: &str = "lockElements";
pub const LOCK_ALL_ELEMENTS_EXCEPT: &str = "lockAllElementsExcept";

const LOCK_ALL: &str = "*";

#[derive(Debug, Clone)]
struct LockEntry {
    name: String,
    inherited: bool,
}

#[derive(Debug, Clone)]
struct ExceptList {
    names: Vec<String>,
    inherited: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LockState {
    attributes: Vec<LockEntry>,
    elements: Vec<LockEntry>,
    attribute_exceptions: Option<ExceptList>,
    element_exceptions: Option<ExceptList>,
    item_locked: bool,
    item_lock_inherited: bool,
}

/// Lock attributes captured during one element read, applied after the
/// content pass.
#[derive(Debug, Default)]
pub struct PendingLocks {
    item: Option<bool>,
    attributes: Option<String>,
    attribute_exceptions: Option<String>,
    elements: Option<String>,
    element_exceptions: Option<String>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ';', ':'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl PendingLocks {
    /// Capture a lock keyword attribute. Returns `false` when the
    /// attribute is not a lock keyword.
    pub fn capture(
        &mut self,
        name: &str,
        value: &str,
        pos: &SourcePos,
    ) -> Result<bool, ConfigError> {
        match name {
            LOCK_ITEM => {
                let flag = match value {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(ConfigError::Format {
                            message: format!("'{LOCK_ITEM}' must be 'true' or 'false'"),
                            pos: pos.clone(),
                        })
                    }
                };
                self.item = Some(flag);
                Ok(true)
            }
            LOCK_ATTRIBUTES => {
                self.attributes = Some(value.to_string());
                Ok(true)
            }
            LOCK_ALL_ATTRIBUTES_EXCEPT => {
                self.attribute_exceptions = Some(value.to_string());
                Ok(true)
            }
            LOCK_ELEMENTS => {
                self.elements = Some(value.to_string());
                Ok(true)
            }
            LOCK_ALL_ELEMENTS_EXCEPT => {
                self.element_exceptions = Some(value.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_none()
            && self.attributes.is_none()
            && self.attribute_exceptions.is_none()
            && self.elements.is_none()
            && self.element_exceptions.is_none()
    }

    /// Merge the captured lock attributes into the element's lock state.
    pub fn apply(self, locks: &mut LockState) {
        if let Some(flag) = self.item {
            locks.item_locked = flag;
            locks.item_lock_inherited = false;
        }
        if let Some(raw) = self.attributes {
            for name in split_list(&raw) {
                locks.add_attribute_lock(name, false);
            }
        }
        if let Some(raw) = self.attribute_exceptions {
            locks.attribute_exceptions = Some(ExceptList {
                names: split_list(&raw),
                inherited: false,
            });
        }
        if let Some(raw) = self.elements {
            for name in split_list(&raw) {
                locks.add_element_lock(name, false);
            }
        }
        if let Some(raw) = self.element_exceptions {
            locks.element_exceptions = Some(ExceptList {
                names: split_list(&raw),
                inherited: false,
            });
        }
    }
}

impl LockState {
    fn add_attribute_lock(&mut self, name: String, inherited: bool) {
        if !self.attributes.iter().any(|e| e.name == name) {
            self.attributes.push(LockEntry { name, inherited });
        }
    }

    fn add_element_lock(&mut self, name: String, inherited: bool) {
        if !self.elements.iter().any(|e| e.name == name) {
            self.elements.push(LockEntry { name, inherited });
        }
    }

    /// Seed this element's locks from its parent during `reset`. Inherited
    /// entries are tracked so they are not re-serialized by this level.
    pub fn inherit_from(&mut self, parent: &LockState) {
        for entry in &parent.attributes {
            self.add_attribute_lock(entry.name.clone(), true);
        }
        for entry in &parent.elements {
            self.add_element_lock(entry.name.clone(), true);
        }
        if self.attribute_exceptions.is_none() {
            if let Some(list) = &parent.attribute_exceptions {
                self.attribute_exceptions = Some(ExceptList {
                    names: list.names.clone(),
                    inherited: true,
                });
            }
        }
        if self.element_exceptions.is_none() {
            if let Some(list) = &parent.element_exceptions {
                self.element_exceptions = Some(ExceptList {
                    names: list.names.clone(),
                    inherited: true,
                });
            }
        }
        if parent.item_locked {
            self.item_locked = true;
            self.item_lock_inherited = true;
        }
    }

    /// Whether the whole element is locked by an ancestor file.
    pub fn item_locked_inherited(&self) -> bool {
        self.item_locked && self.item_lock_inherited
    }

    fn listed(entries: &[LockEntry], name: &str, inherited_only: bool) -> bool {
        entries.iter().any(|e| {
            (!inherited_only || e.inherited) && (e.name == name || e.name == LOCK_ALL)
        })
    }

    fn excepted(list: &Option<ExceptList>, name: &str, inherited_only: bool) -> bool {
        match list {
            Some(l) if !inherited_only || l.inherited => !l.names.iter().any(|n| n == name),
            _ => false,
        }
    }

    /// Locks that apply while deserializing a child file: only those that
    /// came from an ancestor.
    pub fn attribute_locked_inherited(&self, name: &str) -> bool {
        Self::listed(&self.attributes, name, true)
            || Self::excepted(&self.attribute_exceptions, name, true)
    }

    pub fn element_locked_inherited(&self, name: &str) -> bool {
        Self::listed(&self.elements, name, true)
            || Self::excepted(&self.element_exceptions, name, true)
    }

    /// Locks that apply to programmatic assignment: local or inherited.
    pub fn attribute_locked(&self, name: &str) -> bool {
        Self::listed(&self.attributes, name, false)
            || Self::excepted(&self.attribute_exceptions, name, false)
    }

    /// Re-emit the lock attributes this level declared itself.
    pub fn serialize(&self, w: &mut XmlWriter) -> Result<(), ConfigError> {
        let local: Vec<&str> = self
            .attributes
            .iter()
            .filter(|e| !e.inherited)
            .map(|e| e.name.as_str())
            .collect();
        if !local.is_empty() {
            w.attribute(LOCK_ATTRIBUTES, &local.join(","))?;
        }
        if let Some(list) = &self.attribute_exceptions {
            if !list.inherited {
                w.attribute(LOCK_ALL_ATTRIBUTES_EXCEPT, &list.names.join(","))?;
            }
        }
        let local: Vec<&str> = self
            .elements
            .iter()
            .filter(|e| !e.inherited)
            .map(|e| e.name.as_str())
            .collect();
        if !local.is_empty() {
            w.attribute(LOCK_ELEMENTS, &local.join(","))?;
        }
        if let Some(list) = &self.element_exceptions {
            if !list.inherited {
                w.attribute(LOCK_ALL_ELEMENTS_EXCEPT, &list.names.join(","))?;
            }
        }
        if self.item_locked && !self.item_lock_inherited {
            w.attribute(LOCK_ITEM, "true")?;
        }
        Ok(())
    }
}
