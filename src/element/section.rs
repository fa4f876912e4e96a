//! Configuration sections.
//!
//! A section is a named root element materialized from one XML subtree.
//! On top of the element it tracks the raw XML it was read from, an
//! optional external-file redirect (`configSource`), and protection state.
//! A section whose declared type cannot be resolved materializes as a raw
//! placeholder that refuses typed access but passes its XML through a save
//! untouched; unknown section types must never break the whole file.

use std::cell::RefCell;
use std::rc::Rc;

use crate::element::ConfigElement;
use crate::error::ConfigError;

/// Shared handle to a materialized section. Sections are owned by the
/// `Configuration` that materialized them; chains are single-threaded, so a
/// reference-counted cell is the right shape.
pub type SectionHandle = Rc<RefCell<Section>>;

#[derive(Debug, Clone)]
pub(crate) enum SectionBody {
    /// A fully materialized element tree.
    Typed(ConfigElement),
    /// Raw passthrough: unresolved type or protected content.
    Raw,
}

#[derive(Debug, Clone)]
pub struct Section {
    name: String,
    path: String,
    type_name: String,
    body: SectionBody,
    raw_xml: Option<String>,
    config_source: String,
    protection_provider: Option<String>,
}

impl Section {
    pub(crate) fn typed(
        name: impl Into<String>,
        path: impl Into<String>,
        type_name: impl Into<String>,
        element: ConfigElement,
    ) -> Self {
        Section {
            name: name.into(),
            path: path.into(),
            type_name: type_name.into(),
            body: SectionBody::Typed(element),
            raw_xml: None,
            config_source: String::new(),
            protection_provider: None,
        }
    }

    pub(crate) fn raw(
        name: impl Into<String>,
        path: impl Into<String>,
        type_name: impl Into<String>,
        raw_xml: Option<String>,
    ) -> Self {
        Section {
            name: name.into(),
            path: path.into(),
            type_name: type_name.into(),
            body: SectionBody::Raw,
            raw_xml,
            config_source: String::new(),
            protection_provider: None,
        }
    }

    /// Local section name (the XML tag).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full declaration path ("group/child/section").
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether the section materialized as a typed element tree.
    pub fn is_typed(&self) -> bool {
        matches!(self.body, SectionBody::Typed(_))
    }

    pub fn element(&self) -> Result<&ConfigElement, ConfigError> {
        match &self.body {
            SectionBody::Typed(el) => Ok(el),
            SectionBody::Raw => Err(ConfigError::SectionTypeUnresolved {
                section: self.path.clone(),
                type_name: self.type_name.clone(),
            }),
        }
    }

    pub fn element_mut(&mut self) -> Result<&mut ConfigElement, ConfigError> {
        match &mut self.body {
            SectionBody::Typed(el) => Ok(el),
            SectionBody::Raw => Err(ConfigError::SectionTypeUnresolved {
                section: self.path.clone(),
                type_name: self.type_name.clone(),
            }),
        }
    }

    /// The raw XML this section was read from, if any.
    pub fn raw_xml(&self) -> Option<&str> {
        self.raw_xml.as_deref()
    }

    pub(crate) fn set_raw_xml(&mut self, xml: Option<String>) {
        self.raw_xml = xml;
    }

    /// External-file redirect. Empty when the section lives inline.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Redirect the section's content to an external file. The inline
    /// element will carry only the redirect attribute on save.
    pub fn set_config_source(&mut self, path: impl Into<String>) {
        self.config_source = path.into();
    }

    pub fn is_protected(&self) -> bool {
        self.protection_provider.is_some()
    }

    pub fn protection_provider(&self) -> Option<&str> {
        self.protection_provider.as_deref()
    }

    pub(crate) fn set_protection_provider(&mut self, provider: impl Into<String>) {
        self.protection_provider = Some(provider.into());
    }

    pub fn is_modified(&self) -> bool {
        match &self.body {
            SectionBody::Typed(el) => el.is_modified(),
            SectionBody::Raw => false,
        }
    }
}
