//! Configuration Instances
//!
//! One [`Configuration`] represents one open file in a chain (machine →
//! application → roaming-user → local-user). It owns the declaration tree
//! root (shared with its parent until this file declares something), a
//! cache of lazily materialized sections, the parent-chain link, and the
//! set of path-scoped location overrides.
//!
//! A `Configuration` is a cheap reference-counted handle; a chain is
//! single-threaded and must be externally serialized by the caller.

pub mod location;
mod read;
mod write;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, info};

use crate::activation::TypeRegistry;
use crate::declaration::{ConfigLevel, GroupDecl, SectionDecl};
use crate::element::section::{Section, SectionHandle};
use crate::element::SaveMode;
use crate::error::{ConfigError, SourcePos};
use crate::host::{ConfigHost, LevelStream};
use location::{LocationCollection, LocationInfo};

/// A raw XML fragment captured for lazy materialization, with the line
/// offset needed to keep diagnostics pointing at the original file.
#[derive(Debug, Clone)]
pub(crate) struct RawXml {
    pub text: String,
    pub line_offset: usize,
}

#[derive(Debug, Default)]
pub(crate) struct SectionEntry {
    pub raw: Option<RawXml>,
    pub instance: Option<SectionHandle>,
}

pub(crate) enum ParentLink {
    None,
    /// The next-outer level of the chain; the chain owns its outer levels.
    Owned(Configuration),
    /// Back-reference from a location-opened configuration to its
    /// container, weak to keep the ownership tree acyclic.
    Back(Weak<RefCell<ConfigData>>),
}

pub(crate) struct ConfigData {
    pub host: Rc<dyn ConfigHost>,
    pub registry: Arc<TypeRegistry>,
    pub parent: ParentLink,
    pub level: ConfigLevel,
    pub stream_name: String,
    pub has_file: bool,
    /// Set when this configuration is the content of a `<location>` block.
    pub location_subpath: Option<String>,
    pub root_group: Rc<GroupDecl>,
    /// Whether this file introduced declarations of its own (and therefore
    /// owns a copy of the tree).
    pub owns_declarations: bool,
    pub sections: HashMap<String, SectionEntry>,
    pub locations: LocationCollection,
}

/// One open configuration instance for one file in the chain.
pub struct Configuration {
    pub(crate) data: Rc<RefCell<ConfigData>>,
}

impl Clone for Configuration {
    fn clone(&self) -> Self {
        Configuration {
            data: Rc::clone(&self.data),
        }
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.borrow();
        f.debug_struct("Configuration")
            .field("stream", &data.stream_name)
            .field("level", &data.level)
            .field("has_file", &data.has_file)
            .field("location_subpath", &data.location_subpath)
            .finish()
    }
}

fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl Configuration {
    /// Open a configuration chain. Levels are given outermost first
    /// (machine before application before user); a level without a stream
    /// still participates for default inheritance. Returns the innermost
    /// (most derived) configuration.
    pub fn open(
        host: Rc<dyn ConfigHost>,
        registry: Arc<TypeRegistry>,
        levels: &[LevelStream],
    ) -> Result<Configuration, ConfigError> {
        if levels.is_empty() {
            return Err(ConfigError::Open {
                message: "a configuration chain needs at least one level".to_string(),
            });
        }
        let mut current: Option<Configuration> = None;
        for level in levels {
            let cfg = Self::open_level(Rc::clone(&host), Arc::clone(&registry), level, current)?;
            current = Some(cfg);
        }
        Ok(current.expect("levels checked non-empty"))
    }

    /// Open a single file with no parent chain.
    pub fn open_single(
        host: Rc<dyn ConfigHost>,
        registry: Arc<TypeRegistry>,
        stream: &str,
    ) -> Result<Configuration, ConfigError> {
        Self::open(
            host,
            registry,
            &[LevelStream::new(ConfigLevel::Application, stream)],
        )
    }

    fn open_level(
        host: Rc<dyn ConfigHost>,
        registry: Arc<TypeRegistry>,
        level: &LevelStream,
        parent: Option<Configuration>,
    ) -> Result<Configuration, ConfigError> {
        let root_group = match &parent {
            Some(p) => Rc::clone(&p.data.borrow().root_group),
            None => Rc::new(GroupDecl::root()),
        };
        let stream_name = level
            .stream
            .clone()
            .unwrap_or_else(|| format!("<{}>", level.level.describe()));
        let data = ConfigData {
            host,
            registry,
            parent: match parent {
                Some(p) => ParentLink::Owned(p),
                None => ParentLink::None,
            },
            level: level.level,
            stream_name,
            has_file: false,
            location_subpath: None,
            root_group,
            owns_declarations: false,
            sections: HashMap::new(),
            locations: LocationCollection::default(),
        };
        let cfg = Configuration {
            data: Rc::new(RefCell::new(data)),
        };
        if let Some(stream) = &level.stream {
            let text = cfg.host().read(stream)?;
            if let Some(text) = text {
                info!(stream = %stream, level = level.level.describe(), "reading configuration file");
                read::read_document(&cfg, &text)?;
                cfg.data.borrow_mut().has_file = true;
            }
        }
        Ok(cfg)
    }

    pub(crate) fn host(&self) -> Rc<dyn ConfigHost> {
        Rc::clone(&self.data.borrow().host)
    }

    pub(crate) fn registry(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.data.borrow().registry)
    }

    pub fn stream_name(&self) -> String {
        self.data.borrow().stream_name.clone()
    }

    pub fn has_file(&self) -> bool {
        self.data.borrow().has_file
    }

    pub fn level(&self) -> ConfigLevel {
        self.data.borrow().level
    }

    /// The location path this configuration overrides, when it was opened
    /// from a `<location>` block.
    pub fn location_subpath(&self) -> Option<String> {
        self.data.borrow().location_subpath.clone()
    }

    /// The next-outer configuration in the chain (non-owning for
    /// location-opened configurations).
    pub fn parent(&self) -> Option<Configuration> {
        match &self.data.borrow().parent {
            ParentLink::None => None,
            ParentLink::Owned(cfg) => Some(cfg.clone()),
            ParentLink::Back(weak) => weak.upgrade().map(|data| Configuration { data }),
        }
    }

    /// The shared declaration tree root.
    pub fn declarations(&self) -> Rc<GroupDecl> {
        Rc::clone(&self.data.borrow().root_group)
    }

    /// Declared location blocks at this level.
    pub fn locations(&self) -> Vec<LocationInfo> {
        self.data
            .borrow()
            .locations
            .entries()
            .iter()
            .map(|e| LocationInfo {
                path: e.path.clone(),
                allow_override: e.allow_override,
                opened: e.opened.is_some(),
            })
            .collect()
    }

    /// Declare a new section in this file (copy-on-first-declare) and
    /// materialize an empty instance for it.
    pub fn declare_section(
        &self,
        group_path: &str,
        name: &str,
        type_name: &str,
    ) -> Result<SectionHandle, ConfigError> {
        let full_path = if group_path.is_empty() {
            name.to_string()
        } else {
            format!("{group_path}/{name}")
        };
        {
            let mut data = self.data.borrow_mut();
            let stream = data.stream_name.clone();
            let pos = SourcePos::new(&stream, 0);
            let root = Rc::make_mut(&mut data.root_group);
            let group = root
                .find_group_mut(group_path)
                .ok_or_else(|| ConfigError::Open {
                    message: format!("no section group at '{group_path}'"),
                })?;
            if group.find(name).is_some() {
                return Err(ConfigError::DuplicateSectionDeclaration {
                    name: name.to_string(),
                    pos,
                });
            }
            group.push_section(SectionDecl::new_default(name, type_name, &stream));
            data.owns_declarations = true;
        }
        self.section(&full_path)?.ok_or_else(|| ConfigError::Open {
            message: format!("section '{full_path}' failed to materialize"),
        })
    }

    /// Materialize (or fetch the cached instance of) the section at a
    /// declaration path. `Ok(None)` when the path is not declared.
    pub fn section(&self, path: &str) -> Result<Option<SectionHandle>, ConfigError> {
        let decl = {
            let data = self.data.borrow();
            data.root_group.find_section(path).cloned()
        };
        match decl {
            None => Ok(None),
            Some(decl) => self.section_instance(path, &decl).map(Some),
        }
    }

    fn section_instance(
        &self,
        path: &str,
        decl: &SectionDecl,
    ) -> Result<SectionHandle, ConfigError> {
        if let Some(handle) = {
            let data = self.data.borrow();
            data.sections.get(path).and_then(|e| e.instance.clone())
        } {
            return Ok(handle);
        }

        let (registry, host, stream_name, raw) = {
            let data = self.data.borrow();
            (
                Arc::clone(&data.registry),
                Rc::clone(&data.host),
                data.stream_name.clone(),
                data.sections.get(path).and_then(|e| e.raw.clone()),
            )
        };

        let handle = match registry.lookup(&decl.type_name).cloned() {
            None => {
                // Unknown section types degrade to a raw placeholder: they
                // must never break the whole file.
                debug!(
                    section = path,
                    r#type = %decl.type_name,
                    "section type unresolved, using raw placeholder"
                );
                Rc::new(RefCell::new(Section::raw(
                    leaf_name(path),
                    path,
                    &decl.type_name,
                    raw.map(|r| r.text),
                )))
            }
            Some(ty) => {
                let mut element = registry.instantiate(&ty)?;

                // Seed defaults from the same section one level out.
                let parent_handle = match self.parent() {
                    Some(parent)
                        if parent
                            .data
                            .borrow()
                            .root_group
                            .find_section(path)
                            .is_some() =>
                    {
                        Some(parent.section_instance(path, decl)?)
                    }
                    _ => None,
                };
                {
                    let parent_guard = parent_handle.as_ref().map(|h| h.borrow());
                    let parent_element =
                        parent_guard.as_ref().and_then(|s| s.element().ok());
                    element.reset(parent_element)?;
                }

                let mut section =
                    Section::typed(leaf_name(path), path, &decl.type_name, element);
                if let Some(raw) = raw {
                    read::deserialize_section(&mut section, &raw, &stream_name, host.as_ref())?;
                    section.set_raw_xml(Some(raw.text));
                }
                Rc::new(RefCell::new(section))
            }
        };

        self.data
            .borrow_mut()
            .sections
            .entry(path.to_string())
            .or_default()
            .instance = Some(Rc::clone(&handle));
        Ok(handle)
    }

    /// Open the location block with an exactly matching path at this
    /// level, if any.
    pub fn open_location(&self, path: &str) -> Result<Option<Configuration>, ConfigError> {
        let idx = self.data.borrow().locations.find(path);
        match idx {
            None => Ok(None),
            Some(idx) => self.open_location_index(idx, self.clone()).map(Some),
        }
    }

    /// Resolve the configuration that applies to a relative sub-path:
    /// the parent chain's resolution is computed first (with the path
    /// translated into the parent's namespace) and becomes the parent of
    /// the best-matching location at this level; with no local match the
    /// fallback itself is returned.
    pub fn find_location_configuration(
        &self,
        relative_path: &str,
    ) -> Result<Configuration, ConfigError> {
        self.find_location_with_default(relative_path, self.clone())
    }

    fn find_location_with_default(
        &self,
        relative_path: &str,
        default: Configuration,
    ) -> Result<Configuration, ConfigError> {
        let mut fallback = default;
        if let Some(parent) = self.parent() {
            let parent_relative = match self.location_subpath() {
                Some(sub) => format!("{sub}/{relative_path}"),
                None => relative_path.to_string(),
            };
            fallback = parent.find_location_with_default(&parent_relative, fallback)?;
        }
        let idx = self.data.borrow().locations.find_best(relative_path);
        match idx {
            None => Ok(fallback),
            Some(idx) => self.open_location_index(idx, fallback),
        }
    }

    fn open_location_index(
        &self,
        idx: usize,
        parent: Configuration,
    ) -> Result<Configuration, ConfigError> {
        if let Some(opened) = {
            let data = self.data.borrow();
            data.locations.entries()[idx].opened.clone()
        } {
            return Ok(opened);
        }

        let (path, raw, host, registry, level, stream_name, root_group) = {
            let data = self.data.borrow();
            let entry = &data.locations.entries()[idx];
            (
                entry.path.clone(),
                entry.raw.clone(),
                Rc::clone(&data.host),
                Arc::clone(&data.registry),
                data.level,
                data.stream_name.clone(),
                Rc::clone(&data.root_group),
            )
        };
        debug!(path = %path, stream = %stream_name, "opening location configuration");

        // A location's parent is usually its own container; a strong link
        // there would cycle, so containers are back-referenced weakly.
        let parent_link = if Rc::ptr_eq(&parent.data, &self.data) {
            ParentLink::Back(Rc::downgrade(&self.data))
        } else {
            ParentLink::Owned(parent)
        };

        let sub = Configuration {
            data: Rc::new(RefCell::new(ConfigData {
                host,
                registry,
                parent: parent_link,
                level,
                stream_name,
                has_file: true,
                location_subpath: Some(path),
                root_group,
                owns_declarations: false,
                sections: HashMap::new(),
                locations: LocationCollection::default(),
            })),
        };
        if let Some(raw) = &raw {
            read::read_location_content(&sub, &raw.text, raw.line_offset)?;
        }
        self.data
            .borrow_mut()
            .locations
            .entry_mut(idx)
            .opened = Some(sub.clone());
        Ok(sub)
    }

    /// Serialize this configuration back to its own stream.
    pub fn save(&self, mode: SaveMode) -> Result<(), ConfigError> {
        let stream = self.stream_name();
        self.save_as(&stream, mode)
    }

    /// Serialize this configuration to the named stream.
    pub fn save_as(&self, stream: &str, mode: SaveMode) -> Result<(), ConfigError> {
        if self.location_subpath().is_some() {
            return Err(ConfigError::Open {
                message: "a location configuration is saved through its containing file"
                    .to_string(),
            });
        }
        write::save_to(self, stream, mode)
    }

    /// Parse a document as this configuration's content (tooling support:
    /// the text is read as if it were the backing file).
    pub fn load_text(&self, text: &str) -> Result<(), ConfigError> {
        read::read_document(self, text)?;
        self.data.borrow_mut().has_file = true;
        Ok(())
    }
}
