//! Section declaration tree.
//!
//! The `<configSections>` block of each file maintains a tree, parallel to
//! the data tree, that records for every declared section or group its
//! name, implementing type, and placement policy. The tree is read before
//! any section data and is shared by reference between a configuration and
//! its parent until a file declares something of its own
//! (copy-on-first-declare, done by the owning `Configuration`).

use tracing::debug;

use crate::error::ConfigError;
use crate::xml::{Node, StartTag, XmlSource, XmlWriter};

/// The level of one file in a configuration chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLevel {
    Machine,
    Application,
    RoamingUser,
    LocalUser,
}

impl ConfigLevel {
    fn rank(self) -> u8 {
        match self {
            ConfigLevel::Machine => 0,
            ConfigLevel::Application => 1,
            ConfigLevel::RoamingUser => 2,
            ConfigLevel::LocalUser => 3,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ConfigLevel::Machine => "machine",
            ConfigLevel::Application => "application",
            ConfigLevel::RoamingUser => "roaming-user",
            ConfigLevel::LocalUser => "local-user",
        }
    }
}

/// Where a section may be defined in the generic (location-aware) sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowDefinition {
    MachineOnly,
    MachineToApplication,
    #[default]
    Everywhere,
}

impl AllowDefinition {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "MachineOnly" => Some(AllowDefinition::MachineOnly),
            "MachineToApplication" => Some(AllowDefinition::MachineToApplication),
            "Everywhere" => Some(AllowDefinition::Everywhere),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AllowDefinition::MachineOnly => "MachineOnly",
            AllowDefinition::MachineToApplication => "MachineToApplication",
            AllowDefinition::Everywhere => "Everywhere",
        }
    }
}

/// Where a section may be defined along the exe chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowExeDefinition {
    MachineOnly,
    #[default]
    MachineToApplication,
    MachineToRoamingUser,
    MachineToLocalUser,
}

impl AllowExeDefinition {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "MachineOnly" => Some(AllowExeDefinition::MachineOnly),
            "MachineToApplication" => Some(AllowExeDefinition::MachineToApplication),
            "MachineToRoamingUser" => Some(AllowExeDefinition::MachineToRoamingUser),
            "MachineToLocalUser" => Some(AllowExeDefinition::MachineToLocalUser),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AllowExeDefinition::MachineOnly => "MachineOnly",
            AllowExeDefinition::MachineToApplication => "MachineToApplication",
            AllowExeDefinition::MachineToRoamingUser => "MachineToRoamingUser",
            AllowExeDefinition::MachineToLocalUser => "MachineToLocalUser",
        }
    }

    fn max_rank(self) -> u8 {
        match self {
            AllowExeDefinition::MachineOnly => 0,
            AllowExeDefinition::MachineToApplication => 1,
            AllowExeDefinition::MachineToRoamingUser => 2,
            AllowExeDefinition::MachineToLocalUser => 3,
        }
    }
}

/// Declaration of one section: name, implementing type, placement policy.
#[derive(Debug, Clone)]
pub struct SectionDecl {
    pub name: String,
    pub type_name: String,
    /// The stream that first declared this section.
    pub stream_name: String,
    pub allow_location: bool,
    pub allow_definition: AllowDefinition,
    pub allow_exe_definition: AllowExeDefinition,
    pub require_permission: bool,
    pub restart_on_external_changes: bool,
}

impl SectionDecl {
    /// A declaration with default placement policy, for programmatic
    /// registration.
    pub fn new_default(name: &str, type_name: &str, stream_name: &str) -> Self {
        Self::new(name.to_string(), type_name.to_string(), stream_name.to_string())
    }

    fn new(name: String, type_name: String, stream_name: String) -> Self {
        SectionDecl {
            name,
            type_name,
            stream_name,
            allow_location: true,
            allow_definition: AllowDefinition::default(),
            allow_exe_definition: AllowExeDefinition::default(),
            require_permission: true,
            restart_on_external_changes: true,
        }
    }

    /// Check the placement policy for defining this section's data at the
    /// given level (and location context).
    pub fn definition_allowed(
        &self,
        level: ConfigLevel,
        in_location: bool,
    ) -> Result<(), ConfigError> {
        if in_location && !self.allow_location {
            return Err(ConfigError::SectionPlacement {
                section: self.name.clone(),
                allowed: "outside <location> blocks only".to_string(),
            });
        }
        let definition_ok = match self.allow_definition {
            AllowDefinition::MachineOnly => level == ConfigLevel::Machine,
            AllowDefinition::MachineToApplication => level.rank() <= ConfigLevel::Application.rank(),
            AllowDefinition::Everywhere => true,
        };
        if !definition_ok {
            return Err(ConfigError::SectionPlacement {
                section: self.name.clone(),
                allowed: format!("allowDefinition={}", self.allow_definition.as_str()),
            });
        }
        if level.rank() > self.allow_exe_definition.max_rank() {
            return Err(ConfigError::SectionPlacement {
                section: self.name.clone(),
                allowed: format!("allowExeDefinition={}", self.allow_exe_definition.as_str()),
            });
        }
        Ok(())
    }
}

/// Declaration of a section group: a named namespace of sections and
/// nested groups.
#[derive(Debug, Clone)]
pub struct GroupDecl {
    pub name: String,
    pub type_name: Option<String>,
    pub stream_name: String,
    children: Vec<DeclNode>,
}

/// A declaration node: section or group. Within one group, a name denotes
/// at most one child of one consistent kind.
#[derive(Debug, Clone)]
pub enum DeclNode {
    Section(SectionDecl),
    Group(GroupDecl),
}

impl DeclNode {
    pub fn name(&self) -> &str {
        match self {
            DeclNode::Section(s) => &s.name,
            DeclNode::Group(g) => &g.name,
        }
    }
}

impl GroupDecl {
    /// The invisible root group of a declaration tree.
    pub fn root() -> Self {
        GroupDecl {
            name: String::new(),
            type_name: None,
            stream_name: String::new(),
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[DeclNode] {
        &self.children
    }

    pub fn find(&self, name: &str) -> Option<&DeclNode> {
        self.children.iter().find(|c| c.name() == name)
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.name() == name)
    }

    /// Resolve a slash-separated path to a section declaration.
    pub fn find_section(&self, path: &str) -> Option<&SectionDecl> {
        let (group, leaf) = self.walk(path)?;
        match group.find(leaf)? {
            DeclNode::Section(s) => Some(s),
            DeclNode::Group(_) => None,
        }
    }

    /// Resolve a slash-separated path to a group declaration.
    pub fn find_group(&self, path: &str) -> Option<&GroupDecl> {
        if path.is_empty() {
            return Some(self);
        }
        let (group, leaf) = self.walk(path)?;
        match group.find(leaf)? {
            DeclNode::Group(g) => Some(g),
            DeclNode::Section(_) => None,
        }
    }

    /// Resolve a slash-separated path to a mutable group, for programmatic
    /// declaration.
    pub(crate) fn find_group_mut(&mut self, path: &str) -> Option<&mut GroupDecl> {
        if path.is_empty() {
            return Some(self);
        }
        let (head, tail) = match path.split_once('/') {
            Some((head, tail)) => (head, Some(tail)),
            None => (path, None),
        };
        let idx = self.find_index(head)?;
        match &mut self.children[idx] {
            DeclNode::Group(group) => match tail {
                None => Some(group),
                Some(tail) => group.find_group_mut(tail),
            },
            DeclNode::Section(_) => None,
        }
    }

    pub(crate) fn push_section(&mut self, decl: SectionDecl) {
        self.children.push(DeclNode::Section(decl));
    }

    fn walk<'a, 'p>(&'a self, path: &'p str) -> Option<(&'a GroupDecl, &'p str)> {
        let mut group = self;
        let mut rest = path;
        while let Some((head, tail)) = rest.split_once('/') {
            match group.find(head)? {
                DeclNode::Group(g) => group = g,
                DeclNode::Section(_) => return None,
            }
            rest = tail;
        }
        Some((group, rest))
    }

    /// Whether this group or any descendant declares something in `stream`.
    pub(crate) fn declares_in_stream(&self, stream: &str) -> bool {
        self.children.iter().any(|child| match child {
            DeclNode::Section(s) => s.stream_name == stream,
            DeclNode::Group(g) => g.stream_name == stream || g.declares_in_stream(stream),
        })
    }

    /// Read the children of a `<configSections>` or `<sectionGroup>`
    /// element into this group.
    pub(crate) fn read_declarations(
        &mut self,
        src: &mut XmlSource<'_>,
        start: &StartTag,
        stream: &str,
    ) -> Result<(), ConfigError> {
        if start.empty {
            return Ok(());
        }
        loop {
            match src.next_node()? {
                None => return Err(src.format_err("unexpected end of stream")),
                Some(Node::End(_)) => return Ok(()),
                Some(Node::Text { pos, .. }) => {
                    return Err(ConfigError::Format {
                        message: "declaration blocks cannot contain text content".to_string(),
                        pos,
                    });
                }
                Some(Node::Start(tag)) => match tag.name.as_str() {
                    "section" => self.read_section_decl(src, &tag, stream)?,
                    "sectionGroup" => self.read_group_decl(src, &tag, stream)?,
                    "remove" => {
                        let name = require_attr(&tag, "name")?;
                        src.skip_element(&tag)?;
                        match self.find_index(name) {
                            Some(idx) => {
                                debug!(section = name, "removing section declaration");
                                self.children.remove(idx);
                            }
                            None => {
                                return Err(ConfigError::UnknownSectionRemoval {
                                    name: name.to_string(),
                                    pos: tag.pos.clone(),
                                });
                            }
                        }
                    }
                    "clear" => {
                        src.skip_element(&tag)?;
                        self.children.clear();
                    }
                    other => {
                        return Err(ConfigError::UnrecognizedElement {
                            name: other.to_string(),
                            pos: tag.pos.clone(),
                        });
                    }
                },
            }
        }
    }

    fn read_section_decl(
        &mut self,
        src: &mut XmlSource<'_>,
        tag: &StartTag,
        stream: &str,
    ) -> Result<(), ConfigError> {
        let name = require_attr(tag, "name")?.to_string();
        let type_name = require_attr(tag, "type")?.to_string();
        src.skip_element(tag)?;

        match self.find_index(&name) {
            Some(idx) => {
                // Re-declaration from a descendant file: the type identity
                // must hold; explicitly given policy attributes are merged.
                let node = &mut self.children[idx];
                match node {
                    DeclNode::Section(existing) if existing.type_name == type_name => {
                        apply_policy_attrs(existing, tag)?;
                        Ok(())
                    }
                    _ => Err(ConfigError::DuplicateSectionDeclaration {
                        name,
                        pos: tag.pos.clone(),
                    }),
                }
            }
            None => {
                let mut decl = SectionDecl::new(name, type_name, stream.to_string());
                apply_policy_attrs(&mut decl, tag)?;
                debug!(section = %decl.name, r#type = %decl.type_name, "declared section");
                self.children.push(DeclNode::Section(decl));
                Ok(())
            }
        }
    }

    fn read_group_decl(
        &mut self,
        src: &mut XmlSource<'_>,
        tag: &StartTag,
        stream: &str,
    ) -> Result<(), ConfigError> {
        let name = require_attr(tag, "name")?.to_string();
        let type_name = tag.attribute("type").map(str::to_string);

        let idx = match self.find_index(&name) {
            Some(idx) => match &mut self.children[idx] {
                DeclNode::Group(existing) => {
                    match (&existing.type_name, &type_name) {
                        (Some(a), Some(b)) if a != b => {
                            return Err(ConfigError::DuplicateSectionDeclaration {
                                name,
                                pos: tag.pos.clone(),
                            });
                        }
                        (None, Some(_)) => existing.type_name = type_name.clone(),
                        _ => {}
                    }
                    idx
                }
                DeclNode::Section(_) => {
                    return Err(ConfigError::DuplicateSectionDeclaration {
                        name,
                        pos: tag.pos.clone(),
                    });
                }
            },
            None => {
                self.children.push(DeclNode::Group(GroupDecl {
                    name,
                    type_name,
                    stream_name: stream.to_string(),
                    children: Vec::new(),
                }));
                self.children.len() - 1
            }
        };

        match &mut self.children[idx] {
            DeclNode::Group(group) => group.read_declarations(src, tag, stream),
            DeclNode::Section(_) => unreachable!("index points at a group"),
        }
    }

    /// Write the declarations owned by `stream` into an open
    /// `<configSections>` (or `<sectionGroup>`) element.
    pub(crate) fn write_declarations(
        &self,
        w: &mut XmlWriter,
        stream: &str,
    ) -> Result<(), ConfigError> {
        for child in &self.children {
            match child {
                DeclNode::Section(s) if s.stream_name == stream => {
                    w.start_element("section")?;
                    w.attribute("name", &s.name)?;
                    w.attribute("type", &s.type_name)?;
                    if !s.allow_location {
                        w.attribute("allowLocation", "false")?;
                    }
                    if s.allow_definition != AllowDefinition::default() {
                        w.attribute("allowDefinition", s.allow_definition.as_str())?;
                    }
                    if s.allow_exe_definition != AllowExeDefinition::default() {
                        w.attribute("allowExeDefinition", s.allow_exe_definition.as_str())?;
                    }
                    if !s.require_permission {
                        w.attribute("requirePermission", "false")?;
                    }
                    if !s.restart_on_external_changes {
                        w.attribute("restartOnExternalChanges", "false")?;
                    }
                    w.end_element()?;
                }
                DeclNode::Group(g)
                    if g.stream_name == stream || g.declares_in_stream(stream) =>
                {
                    w.start_element("sectionGroup")?;
                    w.attribute("name", &g.name)?;
                    if let Some(ty) = &g.type_name {
                        w.attribute("type", ty)?;
                    }
                    g.write_declarations(w, stream)?;
                    w.end_element()?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn require_attr<'t>(tag: &'t StartTag, name: &str) -> Result<&'t str, ConfigError> {
    tag.attribute(name).ok_or_else(|| ConfigError::Format {
        message: format!("<{}> requires a '{name}' attribute", tag.name),
        pos: tag.pos.clone(),
    })
}

fn bool_attr(tag: &StartTag, name: &str) -> Result<Option<bool>, ConfigError> {
    match tag.attribute(name) {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(ConfigError::Format {
            message: format!("'{name}' must be 'true' or 'false', got '{other}'"),
            pos: tag.pos.clone(),
        }),
    }
}

fn policy_err(tag: &StartTag, attr: &str, raw: &str) -> ConfigError {
    ConfigError::Format {
        message: format!("invalid {attr} value '{raw}'"),
        pos: tag.pos.clone(),
    }
}

fn apply_policy_attrs(decl: &mut SectionDecl, tag: &StartTag) -> Result<(), ConfigError> {
    for (key, value) in &tag.attributes {
        match key.as_str() {
            "name" | "type" => {}
            "allowLocation" => {
                decl.allow_location = bool_attr(tag, "allowLocation")?.unwrap_or(true);
            }
            "allowDefinition" => {
                decl.allow_definition = AllowDefinition::parse(value)
                    .ok_or_else(|| policy_err(tag, "allowDefinition", value))?;
            }
            "allowExeDefinition" => {
                decl.allow_exe_definition = AllowExeDefinition::parse(value)
                    .ok_or_else(|| policy_err(tag, "allowExeDefinition", value))?;
            }
            "requirePermission" => {
                decl.require_permission = bool_attr(tag, "requirePermission")?.unwrap_or(true);
            }
            "restartOnExternalChanges" => {
                decl.restart_on_external_changes =
                    bool_attr(tag, "restartOnExternalChanges")?.unwrap_or(true);
            }
            other => {
                return Err(ConfigError::UnrecognizedAttribute {
                    name: other.to_string(),
                    pos: tag.pos.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(xml: &str, stream: &str) -> Result<GroupDecl, ConfigError> {
        let mut root = GroupDecl::root();
        let mut src = XmlSource::new(xml, stream, 0);
        let start = src.root()?;
        root.read_declarations(&mut src, &start, stream)?;
        Ok(root)
    }

    #[test]
    fn declares_sections_and_groups() {
        let root = read(
            r#"<configSections>
                 <section name="web" type="T1"/>
                 <sectionGroup name="system">
                   <section name="net" type="T2" allowDefinition="MachineOnly"/>
                 </sectionGroup>
               </configSections>"#,
            "machine.config",
        )
        .unwrap();
        assert_eq!(root.find_section("web").unwrap().type_name, "T1");
        let net = root.find_section("system/net").unwrap();
        assert_eq!(net.type_name, "T2");
        assert_eq!(net.allow_definition, AllowDefinition::MachineOnly);
        assert!(root.find_group("system").is_some());
        assert!(root.find_section("system").is_none());
    }

    #[test]
    fn redeclaration_with_same_type_merges() {
        let mut root = read(
            r#"<configSections><section name="web" type="T1"/></configSections>"#,
            "machine.config",
        )
        .unwrap();
        let mut src = XmlSource::new(
            r#"<configSections><section name="web" type="T1" allowLocation="false"/></configSections>"#,
            "app.config",
            0,
        );
        let start = src.root().unwrap();
        root.read_declarations(&mut src, &start, "app.config").unwrap();
        let web = root.find_section("web").unwrap();
        assert!(!web.allow_location);
        // Still owned by the declaring stream.
        assert_eq!(web.stream_name, "machine.config");
    }

    #[test]
    fn redeclaration_with_different_type_fails() {
        let mut root = read(
            r#"<configSections><section name="web" type="T1"/></configSections>"#,
            "machine.config",
        )
        .unwrap();
        let mut src = XmlSource::new(
            r#"<configSections><section name="web" type="Other"/></configSections>"#,
            "app.config",
            0,
        );
        let start = src.root().unwrap();
        let err = root
            .read_declarations(&mut src, &start, "app.config")
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSectionDeclaration { .. }));
    }

    #[test]
    fn section_and_group_names_conflict() {
        let err = read(
            r#"<configSections>
                 <section name="x" type="T"/>
                 <sectionGroup name="x"/>
               </configSections>"#,
            "a.config",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSectionDeclaration { .. }));
    }

    #[test]
    fn remove_requires_existing_declaration() {
        let err = read(
            r#"<configSections><remove name="ghost"/></configSections>"#,
            "a.config",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSectionRemoval { .. }));
    }

    #[test]
    fn remove_deletes_declaration() {
        let root = read(
            r#"<configSections>
                 <section name="web" type="T"/>
                 <remove name="web"/>
               </configSections>"#,
            "a.config",
        )
        .unwrap();
        assert!(root.find_section("web").is_none());
    }

    #[test]
    fn clear_removes_all_declarations() {
        let root = read(
            r#"<configSections>
                 <section name="a" type="T"/>
                 <section name="b" type="T"/>
                 <clear/>
                 <section name="c" type="T"/>
               </configSections>"#,
            "a.config",
        )
        .unwrap();
        assert!(root.find_section("a").is_none());
        assert!(root.find_section("c").is_some());
    }

    #[test]
    fn placement_policy_is_enforced() {
        let root = read(
            r#"<configSections>
                 <section name="m" type="T" allowExeDefinition="MachineOnly"/>
                 <section name="u" type="T" allowExeDefinition="MachineToLocalUser"/>
               </configSections>"#,
            "machine.config",
        )
        .unwrap();
        let m = root.find_section("m").unwrap();
        assert!(m.definition_allowed(ConfigLevel::Machine, false).is_ok());
        assert!(m
            .definition_allowed(ConfigLevel::Application, false)
            .is_err());
        let u = root.find_section("u").unwrap();
        assert!(u.definition_allowed(ConfigLevel::LocalUser, false).is_ok());
    }

    #[test]
    fn location_placement_is_enforced() {
        let root = read(
            r#"<configSections><section name="x" type="T" allowLocation="false"/></configSections>"#,
            "a.config",
        )
        .unwrap();
        let x = root.find_section("x").unwrap();
        let err = x
            .definition_allowed(ConfigLevel::Application, true)
            .unwrap_err();
        assert!(matches!(err, ConfigError::SectionPlacement { .. }));
    }

    #[test]
    fn declarations_round_trip_per_stream() {
        let root = read(
            r#"<configSections>
                 <section name="a" type="TA" allowLocation="false"/>
                 <sectionGroup name="g"><section name="b" type="TB"/></sectionGroup>
               </configSections>"#,
            "app.config",
        )
        .unwrap();
        let mut w = XmlWriter::new();
        w.start_element("configSections").unwrap();
        root.write_declarations(&mut w, "app.config").unwrap();
        w.end_element().unwrap();
        let out = w.into_string().unwrap();
        assert!(out.contains(r#"<section name="a" type="TA" allowLocation="false"/>"#));
        assert!(out.contains(r#"<sectionGroup name="g">"#));
        assert!(out.contains(r#"<section name="b" type="TB"/>"#));

        // A different stream owns none of these.
        let mut w = XmlWriter::new();
        w.start_element("configSections").unwrap();
        root.write_declarations(&mut w, "other.config").unwrap();
        w.end_element().unwrap();
        assert_eq!(w.into_string().unwrap(), "<configSections/>");
    }
}
