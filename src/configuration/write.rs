//! Save: unmerge-driven serialization.
//!
//! Saving walks the declaration tree, asks each materialized section to
//! unmerge against its parent-chain counterpart, and writes only what the
//! configured save mode requires. Unopened sections and location blocks
//! pass through verbatim so content this process never parsed is not lost.

use tracing::{debug, info};

use crate::configuration::Configuration;
use crate::declaration::{DeclNode, SectionDecl};
use crate::element::{ConfigElement, SaveMode};
use crate::error::ConfigError;
use crate::xml::XmlWriter;

/// A section prepared for writing.
enum PreparedSection {
    /// Verbatim raw XML: unopened data, unresolved type, protected content.
    Passthrough(String),
    /// A materialized section's diff, written inline.
    Inline { tag: String, diff: ConfigElement },
    /// A `configSource` redirect: the diff goes to the external stream and
    /// only the redirect attribute stays inline.
    Redirect { tag: String, config_source: String },
}

enum PreparedNode {
    Section(PreparedSection),
    Group(String, Vec<PreparedNode>),
}

pub(crate) fn save_to(
    cfg: &Configuration,
    stream: &str,
    mode: SaveMode,
) -> Result<(), ConfigError> {
    info!(stream, ?mode, "saving configuration");
    let mut external_writes: Vec<(String, String)> = Vec::new();
    let text = write_document(cfg, stream, mode, &mut external_writes)?;

    let host = cfg.host();
    host.write(stream, &text)?;
    for (external_stream, content) in external_writes {
        debug!(stream = %external_stream, "writing external section content");
        host.write(&external_stream, &content)?;
    }
    cfg.data.borrow_mut().has_file = true;
    Ok(())
}

fn write_document(
    cfg: &Configuration,
    target_stream: &str,
    mode: SaveMode,
    external_writes: &mut Vec<(String, String)>,
) -> Result<String, ConfigError> {
    let mut w = XmlWriter::new();
    w.decl()?;
    w.start_element("configuration")?;

    // Declarations this file owns.
    {
        let data = cfg.data.borrow();
        let own_stream = data.stream_name.clone();
        if data.root_group.declares_in_stream(&own_stream) {
            w.start_element("configSections")?;
            data.root_group.write_declarations(&mut w, &own_stream)?;
            w.end_element()?;
        }
    }

    // Root-scope section data.
    let prepared = prepare_group(cfg, "", mode, target_stream, external_writes)?;
    write_prepared(&mut w, &prepared)?;

    // Location blocks: re-serialize opened ones, pass the rest through.
    let locations: Vec<_> = {
        let data = cfg.data.borrow();
        data.locations.entries().to_vec()
    };
    for entry in locations {
        w.start_element("location")?;
        if !entry.path.is_empty() {
            w.attribute("path", &entry.path)?;
        }
        if !entry.allow_override {
            w.attribute("allowOverride", "false")?;
        }
        match &entry.opened {
            Some(sub) => {
                let prepared = prepare_group(sub, "", mode, target_stream, external_writes)?;
                write_prepared(&mut w, &prepared)?;
            }
            None => {
                if let Some(raw) = &entry.raw {
                    w.raw(&raw.text)?;
                }
            }
        }
        w.end_element()?;
    }

    w.end_element()?;
    w.into_string()
}

/// Prepare the sections under one declaration group, depth first. Groups
/// with no content are dropped entirely.
fn prepare_group(
    cfg: &Configuration,
    group_path: &str,
    mode: SaveMode,
    target_stream: &str,
    external_writes: &mut Vec<(String, String)>,
) -> Result<Vec<PreparedNode>, ConfigError> {
    let root = cfg.declarations();
    let Some(group) = root.find_group(group_path) else {
        return Ok(Vec::new());
    };
    let mut nodes = Vec::new();
    for child in group.children() {
        match child {
            DeclNode::Group(g) => {
                let path = if group_path.is_empty() {
                    g.name.clone()
                } else {
                    format!("{group_path}/{}", g.name)
                };
                let inner = prepare_group(cfg, &path, mode, target_stream, external_writes)?;
                if !inner.is_empty() {
                    nodes.push(PreparedNode::Group(g.name.clone(), inner));
                }
            }
            DeclNode::Section(decl) => {
                let path = if group_path.is_empty() {
                    decl.name.clone()
                } else {
                    format!("{group_path}/{}", decl.name)
                };
                if let Some(section) =
                    prepare_section(cfg, &path, decl, mode, target_stream, external_writes)?
                {
                    nodes.push(PreparedNode::Section(section));
                }
            }
        }
    }
    Ok(nodes)
}

fn prepare_section(
    cfg: &Configuration,
    path: &str,
    decl: &SectionDecl,
    mode: SaveMode,
    target_stream: &str,
    external_writes: &mut Vec<(String, String)>,
) -> Result<Option<PreparedSection>, ConfigError> {
    let (raw, instance) = {
        let data = cfg.data.borrow();
        match data.sections.get(path) {
            None => return Ok(None),
            Some(entry) => (entry.raw.clone(), entry.instance.clone()),
        }
    };

    let Some(handle) = instance else {
        // Never materialized: the stored raw XML is already the minimal
        // local delta; pass it through.
        return Ok(raw.map(|r| PreparedSection::Passthrough(r.text)));
    };

    let section = handle.borrow();
    if !section.is_typed() || section.is_protected() {
        return Ok(section
            .raw_xml()
            .map(|r| PreparedSection::Passthrough(r.to_string())));
    }

    let registry = cfg.registry();
    let ty = registry
        .lookup(section.type_name())
        .cloned()
        .ok_or_else(|| ConfigError::TypeActivation {
            type_name: section.type_name().to_string(),
            message: "element type disappeared from the registry".to_string(),
        })?;

    // The parent-chain counterpart supplies the diff baseline.
    let parent_handle = match cfg.parent() {
        Some(parent)
            if parent
                .data
                .borrow()
                .root_group
                .find_section(path)
                .is_some() =>
        {
            Some(parent.section(path)?.ok_or_else(|| ConfigError::Open {
                message: format!("parent section '{path}' failed to materialize"),
            })?)
        }
        _ => None,
    };
    let parent_guard = parent_handle.as_ref().map(|h| h.borrow());
    let parent_element = parent_guard.as_ref().and_then(|s| s.element().ok());

    let mut diff = registry.instantiate(&ty)?;
    diff.unmerge(section.element()?, parent_element, mode)?;

    let has_output = diff.has_values() || mode == SaveMode::Full;
    if !has_output && section.config_source().is_empty() {
        return Ok(None);
    }

    // Writing data here must be legal for this level and location context.
    // A purely inherited instance (materialized for reading, never changed,
    // no data in this file) is silently skipped instead; only content that
    // actually originates here can violate placement.
    if let Err(e) = decl.definition_allowed(cfg.level(), cfg.location_subpath().is_some()) {
        if raw.is_none() && !section.is_modified() {
            return Ok(None);
        }
        return Err(e);
    }

    let tag = section.name().to_string();
    if section.config_source().is_empty() {
        Ok(Some(PreparedSection::Inline { tag, diff }))
    } else {
        let config_source = section.config_source().to_string();
        let resolved = cfg
            .host()
            .resolve_relative(target_stream, &config_source);
        let mut ext = XmlWriter::new();
        ext.decl()?;
        ext.start_element(&tag)?;
        diff.serialize(&mut ext, false)?;
        ext.end_element()?;
        external_writes.push((resolved, ext.into_string()?));
        Ok(Some(PreparedSection::Redirect { tag, config_source }))
    }
}

fn write_prepared(w: &mut XmlWriter, nodes: &[PreparedNode]) -> Result<(), ConfigError> {
    for node in nodes {
        match node {
            PreparedNode::Group(name, children) => {
                w.start_element(name)?;
                write_prepared(w, children)?;
                w.end_element()?;
            }
            PreparedNode::Section(PreparedSection::Passthrough(raw)) => {
                w.raw(raw)?;
            }
            PreparedNode::Section(PreparedSection::Inline { tag, diff }) => {
                w.start_element(tag)?;
                diff.serialize(w, false)?;
                w.end_element()?;
            }
            PreparedNode::Section(PreparedSection::Redirect { tag, config_source }) => {
                w.start_element(tag)?;
                w.attribute("configSource", config_source)?;
                w.end_element()?;
            }
        }
    }
    Ok(())
}
