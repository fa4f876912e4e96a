//! File-format reading.
//!
//! Feeds a document into a `Configuration`: the optional `<configSections>`
//! declaration block first, then data elements and `<location>` blocks.
//! Section data is captured as raw XML and only materialized on first
//! access; location content is captured verbatim until opened.

use std::rc::Rc;

use tracing::debug;

use crate::configuration::location::{normalize_location_path, LocationEntry};
use crate::configuration::{ConfigData, Configuration, RawXml, SectionEntry};
use crate::declaration::DeclNode;
use crate::element::section::Section;
use crate::error::ConfigError;
use crate::host::ConfigHost;
use crate::xml::{Node, StartTag, XmlSource};

const ROOT_ELEMENT: &str = "configuration";

/// Read a whole configuration document into `cfg`.
pub(crate) fn read_document(cfg: &Configuration, text: &str) -> Result<(), ConfigError> {
    let mut data = cfg.data.borrow_mut();
    let stream = data.stream_name.clone();
    let mut src = XmlSource::new(text, &stream, 0);

    let root = src.root()?;
    if root.name != ROOT_ELEMENT {
        return Err(ConfigError::Format {
            message: format!("root element must be <{ROOT_ELEMENT}>, found <{}>", root.name),
            pos: root.pos,
        });
    }
    for (key, _) in &root.attributes {
        if key != "xmlns" {
            return Err(ConfigError::UnrecognizedAttribute {
                name: key.clone(),
                pos: root.pos.clone(),
            });
        }
    }
    if root.empty {
        return Ok(());
    }

    let mut seen_sections_block = false;
    let mut seen_data = false;
    loop {
        match src.next_node()? {
            None => return Err(src.format_err("unexpected end of stream")),
            Some(Node::End(_)) => break,
            Some(Node::Text { pos, .. }) => {
                return Err(ConfigError::Format {
                    message: format!("<{ROOT_ELEMENT}> cannot contain text content"),
                    pos,
                });
            }
            Some(Node::Start(tag)) => match tag.name.as_str() {
                "configSections" => {
                    if seen_sections_block {
                        return Err(ConfigError::DuplicateMember {
                            name: "configSections".to_string(),
                            pos: tag.pos.clone(),
                        });
                    }
                    if seen_data {
                        return Err(ConfigError::Format {
                            message: "<configSections> must appear before any section data"
                                .to_string(),
                            pos: tag.pos.clone(),
                        });
                    }
                    seen_sections_block = true;
                    // Copy-on-first-declare: a shared tree is cloned before
                    // this file's declarations are merged in.
                    let group = Rc::make_mut(&mut data.root_group);
                    group.read_declarations(&mut src, &tag, &stream)?;
                    data.owns_declarations = true;
                }
                "location" => {
                    seen_data = true;
                    read_location_block(&mut data, &mut src, &tag)?;
                }
                _ => {
                    seen_data = true;
                    read_data_element(&mut data, &mut src, &tag, "")?;
                }
            },
        }
    }
    Ok(())
}

fn read_location_block(
    data: &mut ConfigData,
    src: &mut XmlSource<'_>,
    tag: &StartTag,
) -> Result<(), ConfigError> {
    let mut path = String::new();
    let mut allow_override = true;
    for (key, value) in &tag.attributes {
        match key.as_str() {
            "path" => path = normalize_location_path(value, &tag.pos)?,
            "allowOverride" => {
                allow_override = match value.as_str() {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(ConfigError::Format {
                            message: format!(
                                "'allowOverride' must be 'true' or 'false', got '{other}'"
                            ),
                            pos: tag.pos.clone(),
                        });
                    }
                }
            }
            other => {
                return Err(ConfigError::UnrecognizedAttribute {
                    name: other.to_string(),
                    pos: tag.pos.clone(),
                });
            }
        }
    }
    if data.locations.find(&path).is_some() {
        return Err(ConfigError::DuplicateMember {
            name: format!("location path=\"{path}\""),
            pos: tag.pos.clone(),
        });
    }
    let (text, line_offset) = src.inner_raw(tag)?;
    debug!(path = %path, "captured location block");
    data.locations.push(LocationEntry {
        path,
        allow_override,
        raw: Some(RawXml { text, line_offset }),
        opened: None,
    });
    Ok(())
}

/// Read one data element (a section's raw content, or a group wrapper to
/// recurse into) at declaration path `prefix`.
fn read_data_element(
    data: &mut ConfigData,
    src: &mut XmlSource<'_>,
    tag: &StartTag,
    prefix: &str,
) -> Result<(), ConfigError> {
    let path = if prefix.is_empty() {
        tag.name.clone()
    } else {
        format!("{prefix}/{}", tag.name)
    };

    // Owned copy of the declaration so the tree borrow does not outlive
    // the mutations below.
    let node_kind = data
        .root_group
        .find_group(prefix)
        .and_then(|group| group.find(&tag.name))
        .map(|node| match node {
            DeclNode::Section(decl) => Some(decl.clone()),
            DeclNode::Group(_) => None,
        });

    match node_kind {
        None => Err(ConfigError::UndeclaredSection {
            name: path,
            pos: tag.pos.clone(),
        }),
        Some(None) => {
            // A group wrapper: no attributes, children are its members.
            if let Some((key, _)) = tag.attributes.first() {
                return Err(ConfigError::UnrecognizedAttribute {
                    name: key.clone(),
                    pos: tag.pos.clone(),
                });
            }
            if tag.empty {
                return Ok(());
            }
            loop {
                match src.next_node()? {
                    None => return Err(src.format_err("unexpected end of stream")),
                    Some(Node::End(_)) => return Ok(()),
                    Some(Node::Text { pos, .. }) => {
                        return Err(ConfigError::Format {
                            message: format!(
                                "section group '{path}' cannot contain text content"
                            ),
                            pos,
                        });
                    }
                    Some(Node::Start(child)) => {
                        read_data_element(data, src, &child, &path)?;
                    }
                }
            }
        }
        Some(Some(decl)) => {
            decl.definition_allowed(data.level, data.location_subpath.is_some())?;
            if data
                .sections
                .get(&path)
                .is_some_and(|e| e.raw.is_some() || e.instance.is_some())
            {
                return Err(ConfigError::DuplicateMember {
                    name: path,
                    pos: tag.pos.clone(),
                });
            }
            let (text, line_offset) = src.raw_element(tag)?;
            debug!(section = %path, "captured section data");
            data.sections.insert(
                path,
                SectionEntry {
                    raw: Some(RawXml { text, line_offset }),
                    instance: None,
                },
            );
            Ok(())
        }
    }
}

/// Read the verbatim content of a `<location>` block into a location
/// configuration: a sequence of data elements with no document root.
pub(crate) fn read_location_content(
    cfg: &Configuration,
    text: &str,
    line_offset: usize,
) -> Result<(), ConfigError> {
    let mut data = cfg.data.borrow_mut();
    let stream = data.stream_name.clone();
    let mut src = XmlSource::new(text, &stream, line_offset);
    loop {
        match src.next_node()? {
            None => return Ok(()),
            Some(Node::End(name)) => {
                return Err(src.format_err(format!("unbalanced end tag </{name}>")));
            }
            Some(Node::Text { pos, .. }) => {
                return Err(ConfigError::Format {
                    message: "<location> cannot contain text content".to_string(),
                    pos,
                });
            }
            Some(Node::Start(tag)) => read_data_element(&mut data, &mut src, &tag, "")?,
        }
    }
}

/// Deserialize a materialized section's element tree from its captured raw
/// XML, honoring `configSource` redirects and protection state.
pub(crate) fn deserialize_section(
    section: &mut Section,
    raw: &RawXml,
    stream: &str,
    host: &dyn ConfigHost,
) -> Result<(), ConfigError> {
    let mut src = XmlSource::new(&raw.text, stream, raw.line_offset);
    let start = src.root()?;

    if let Some(config_source) = start.attribute("configSource") {
        let config_source = config_source.to_string();
        if start.attributes.len() > 1 {
            return Err(ConfigError::ConfigSourceConflict {
                section: section.path().to_string(),
                config_source,
            });
        }
        if !start.empty {
            match src.next_node()? {
                Some(Node::End(_)) => {}
                _ => {
                    return Err(ConfigError::ConfigSourceConflict {
                        section: section.path().to_string(),
                        config_source,
                    });
                }
            }
        }
        section.set_config_source(&config_source);

        let resolved = host.resolve_relative(stream, &config_source);
        if let Some(external) = host.read(&resolved)? {
            debug!(section = section.path(), file = %resolved, "loading external section content");
            let mut ext_src = XmlSource::new(&external, &resolved, 0);
            let ext_root = ext_src.root()?;
            if ext_root.name != section.name() {
                return Err(ConfigError::Format {
                    message: format!(
                        "external file root must be <{}>, found <{}>",
                        section.name(),
                        ext_root.name
                    ),
                    pos: ext_root.pos,
                });
            }
            if ext_root.attribute("configSource").is_some() {
                return Err(ConfigError::Format {
                    message: "an external section file cannot redirect again".to_string(),
                    pos: ext_root.pos,
                });
            }
            section.element_mut()?.deserialize(&mut ext_src, &ext_root, false)?;
        }
        return Ok(());
    }

    if let Some(provider) = start.attribute("configProtectionProvider") {
        // Decryption belongs to an external protection provider; the
        // section keeps its raw form and passes through saves untouched.
        section.set_protection_provider(provider);
        src.skip_element(&start)?;
        return Ok(());
    }

    section.element_mut()?.deserialize(&mut src, &start, false)
}
