//! Indenting XML writer.
//!
//! Wraps `quick_xml::Writer` with a pending-start-tag buffer: callers open
//! an element, append attributes, then either nest children or close it.
//! An element closed with no intervening content collapses to the empty
//! form (`<x/>`). Raw passthrough writes stored fragments byte-for-byte so
//! unopened foreign content survives a save.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::ConfigError;

pub struct XmlWriter {
    inner: Writer<Cursor<Vec<u8>>>,
    pending: Option<BytesStart<'static>>,
    stack: Vec<String>,
    writes: usize,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        XmlWriter {
            inner: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
            pending: None,
            stack: Vec::new(),
            writes: 0,
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), ConfigError> {
        self.inner
            .write_event(event)
            .map_err(|e| ConfigError::Serialize {
                message: e.to_string(),
            })?;
        self.writes += 1;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), ConfigError> {
        if let Some(start) = self.pending.take() {
            self.emit(Event::Start(start))?;
        }
        Ok(())
    }

    /// Number of writes so far; callers compare marks to learn whether a
    /// serialization step produced anything.
    pub fn mark(&self) -> usize {
        self.writes
    }

    pub fn wrote_since(&self, mark: usize) -> bool {
        self.writes > mark
    }

    /// Write the `<?xml … ?>` declaration.
    pub fn decl(&mut self) -> Result<(), ConfigError> {
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
    }

    pub fn start_element(&mut self, name: &str) -> Result<(), ConfigError> {
        self.flush_pending()?;
        self.pending = Some(BytesStart::new(name.to_string()));
        self.stack.push(name.to_string());
        Ok(())
    }

    /// Append an attribute to the currently open, not-yet-committed start
    /// tag. The value is escaped.
    pub fn attribute(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((key, value));
                self.writes += 1;
                Ok(())
            }
            None => Err(ConfigError::Serialize {
                message: format!("attribute '{key}' written outside a start tag"),
            }),
        }
    }

    pub fn end_element(&mut self) -> Result<(), ConfigError> {
        let name = self.stack.pop().ok_or_else(|| ConfigError::Serialize {
            message: "end_element with no open element".to_string(),
        })?;
        match self.pending.take() {
            Some(start) => self.emit(Event::Empty(start)),
            None => self.emit(Event::End(BytesEnd::new(name))),
        }
    }

    /// Write an already-serialized fragment verbatim.
    pub fn raw(&mut self, content: &str) -> Result<(), ConfigError> {
        if content.trim().is_empty() {
            return Ok(());
        }
        self.flush_pending()?;
        self.emit(Event::Text(BytesText::from_escaped(content.trim())))
    }

    /// Write escaped text content.
    pub fn text(&mut self, content: &str) -> Result<(), ConfigError> {
        self.flush_pending()?;
        self.emit(Event::Text(BytesText::new(content)))
    }

    pub fn into_string(mut self) -> Result<String, ConfigError> {
        self.flush_pending()?;
        if !self.stack.is_empty() {
            return Err(ConfigError::Serialize {
                message: format!("unclosed element '{}'", self.stack[self.stack.len() - 1]),
            });
        }
        let bytes = self.inner.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_element_collapses() {
        let mut w = XmlWriter::new();
        w.start_element("clear").unwrap();
        w.end_element().unwrap();
        assert_eq!(w.into_string().unwrap(), "<clear/>");
    }

    #[test]
    fn attributes_are_escaped() {
        let mut w = XmlWriter::new();
        w.start_element("add").unwrap();
        w.attribute("key", "a<b&\"c\"").unwrap();
        w.end_element().unwrap();
        let out = w.into_string().unwrap();
        assert!(out.contains("&lt;"));
        assert!(out.contains("&amp;"));
        assert!(!out.contains("a<b"));
    }

    #[test]
    fn nested_elements_are_indented() {
        let mut w = XmlWriter::new();
        w.start_element("configuration").unwrap();
        w.start_element("appSettings").unwrap();
        w.start_element("add").unwrap();
        w.attribute("key", "x").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        let out = w.into_string().unwrap();
        assert_eq!(
            out,
            "<configuration>\n  <appSettings>\n    <add key=\"x\"/>\n  </appSettings>\n</configuration>"
        );
    }

    #[test]
    fn raw_passes_markup_through() {
        let mut w = XmlWriter::new();
        w.start_element("location").unwrap();
        w.raw("<x a=\"9\"/>").unwrap();
        w.end_element().unwrap();
        let out = w.into_string().unwrap();
        assert!(out.contains("<x a=\"9\"/>"));
    }

    #[test]
    fn unclosed_element_is_an_error() {
        let mut w = XmlWriter::new();
        w.start_element("configuration").unwrap();
        assert!(w.into_string().is_err());
    }

    #[test]
    fn marks_detect_output() {
        let mut w = XmlWriter::new();
        w.start_element("a").unwrap();
        let mark = w.mark();
        assert!(!w.wrote_since(mark));
        w.attribute("k", "v").unwrap();
        assert!(w.wrote_since(mark));
        w.end_element().unwrap();
    }
}
