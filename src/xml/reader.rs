//! Pull-style XML reader with position tracking.
//!
//! Wraps a `quick_xml::Reader` over the full document text. Line numbers
//! are derived from byte offsets against the text, which keeps the reader
//! allocation-free on the hot path and lets raw spans (start tag through
//! end tag) be sliced out verbatim. Fragments stored for lazy
//! materialization carry a line offset so their diagnostics still point at
//! the original file.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::error::{ConfigError, SourcePos};

/// A parsed start tag, with its attributes decoded in document order.
#[derive(Debug, Clone)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// `<name/>` rather than `<name>…</name>`.
    pub empty: bool,
    pub pos: SourcePos,
    byte_start: usize,
}

impl StartTag {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One structural node. Comments, processing instructions, and
/// whitespace-only text are skipped by the reader.
#[derive(Debug)]
pub enum Node {
    Start(StartTag),
    End(String),
    Text { content: String, pos: SourcePos },
}

pub struct XmlSource<'a> {
    text: &'a str,
    reader: Reader<&'a [u8]>,
    stream: String,
    line_offset: usize,
}

impl<'a> XmlSource<'a> {
    /// `line_offset` is the number of lines preceding `text` in the
    /// original stream (0 for a whole file).
    pub fn new(text: &'a str, stream: impl Into<String>, line_offset: usize) -> Self {
        XmlSource {
            text,
            reader: Reader::from_str(text),
            stream: stream.into(),
            line_offset,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    fn line_at(&self, byte: usize) -> usize {
        let upto = &self.text.as_bytes()[..byte.min(self.text.len())];
        self.line_offset + 1 + upto.iter().filter(|&&b| b == b'\n').count()
    }

    pub fn pos_at(&self, byte: usize) -> SourcePos {
        SourcePos::new(&self.stream, self.line_at(byte))
    }

    /// Position of the reader's current location.
    pub fn pos(&self) -> SourcePos {
        self.pos_at(self.reader.buffer_position() as usize)
    }

    pub fn format_err(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Format {
            message: message.into(),
            pos: self.pos(),
        }
    }

    fn xml_err(&self, err: quick_xml::Error) -> ConfigError {
        ConfigError::Format {
            message: format!("malformed XML: {err}"),
            pos: self.pos(),
        }
    }

    fn decode_start(&self, e: &quick_xml::events::BytesStart<'_>, empty: bool, byte_start: usize)
        -> Result<StartTag, ConfigError>
    {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attributes: Vec<(String, String)> = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| match err {
                AttrError::Duplicated(..) => ConfigError::DuplicateMember {
                    name: name.clone(),
                    pos: self.pos_at(byte_start),
                },
                other => ConfigError::Format {
                    message: format!("malformed attribute: {other}"),
                    pos: self.pos_at(byte_start),
                },
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| self.xml_err(err))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(StartTag {
            name,
            attributes,
            empty,
            pos: self.pos_at(byte_start),
            byte_start,
        })
    }

    /// The next structural node, or `None` at end of input.
    pub fn next_node(&mut self) -> Result<Option<Node>, ConfigError> {
        loop {
            let byte_start = self.reader.buffer_position() as usize;
            match self.reader.read_event().map_err(|e| self.xml_err(e))? {
                Event::Start(e) => {
                    return Ok(Some(Node::Start(self.decode_start(&e, false, byte_start)?)))
                }
                Event::Empty(e) => {
                    return Ok(Some(Node::Start(self.decode_start(&e, true, byte_start)?)))
                }
                Event::End(e) => {
                    return Ok(Some(Node::End(
                        String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    )))
                }
                Event::Text(t) => {
                    let content = t.unescape().map_err(|e| self.xml_err(e))?;
                    if !content.trim().is_empty() {
                        return Ok(Some(Node::Text {
                            content: content.into_owned(),
                            pos: self.pos_at(byte_start),
                        }));
                    }
                }
                Event::CData(t) => {
                    return Ok(Some(Node::Text {
                        content: String::from_utf8_lossy(&t.into_inner()).into_owned(),
                        pos: self.pos_at(byte_start),
                    }))
                }
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => continue,
                Event::Eof => return Ok(None),
            }
        }
    }

    /// Skip declarations and comments and return the document's root
    /// element start tag.
    pub fn root(&mut self) -> Result<StartTag, ConfigError> {
        match self.next_node()? {
            Some(Node::Start(tag)) => Ok(tag),
            _ => Err(self.format_err("expected a root element")),
        }
    }

    /// Consume the rest of the element opened by `start`, discarding it.
    pub fn skip_element(&mut self, start: &StartTag) -> Result<(), ConfigError> {
        if start.empty {
            return Ok(());
        }
        self.reader
            .read_to_end(QName(start.name.as_bytes()))
            .map(|_| ())
            .map_err(|e| self.xml_err(e))
    }

    /// Consume the element opened by `start` and return its full raw text,
    /// start tag through end tag, plus the line offset to attach when the
    /// fragment is re-parsed later.
    pub fn raw_element(&mut self, start: &StartTag) -> Result<(String, usize), ConfigError> {
        if !start.empty {
            self.reader
                .read_to_end(QName(start.name.as_bytes()))
                .map_err(|e| self.xml_err(e))?;
        }
        let end = self.reader.buffer_position() as usize;
        Ok((
            self.text[start.byte_start..end].to_string(),
            self.line_at(start.byte_start) - 1,
        ))
    }

    /// Consume the element opened by `start` and return its inner content
    /// (between the tags) verbatim, plus the content's line offset.
    pub fn inner_raw(&mut self, start: &StartTag) -> Result<(String, usize), ConfigError> {
        if start.empty {
            return Ok((String::new(), self.line_at(start.byte_start) - 1));
        }
        let span = self
            .reader
            .read_to_end(QName(start.name.as_bytes()))
            .map_err(|e| self.xml_err(e))?;
        Ok((
            self.text[span.start as usize..span.end as usize].to_string(),
            self.line_at(span.start as usize) - 1,
        ))
    }
}
