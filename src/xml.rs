//! Structured-text reading and writing.
//!
//! Thin, line-aware wrappers over `quick-xml`. The reader operates on an
//! in-memory document so that raw element spans can be captured verbatim
//! for lazy materialization and save-time passthrough; the writer buffers
//! the currently open start tag so attributes can be appended before the
//! tag is committed.

pub mod reader;
pub mod writer;

pub use reader::{Node, StartTag, XmlSource};
pub use writer::XmlWriter;
