//! Path-scoped location overrides.
//!
//! A `<location path="…">` block supplies configuration applicable only to
//! a sub-path. Blocks are kept verbatim until a caller opens them; an
//! unopened block passes through a save byte-for-byte so unparsed content
//! is never lost.

use crate::configuration::{Configuration, RawXml};
use crate::error::{ConfigError, SourcePos};

#[derive(Debug, Clone)]
pub(crate) struct LocationEntry {
    /// Normalized path (trailing separators trimmed, original case kept).
    pub path: String,
    pub allow_override: bool,
    /// Verbatim inner XML, present until (and after) the block is opened.
    pub raw: Option<RawXml>,
    /// Lazily opened sub-configuration; set at most once.
    pub opened: Option<Configuration>,
}

/// Public summary of a location block.
#[derive(Debug, Clone)]
pub struct LocationInfo {
    pub path: String,
    pub allow_override: bool,
    pub opened: bool,
}

/// Validate and normalize a location path: trailing separators are
/// trimmed, and a path beginning with a separator-like character is
/// rejected.
pub(crate) fn normalize_location_path(raw: &str, pos: &SourcePos) -> Result<String, ConfigError> {
    let trimmed = raw.trim_end_matches(['/', '\\']);
    if trimmed.starts_with(['/', '\\', '.']) {
        return Err(ConfigError::Format {
            message: format!("location path '{raw}' must not begin with '/', '\\' or '.'"),
            pos: pos.clone(),
        });
    }
    Ok(trimmed.to_string())
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| x.eq_ignore_ascii_case(&y))
}

#[derive(Debug, Default, Clone)]
pub(crate) struct LocationCollection {
    entries: Vec<LocationEntry>,
}

impl LocationCollection {
    pub fn push(&mut self, entry: LocationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LocationEntry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, idx: usize) -> &mut LocationEntry {
        &mut self.entries[idx]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact, case-insensitive path match.
    pub fn find(&self, path: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| eq_ignore_case(&e.path, path))
    }

    /// The declared location whose path is the longest segment-aligned
    /// prefix of `path`. A prefix must be followed by a separator or be the
    /// whole path, so `"admin"` never matches a lookup for
    /// `"administration"`. An exact match is necessarily the longest
    /// prefix, so it always wins.
    pub fn find_best(&self, path: &str) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.path.is_empty() || entry.path.len() > path.len() {
                continue;
            }
            let head = &path[..entry.path.len()];
            if !eq_ignore_case(&entry.path, head) {
                continue;
            }
            let aligned = path.len() == entry.path.len()
                || path[entry.path.len()..].starts_with(['/', '\\']);
            if !aligned {
                continue;
            }
            if best.map_or(true, |(_, len)| entry.path.len() > len) {
                best = Some((idx, entry.path.len()));
            }
        }
        best.map(|(idx, _)| idx)
    }
}
