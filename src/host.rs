//! Stream access and level path resolution.
//!
//! The store never keeps its own file handles: all reads and writes go
//! through a [`ConfigHost`], which maps stream identities (usually file
//! paths) to content. [`FileHost`] is the filesystem implementation;
//! [`MemoryHost`] backs tests and tooling dry-runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use tracing::debug;

use crate::declaration::ConfigLevel;

/// Synchronous stream access collaborator.
pub trait ConfigHost {
    /// Read a stream's full content; `Ok(None)` when the stream does not
    /// exist (a level without a backing file).
    fn read(&self, stream: &str) -> io::Result<Option<String>>;

    /// Replace a stream's content.
    fn write(&self, stream: &str, contents: &str) -> io::Result<()>;

    /// Resolve a stream name relative to another stream (used for
    /// `configSource` redirects). The default joins paths file-system
    /// style.
    fn resolve_relative(&self, base_stream: &str, relative: &str) -> String {
        let base = Path::new(base_stream);
        match base.parent() {
            Some(dir) => dir.join(relative).to_string_lossy().into_owned(),
            None => relative.to_string(),
        }
    }
}

/// Filesystem-backed host: stream identities are file paths.
#[derive(Debug, Default)]
pub struct FileHost;

impl ConfigHost for FileHost {
    fn read(&self, stream: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(stream) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(stream, "no backing file for level");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write(&self, stream: &str, contents: &str) -> io::Result<()> {
        if let Some(dir) = Path::new(stream).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(stream, contents)
    }
}

/// In-memory host for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryHost {
    files: RefCell<HashMap<String, String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost::default()
    }

    pub fn put(&self, stream: impl Into<String>, contents: impl Into<String>) {
        self.files.borrow_mut().insert(stream.into(), contents.into());
    }

    pub fn get(&self, stream: &str) -> Option<String> {
        self.files.borrow().get(stream).cloned()
    }
}

impl ConfigHost for MemoryHost {
    fn read(&self, stream: &str) -> io::Result<Option<String>> {
        Ok(self.files.borrow().get(stream).cloned())
    }

    fn write(&self, stream: &str, contents: &str) -> io::Result<()> {
        self.files
            .borrow_mut()
            .insert(stream.to_string(), contents.to_string());
        Ok(())
    }

    fn resolve_relative(&self, _base_stream: &str, relative: &str) -> String {
        relative.to_string()
    }
}

/// One level of a configuration chain: its role and, when backed by a
/// file, the stream to open.
#[derive(Debug, Clone)]
pub struct LevelStream {
    pub level: ConfigLevel,
    pub stream: Option<String>,
}

impl LevelStream {
    pub fn new(level: ConfigLevel, stream: impl Into<String>) -> Self {
        LevelStream {
            level,
            stream: Some(stream.into()),
        }
    }

    pub fn empty(level: ConfigLevel) -> Self {
        LevelStream {
            level,
            stream: None,
        }
    }
}

/// Default file locations for an application's configuration chain:
/// machine-wide, application (next to the given app config), roaming-user,
/// and local-user. Levels whose base directory cannot be resolved
/// participate without a backing file.
pub fn default_level_paths(app_name: &str, app_config: Option<&Path>) -> Vec<LevelStream> {
    let mut levels = Vec::with_capacity(4);

    let machine: PathBuf = ["/etc", app_name, "machine.config"].iter().collect();
    levels.push(LevelStream::new(
        ConfigLevel::Machine,
        machine.to_string_lossy().into_owned(),
    ));

    levels.push(match app_config {
        Some(path) => LevelStream::new(
            ConfigLevel::Application,
            path.to_string_lossy().into_owned(),
        ),
        None => LevelStream::empty(ConfigLevel::Application),
    });

    match BaseDirs::new() {
        Some(dirs) => {
            let roaming = dirs
                .config_dir()
                .join(app_name)
                .join("user.config");
            levels.push(LevelStream::new(
                ConfigLevel::RoamingUser,
                roaming.to_string_lossy().into_owned(),
            ));
            let local = dirs
                .config_local_dir()
                .join(app_name)
                .join("user.config");
            levels.push(LevelStream::new(
                ConfigLevel::LocalUser,
                local.to_string_lossy().into_owned(),
            ));
        }
        None => {
            levels.push(LevelStream::empty(ConfigLevel::RoamingUser));
            levels.push(LevelStream::empty(ConfigLevel::LocalUser));
        }
    }
    levels
}
