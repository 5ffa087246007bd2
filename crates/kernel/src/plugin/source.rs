//! Access to plugin source text for dependency inference.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::ActivePlugin;

/// Read-only view of installed plugin files.
pub trait PluginSource: Send + Sync {
    /// Read at most `max_bytes` of the plugin's main file.
    ///
    /// Returns `None` when the file cannot be read; callers treat that as
    /// "no signal", never as an error.
    fn read_main_file(&self, plugin: &ActivePlugin, max_bytes: usize) -> Option<String>;
}

/// Plugin source backed by the host's plugins directory.
#[derive(Debug, Clone)]
pub struct FsPluginSource {
    root: PathBuf,
}

impl FsPluginSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PluginSource for FsPluginSource {
    fn read_main_file(&self, plugin: &ActivePlugin, max_bytes: usize) -> Option<String> {
        // Host paths are relative; refuse anything that climbs out of the root.
        if plugin.path.split(['/', '\\']).any(|part| part == "..") {
            debug!(path = %plugin.path, "refusing plugin path outside plugins dir");
            return None;
        }

        let path = self.root.join(plugin.path.trim_start_matches(['/', '\\']));
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "plugin main file unreadable");
                return None;
            }
        };

        let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
        if let Err(e) = file.take(max_bytes as u64).read_to_end(&mut buf) {
            debug!(path = %path.display(), error = %e, "failed reading plugin main file");
            return None;
        }

        Some(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::plugin::ActivePluginSet;

    #[test]
    fn reads_bounded_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("jet-menu")).unwrap();
        std::fs::write(dir.path().join("jet-menu/jet-menu.php"), "0123456789").unwrap();

        let set = ActivePluginSet::from_paths(["jet-menu/jet-menu.php"]);
        let plugin = set.iter().next().unwrap();
        let source = FsPluginSource::new(dir.path());

        assert_eq!(source.read_main_file(plugin, 4).as_deref(), Some("0123"));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let set = ActivePluginSet::from_paths(["gone/gone.php"]);
        let plugin = set.iter().next().unwrap();

        assert!(FsPluginSource::new(dir.path()).read_main_file(plugin, 64).is_none());
    }

    #[test]
    fn parent_traversal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let set = ActivePluginSet::from_paths(["../etc/passwd"]);
        let plugin = set.iter().next().unwrap();

        assert!(FsPluginSource::new(dir.path()).read_main_file(plugin, 64).is_none());
    }
}
