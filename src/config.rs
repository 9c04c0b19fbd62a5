// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load the vmshare launcher configuration from TOML.
// Author: Lukas Bower

//! Launcher configuration.
//!
//! ```toml
//! root = "export"
//! metadata_dir = "meta"
//! socket = "/run/vmshare.sock"
//! iounit = 8192
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use share_door::{ServerOptions, DEFAULT_IOUNIT};
use thiserror::Error;

/// Errors raised while loading or validating a [`ShareConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// The metadata directory would be visible to the guest.
    #[error("metadata_dir {metadata_dir} lies inside the exported root {root}")]
    MetadataInsideRoot {
        /// Export root.
        root: PathBuf,
        /// Offending metadata directory.
        metadata_dir: PathBuf,
    },
    /// `iounit` must leave room for at least one byte.
    #[error("iounit must be non-zero")]
    ZeroIounit,
}

fn default_iounit() -> u32 {
    DEFAULT_IOUNIT
}

/// Settings for one exported share.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareConfig {
    /// Host directory exposed as the guest's root.
    pub root: PathBuf,
    /// Directory holding the shadow metadata files.
    pub metadata_dir: PathBuf,
    /// Unix socket the launcher listens on.
    #[serde(default)]
    pub socket: Option<PathBuf>,
    /// I/O unit advertised to the guest.
    #[serde(default = "default_iounit")]
    pub iounit: u32,
}

impl ShareConfig {
    /// Configuration from explicit paths with the default I/O unit.
    pub fn new(root: impl Into<PathBuf>, metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_dir: metadata_dir.into(),
            socket: None,
            iounit: DEFAULT_IOUNIT,
        }
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ShareConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.rebase_paths(path);
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iounit == 0 {
            return Err(ConfigError::ZeroIounit);
        }
        let root = normalize(&absolute(&self.root));
        let metadata_dir = normalize(&absolute(&self.metadata_dir));
        if metadata_dir.starts_with(&root) {
            return Err(ConfigError::MetadataInsideRoot {
                root: self.root.clone(),
                metadata_dir: self.metadata_dir.clone(),
            });
        }
        Ok(())
    }

    /// Options handed to [`share_door::ShareDoor::new`].
    #[must_use]
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            root: self.root.clone(),
            metadata_dir: self.metadata_dir.clone(),
            iounit: self.iounit,
        }
    }

    fn rebase_paths(&mut self, path: &Path) {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        self.root = join_base(base, &self.root);
        self.metadata_dir = join_base(base, &self.metadata_dir);
        if let Some(socket) = &mut self.socket {
            *socket = join_base(base, socket);
        }
    }
}

fn join_base(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Lexically resolve `.` and `..`; the paths may not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("vmshare.toml");
        fs::write(
            &path,
            "root = 'export'\nmetadata_dir = 'meta'\nsocket = 'run/share.sock'\n",
        )
        .expect("write config");
        let config = ShareConfig::load(&path).expect("load");
        assert_eq!(config.root, dir.path().join("export"));
        assert_eq!(config.metadata_dir, dir.path().join("meta"));
        assert_eq!(config.socket, Some(dir.path().join("run/share.sock")));
        assert_eq!(config.iounit, DEFAULT_IOUNIT);
    }

    #[test]
    fn absolute_paths_are_kept() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("vmshare.toml");
        fs::write(
            &path,
            "root = '/srv/export'\nmetadata_dir = '/var/lib/vmshare'\niounit = 4096\n",
        )
        .expect("write config");
        let config = ShareConfig::load(&path).expect("load");
        assert_eq!(config.root, PathBuf::from("/srv/export"));
        assert_eq!(config.metadata_dir, PathBuf::from("/var/lib/vmshare"));
        assert_eq!(config.socket, None);
        assert_eq!(config.server_options().iounit, 4096);
    }

    #[test]
    fn metadata_inside_root_is_rejected() {
        let config = ShareConfig::new("/srv/export", "/srv/export/../export/.meta");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MetadataInsideRoot { .. })
        ));
        assert!(ShareConfig::new("/srv/export", "/srv/export-meta")
            .validate()
            .is_ok());
    }

    #[test]
    fn normalize_folds_dot_components() {
        assert_eq!(
            normalize(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
    }
}
