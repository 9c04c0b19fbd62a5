// Author: Lukas Bower
// Purpose: Resolve walk components against the host filesystem inside the confined root.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};

use log::trace;

use crate::ShareDoorError;

/// Confines every resolved path to a single host directory.
///
/// Paths handed out are lexical (`root` joined with guest names) so that
/// metadata keys follow the guest's view. A component is only accepted when
/// its canonical form also stays inside the root, which rejects host
/// symlinks that point elsewhere.
#[derive(Debug, Clone)]
pub(crate) struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create the root if needed and pin its canonical location.
    pub(crate) fn new(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: fs::canonicalize(root)?,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Recreate the root directory if it was removed behind our back.
    pub(crate) fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Metadata key for `path`: `"."` for the root, `/`-joined components otherwise.
    pub(crate) fn relative(&self, path: &Path) -> String {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return ".".to_owned();
        };
        let parts: Vec<String> = rel
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            ".".to_owned()
        } else {
            parts.join("/")
        }
    }

    /// Resolve `names` one at a time starting from `from`, stopping at the
    /// first component that is malformed, missing, or outside the root.
    /// Returns one `(path, lstat)` pair per resolved component.
    pub(crate) fn walk(&self, from: &Path, names: &[String]) -> Vec<(PathBuf, Metadata)> {
        let mut steps = Vec::with_capacity(names.len());
        let mut current = from.to_path_buf();
        for name in names {
            if name.is_empty() || name.contains('/') || name.contains('\0') {
                trace!("walk rejected component {name:?}");
                break;
            }
            let next = match name.as_str() {
                "." => current.clone(),
                ".." if current == self.root => current.clone(),
                ".." => current
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone()),
                _ => current.join(name),
            };
            let Ok(meta) = fs::symlink_metadata(&next) else {
                trace!("walk stopped at missing {}", next.display());
                break;
            };
            if !self.is_confined(&next) {
                trace!("walk refused {} outside root", next.display());
                break;
            }
            steps.push((next.clone(), meta));
            current = next;
        }
        steps
    }

    /// Join a single-component `name` onto `dir` for create-type requests.
    pub(crate) fn child(&self, dir: &Path, name: &str) -> Result<PathBuf, ShareDoorError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\0')
        {
            return Err(ShareDoorError::protocol(format!("invalid name {name:?}")));
        }
        Ok(dir.join(name))
    }

    fn is_confined(&self, path: &Path) -> bool {
        match fs::canonicalize(path) {
            Ok(real) => real.starts_with(&self.root),
            Err(_) => false,
        }
    }
}
