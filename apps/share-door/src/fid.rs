// Author: Lukas Bower
// Purpose: Track guest-assigned fids and the host resources they hold.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::ShareDoorError;

/// Host resource attached to a fid by `Tlopen`/`Tlcreate`.
#[derive(Debug, Default)]
pub(crate) enum Handle {
    /// Walked or attached but not opened.
    #[default]
    Unopened,
    /// Open host descriptor.
    File(File),
    /// Directory snapshot taken at open time.
    Dir(DirCursor),
}

/// Sorted directory listing; `Treaddir` offsets index into it.
#[derive(Debug, Default)]
pub(crate) struct DirCursor {
    pub(crate) entries: Vec<String>,
}

/// One guest handle.
#[derive(Debug)]
pub(crate) struct Fid {
    pub(crate) path: PathBuf,
    /// Numeric user supplied at attach time; owner of nodes created through this fid.
    pub(crate) uid: u32,
    pub(crate) handle: Handle,
}

impl Fid {
    pub(crate) fn new(path: PathBuf, uid: u32) -> Self {
        Self {
            path,
            uid,
            handle: Handle::Unopened,
        }
    }
}

/// Fids keyed by the guest-chosen integer.
///
/// Entries live until the guest clunks or removes them, a new `Tversion`
/// resets the session, or the table is dropped. Descriptors are closed when
/// their entry is dropped.
#[derive(Debug, Default)]
pub(crate) struct FidTable {
    fids: HashMap<u32, Fid>,
}

impl FidTable {
    pub(crate) fn insert(&mut self, id: u32, fid: Fid) {
        self.fids.insert(id, fid);
    }

    pub(crate) fn get(&self, id: u32) -> Result<&Fid, ShareDoorError> {
        self.fids.get(&id).ok_or(ShareDoorError::UnknownFid(id))
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Result<&mut Fid, ShareDoorError> {
        self.fids.get_mut(&id).ok_or(ShareDoorError::UnknownFid(id))
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<Fid> {
        self.fids.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.fids.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.fids.len()
    }

    /// Re-point every fid at or below `old` to the matching path under `new`.
    pub(crate) fn rebase(&mut self, old: &Path, new: &Path) {
        for fid in self.fids.values_mut() {
            if let Ok(suffix) = fid.path.strip_prefix(old) {
                fid.path = if suffix.as_os_str().is_empty() {
                    new.to_path_buf()
                } else {
                    new.join(suffix)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fid_is_reported() {
        let table = FidTable::default();
        assert!(matches!(table.get(9), Err(ShareDoorError::UnknownFid(9))));
    }

    #[test]
    fn rebase_moves_descendants_only() {
        let mut table = FidTable::default();
        table.insert(1, Fid::new(PathBuf::from("/r/a"), 0));
        table.insert(2, Fid::new(PathBuf::from("/r/a/b/c"), 0));
        table.insert(3, Fid::new(PathBuf::from("/r/ab"), 0));
        table.rebase(Path::new("/r/a"), Path::new("/r/z"));
        assert_eq!(table.get(1).map(|f| f.path.clone()).ok(), Some(PathBuf::from("/r/z")));
        assert_eq!(
            table.get(2).map(|f| f.path.clone()).ok(),
            Some(PathBuf::from("/r/z/b/c"))
        );
        assert_eq!(table.get(3).map(|f| f.path.clone()).ok(), Some(PathBuf::from("/r/ab")));
    }
}
