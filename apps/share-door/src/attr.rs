// Author: Lukas Bower
// Purpose: Merge host stat data with shadow metadata into qids, attributes and dirent types.

use std::fs::{self, FileType, Metadata};
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use ninep_wire::{Attr, Qid, QidType};
use shadow_store::{MetadataStore, NodeKind};

use crate::resolver::PathResolver;
use crate::ShareDoorError;

/// File type mask and type bits as carried by 9P2000.L (Linux values).
pub(crate) const S_IFMT: u32 = 0o170_000;
pub(crate) const S_IFSOCK: u32 = 0o140_000;
pub(crate) const S_IFLNK: u32 = 0o120_000;
pub(crate) const S_IFREG: u32 = 0o100_000;
pub(crate) const S_IFBLK: u32 = 0o060_000;
pub(crate) const S_IFDIR: u32 = 0o040_000;
pub(crate) const S_IFCHR: u32 = 0o020_000;
pub(crate) const S_IFIFO: u32 = 0o010_000;

/// `Rgetattr` valid mask: basic fields plus btime and gen.
const GETATTR_VALID: u64 = 0x1FFF;
const BLOCK_SIZE: u64 = 4096;

/// Host node with its shadow-metadata key and effective type.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) path: PathBuf,
    pub(crate) rel: String,
    pub(crate) meta: Metadata,
    pub(crate) kind: NodeKind,
}

impl Node {
    /// `lstat` the node and apply its type tag, if any.
    pub(crate) fn stat(
        resolver: &PathResolver,
        store: &MetadataStore,
        path: &Path,
    ) -> Result<Self, ShareDoorError> {
        let meta = fs::symlink_metadata(path).map_err(|err| host_error(err, path))?;
        Ok(Self::from_metadata(resolver, store, path.to_path_buf(), meta))
    }

    pub(crate) fn from_metadata(
        resolver: &PathResolver,
        store: &MetadataStore,
        path: PathBuf,
        meta: Metadata,
    ) -> Self {
        let rel = resolver.relative(&path);
        let kind = store
            .kind(&rel)
            .unwrap_or_else(|| host_kind(&meta.file_type()));
        Self {
            path,
            rel,
            meta,
            kind,
        }
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub(crate) fn qid(&self) -> Qid {
        let ty = match self.kind {
            NodeKind::Directory => QidType::DIRECTORY,
            NodeKind::Symlink => QidType::SYMLINK,
            _ => QidType::FILE,
        };
        Qid::new(ty, self.meta.mtime() as u32, self.meta.ino())
    }

    pub(crate) fn dirent_type(&self) -> u8 {
        match self.kind {
            NodeKind::Fifo => 1,
            NodeKind::CharDevice => 2,
            NodeKind::Directory => 4,
            NodeKind::BlockDevice => 6,
            NodeKind::File => 8,
            NodeKind::Symlink => 10,
            NodeKind::Socket => 12,
        }
    }

    pub(crate) fn attr(&self, store: &MetadataStore) -> Attr {
        let record = store.permission(&self.rel);
        let perms = record.map_or(self.meta.mode() & 0o7777, |r| u32::from(r.mode));
        let size = match store.symlink(&self.rel) {
            Some(target) if self.kind == NodeKind::Symlink => target.len() as u64,
            _ => self.meta.size(),
        };
        let rdev = store
            .device(&self.rel)
            .map_or(self.meta.rdev(), |d| makedev(d.major.into(), d.minor.into()));
        Attr {
            valid: GETATTR_VALID,
            qid: self.qid(),
            mode: type_bits(self.kind) | perms,
            uid: record.map_or(0, |r| r.uid),
            gid: record.map_or(0, |r| r.gid),
            nlink: self.meta.nlink(),
            rdev,
            size,
            blksize: BLOCK_SIZE,
            blocks: size.div_ceil(512),
            atime_sec: self.meta.atime() as u64,
            atime_nsec: self.meta.atime_nsec() as u64,
            mtime_sec: self.meta.mtime() as u64,
            mtime_nsec: self.meta.mtime_nsec() as u64,
            ctime_sec: self.meta.ctime() as u64,
            ctime_nsec: self.meta.ctime_nsec() as u64,
            ..Attr::default()
        }
    }
}

/// `NotFound` becomes a path error; everything else is host I/O.
pub(crate) fn host_error(err: io::Error, path: &Path) -> ShareDoorError {
    if err.kind() == io::ErrorKind::NotFound {
        ShareDoorError::Path(path.display().to_string())
    } else {
        ShareDoorError::Io(err)
    }
}

pub(crate) fn host_kind(ft: &FileType) -> NodeKind {
    if ft.is_dir() {
        NodeKind::Directory
    } else if ft.is_symlink() {
        NodeKind::Symlink
    } else if ft.is_char_device() {
        NodeKind::CharDevice
    } else if ft.is_block_device() {
        NodeKind::BlockDevice
    } else if ft.is_fifo() {
        NodeKind::Fifo
    } else if ft.is_socket() {
        NodeKind::Socket
    } else {
        NodeKind::File
    }
}

pub(crate) fn type_bits(kind: NodeKind) -> u32 {
    match kind {
        NodeKind::File => S_IFREG,
        NodeKind::Directory => S_IFDIR,
        NodeKind::Symlink => S_IFLNK,
        NodeKind::CharDevice => S_IFCHR,
        NodeKind::BlockDevice => S_IFBLK,
        NodeKind::Fifo => S_IFIFO,
        NodeKind::Socket => S_IFSOCK,
    }
}

/// Node kind requested by the type bits of a `Tmknod` mode.
pub(crate) fn kind_from_mode(mode: u32) -> Option<NodeKind> {
    match mode & S_IFMT {
        0 | S_IFREG => Some(NodeKind::File),
        S_IFCHR => Some(NodeKind::CharDevice),
        S_IFBLK => Some(NodeKind::BlockDevice),
        S_IFIFO => Some(NodeKind::Fifo),
        S_IFSOCK => Some(NodeKind::Socket),
        _ => None,
    }
}

/// Linux `dev_t` encoding.
pub(crate) fn makedev(major: u64, minor: u64) -> u64 {
    ((major & 0xffff_f000) << 32)
        | ((major & 0x0000_0fff) << 8)
        | ((minor & 0xffff_ff00) << 12)
        | (minor & 0x0000_00ff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn makedev_matches_linux_layout() {
        assert_eq!(makedev(1, 3), 0x0103);
        assert_eq!(makedev(8, 0), 0x0800);
        assert_eq!(makedev(259, 65_536), 0x1000_0000 | 0x0103_00);
    }

    #[test]
    fn mknod_modes_select_kinds() {
        assert_eq!(kind_from_mode(S_IFCHR | 0o666), Some(NodeKind::CharDevice));
        assert_eq!(kind_from_mode(S_IFIFO | 0o600), Some(NodeKind::Fifo));
        assert_eq!(kind_from_mode(0o644), Some(NodeKind::File));
        assert_eq!(kind_from_mode(S_IFDIR | 0o755), None);
    }
}
