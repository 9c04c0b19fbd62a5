// Author: Lukas Bower
// Purpose: Request dispatcher mapping 9P2000.L operations onto the confined host tree.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, trace, warn};
use ninep_wire::{
    Codec, DirEntry, Qid, Request, RequestBody, Response, ResponseBody, SetAttr,
    DEFAULT_MSIZE, HEADER_LEN, NOFID, VERSION,
};
use shadow_store::{DeviceKind, DeviceRecord, MetadataStore, NodeKind, PermissionRecord};

use crate::attr::{host_error, kind_from_mode, Node};
use crate::fid::{DirCursor, Fid, FidTable, Handle};
use crate::resolver::PathResolver;
use crate::{ServerOptions, ShareDoorError};

/// Linux open flags carried by `Tlopen`/`Tlcreate`.
const L_O_ACCMODE: u32 = 0o3;
const L_O_WRONLY: u32 = 0o1;
const L_O_RDWR: u32 = 0o2;
const L_O_EXCL: u32 = 0o200;
const L_O_TRUNC: u32 = 0o1000;
const L_O_APPEND: u32 = 0o2000;

/// Legacy 9P2000 `Topen` mode bits.
const P9_OWRITE: u8 = 0x01;
const P9_ORDWR: u8 = 0x02;
const P9_OTRUNC: u8 = 0x10;

/// `Tunlinkat` flag requesting directory removal.
const AT_REMOVEDIR: u32 = 0x200;

/// Rread header: frame header plus the `count[4]` field.
const READ_OVERHEAD: u32 = HEADER_LEN as u32 + 4;

/// Access requested when opening a host descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Access {
    write: bool,
    read: bool,
    truncate: bool,
    append: bool,
}

impl Access {
    fn from_lopen(flags: u32) -> Self {
        let mode = flags & L_O_ACCMODE;
        Self {
            read: mode != L_O_WRONLY,
            write: mode == L_O_WRONLY || mode == L_O_RDWR,
            truncate: flags & L_O_TRUNC != 0,
            append: flags & L_O_APPEND != 0,
        }
    }

    fn from_legacy(mode: u8) -> Self {
        let access = mode & 0x03;
        Self {
            read: access != P9_OWRITE,
            write: access == P9_OWRITE || access == P9_ORDWR,
            truncate: mode & P9_OTRUNC != 0,
            append: false,
        }
    }

    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.write && self.append)
            .truncate(self.write && self.truncate && !self.append);
        options
    }

    /// Open `path`; `O_TRUNC` with `O_APPEND` truncates before appending.
    fn open(self, path: &Path) -> Result<File, ShareDoorError> {
        let file = self.options().open(path)?;
        if self.write && self.truncate && self.append {
            file.set_len(0)?;
        }
        Ok(file)
    }
}

/// Single-session protocol state: fid table, metadata store and confined root.
pub(crate) struct ServerCore {
    codec: Codec,
    resolver: PathResolver,
    fids: FidTable,
    store: MetadataStore,
    iounit: u32,
    msize: u32,
}

impl ServerCore {
    pub(crate) fn new(options: &ServerOptions) -> Result<Self, ShareDoorError> {
        let resolver = PathResolver::new(&options.root)?;
        let store = MetadataStore::load(&options.metadata_dir);
        info!(
            target: "share-door",
            "exporting {} (metadata in {}, iounit {})",
            resolver.root().display(),
            store.dir().display(),
            options.iounit
        );
        Ok(Self {
            codec: Codec,
            resolver,
            fids: FidTable::default(),
            store,
            iounit: options.iounit,
            msize: DEFAULT_MSIZE,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub(crate) fn open_fids(&self) -> usize {
        self.fids.len()
    }

    /// Release every fid, as on a fresh connection or `Tversion`.
    pub(crate) fn reset_session(&mut self) {
        let released = self.fids.len();
        self.fids.clear();
        self.msize = DEFAULT_MSIZE;
        if released > 0 {
            debug!(target: "share-door", "session reset released {released} fids");
        }
    }

    /// Decode, dispatch and encode one frame. `None` means the request is
    /// dropped without a reply.
    pub(crate) fn handle_frame(&mut self, request_bytes: &[u8]) -> Option<Vec<u8>> {
        let request = match self.codec.decode_request(request_bytes) {
            Ok(request) => request,
            Err(err) => {
                let Ok(header) = self.codec.decode_header(request_bytes) else {
                    warn!(target: "share-door", "dropping undecodable request: {err}");
                    return None;
                };
                debug!(
                    "type {} tag {} malformed: {err}; replying EINVAL",
                    header.ty, header.tag
                );
                return self.encode(
                    header.tag,
                    ResponseBody::Error {
                        ecode: libc::EINVAL as u32,
                    },
                );
            }
        };
        trace!("tag {} <- {:?}", request.tag, request.body);
        let body = match self.dispatch(&request) {
            Ok(body) => body,
            Err(err) => {
                let ecode = err.errno();
                debug!(
                    "{} tag {} failed: {err} (errno {ecode})",
                    op_name(&request.body),
                    request.tag
                );
                ResponseBody::Error { ecode }
            }
        };
        self.encode(request.tag, body)
    }

    fn encode(&self, tag: u16, body: ResponseBody) -> Option<Vec<u8>> {
        match self.codec.encode_response(&Response { tag, body }) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(target: "share-door", "dropping reply for tag {tag}: {err}");
                None
            }
        }
    }

    fn dispatch(&mut self, request: &Request) -> Result<ResponseBody, ShareDoorError> {
        let result = self.apply(&request.body);
        if !self.store.has_pending_changes() {
            return result;
        }
        match self.store.flush() {
            Ok(()) => result,
            Err(err) => {
                warn!(target: "share-door", "metadata flush failed: {err}");
                result.and(Err(ShareDoorError::Store(err)))
            }
        }
    }

    fn apply(&mut self, body: &RequestBody) -> Result<ResponseBody, ShareDoorError> {
        match body {
            RequestBody::Version { msize, version } => Ok(self.handle_version(*msize, version)),
            RequestBody::Attach { fid, n_uname, .. } => self.handle_attach(*fid, *n_uname),
            RequestBody::Flush { .. } => Ok(ResponseBody::Flush),
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => self.handle_walk(*fid, *newfid, wnames),
            RequestBody::Lopen { fid, flags } => {
                let (qid, iounit) = self.open_fid(*fid, Access::from_lopen(*flags))?;
                Ok(ResponseBody::Lopen { qid, iounit })
            }
            RequestBody::Open { fid, mode } => {
                let (qid, iounit) = self.open_fid(*fid, Access::from_legacy(*mode))?;
                Ok(ResponseBody::Open { qid, iounit })
            }
            RequestBody::Lcreate {
                fid,
                name,
                flags,
                mode,
                gid,
            } => self.handle_lcreate(*fid, name, *flags, *mode, *gid),
            RequestBody::Symlink {
                fid,
                name,
                target,
                gid,
            } => self.handle_symlink(*fid, name, target, *gid),
            RequestBody::Mknod {
                dfid,
                name,
                mode,
                major,
                minor,
                gid,
            } => self.handle_mknod(*dfid, name, *mode, (*major, *minor), *gid),
            RequestBody::Readlink { fid } => self.handle_readlink(*fid),
            RequestBody::Getattr { fid, .. } => self.handle_getattr(*fid),
            RequestBody::Setattr { fid, attr } => self.handle_setattr(*fid, attr),
            RequestBody::Readdir { fid, offset, count } => {
                self.handle_readdir(*fid, *offset, *count)
            }
            RequestBody::Fsync { fid, datasync } => self.handle_fsync(*fid, *datasync),
            RequestBody::Mkdir {
                dfid,
                name,
                mode,
                gid,
            } => self.handle_mkdir(*dfid, name, *mode, *gid),
            RequestBody::Renameat {
                olddirfid,
                oldname,
                newdirfid,
                newname,
            } => self.handle_renameat(*olddirfid, oldname, *newdirfid, newname),
            RequestBody::Unlinkat {
                dirfid,
                name,
                flags,
            } => self.handle_unlinkat(*dirfid, name, *flags),
            RequestBody::Read { fid, offset, count } => self.handle_read(*fid, *offset, *count),
            RequestBody::Write { fid, offset, data } => self.handle_write(*fid, *offset, data),
            RequestBody::Clunk { fid } => {
                self.fids.remove(*fid);
                Ok(ResponseBody::Clunk)
            }
            RequestBody::Remove { fid } => self.handle_remove(*fid),
            RequestBody::Unknown { op } => Err(ShareDoorError::protocol(format!(
                "unsupported message type {op}"
            ))),
        }
    }

    fn handle_version(&mut self, msize: u32, version: &str) -> ResponseBody {
        self.reset_session();
        self.msize = msize.max(READ_OVERHEAD + 1);
        info!(
            target: "share-door",
            "client version {version:?} msize {msize}; speaking {VERSION}"
        );
        ResponseBody::Version {
            msize,
            version: VERSION.to_owned(),
        }
    }

    fn handle_attach(&mut self, fid: u32, n_uname: u32) -> Result<ResponseBody, ShareDoorError> {
        self.resolver.ensure_root()?;
        let root = self.resolver.root().to_path_buf();
        let node = self.node(&root)?;
        let uid = if n_uname == NOFID { 0 } else { n_uname };
        self.fids.insert(fid, Fid::new(root, uid));
        debug!(target: "share-door", "fid {fid} attached as uid {uid}");
        Ok(ResponseBody::Attach { qid: node.qid() })
    }

    fn handle_walk(
        &mut self,
        fid: u32,
        newfid: u32,
        wnames: &[String],
    ) -> Result<ResponseBody, ShareDoorError> {
        let source = self.fids.get(fid)?;
        let (start, uid) = (source.path.clone(), source.uid);
        if wnames.is_empty() {
            self.fids.insert(newfid, Fid::new(start, uid));
            return Ok(ResponseBody::Walk { qids: Vec::new() });
        }
        let steps = self.resolver.walk(&start, wnames);
        if steps.is_empty() {
            return Err(ShareDoorError::Path(wnames.join("/")));
        }
        let complete = steps.len() == wnames.len();
        let mut qids = Vec::with_capacity(steps.len());
        let mut last = None;
        for (path, meta) in steps {
            let node = Node::from_metadata(&self.resolver, &self.store, path, meta);
            qids.push(node.qid());
            last = Some(node.path);
        }
        if let (true, Some(path)) = (complete, last) {
            self.fids.insert(newfid, Fid::new(path, uid));
        }
        Ok(ResponseBody::Walk { qids })
    }

    fn open_fid(&mut self, fid: u32, access: Access) -> Result<(Qid, u32), ShareDoorError> {
        let path = self.fids.get(fid)?.path.clone();
        let node = self.node(&path)?;
        let handle = match node.kind {
            NodeKind::Directory => Handle::Dir(DirCursor {
                entries: snapshot(&path)?,
            }),
            NodeKind::Symlink => Handle::Unopened,
            _ if node.meta.is_file() => Handle::File(access.open(&path)?),
            _ => Handle::Unopened,
        };
        self.fids.get_mut(fid)?.handle = handle;
        Ok((node.qid(), self.iounit))
    }

    fn handle_lcreate(
        &mut self,
        fid: u32,
        name: &str,
        flags: u32,
        mode: u32,
        gid: u32,
    ) -> Result<ResponseBody, ShareDoorError> {
        let (dir, uid) = self.directory_fid(fid)?;
        let path = self.resolver.child(&dir, name)?;
        // Host symlinks are never followed, here or by the open below.
        if fs::symlink_metadata(&path).is_ok_and(|meta| meta.file_type().is_symlink()) {
            return Err(ShareDoorError::Path(format!(
                "{} is a host symlink",
                self.resolver.relative(&path)
            )));
        }
        let access = Access::from_lopen(flags);
        let mut options = OpenOptions::new();
        options
            .read(true)
            .write(true)
            .create(true)
            .truncate(access.truncate)
            .custom_flags(libc::O_NOFOLLOW);
        if flags & L_O_EXCL != 0 {
            options.create_new(true);
        }
        let file = options.open(&path)?;
        self.record_new_node(&path, NodeKind::File, mode, uid, gid);
        let node = self.node(&path)?;
        let entry = self.fids.get_mut(fid)?;
        entry.path = path;
        entry.handle = Handle::File(file);
        Ok(ResponseBody::Lcreate {
            qid: node.qid(),
            iounit: self.iounit,
        })
    }

    fn handle_symlink(
        &mut self,
        fid: u32,
        name: &str,
        target: &str,
        gid: u32,
    ) -> Result<ResponseBody, ShareDoorError> {
        let (dir, uid) = self.directory_fid(fid)?;
        let path = self.resolver.child(&dir, name)?;
        placeholder(&path)?;
        self.record_new_node(&path, NodeKind::Symlink, 0o777, uid, gid);
        let rel = self.resolver.relative(&path);
        self.store.set_symlink(&rel, target);
        Ok(ResponseBody::Symlink {
            qid: self.node(&path)?.qid(),
        })
    }

    fn handle_mknod(
        &mut self,
        dfid: u32,
        name: &str,
        mode: u32,
        (major, minor): (u32, u32),
        gid: u32,
    ) -> Result<ResponseBody, ShareDoorError> {
        let kind = kind_from_mode(mode)
            .ok_or_else(|| ShareDoorError::protocol(format!("mknod type {mode:#o}")))?;
        let device = match kind {
            NodeKind::CharDevice | NodeKind::BlockDevice => Some(DeviceRecord {
                kind: if kind == NodeKind::CharDevice {
                    DeviceKind::Char
                } else {
                    DeviceKind::Block
                },
                major: u16::try_from(major)
                    .map_err(|_| ShareDoorError::protocol(format!("major {major}")))?,
                minor: u16::try_from(minor)
                    .map_err(|_| ShareDoorError::protocol(format!("minor {minor}")))?,
            }),
            _ => None,
        };
        let (dir, uid) = self.directory_fid(dfid)?;
        let path = self.resolver.child(&dir, name)?;
        placeholder(&path)?;
        self.record_new_node(&path, kind, mode, uid, gid);
        if let Some(device) = device {
            let rel = self.resolver.relative(&path);
            self.store.set_device(&rel, device);
        }
        Ok(ResponseBody::Mknod {
            qid: self.node(&path)?.qid(),
        })
    }

    fn handle_mkdir(
        &mut self,
        dfid: u32,
        name: &str,
        mode: u32,
        gid: u32,
    ) -> Result<ResponseBody, ShareDoorError> {
        let (dir, uid) = self.directory_fid(dfid)?;
        let path = self.resolver.child(&dir, name)?;
        fs::create_dir(&path)?;
        self.record_new_node(&path, NodeKind::Directory, mode, uid, gid);
        Ok(ResponseBody::Mkdir {
            qid: self.node(&path)?.qid(),
        })
    }

    fn handle_readlink(&mut self, fid: u32) -> Result<ResponseBody, ShareDoorError> {
        let path = self.fids.get(fid)?.path.clone();
        let target = self.link_target(&path)?.ok_or(ShareDoorError::NotSymlink)?;
        Ok(ResponseBody::Readlink { target })
    }

    fn handle_getattr(&mut self, fid: u32) -> Result<ResponseBody, ShareDoorError> {
        let path = self.fids.get(fid)?.path.clone();
        let node = self.node(&path)?;
        Ok(ResponseBody::Getattr(Box::new(node.attr(&self.store))))
    }

    fn handle_setattr(&mut self, fid: u32, attr: &SetAttr) -> Result<ResponseBody, ShareDoorError> {
        let path = self.fids.get(fid)?.path.clone();
        let node = self.node(&path)?;
        let mut record = self.store.permission(&node.rel).unwrap_or_else(|| {
            PermissionRecord::new(node.meta.mode(), 0, 0, node.meta.mtime() as u32)
        });
        let mut changed = false;
        if attr.has(SetAttr::MODE) {
            record.mode = (attr.mode & 0o7777) as u16;
            changed = true;
        }
        if attr.has(SetAttr::UID) {
            record.uid = attr.uid;
            changed = true;
        }
        if attr.has(SetAttr::GID) {
            record.gid = attr.gid;
            changed = true;
        }
        if attr.has(SetAttr::SIZE) {
            if node.is_dir() {
                return Err(ShareDoorError::IsDirectory);
            }
            OpenOptions::new()
                .write(true)
                .open(&path)?
                .set_len(attr.size)?;
        }
        let mut times = FileTimes::new();
        let mut touch = false;
        if attr.has(SetAttr::ATIME) {
            let atime = if attr.has(SetAttr::ATIME_SET) {
                timestamp(attr.atime_sec, attr.atime_nsec)?
            } else {
                SystemTime::now()
            };
            times = times.set_accessed(atime);
            touch = true;
        }
        if attr.has(SetAttr::MTIME) {
            let mtime = if attr.has(SetAttr::MTIME_SET) {
                timestamp(attr.mtime_sec, attr.mtime_nsec)?
            } else {
                SystemTime::now()
            };
            record.mtime = epoch_secs(mtime);
            times = times.set_modified(mtime);
            touch = true;
            changed = true;
        }
        if touch && node.kind != NodeKind::Symlink {
            File::open(&path)?.set_times(times)?;
        }
        if changed {
            self.store.set_permission(&node.rel, record);
        }
        Ok(ResponseBody::Setattr)
    }

    fn handle_readdir(
        &mut self,
        fid: u32,
        offset: u64,
        count: u32,
    ) -> Result<ResponseBody, ShareDoorError> {
        let budget = count.min(self.msize.saturating_sub(READ_OVERHEAD)) as usize;
        let entry = self.fids.get(fid)?;
        let Handle::Dir(cursor) = &entry.handle else {
            return Err(ShareDoorError::NotDirectory);
        };
        let mut used = 0;
        let mut entries = Vec::new();
        let mut index = usize::try_from(offset).unwrap_or(usize::MAX);
        while let Some(name) = cursor.entries.get(index) {
            let Ok(node) = Node::stat(&self.resolver, &self.store, &entry.path.join(name)) else {
                trace!("readdir skipping vanished entry {name}");
                index += 1;
                continue;
            };
            let dirent = DirEntry {
                qid: node.qid(),
                offset: index as u64 + 1,
                kind: node.dirent_type(),
                name: name.clone(),
            };
            if used + dirent.encoded_len() > budget {
                break;
            }
            used += dirent.encoded_len();
            entries.push(dirent);
            index += 1;
        }
        Ok(ResponseBody::Readdir { entries })
    }

    fn handle_fsync(&mut self, fid: u32, datasync: u32) -> Result<ResponseBody, ShareDoorError> {
        if let Handle::File(file) = &self.fids.get(fid)?.handle {
            if datasync != 0 {
                file.sync_data()?;
            } else {
                file.sync_all()?;
            }
        }
        Ok(ResponseBody::Fsync)
    }

    fn handle_renameat(
        &mut self,
        olddirfid: u32,
        oldname: &str,
        newdirfid: u32,
        newname: &str,
    ) -> Result<ResponseBody, ShareDoorError> {
        let (old_dir, _) = self.directory_fid(olddirfid)?;
        let (new_dir, _) = self.directory_fid(newdirfid)?;
        let old = self.resolver.child(&old_dir, oldname)?;
        let new = self.resolver.child(&new_dir, newname)?;
        fs::symlink_metadata(&old).map_err(|err| host_error(err, &old))?;
        fs::rename(&old, &new)?;
        let (old_rel, new_rel) = (self.resolver.relative(&old), self.resolver.relative(&new));
        self.store.rename(&old_rel, &new_rel);
        self.fids.rebase(&old, &new);
        debug!("renamed {old_rel} -> {new_rel}");
        Ok(ResponseBody::Renameat)
    }

    fn handle_unlinkat(
        &mut self,
        dirfid: u32,
        name: &str,
        flags: u32,
    ) -> Result<ResponseBody, ShareDoorError> {
        let (dir, _) = self.directory_fid(dirfid)?;
        let path = self.resolver.child(&dir, name)?;
        trace!("unlinkat {} flags {flags:#x}", path.display());
        self.remove_node(&path, flags & AT_REMOVEDIR != 0)?;
        Ok(ResponseBody::Unlinkat)
    }

    fn handle_remove(&mut self, fid: u32) -> Result<ResponseBody, ShareDoorError> {
        let entry = self.fids.remove(fid).ok_or(ShareDoorError::UnknownFid(fid))?;
        if entry.path == self.resolver.root() {
            return Err(ShareDoorError::protocol("refusing to remove the export root"));
        }
        drop(entry.handle);
        self.remove_node(&entry.path, false)?;
        Ok(ResponseBody::Remove)
    }

    fn handle_read(
        &mut self,
        fid: u32,
        offset: u64,
        count: u32,
    ) -> Result<ResponseBody, ShareDoorError> {
        let count = count.min(self.msize.saturating_sub(READ_OVERHEAD));
        let entry = self.fids.get(fid)?;
        match &entry.handle {
            Handle::File(file) => Ok(ResponseBody::Read {
                data: read_at(file, offset, count as usize)?,
            }),
            Handle::Dir(_) => Err(ShareDoorError::IsDirectory),
            Handle::Unopened => {
                if let Some(target) = self.link_target(&entry.path)? {
                    let bytes = target.as_bytes();
                    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
                    let end = start.saturating_add(count as usize).min(bytes.len());
                    return Ok(ResponseBody::Read {
                        data: bytes[start..end].to_vec(),
                    });
                }
                if entry.path.is_dir() {
                    Err(ShareDoorError::IsDirectory)
                } else {
                    Err(ShareDoorError::NotOpen(fid))
                }
            }
        }
    }

    fn handle_write(
        &mut self,
        fid: u32,
        offset: u64,
        data: &[u8],
    ) -> Result<ResponseBody, ShareDoorError> {
        match &self.fids.get(fid)?.handle {
            Handle::File(file) => {
                file.write_all_at(data, offset)?;
                let count = u32::try_from(data.len())
                    .map_err(|_| ShareDoorError::protocol("write larger than a frame"))?;
                Ok(ResponseBody::Write { count })
            }
            Handle::Dir(_) => Err(ShareDoorError::IsDirectory),
            Handle::Unopened => Err(ShareDoorError::NotOpen(fid)),
        }
    }

    fn node(&self, path: &Path) -> Result<Node, ShareDoorError> {
        Node::stat(&self.resolver, &self.store, path)
    }

    /// Path and owner of `fid`, which must name a directory.
    fn directory_fid(&self, fid: u32) -> Result<(PathBuf, u32), ShareDoorError> {
        let entry = self.fids.get(fid)?;
        if !self.node(&entry.path)?.is_dir() {
            return Err(ShareDoorError::NotDirectory);
        }
        Ok((entry.path.clone(), entry.uid))
    }

    /// Emulated target from the store, else the host link target.
    fn link_target(&self, path: &Path) -> Result<Option<String>, ShareDoorError> {
        let rel = self.resolver.relative(path);
        if let Some(target) = self.store.symlink(&rel) {
            return Ok(Some(target.to_owned()));
        }
        let meta = fs::symlink_metadata(path).map_err(|err| host_error(err, path))?;
        if !meta.file_type().is_symlink() {
            return Ok(None);
        }
        let target = fs::read_link(path)?;
        Ok(Some(target.to_string_lossy().into_owned()))
    }

    fn record_new_node(&mut self, path: &Path, kind: NodeKind, mode: u32, uid: u32, gid: u32) {
        let rel = self.resolver.relative(path);
        self.store.delete(&rel);
        let now = epoch_secs(SystemTime::now());
        self.store
            .set_permission(&rel, PermissionRecord::new(mode, uid, gid, now));
        self.store.set_kind(&rel, kind);
        trace!("recorded {kind:?} {rel} mode {mode:#o}");
    }

    fn remove_node(&mut self, path: &Path, expect_dir: bool) -> Result<(), ShareDoorError> {
        let meta = fs::symlink_metadata(path).map_err(|err| host_error(err, path))?;
        if meta.is_dir() {
            fs::remove_dir(path)?;
        } else if expect_dir {
            return Err(ShareDoorError::NotDirectory);
        } else {
            fs::remove_file(path)?;
        }
        let rel = self.resolver.relative(path);
        self.store.delete(&rel);
        debug!("removed {rel}");
        Ok(())
    }
}

/// Sorted entry names of `dir`, excluding names that are not valid UTF-8.
fn snapshot(dir: &Path) -> Result<Vec<String>, ShareDoorError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => trace!("readdir skipping non-utf8 name {raw:?}"),
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// Empty regular file standing in for a node the host cannot represent.
fn placeholder(path: &Path) -> Result<(), ShareDoorError> {
    OpenOptions::new().write(true).create_new(true).open(path)?;
    Ok(())
}

fn read_at(file: &File, offset: u64, count: usize) -> Result<Vec<u8>, ShareDoorError> {
    let mut data = vec![0u8; count];
    let mut filled = 0;
    while filled < count {
        let n = file.read_at(&mut data[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    data.truncate(filled);
    Ok(data)
}

fn timestamp(secs: u64, nsecs: u64) -> Result<SystemTime, ShareDoorError> {
    Duration::from_secs(secs)
        .checked_add(Duration::from_nanos(nsecs))
        .and_then(|since| UNIX_EPOCH.checked_add(since))
        .ok_or_else(|| ShareDoorError::protocol("timestamp out of range"))
}

fn epoch_secs(time: SystemTime) -> u32 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_secs() as u32)
}

fn op_name(body: &RequestBody) -> &'static str {
    match body {
        RequestBody::Version { .. } => "Tversion",
        RequestBody::Attach { .. } => "Tattach",
        RequestBody::Flush { .. } => "Tflush",
        RequestBody::Walk { .. } => "Twalk",
        RequestBody::Lopen { .. } => "Tlopen",
        RequestBody::Open { .. } => "Topen",
        RequestBody::Lcreate { .. } => "Tlcreate",
        RequestBody::Symlink { .. } => "Tsymlink",
        RequestBody::Mknod { .. } => "Tmknod",
        RequestBody::Readlink { .. } => "Treadlink",
        RequestBody::Getattr { .. } => "Tgetattr",
        RequestBody::Setattr { .. } => "Tsetattr",
        RequestBody::Readdir { .. } => "Treaddir",
        RequestBody::Fsync { .. } => "Tfsync",
        RequestBody::Mkdir { .. } => "Tmkdir",
        RequestBody::Renameat { .. } => "Trenameat",
        RequestBody::Unlinkat { .. } => "Tunlinkat",
        RequestBody::Read { .. } => "Tread",
        RequestBody::Write { .. } => "Twrite",
        RequestBody::Clunk { .. } => "Tclunk",
        RequestBody::Remove { .. } => "Tremove",
        RequestBody::Unknown { .. } => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lopen_access_modes() {
        let read = Access::from_lopen(0);
        assert!(read.read && !read.write);
        let write = Access::from_lopen(L_O_WRONLY | L_O_TRUNC);
        assert!(!write.read && write.write && write.truncate);
        let rdwr = Access::from_lopen(L_O_RDWR | L_O_APPEND);
        assert!(rdwr.read && rdwr.write && rdwr.append);
    }

    #[test]
    fn legacy_open_modes() {
        let exec = Access::from_legacy(0x03);
        assert!(exec.read && !exec.write);
        let trunc = Access::from_legacy(P9_OWRITE | P9_OTRUNC);
        assert!(trunc.write && trunc.truncate);
    }

    #[test]
    fn timestamps_reject_overflow() {
        assert!(timestamp(u64::MAX, 2_000_000_000).is_err());
        assert_eq!(
            timestamp(1, 500).ok(),
            UNIX_EPOCH.checked_add(Duration::new(1, 500))
        );
    }
}
