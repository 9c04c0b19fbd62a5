// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! share-door exports one host directory to a guest over 9P2000.L.
//!
//! The server is a synchronous request/reply state machine: each call to
//! [`ShareDoor::handle_frame`] takes exactly one request frame and yields at
//! most one reply frame. POSIX attributes the host tree cannot carry (guest
//! ownership, symlinks on filesystems without them, device nodes) live in a
//! [`shadow_store::MetadataStore`] beside the export. [`InProcessConnection`]
//! drives the full wire path from tests without any socket plumbing.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ninep_wire::{
    Attr, Codec, CodecError, DirEntry, Qid, Request, RequestBody, ResponseBody, SetAttr,
    DEFAULT_MSIZE, NOFID, VERSION,
};
use shadow_store::StoreError;
use thiserror::Error;

mod attr;
mod fid;
mod resolver;
mod server;

use crate::server::ServerCore;

/// I/O unit advertised in `Rlopen`/`Rlcreate` unless configured otherwise.
pub const DEFAULT_IOUNIT: u32 = 8192;

/// Errors surfaced by share-door operations. Each maps to one Linux errno.
#[derive(Debug, Error)]
pub enum ShareDoorError {
    /// Malformed or unsupported request.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The fid is not in the table.
    #[error("unknown fid {0}")]
    UnknownFid(u32),
    /// Missing path or a path outside the export root.
    #[error("no such path: {0}")]
    Path(String),
    /// Host filesystem failure.
    #[error("host i/o: {0}")]
    Io(#[from] io::Error),
    /// Operation requires a non-directory.
    #[error("is a directory")]
    IsDirectory,
    /// Operation requires an opened directory.
    #[error("not a directory")]
    NotDirectory,
    /// `Treadlink` on something that is not a symlink.
    #[error("not a symlink")]
    NotSymlink,
    /// I/O on a fid without a host descriptor.
    #[error("fid {0} is not open")]
    NotOpen(u32),
    /// Persisting the metadata store failed.
    #[error("metadata store: {0}")]
    Store(#[from] StoreError),
    /// Frame encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The server answered with `Rlerror`.
    #[error("server returned errno {0}")]
    Remote(u32),
    /// The server dropped the request without replying.
    #[error("request dropped without reply")]
    Dropped,
}

impl ShareDoorError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Linux errno carried by the `Rlerror` for this error.
    #[must_use]
    pub fn errno(&self) -> u32 {
        let code = match self {
            Self::Protocol(_) | Self::NotSymlink | Self::Codec(_) | Self::Dropped => libc::EINVAL,
            Self::UnknownFid(_) | Self::Path(_) => libc::ENOENT,
            Self::Io(_) | Self::NotOpen(_) | Self::Store(_) => libc::EIO,
            Self::IsDirectory => libc::EISDIR,
            Self::NotDirectory => libc::ENOTDIR,
            Self::Remote(code) => return *code,
        };
        code as u32
    }
}

/// Where the server exports from and keeps its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Host directory exposed as the guest's root.
    pub root: PathBuf,
    /// Directory holding the shadow metadata category files.
    pub metadata_dir: PathBuf,
    /// I/O unit advertised to the guest.
    pub iounit: u32,
}

impl ServerOptions {
    /// Options with the default I/O unit.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_dir: metadata_dir.into(),
            iounit: DEFAULT_IOUNIT,
        }
    }
}

/// Host share server. Clones share one fid table and metadata store; every
/// request runs under a single lock.
#[derive(Clone)]
pub struct ShareDoor {
    inner: Arc<Mutex<ServerCore>>,
    root: PathBuf,
}

impl fmt::Debug for ShareDoor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareDoor")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ShareDoor {
    /// Create the export root if needed and load the metadata store.
    pub fn new(options: ServerOptions) -> Result<Self, ShareDoorError> {
        let core = ServerCore::new(&options)?;
        let root = core.root().to_path_buf();
        Ok(Self {
            inner: Arc::new(Mutex::new(core)),
            root,
        })
    }

    /// Canonical path of the export root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle one request frame. `None` means the request was dropped and no
    /// reply must be sent.
    pub fn handle_frame(&self, request: &[u8]) -> Option<Vec<u8>> {
        self.lock().handle_frame(request)
    }

    /// Callback form of [`ShareDoor::handle_frame`]: `reply` runs at most once
    /// with the complete reply frame.
    pub fn serve(&self, request: &[u8], reply: impl FnOnce(&[u8])) {
        if let Some(frame) = self.handle_frame(request) {
            reply(&frame);
        }
    }

    /// Drop every fid, closing host descriptors.
    pub fn reset_session(&self) {
        self.lock().reset_session();
    }

    /// Number of fids currently held by the guest.
    #[must_use]
    pub fn open_fids(&self) -> usize {
        self.lock().open_fids()
    }

    /// Create a client that talks to this server without a transport.
    #[must_use]
    pub fn connect(&self) -> InProcessConnection {
        InProcessConnection::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, ServerCore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client-side handle used by tests to exercise the full 9P2000.L stack.
pub struct InProcessConnection {
    server: ShareDoor,
    codec: Codec,
    next_tag: u16,
    negotiated_msize: u32,
}

impl fmt::Debug for InProcessConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessConnection")
            .field("next_tag", &self.next_tag)
            .field("negotiated_msize", &self.negotiated_msize)
            .finish()
    }
}

impl InProcessConnection {
    fn new(server: ShareDoor) -> Self {
        Self {
            server,
            codec: Codec,
            next_tag: 1,
            negotiated_msize: DEFAULT_MSIZE,
        }
    }

    fn next_tag(&mut self) -> u16 {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        if self.next_tag == u16::MAX {
            self.next_tag = 1;
        }
        tag
    }

    /// Send one typed request and return the reply body, turning `Rlerror`
    /// into [`ShareDoorError::Remote`].
    pub fn transact(&mut self, body: RequestBody) -> Result<ResponseBody, ShareDoorError> {
        let tag = self.next_tag();
        let encoded = self.codec.encode_request(&Request { tag, body })?;
        let reply = self
            .server
            .handle_frame(&encoded)
            .ok_or(ShareDoorError::Dropped)?;
        let response = self.codec.decode_response(&reply)?;
        debug_assert_eq!(response.tag, tag);
        match response.body {
            ResponseBody::Error { ecode } => Err(ShareDoorError::Remote(ecode)),
            other => Ok(other),
        }
    }

    /// Send raw bytes and return the raw reply, if any.
    pub fn transact_raw(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        self.server.handle_frame(frame)
    }

    /// Negotiate the protocol version and message size.
    pub fn version(&mut self, msize: u32) -> Result<u32, ShareDoorError> {
        let response = self.transact(RequestBody::Version {
            msize,
            version: VERSION.to_owned(),
        })?;
        let ResponseBody::Version { msize, version } = response else {
            unreachable!("version response must be Rversion");
        };
        if version != VERSION {
            return Err(ShareDoorError::protocol(format!(
                "unexpected version {version}"
            )));
        }
        self.negotiated_msize = msize;
        Ok(msize)
    }

    /// Attach `fid` to the export root as numeric user `uid`.
    pub fn attach(&mut self, fid: u32, uid: u32) -> Result<Qid, ShareDoorError> {
        let response = self.transact(RequestBody::Attach {
            fid,
            afid: NOFID,
            uname: String::new(),
            aname: String::new(),
            n_uname: uid,
        })?;
        let ResponseBody::Attach { qid } = response else {
            unreachable!("attach response must be Rattach");
        };
        Ok(qid)
    }

    /// Walk from `fid` to `newfid` following `path`.
    pub fn walk(&mut self, fid: u32, newfid: u32, path: &[&str]) -> Result<Vec<Qid>, ShareDoorError> {
        let response = self.transact(RequestBody::Walk {
            fid,
            newfid,
            wnames: path.iter().map(|name| (*name).to_owned()).collect(),
        })?;
        let ResponseBody::Walk { qids } = response else {
            unreachable!("walk response must be Rwalk");
        };
        Ok(qids)
    }

    /// Open `fid` with Linux open flags.
    pub fn lopen(&mut self, fid: u32, flags: u32) -> Result<(Qid, u32), ShareDoorError> {
        let response = self.transact(RequestBody::Lopen { fid, flags })?;
        let ResponseBody::Lopen { qid, iounit } = response else {
            unreachable!("lopen response must be Rlopen");
        };
        Ok((qid, iounit))
    }

    /// Open `fid` with a legacy 9P2000 mode byte.
    pub fn open(&mut self, fid: u32, mode: u8) -> Result<(Qid, u32), ShareDoorError> {
        let response = self.transact(RequestBody::Open { fid, mode })?;
        let ResponseBody::Open { qid, iounit } = response else {
            unreachable!("open response must be Ropen");
        };
        Ok((qid, iounit))
    }

    /// Create and open `name` inside directory `fid`; `fid` moves to the new file.
    pub fn lcreate(
        &mut self,
        fid: u32,
        name: &str,
        flags: u32,
        mode: u32,
        gid: u32,
    ) -> Result<Qid, ShareDoorError> {
        let response = self.transact(RequestBody::Lcreate {
            fid,
            name: name.to_owned(),
            flags,
            mode,
            gid,
        })?;
        let ResponseBody::Lcreate { qid, .. } = response else {
            unreachable!("lcreate response must be Rlcreate");
        };
        Ok(qid)
    }

    /// Create symlink `name` -> `target` inside directory `fid`.
    pub fn symlink(&mut self, fid: u32, name: &str, target: &str) -> Result<Qid, ShareDoorError> {
        let response = self.transact(RequestBody::Symlink {
            fid,
            name: name.to_owned(),
            target: target.to_owned(),
            gid: 0,
        })?;
        let ResponseBody::Symlink { qid } = response else {
            unreachable!("symlink response must be Rsymlink");
        };
        Ok(qid)
    }

    /// Create a device, fifo or socket node inside directory `dfid`.
    pub fn mknod(
        &mut self,
        dfid: u32,
        name: &str,
        mode: u32,
        major: u32,
        minor: u32,
    ) -> Result<Qid, ShareDoorError> {
        let response = self.transact(RequestBody::Mknod {
            dfid,
            name: name.to_owned(),
            mode,
            major,
            minor,
            gid: 0,
        })?;
        let ResponseBody::Mknod { qid } = response else {
            unreachable!("mknod response must be Rmknod");
        };
        Ok(qid)
    }

    /// Create directory `name` inside `dfid`.
    pub fn mkdir(&mut self, dfid: u32, name: &str, mode: u32) -> Result<Qid, ShareDoorError> {
        let response = self.transact(RequestBody::Mkdir {
            dfid,
            name: name.to_owned(),
            mode,
            gid: 0,
        })?;
        let ResponseBody::Mkdir { qid } = response else {
            unreachable!("mkdir response must be Rmkdir");
        };
        Ok(qid)
    }

    /// Read the target of a symlink fid.
    pub fn readlink(&mut self, fid: u32) -> Result<String, ShareDoorError> {
        let response = self.transact(RequestBody::Readlink { fid })?;
        let ResponseBody::Readlink { target } = response else {
            unreachable!("readlink response must be Rreadlink");
        };
        Ok(target)
    }

    /// Fetch all attributes of `fid`.
    pub fn getattr(&mut self, fid: u32) -> Result<Attr, ShareDoorError> {
        let response = self.transact(RequestBody::Getattr {
            fid,
            request_mask: u64::MAX,
        })?;
        let ResponseBody::Getattr(attr) = response else {
            unreachable!("getattr response must be Rgetattr");
        };
        Ok(*attr)
    }

    /// Apply the fields of `attr` selected by its valid mask.
    pub fn setattr(&mut self, fid: u32, attr: SetAttr) -> Result<(), ShareDoorError> {
        let response = self.transact(RequestBody::Setattr { fid, attr })?;
        let ResponseBody::Setattr = response else {
            unreachable!("setattr response must be Rsetattr");
        };
        Ok(())
    }

    /// Read directory entries starting at cursor `offset`.
    pub fn readdir(
        &mut self,
        fid: u32,
        offset: u64,
        count: u32,
    ) -> Result<Vec<DirEntry>, ShareDoorError> {
        let response = self.transact(RequestBody::Readdir { fid, offset, count })?;
        let ResponseBody::Readdir { entries } = response else {
            unreachable!("readdir response must be Rreaddir");
        };
        Ok(entries)
    }

    /// Flush an open fid to stable storage.
    pub fn fsync(&mut self, fid: u32) -> Result<(), ShareDoorError> {
        let response = self.transact(RequestBody::Fsync { fid, datasync: 0 })?;
        let ResponseBody::Fsync = response else {
            unreachable!("fsync response must be Rfsync");
        };
        Ok(())
    }

    /// Move `oldname` in `olddirfid` to `newname` in `newdirfid`.
    pub fn renameat(
        &mut self,
        olddirfid: u32,
        oldname: &str,
        newdirfid: u32,
        newname: &str,
    ) -> Result<(), ShareDoorError> {
        let response = self.transact(RequestBody::Renameat {
            olddirfid,
            oldname: oldname.to_owned(),
            newdirfid,
            newname: newname.to_owned(),
        })?;
        let ResponseBody::Renameat = response else {
            unreachable!("renameat response must be Rrenameat");
        };
        Ok(())
    }

    /// Remove `name` from directory `dirfid`.
    pub fn unlinkat(&mut self, dirfid: u32, name: &str, flags: u32) -> Result<(), ShareDoorError> {
        let response = self.transact(RequestBody::Unlinkat {
            dirfid,
            name: name.to_owned(),
            flags,
        })?;
        let ResponseBody::Unlinkat = response else {
            unreachable!("unlinkat response must be Runlinkat");
        };
        Ok(())
    }

    /// Read up to `count` bytes at `offset`.
    pub fn read(&mut self, fid: u32, offset: u64, count: u32) -> Result<Vec<u8>, ShareDoorError> {
        let response = self.transact(RequestBody::Read { fid, offset, count })?;
        let ResponseBody::Read { data } = response else {
            unreachable!("read response must be Rread");
        };
        Ok(data)
    }

    /// Write `data` at `offset`.
    pub fn write(&mut self, fid: u32, offset: u64, data: &[u8]) -> Result<u32, ShareDoorError> {
        let response = self.transact(RequestBody::Write {
            fid,
            offset,
            data: data.to_vec(),
        })?;
        let ResponseBody::Write { count } = response else {
            unreachable!("write response must be Rwrite");
        };
        Ok(count)
    }

    /// Release a fid.
    pub fn clunk(&mut self, fid: u32) -> Result<(), ShareDoorError> {
        let response = self.transact(RequestBody::Clunk { fid })?;
        let ResponseBody::Clunk = response else {
            unreachable!("clunk response must be Rclunk");
        };
        Ok(())
    }

    /// Remove the node behind `fid` and release the fid.
    pub fn remove(&mut self, fid: u32) -> Result<(), ShareDoorError> {
        let response = self.transact(RequestBody::Remove { fid })?;
        let ResponseBody::Remove = response else {
            unreachable!("remove response must be Rremove");
        };
        Ok(())
    }

    /// Message size agreed by the last `version` call.
    #[must_use]
    pub fn negotiated_msize(&self) -> u32 {
        self.negotiated_msize
    }
}
