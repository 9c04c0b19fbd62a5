// Author: Lukas Bower
// Purpose: Define 9P2000.L wire types and constants shared across components.
#![allow(clippy::module_name_repetitions)]

//! 9P2000.L data model definitions shared by the codec and the server.

/// Protocol version string; the only dialect the server speaks.
pub const VERSION: &str = "9P2000.L";

/// Message size offered by the in-process client when none is specified.
pub const DEFAULT_MSIZE: u32 = 512 * 1024;

/// Size of the `size[4] type[1] tag[2]` frame header.
pub const HEADER_LEN: usize = 7;

/// Encoded size of a qid: `type[1] version[4] path[8]`.
pub const QID_LEN: usize = 13;

/// Maximum number of path elements in a single `Twalk` (9P `MAXWELEM`).
pub const MAX_WALK_ELEMENTS: usize = 16;

/// Tag value used by requests that are not part of a tagged exchange.
pub const NOTAG: u16 = u16::MAX;

/// Fid value meaning "no fid" (e.g. the `afid` of an unauthenticated attach).
pub const NOFID: u32 = u32::MAX;

/// Errors produced while encoding or decoding 9P2000.L messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input buffer was shorter than a field or the declared frame length.
    #[error("truncated frame")]
    Truncated,
    /// Encountered a message type this codec cannot decode in this direction.
    #[error("unsupported message type {0}")]
    Unsupported(u8),
    /// Encountered malformed UTF-8 data in a string field.
    #[error("invalid utf8 in string field")]
    InvalidUtf8,
    /// Declared message size is impossible for the supplied buffer.
    #[error("length mismatch: declared {declared} actual {actual}")]
    LengthMismatch {
        /// Message length declared in the frame header.
        declared: u32,
        /// Byte length of the buffer that carried the frame.
        actual: usize,
    },
    /// Walk request carried more than [`MAX_WALK_ELEMENTS`] components.
    #[error("invalid path component")]
    InvalidPath,
    /// A string or blob does not fit in its length prefix.
    #[error("field of {0} bytes exceeds its length prefix")]
    TooLong(usize),
}

/// Qid type bits as defined by 9P2000.L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QidType(u8);

impl QidType {
    /// Directory bit.
    pub const DIRECTORY: Self = Self(0x80);
    /// Symbolic link bit.
    pub const SYMLINK: Self = Self(0x02);
    /// Regular file.
    pub const FILE: Self = Self(0x00);

    /// Wrap a raw qid type byte.
    #[must_use]
    pub fn from_raw(value: u8) -> Self {
        Self(value)
    }

    /// Raw byte carried on the wire.
    #[must_use]
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Check whether the Qid represents a directory.
    #[must_use]
    pub fn is_directory(self) -> bool {
        self.0 & Self::DIRECTORY.0 != 0
    }

    /// Check whether the Qid represents a symbolic link.
    #[must_use]
    pub fn is_symlink(self) -> bool {
        self.0 & Self::SYMLINK.0 != 0
    }
}

impl From<QidType> for u8 {
    fn from(value: QidType) -> Self {
        value.raw()
    }
}

/// 9P Qid descriptor identifying a node for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Qid {
    ty: QidType,
    version: u32,
    path: u64,
}

impl Qid {
    /// Construct a new Qid.
    #[must_use]
    pub fn new(ty: QidType, version: u32, path: u64) -> Self {
        Self { ty, version, path }
    }

    /// Return the Qid type bits.
    #[must_use]
    pub fn ty(&self) -> QidType {
        self.ty
    }

    /// Return the Qid version field.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Return the Qid path field.
    #[must_use]
    pub fn path(&self) -> u64 {
        self.path
    }
}

/// Parsed `size[4] type[1] tag[2]` prefix of every 9P message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Declared frame size including the header.
    pub size: u32,
    /// Raw message type byte.
    pub ty: u8,
    /// Request tag echoed by the reply.
    pub tag: u16,
}

/// `Tsetattr` payload. Only fields whose bit is set in `valid` are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetAttr {
    /// Bitmask of `SetAttr::*` flags.
    pub valid: u32,
    /// Permission bits (and possibly type bits, which are ignored).
    pub mode: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// New file size.
    pub size: u64,
    /// Access time seconds, used with [`SetAttr::ATIME_SET`].
    pub atime_sec: u64,
    /// Access time nanoseconds.
    pub atime_nsec: u64,
    /// Modification time seconds, used with [`SetAttr::MTIME_SET`].
    pub mtime_sec: u64,
    /// Modification time nanoseconds.
    pub mtime_nsec: u64,
}

impl SetAttr {
    /// Apply `mode`.
    pub const MODE: u32 = 0x0000_0001;
    /// Apply `uid`.
    pub const UID: u32 = 0x0000_0002;
    /// Apply `gid`.
    pub const GID: u32 = 0x0000_0004;
    /// Truncate or extend to `size`.
    pub const SIZE: u32 = 0x0000_0008;
    /// Update access time.
    pub const ATIME: u32 = 0x0000_0010;
    /// Update modification time.
    pub const MTIME: u32 = 0x0000_0020;
    /// Update change time (host-managed; accepted and ignored).
    pub const CTIME: u32 = 0x0000_0040;
    /// Use `atime_*` instead of the current time.
    pub const ATIME_SET: u32 = 0x0000_0080;
    /// Use `mtime_*` instead of the current time.
    pub const MTIME_SET: u32 = 0x0000_0100;

    /// Check whether a `SetAttr::*` bit is present in `valid`.
    #[must_use]
    pub fn has(&self, bit: u32) -> bool {
        self.valid & bit != 0
    }
}

/// `Rgetattr` payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attr {
    /// Mask of fields the server filled in.
    pub valid: u64,
    /// Node qid.
    pub qid: Qid,
    /// Type and permission bits (`S_IF*` | `0o7777`).
    pub mode: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Hard link count.
    pub nlink: u64,
    /// Device number for character and block devices.
    pub rdev: u64,
    /// Size in bytes.
    pub size: u64,
    /// Preferred I/O block size.
    pub blksize: u64,
    /// Number of 512-byte blocks.
    pub blocks: u64,
    /// Access time seconds.
    pub atime_sec: u64,
    /// Access time nanoseconds.
    pub atime_nsec: u64,
    /// Modification time seconds.
    pub mtime_sec: u64,
    /// Modification time nanoseconds.
    pub mtime_nsec: u64,
    /// Status change time seconds.
    pub ctime_sec: u64,
    /// Status change time nanoseconds.
    pub ctime_nsec: u64,
    /// Birth time seconds (always zero).
    pub btime_sec: u64,
    /// Birth time nanoseconds (always zero).
    pub btime_nsec: u64,
    /// Inode generation (always zero).
    pub gen: u64,
    /// Data version (always zero).
    pub data_version: u64,
}

impl Default for Qid {
    fn default() -> Self {
        Self::new(QidType::FILE, 0, 0)
    }
}

/// One `Rreaddir` entry: `qid[13] offset[8] type[1] name[s]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Qid of the entry.
    pub qid: Qid,
    /// Cursor value a client passes back to resume after this entry.
    pub offset: u64,
    /// `DT_*` directory entry type.
    pub kind: u8,
    /// Entry name.
    pub name: String,
}

impl DirEntry {
    /// Number of bytes this entry occupies inside an `Rreaddir` payload.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        QID_LEN + 8 + 1 + 2 + self.name.len()
    }
}

/// Request envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request identifier, echoed back by responses.
    pub tag: u16,
    /// The concrete request payload.
    pub body: RequestBody,
}

/// Response envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response identifier (mirrors the request tag).
    pub tag: u16,
    /// The concrete response payload.
    pub body: ResponseBody,
}

/// Request variants understood by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `Tversion` negotiates the message size and version string.
    Version {
        /// Requested maximum message size.
        msize: u32,
        /// Protocol version string supplied by the client.
        version: String,
    },
    /// `Tattach` binds a fid to the confined root.
    Attach {
        /// Fid to associate with the root.
        fid: u32,
        /// Authentication fid (ignored).
        afid: u32,
        /// User name string.
        uname: String,
        /// Attachment name (ignored; a single root is exported).
        aname: String,
        /// Numeric user id.
        n_uname: u32,
    },
    /// `Tflush` asks the server to abandon an outstanding request.
    Flush {
        /// Tag of the request to abandon.
        oldtag: u16,
    },
    /// `Twalk` resolves path components from `fid` into `newfid`.
    Walk {
        /// Source fid.
        fid: u32,
        /// Destination fid.
        newfid: u32,
        /// Path components, at most [`MAX_WALK_ELEMENTS`].
        wnames: Vec<String>,
    },
    /// `Tlopen` opens a fid with Linux `O_*` flags.
    Lopen {
        /// Fid to open.
        fid: u32,
        /// Linux open flags.
        flags: u32,
    },
    /// Legacy 9P2000 `Topen` with a one-byte mode.
    Open {
        /// Fid to open.
        fid: u32,
        /// 9P2000 open mode (`OREAD`, `OWRITE`, `ORDWR`, `OEXEC`, `OTRUNC`).
        mode: u8,
    },
    /// `Tlcreate` creates and opens a regular file in the directory `fid`.
    Lcreate {
        /// Directory fid; re-targeted to the new file on success.
        fid: u32,
        /// New file name.
        name: String,
        /// Linux open flags.
        flags: u32,
        /// Permission bits.
        mode: u32,
        /// Owning group id.
        gid: u32,
    },
    /// `Tsymlink` creates a symbolic link in the directory `fid`.
    Symlink {
        /// Directory fid.
        fid: u32,
        /// Link name.
        name: String,
        /// Link target.
        target: String,
        /// Owning group id.
        gid: u32,
    },
    /// `Tmknod` creates a device, fifo or socket node in the directory `dfid`.
    Mknod {
        /// Directory fid.
        dfid: u32,
        /// Node name.
        name: String,
        /// Type and permission bits.
        mode: u32,
        /// Device major number.
        major: u32,
        /// Device minor number.
        minor: u32,
        /// Owning group id.
        gid: u32,
    },
    /// `Treadlink` reads a symbolic link target.
    Readlink {
        /// Symlink fid.
        fid: u32,
    },
    /// `Tgetattr` queries node attributes.
    Getattr {
        /// Fid to query.
        fid: u32,
        /// Attributes the client is interested in.
        request_mask: u64,
    },
    /// `Tsetattr` updates node attributes.
    Setattr {
        /// Fid to update.
        fid: u32,
        /// Attribute values and their validity mask.
        attr: SetAttr,
    },
    /// `Treaddir` reads packed directory entries.
    Readdir {
        /// Opened directory fid.
        fid: u32,
        /// Entry index to resume from.
        offset: u64,
        /// Maximum payload size in bytes.
        count: u32,
    },
    /// `Tfsync` flushes an open file to stable storage.
    Fsync {
        /// Opened fid.
        fid: u32,
        /// Non-zero to only flush data.
        datasync: u32,
    },
    /// `Tmkdir` creates a directory in `dfid`.
    Mkdir {
        /// Directory fid.
        dfid: u32,
        /// New directory name.
        name: String,
        /// Permission bits.
        mode: u32,
        /// Owning group id.
        gid: u32,
    },
    /// `Trenameat` moves a name between two directories.
    Renameat {
        /// Source directory fid.
        olddirfid: u32,
        /// Source name.
        oldname: String,
        /// Destination directory fid.
        newdirfid: u32,
        /// Destination name.
        newname: String,
    },
    /// `Tunlinkat` removes a name from a directory.
    Unlinkat {
        /// Directory fid.
        dirfid: u32,
        /// Name to remove.
        name: String,
        /// `AT_REMOVEDIR` or zero.
        flags: u32,
    },
    /// `Tread` reads bytes from a fid.
    Read {
        /// Fid to read from.
        fid: u32,
        /// Offset into the file.
        offset: u64,
        /// Number of bytes requested.
        count: u32,
    },
    /// `Twrite` writes bytes to a fid.
    Write {
        /// Fid to write to.
        fid: u32,
        /// Offset within the file.
        offset: u64,
        /// Payload bytes supplied by the client.
        data: Vec<u8>,
    },
    /// `Tclunk` releases a fid.
    Clunk {
        /// Fid to release.
        fid: u32,
    },
    /// `Tremove` removes the node behind a fid and releases the fid.
    Remove {
        /// Fid naming the node to remove.
        fid: u32,
    },
    /// Any message type the server does not implement.
    Unknown {
        /// Raw message type byte.
        op: u8,
    },
}

/// Response variants sent to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// `Rversion`.
    Version {
        /// Negotiated maximum message size.
        msize: u32,
        /// Protocol version string.
        version: String,
    },
    /// `Rattach` with the root qid.
    Attach {
        /// Root qid.
        qid: Qid,
    },
    /// `Rflush`.
    Flush,
    /// `Rwalk` with one qid per resolved component.
    Walk {
        /// Qids of the resolved components.
        qids: Vec<Qid>,
    },
    /// `Rlopen`.
    Lopen {
        /// Qid of the opened node.
        qid: Qid,
        /// Maximum I/O payload size.
        iounit: u32,
    },
    /// `Ropen` answering a legacy `Topen`.
    Open {
        /// Qid of the opened node.
        qid: Qid,
        /// Maximum I/O payload size.
        iounit: u32,
    },
    /// `Rlcreate`.
    Lcreate {
        /// Qid of the created file.
        qid: Qid,
        /// Maximum I/O payload size.
        iounit: u32,
    },
    /// `Rsymlink`.
    Symlink {
        /// Qid of the created link.
        qid: Qid,
    },
    /// `Rmknod`.
    Mknod {
        /// Qid of the created node.
        qid: Qid,
    },
    /// `Rreadlink`.
    Readlink {
        /// Link target.
        target: String,
    },
    /// `Rgetattr`.
    Getattr(Box<Attr>),
    /// `Rsetattr`.
    Setattr,
    /// `Rreaddir` with packed entries.
    Readdir {
        /// Entries in cursor order.
        entries: Vec<DirEntry>,
    },
    /// `Rfsync`.
    Fsync,
    /// `Rmkdir`.
    Mkdir {
        /// Qid of the created directory.
        qid: Qid,
    },
    /// `Rrenameat`.
    Renameat,
    /// `Runlinkat`.
    Unlinkat,
    /// `Rread`.
    Read {
        /// Bytes read.
        data: Vec<u8>,
    },
    /// `Rwrite`.
    Write {
        /// Number of bytes written.
        count: u32,
    },
    /// `Rclunk`.
    Clunk,
    /// `Rremove`.
    Remove,
    /// `Rlerror` carrying a Linux errno value.
    Error {
        /// Linux errno value.
        ecode: u32,
    },
}
