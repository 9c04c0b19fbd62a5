// Author: Lukas Bower
// Purpose: Record types held by the metadata shadow store.

use std::fmt;

/// The four independently persisted metadata categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Mode, ownership and modification time.
    Permissions,
    /// Emulated symlink targets.
    Symlinks,
    /// Node type tags overriding the host file type.
    Types,
    /// Device numbers for character and block nodes.
    Devices,
}

impl Category {
    /// Every category, in flush order.
    pub const ALL: [Category; 4] = [
        Category::Permissions,
        Category::Symlinks,
        Category::Types,
        Category::Devices,
    ];

    /// Base name of the binary category file.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Category::Permissions => "permissions.bin",
            Category::Symlinks => "symlinks.bin",
            Category::Types => "types.bin",
            Category::Devices => "devices.bin",
        }
    }

    /// Base name of the legacy JSON sibling read when the binary file is absent.
    #[must_use]
    pub fn legacy_file_name(self) -> &'static str {
        match self {
            Category::Permissions => "permissions.json",
            Category::Symlinks => "symlinks.json",
            Category::Types => "types.json",
            Category::Devices => "devices.json",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Category::Permissions => 0,
            Category::Symlinks => 1,
            Category::Types => 2,
            Category::Devices => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Permissions => "permissions",
            Category::Symlinks => "symlinks",
            Category::Types => "types",
            Category::Devices => "devices",
        };
        f.write_str(name)
    }
}

/// POSIX attributes the host filesystem cannot hold on the guest's behalf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionRecord {
    /// Permission bits, masked to `0o7777`.
    pub mode: u16,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Modification time in epoch seconds.
    pub mtime: u32,
}

impl PermissionRecord {
    /// Build a record, masking `mode` to the permission bits.
    #[must_use]
    pub fn new(mode: u32, uid: u32, gid: u32, mtime: u32) -> Self {
        Self {
            mode: (mode & 0o7777) as u16,
            uid,
            gid,
            mtime,
        }
    }
}

/// Node type tag. The discriminants are the on-disk byte values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File = 0,
    /// Directory.
    Directory = 1,
    /// Emulated symbolic link.
    Symlink = 2,
    /// Character device.
    CharDevice = 3,
    /// Block device.
    BlockDevice = 4,
    /// Named pipe.
    Fifo = 5,
    /// Unix socket.
    Socket = 6,
}

impl NodeKind {
    /// Decode an on-disk tag. Unknown values read as [`NodeKind::File`].
    #[must_use]
    pub fn from_byte(value: u8) -> Self {
        match value {
            1 => NodeKind::Directory,
            2 => NodeKind::Symlink,
            3 => NodeKind::CharDevice,
            4 => NodeKind::BlockDevice,
            5 => NodeKind::Fifo,
            6 => NodeKind::Socket,
            _ => NodeKind::File,
        }
    }

    /// Parse the name used by the legacy JSON format.
    #[must_use]
    pub fn from_legacy_name(name: &str) -> Self {
        match name {
            "dir" => NodeKind::Directory,
            "symlink" => NodeKind::Symlink,
            "chardev" => NodeKind::CharDevice,
            "blockdev" => NodeKind::BlockDevice,
            "fifo" => NodeKind::Fifo,
            "socket" => NodeKind::Socket,
            _ => NodeKind::File,
        }
    }
}

/// Character or block flavour of a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Character device, stored as `0`.
    Char,
    /// Block device, stored as `1`.
    Block,
}

/// Device numbers recorded for an emulated device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Character or block.
    pub kind: DeviceKind,
    /// Major number.
    pub major: u16,
    /// Minor number.
    pub minor: u16,
}
