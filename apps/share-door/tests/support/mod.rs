// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Shared fixtures for share-door integration tests.
// Author: Lukas Bower
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ninep_wire::DEFAULT_MSIZE;
use shadow_store::MetadataStore;
use share_door::{InProcessConnection, ServerOptions, ShareDoor};
use tempfile::TempDir;

pub const ROOT_FID: u32 = 1;
pub const GUEST_UID: u32 = 1000;

pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 0o1;
pub const O_RDWR: u32 = 0o2;
pub const O_TRUNC: u32 = 0o1000;
pub const O_APPEND: u32 = 0o2000;

pub struct Fixture {
    pub dir: TempDir,
    pub door: ShareDoor,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let door = ShareDoor::new(ServerOptions::new(
            dir.path().join("export"),
            dir.path().join("meta"),
        ))
        .expect("start server");
        Self { dir, door }
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.dir.path().join("meta")
    }

    pub fn host(&self, rel: &str) -> PathBuf {
        self.door.root().join(rel)
    }

    /// Metadata as persisted on disk after the last request.
    pub fn persisted(&self) -> MetadataStore {
        MetadataStore::load(self.metadata_dir())
    }

    /// Negotiated and attached client with `ROOT_FID` bound to the root.
    pub fn session(&self) -> InProcessConnection {
        let mut client = self.door.connect();
        client.version(DEFAULT_MSIZE).expect("version");
        client.attach(ROOT_FID, GUEST_UID).expect("attach");
        client
    }

    pub fn restart(&mut self) {
        self.door = ShareDoor::new(ServerOptions::new(
            self.dir.path().join("export"),
            self.metadata_dir(),
        ))
        .expect("restart server");
    }
}

pub fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}
