// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Persistence tests for the metadata shadow store.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;

use shadow_store::{
    Category, DeviceKind, DeviceRecord, MetadataStore, NodeKind, PermissionRecord,
};

#[test]
fn missing_directory_loads_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MetadataStore::load(dir.path().join("absent"));
    assert!(store.permission(".").is_none());
    assert!(!store.has_pending_changes());
}

#[test]
fn flush_then_reload_preserves_every_category() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MetadataStore::load(dir.path());
    store.set_permission("etc/passwd", PermissionRecord::new(0o100644, 0, 0, 1_700_000_000));
    store.set_symlink("bin/sh", "busybox");
    store.set_kind("etc", NodeKind::Directory);
    store.set_kind("dev/tty", NodeKind::CharDevice);
    store.set_device(
        "dev/tty",
        DeviceRecord {
            kind: DeviceKind::Char,
            major: 5,
            minor: 0,
        },
    );
    store.flush().expect("flush");
    assert!(!store.has_pending_changes());
    for category in Category::ALL {
        assert!(dir.path().join(category.file_name()).is_file());
    }

    let reloaded = MetadataStore::load(dir.path());
    let perm = reloaded.permission("etc/passwd").expect("permission");
    assert_eq!(perm.mode, 0o644);
    assert_eq!(perm.mtime, 1_700_000_000);
    assert_eq!(reloaded.symlink("bin/sh"), Some("busybox"));
    assert_eq!(reloaded.kind("bin/sh"), Some(NodeKind::Symlink));
    assert_eq!(reloaded.kind("etc"), Some(NodeKind::Directory));
    assert_eq!(reloaded.device("dev/tty").map(|d| d.major), Some(5));
}

#[test]
fn flush_writes_only_dirty_categories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MetadataStore::load(dir.path());
    store.set_permission("a", PermissionRecord::new(0o600, 1, 1, 0));
    assert!(store.is_dirty(Category::Permissions));
    assert!(!store.is_dirty(Category::Symlinks));
    store.flush().expect("flush");
    assert!(dir.path().join("permissions.bin").exists());
    assert!(!dir.path().join("symlinks.bin").exists());
    assert!(!dir.path().join("types.bin").exists());
}

#[test]
fn malformed_binary_file_yields_empty_map() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("permissions.bin"), b"garbage").expect("write");
    fs::write(dir.path().join("types.bin"), b"V87M\x07\x00\x01\x00").expect("write");
    let store = MetadataStore::load(dir.path());
    assert!(store.permission("garbage").is_none());
    assert!(store.kind("anything").is_none());
}

#[test]
fn legacy_json_is_read_when_binary_is_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("permissions.json"),
        r#"{"home/user": {"mode": 448, "uid": 1000, "gid": 1000}}"#,
    )
    .expect("write");
    fs::write(dir.path().join("symlinks.json"), r#"{"lib64": "lib"}"#).expect("write");
    fs::write(dir.path().join("types.json"), r#"{"lib64": "symlink"}"#).expect("write");
    fs::write(
        dir.path().join("devices.json"),
        r#"{"dev/sda": {"type": "block", "major": 8, "minor": 0}}"#,
    )
    .expect("write");

    let mut store = MetadataStore::load(dir.path());
    assert_eq!(store.permission("home/user").map(|p| p.uid), Some(1000));
    assert_eq!(store.symlink("lib64"), Some("lib"));
    assert_eq!(store.kind("lib64"), Some(NodeKind::Symlink));
    assert_eq!(
        store.device("dev/sda"),
        Some(DeviceRecord {
            kind: DeviceKind::Block,
            major: 8,
            minor: 0
        })
    );

    // The next write of a category migrates it to the binary format.
    store.set_permission("home/user", PermissionRecord::new(0o750, 1000, 1000, 0));
    store.flush().expect("flush");
    assert!(dir.path().join("permissions.bin").exists());
    let reloaded = MetadataStore::load(dir.path());
    assert_eq!(reloaded.permission("home/user").map(|p| p.mode), Some(0o750));
}

#[test]
fn binary_file_wins_over_legacy_sibling() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MetadataStore::load(dir.path());
    store.set_symlink("l", "binary-target");
    store.flush().expect("flush");
    fs::write(dir.path().join("symlinks.json"), r#"{"l": "json-target"}"#).expect("write");
    let reloaded = MetadataStore::load(dir.path());
    assert_eq!(reloaded.symlink("l"), Some("binary-target"));
}

#[test]
fn rename_moves_all_categories_together() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MetadataStore::load(dir.path());
    store.set_permission("old", PermissionRecord::new(0o777, 0, 0, 5));
    store.set_symlink("old", "/etc/passwd");
    store.flush().expect("flush");

    store.rename("old", "new");
    for category in [Category::Permissions, Category::Symlinks, Category::Types] {
        assert!(store.is_dirty(category), "{category} should be dirty");
    }
    assert!(!store.is_dirty(Category::Devices));
    assert!(store.permission("old").is_none());
    assert!(store.symlink("old").is_none());
    assert!(store.kind("old").is_none());
    assert_eq!(store.permission("new").map(|p| p.mtime), Some(5));
    assert_eq!(store.symlink("new"), Some("/etc/passwd"));
    assert_eq!(store.kind("new"), Some(NodeKind::Symlink));
}

#[test]
fn delete_clears_every_category() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MetadataStore::load(dir.path());
    store.set_permission("n", PermissionRecord::new(0o600, 0, 0, 0));
    store.set_kind("n", NodeKind::BlockDevice);
    store.set_device(
        "n",
        DeviceRecord {
            kind: DeviceKind::Block,
            major: 7,
            minor: 1,
        },
    );
    store.delete("n");
    assert!(store.permission("n").is_none());
    assert!(store.kind("n").is_none());
    assert!(store.device("n").is_none());
    store.flush().expect("flush");
    let reloaded = MetadataStore::load(dir.path());
    assert!(reloaded.device("n").is_none());
}
