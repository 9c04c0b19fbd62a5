// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Persist guest-visible POSIX metadata the host filesystem cannot represent.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Metadata shadow store for the host share server.
//!
//! The store keeps four independent maps keyed by root-relative paths
//! (`"."` for the root, `/`-separated otherwise): permission records,
//! emulated symlink targets, node type tags and device numbers. Each map is
//! persisted to its own binary file inside the metadata directory. Loading
//! never fails; missing or malformed files yield empty maps, and a legacy
//! JSON sibling is read when a binary file is absent.

mod binary;
mod legacy;
mod record;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

pub use record::{Category, DeviceKind, DeviceRecord, NodeKind, PermissionRecord};

/// Errors raised while persisting the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Host I/O failure while writing a category file.
    #[error("metadata i/o: {0}")]
    Io(#[from] io::Error),
    /// A category holds more entries than its `u16` count can describe.
    #[error("{category} holds {count} entries, more than the file format allows")]
    TooManyEntries {
        /// Offending category.
        category: Category,
        /// Number of entries in memory.
        count: usize,
    },
    /// A path or payload exceeds its `u16` length prefix.
    #[error("{category} field of {len} bytes exceeds the file format limit")]
    FieldTooLong {
        /// Offending category.
        category: Category,
        /// Length of the field in bytes.
        len: usize,
    },
}

/// In-memory view of the four metadata categories with per-category dirty
/// tracking.
#[derive(Debug)]
pub struct MetadataStore {
    dir: PathBuf,
    permissions: BTreeMap<String, PermissionRecord>,
    symlinks: BTreeMap<String, String>,
    types: BTreeMap<String, NodeKind>,
    devices: BTreeMap<String, DeviceRecord>,
    dirty: [bool; 4],
}

impl MetadataStore {
    /// Load all four categories from `dir`.
    #[must_use]
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let permissions = load_category(
            &dir,
            Category::Permissions,
            binary::decode_permission,
            legacy::permissions,
        );
        let symlinks = load_category(
            &dir,
            Category::Symlinks,
            binary::decode_symlink,
            legacy::symlinks,
        );
        let types = load_category(&dir, Category::Types, binary::decode_kind, legacy::types);
        let devices = load_category(
            &dir,
            Category::Devices,
            binary::decode_device,
            legacy::devices,
        );
        info!(
            target: "shadow-store",
            "loaded metadata from {}: {} permissions, {} symlinks, {} types, {} devices",
            dir.display(),
            permissions.len(),
            symlinks.len(),
            types.len(),
            devices.len()
        );
        Self {
            dir,
            permissions,
            symlinks,
            types,
            devices,
            dirty: [false; 4],
        }
    }

    /// Directory holding the category files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Permission record for `rel`, if any.
    #[must_use]
    pub fn permission(&self, rel: &str) -> Option<PermissionRecord> {
        self.permissions.get(rel).copied()
    }

    /// Replace the permission record for `rel`.
    pub fn set_permission(&mut self, rel: &str, record: PermissionRecord) {
        self.permissions.insert(rel.to_owned(), record);
        self.mark(Category::Permissions);
    }

    /// Emulated symlink target for `rel`, if any.
    #[must_use]
    pub fn symlink(&self, rel: &str) -> Option<&str> {
        self.symlinks.get(rel).map(String::as_str)
    }

    /// Record `rel` as a symlink to `target`. Also tags the node as a symlink.
    pub fn set_symlink(&mut self, rel: &str, target: &str) {
        self.symlinks.insert(rel.to_owned(), target.to_owned());
        self.mark(Category::Symlinks);
        self.set_kind(rel, NodeKind::Symlink);
    }

    /// Type tag for `rel`, if any.
    #[must_use]
    pub fn kind(&self, rel: &str) -> Option<NodeKind> {
        self.types.get(rel).copied()
    }

    /// Replace the type tag for `rel`.
    pub fn set_kind(&mut self, rel: &str, kind: NodeKind) {
        self.types.insert(rel.to_owned(), kind);
        self.mark(Category::Types);
    }

    /// Device numbers for `rel`, if any.
    #[must_use]
    pub fn device(&self, rel: &str) -> Option<DeviceRecord> {
        self.devices.get(rel).copied()
    }

    /// Replace the device numbers for `rel`.
    pub fn set_device(&mut self, rel: &str, record: DeviceRecord) {
        self.devices.insert(rel.to_owned(), record);
        self.mark(Category::Devices);
    }

    /// Drop every record stored under exactly `rel`.
    pub fn delete(&mut self, rel: &str) {
        if self.permissions.remove(rel).is_some() {
            self.mark(Category::Permissions);
        }
        if self.symlinks.remove(rel).is_some() {
            self.mark(Category::Symlinks);
        }
        if self.types.remove(rel).is_some() {
            self.mark(Category::Types);
        }
        if self.devices.remove(rel).is_some() {
            self.mark(Category::Devices);
        }
    }

    /// Move every record at `old` or below it to the matching key under
    /// `new`, across all four categories. Records previously stored at or
    /// below `new` are discarded, mirroring a host rename that replaces its
    /// destination.
    pub fn rename(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        if rename_keys(&mut self.permissions, old, new) {
            self.mark(Category::Permissions);
        }
        if rename_keys(&mut self.symlinks, old, new) {
            self.mark(Category::Symlinks);
        }
        if rename_keys(&mut self.types, old, new) {
            self.mark(Category::Types);
        }
        if rename_keys(&mut self.devices, old, new) {
            self.mark(Category::Devices);
        }
    }

    /// Whether `category` has unflushed changes.
    #[must_use]
    pub fn is_dirty(&self, category: Category) -> bool {
        self.dirty[category.index()]
    }

    /// Whether any category has unflushed changes.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.dirty.iter().any(|dirty| *dirty)
    }

    /// Write every dirty category and clear its flag. A category whose write
    /// fails stays dirty so a later flush retries it.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.has_pending_changes() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        for category in Category::ALL {
            if !self.is_dirty(category) {
                continue;
            }
            let bytes = match category {
                Category::Permissions => {
                    binary::encode(category, &self.permissions, binary::encode_permission)?
                }
                Category::Symlinks => {
                    binary::encode(category, &self.symlinks, binary::encode_symlink)?
                }
                Category::Types => binary::encode(category, &self.types, binary::encode_kind)?,
                Category::Devices => {
                    binary::encode(category, &self.devices, binary::encode_device)?
                }
            };
            self.write_atomic(category, &bytes)?;
            self.dirty[category.index()] = false;
            debug!(target: "shadow-store", "flushed {category} ({} bytes)", bytes.len());
        }
        Ok(())
    }

    fn write_atomic(&self, category: Category, bytes: &[u8]) -> Result<(), StoreError> {
        let target = self.dir.join(category.file_name());
        let mut staged = tempfile::NamedTempFile::new_in(&self.dir)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(&target).map_err(|err| err.error)?;
        Ok(())
    }

    fn mark(&mut self, category: Category) {
        self.dirty[category.index()] = true;
    }
}

fn load_category<T>(
    dir: &Path,
    category: Category,
    decode: impl Fn(&[u8]) -> Option<T>,
    legacy: impl Fn(&str) -> serde_json::Result<BTreeMap<String, T>>,
) -> BTreeMap<String, T> {
    let path = dir.join(category.file_name());
    match fs::read(&path) {
        Ok(bytes) => {
            return binary::decode(&bytes, decode).unwrap_or_else(|| {
                warn!(
                    target: "shadow-store",
                    "ignoring malformed {} file {}",
                    category,
                    path.display()
                );
                BTreeMap::new()
            });
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(target: "shadow-store", "unable to read {}: {err}", path.display());
            return BTreeMap::new();
        }
    }

    let legacy_path = dir.join(category.legacy_file_name());
    let Ok(text) = fs::read_to_string(&legacy_path) else {
        return BTreeMap::new();
    };
    match legacy(&text) {
        Ok(entries) => {
            info!(
                target: "shadow-store",
                "migrating {} {} entries from {}",
                entries.len(),
                category,
                legacy_path.display()
            );
            entries
        }
        Err(err) => {
            warn!(
                target: "shadow-store",
                "ignoring malformed legacy file {}: {err}",
                legacy_path.display()
            );
            BTreeMap::new()
        }
    }
}

fn is_at_or_below(key: &str, base: &str) -> bool {
    key == base
        || (key.len() > base.len() && key.starts_with(base) && key.as_bytes()[base.len()] == b'/')
}

/// Returns whether the map changed.
fn rename_keys<T>(map: &mut BTreeMap<String, T>, old: &str, new: &str) -> bool {
    let moving: Vec<String> = map
        .keys()
        .filter(|key| is_at_or_below(key, old))
        .cloned()
        .collect();
    if moving.is_empty() {
        let stale: Vec<String> = map
            .keys()
            .filter(|key| is_at_or_below(key, new))
            .cloned()
            .collect();
        for key in &stale {
            map.remove(key);
        }
        return !stale.is_empty();
    }
    let mut moved = Vec::with_capacity(moving.len());
    for key in moving {
        if let Some(value) = map.remove(&key) {
            let suffix = &key[old.len()..];
            moved.push((format!("{new}{suffix}"), value));
        }
    }
    map.retain(|key, _| !is_at_or_below(key, new));
    map.extend(moved);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_respects_component_boundaries() {
        assert!(is_at_or_below("a", "a"));
        assert!(is_at_or_below("a/b", "a"));
        assert!(!is_at_or_below("ab", "a"));
        assert!(!is_at_or_below("b/a", "a"));
    }

    #[test]
    fn rename_moves_descendants() {
        let mut map = BTreeMap::new();
        map.insert("src".to_owned(), 1);
        map.insert("src/a".to_owned(), 2);
        map.insert("src/a/b".to_owned(), 3);
        map.insert("srcx".to_owned(), 4);
        assert!(rename_keys(&mut map, "src", "dst"));
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["dst", "dst/a", "dst/a/b", "srcx"]);
        assert_eq!(map["dst/a/b"], 3);
    }

    #[test]
    fn rename_drops_replaced_destination() {
        let mut map = BTreeMap::new();
        map.insert("new".to_owned(), 1);
        assert!(rename_keys(&mut map, "old", "new"));
        assert!(map.is_empty());
    }
}
