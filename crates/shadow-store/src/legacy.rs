// Author: Lukas Bower
// Purpose: Read the legacy per-category JSON metadata files.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::record::{DeviceKind, DeviceRecord, NodeKind, PermissionRecord};

#[derive(Debug, Deserialize)]
struct LegacyPermission {
    #[serde(default)]
    mode: u32,
    #[serde(default)]
    uid: u32,
    #[serde(default)]
    gid: u32,
    #[serde(default)]
    mtime: u32,
}

#[derive(Debug, Deserialize)]
struct LegacyDevice {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    major: u16,
    #[serde(default)]
    minor: u16,
}

pub(crate) fn permissions(text: &str) -> serde_json::Result<BTreeMap<String, PermissionRecord>> {
    let raw: BTreeMap<String, LegacyPermission> = serde_json::from_str(text)?;
    Ok(raw
        .into_iter()
        .map(|(path, p)| (path, PermissionRecord::new(p.mode, p.uid, p.gid, p.mtime)))
        .collect())
}

pub(crate) fn symlinks(text: &str) -> serde_json::Result<BTreeMap<String, String>> {
    serde_json::from_str(text)
}

pub(crate) fn types(text: &str) -> serde_json::Result<BTreeMap<String, NodeKind>> {
    let raw: BTreeMap<String, String> = serde_json::from_str(text)?;
    Ok(raw
        .into_iter()
        .map(|(path, name)| (path, NodeKind::from_legacy_name(&name)))
        .collect())
}

pub(crate) fn devices(text: &str) -> serde_json::Result<BTreeMap<String, DeviceRecord>> {
    let raw: BTreeMap<String, LegacyDevice> = serde_json::from_str(text)?;
    Ok(raw
        .into_iter()
        .map(|(path, d)| {
            let kind = if d.kind == "char" {
                DeviceKind::Char
            } else {
                DeviceKind::Block
            };
            (
                path,
                DeviceRecord {
                    kind,
                    major: d.major,
                    minor: d.minor,
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_without_mtime_default_to_zero() {
        let map = permissions(r#"{"etc/shadow": {"mode": 33184, "uid": 0, "gid": 42}}"#)
            .expect("parse");
        let record = map["etc/shadow"];
        assert_eq!(record.mode, 0o640);
        assert_eq!(record.gid, 42);
        assert_eq!(record.mtime, 0);
    }

    #[test]
    fn type_names_map_to_tags() {
        let map = types(r#"{"l": "symlink", "d": "dir", "weird": "door"}"#).expect("parse");
        assert_eq!(map["l"], NodeKind::Symlink);
        assert_eq!(map["d"], NodeKind::Directory);
        assert_eq!(map["weird"], NodeKind::File);
    }

    #[test]
    fn devices_parse_kind_strings() {
        let map = devices(r#"{"dev/null": {"type": "char", "major": 1, "minor": 3}}"#)
            .expect("parse");
        assert_eq!(map["dev/null"].kind, DeviceKind::Char);
        assert_eq!(map["dev/null"].minor, 3);
    }
}
