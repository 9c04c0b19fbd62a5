// Author: Lukas Bower
// Purpose: Encode and decode the binary category file format.

//! Category files start with an 8-byte header (`"V87M"`, `u16` format
//! version, `u16` entry count) followed by `count` entries of
//! `u16 path_len, path, u16 payload_len, payload`. All integers are
//! little-endian.

use std::collections::BTreeMap;

use crate::record::{Category, DeviceKind, DeviceRecord, NodeKind, PermissionRecord};
use crate::StoreError;

pub(crate) const MAGIC: &[u8; 4] = b"V87M";
pub(crate) const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 8;
const PERMISSION_LEN: usize = 14;
const DEVICE_LEN: usize = 5;

/// Serialise one category map.
pub(crate) fn encode<T>(
    category: Category,
    entries: &BTreeMap<String, T>,
    payload: impl Fn(&T) -> Vec<u8>,
) -> Result<Vec<u8>, StoreError> {
    let count: u16 = entries
        .len()
        .try_into()
        .map_err(|_| StoreError::TooManyEntries {
            category,
            count: entries.len(),
        })?;
    let mut out = Vec::with_capacity(HEADER_LEN + entries.len() * 24);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    for (path, value) in entries {
        put_field(&mut out, category, path.as_bytes())?;
        put_field(&mut out, category, &payload(value))?;
    }
    Ok(out)
}

fn put_field(out: &mut Vec<u8>, category: Category, bytes: &[u8]) -> Result<(), StoreError> {
    let len: u16 = bytes
        .len()
        .try_into()
        .map_err(|_| StoreError::FieldTooLong {
            category,
            len: bytes.len(),
        })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Parse one category file. Returns `None` when the header is unusable.
/// A truncated tail stops parsing and keeps the entries read so far;
/// entries whose payload does not decode are skipped.
pub(crate) fn decode<T>(
    bytes: &[u8],
    payload: impl Fn(&[u8]) -> Option<T>,
) -> Option<BTreeMap<String, T>> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return None;
    }
    if read_u16(bytes, 4)? != FORMAT_VERSION {
        return None;
    }
    let count = read_u16(bytes, 6)?;
    let mut entries = BTreeMap::new();
    let mut pos = HEADER_LEN;
    for _ in 0..count {
        let Some((path, next)) = take_field(bytes, pos) else {
            break;
        };
        let Some((data, next)) = take_field(bytes, next) else {
            break;
        };
        pos = next;
        let Ok(path) = std::str::from_utf8(path) else {
            continue;
        };
        if let Some(value) = payload(data) {
            entries.insert(path.to_owned(), value);
        }
    }
    Some(entries)
}

fn read_u16(bytes: &[u8], pos: usize) -> Option<u16> {
    let raw = bytes.get(pos..pos + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], pos: usize) -> Option<u32> {
    let raw = bytes.get(pos..pos + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn take_field(bytes: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let len = usize::from(read_u16(bytes, pos)?);
    let start = pos + 2;
    let data = bytes.get(start..start + len)?;
    Some((data, start + len))
}

pub(crate) fn encode_permission(record: &PermissionRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(PERMISSION_LEN);
    out.extend_from_slice(&record.mode.to_le_bytes());
    out.extend_from_slice(&record.uid.to_le_bytes());
    out.extend_from_slice(&record.gid.to_le_bytes());
    out.extend_from_slice(&record.mtime.to_le_bytes());
    out
}

pub(crate) fn decode_permission(data: &[u8]) -> Option<PermissionRecord> {
    if data.len() < PERMISSION_LEN {
        return None;
    }
    Some(PermissionRecord {
        mode: read_u16(data, 0)?,
        uid: read_u32(data, 2)?,
        gid: read_u32(data, 6)?,
        mtime: read_u32(data, 10)?,
    })
}

#[allow(clippy::ptr_arg)]
pub(crate) fn encode_symlink(target: &String) -> Vec<u8> {
    target.as_bytes().to_vec()
}

pub(crate) fn decode_symlink(data: &[u8]) -> Option<String> {
    std::str::from_utf8(data).ok().map(str::to_owned)
}

pub(crate) fn encode_kind(kind: &NodeKind) -> Vec<u8> {
    vec![*kind as u8]
}

pub(crate) fn decode_kind(data: &[u8]) -> Option<NodeKind> {
    data.first().copied().map(NodeKind::from_byte)
}

pub(crate) fn encode_device(record: &DeviceRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(DEVICE_LEN);
    out.push(match record.kind {
        DeviceKind::Char => 0,
        DeviceKind::Block => 1,
    });
    out.extend_from_slice(&record.major.to_le_bytes());
    out.extend_from_slice(&record.minor.to_le_bytes());
    out
}

pub(crate) fn decode_device(data: &[u8]) -> Option<DeviceRecord> {
    if data.len() < DEVICE_LEN {
        return None;
    }
    Some(DeviceRecord {
        kind: if data[0] == 0 {
            DeviceKind::Char
        } else {
            DeviceKind::Block
        },
        major: read_u16(data, 1)?,
        minor: read_u16(data, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, PermissionRecord> {
        let mut map = BTreeMap::new();
        map.insert("a.txt".to_owned(), PermissionRecord::new(0o644, 1000, 100, 7));
        map.insert("dir/b".to_owned(), PermissionRecord::new(0o4755, 0, 0, 9));
        map
    }

    #[test]
    fn permission_file_layout() {
        let mut map = BTreeMap::new();
        map.insert("x".to_owned(), PermissionRecord::new(0o600, 1, 2, 3));
        let bytes = encode(Category::Permissions, &map, encode_permission).expect("encode");
        let mut expected = b"V87M".to_vec();
        expected.extend_from_slice(&[1, 0, 1, 0]);
        expected.extend_from_slice(&[1, 0, b'x', 14, 0]);
        expected.extend_from_slice(&0o600u16.to_le_bytes());
        expected.extend_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn bad_magic_or_version_is_rejected() {
        let mut bytes = encode(Category::Permissions, &sample(), encode_permission).expect("encode");
        bytes[4] = 2;
        assert!(decode(&bytes, decode_permission).is_none());
        bytes[4] = 1;
        bytes[0] = b'X';
        assert!(decode(&bytes, decode_permission).is_none());
    }

    #[test]
    fn truncated_tail_keeps_leading_entries() {
        let bytes = encode(Category::Permissions, &sample(), encode_permission).expect("encode");
        let cut = &bytes[..bytes.len() - 3];
        let map = decode(cut, decode_permission).expect("header intact");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("a.txt"));
    }

    #[test]
    fn short_payloads_are_skipped() {
        let mut bytes = b"V87M".to_vec();
        bytes.extend_from_slice(&[1, 0, 2, 0]);
        bytes.extend_from_slice(&[1, 0, b'a', 2, 0, 0xff, 0xff]);
        bytes.extend_from_slice(&[1, 0, b'b', 5, 0, 1, 8, 0, 3, 0]);
        let map = decode(&bytes, decode_device).expect("header intact");
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get("b"),
            Some(&DeviceRecord {
                kind: DeviceKind::Block,
                major: 8,
                minor: 3
            })
        );
    }

    #[test]
    fn unknown_type_tag_reads_as_file() {
        assert_eq!(decode_kind(&[42]), Some(NodeKind::File));
        assert_eq!(decode_kind(&[]), None);
    }
}
