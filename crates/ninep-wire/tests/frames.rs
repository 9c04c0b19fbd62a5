// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Frame-level tests for the 9P2000.L wire codec.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use ninep_wire::{
    decode_header, decode_request, decode_response, encode_request, encode_response, DirEntry,
    MessageType, Qid, QidType, Request, RequestBody, Response, ResponseBody, SetAttr, NOFID,
};

#[test]
fn tversion_matches_kernel_bytes() {
    let frame = encode_request(&Request {
        tag: 0xffff,
        body: RequestBody::Version {
            msize: 8192,
            version: "9P2000.L".to_owned(),
        },
    })
    .expect("encode Tversion");
    let mut expected = vec![21, 0, 0, 0, 100, 0xff, 0xff, 0x00, 0x20, 0, 0, 8, 0];
    expected.extend_from_slice(b"9P2000.L");
    assert_eq!(frame, expected);
}

#[test]
fn header_reports_type_and_tag() {
    let frame = encode_request(&Request {
        tag: 42,
        body: RequestBody::Readlink { fid: 9 },
    })
    .expect("encode Treadlink");
    let header = decode_header(&frame).expect("header");
    assert_eq!(header.size as usize, frame.len());
    assert_eq!(header.ty, MessageType::Treadlink as u8);
    assert_eq!(header.tag, 42);
}

#[test]
fn attach_without_n_uname_defaults_to_nofid() {
    // 9P2000.u-style attach that stops after aname.
    let mut frame = vec![0, 0, 0, 0, 104, 1, 0];
    frame.extend_from_slice(&1u32.to_le_bytes());
    frame.extend_from_slice(&NOFID.to_le_bytes());
    frame.extend_from_slice(&[4, 0]);
    frame.extend_from_slice(b"root");
    frame.extend_from_slice(&[0, 0]);
    let len = frame.len() as u32;
    frame[..4].copy_from_slice(&len.to_le_bytes());

    let request = decode_request(&frame).expect("decode Tattach");
    let RequestBody::Attach { fid, uname, n_uname, .. } = request.body else {
        panic!("expected Tattach");
    };
    assert_eq!(fid, 1);
    assert_eq!(uname, "root");
    assert_eq!(n_uname, NOFID);
}

#[test]
fn setattr_fields_survive_the_wire() {
    let attr = SetAttr {
        valid: SetAttr::MODE | SetAttr::MTIME | SetAttr::MTIME_SET,
        mode: 0o640,
        mtime_sec: 1_700_000_000,
        ..SetAttr::default()
    };
    let frame = encode_request(&Request {
        tag: 3,
        body: RequestBody::Setattr { fid: 5, attr },
    })
    .expect("encode Tsetattr");
    assert_eq!(frame.len(), 7 + 4 + 4 * 4 + 8 * 5);
    let request = decode_request(&frame).expect("decode Tsetattr");
    assert_eq!(request.body, RequestBody::Setattr { fid: 5, attr });
}

#[test]
fn readdir_count_covers_packed_entries() {
    let entries = vec![
        DirEntry {
            qid: Qid::new(QidType::DIRECTORY, 1, 10),
            offset: 1,
            kind: 4,
            name: "bin".to_owned(),
        },
        DirEntry {
            qid: Qid::new(QidType::FILE, 2, 11),
            offset: 2,
            kind: 8,
            name: "notes.txt".to_owned(),
        },
    ];
    let frame = encode_response(&Response {
        tag: 8,
        body: ResponseBody::Readdir {
            entries: entries.clone(),
        },
    })
    .expect("encode Rreaddir");
    let count = u32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]) as usize;
    assert_eq!(count, (13 + 8 + 1 + 2 + 3) + (13 + 8 + 1 + 2 + 9));
    assert_eq!(frame.len(), 7 + 4 + count);

    let response = decode_response(&frame).expect("decode Rreaddir");
    assert_eq!(response.body, ResponseBody::Readdir { entries });
}

#[test]
fn write_payload_is_length_prefixed() {
    let frame = encode_request(&Request {
        tag: 1,
        body: RequestBody::Write {
            fid: 2,
            offset: 0,
            data: b"hello".to_vec(),
        },
    })
    .expect("encode Twrite");
    assert_eq!(&frame[7 + 4 + 8..7 + 4 + 8 + 4], &5u32.to_le_bytes());
    assert_eq!(&frame[frame.len() - 5..], b"hello");
}

#[test]
fn fsync_without_datasync_field_is_accepted() {
    let mut frame = vec![11, 0, 0, 0, 50, 2, 0];
    frame.extend_from_slice(&7u32.to_le_bytes());
    let request = decode_request(&frame).expect("decode Tfsync");
    assert_eq!(request.body, RequestBody::Fsync { fid: 7, datasync: 0 });
}

#[test]
fn unknown_response_type_is_unsupported() {
    let frame = [7, 0, 0, 0, 9, 0, 0];
    assert!(decode_response(&frame).is_err());
}
