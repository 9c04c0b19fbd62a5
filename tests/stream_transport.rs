// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exercise the share server end to end over a Unix stream.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::thread;

use ninep_wire::{
    decode_response, encode_request, Request, RequestBody, Response, ResponseBody, NOFID,
    VERSION,
};
use vmshare::transport::{read_frame, serve_stream};
use vmshare::{ShareConfig, ShareDoor};

const ENOENT: u32 = 2;

fn call(stream: &mut UnixStream, tag: u16, body: RequestBody) -> Response {
    let frame = encode_request(&Request { tag, body }).expect("encode");
    stream.write_all(&frame).expect("send");
    let reply = read_frame(stream).expect("read").expect("reply frame");
    let response = decode_response(&reply).expect("decode");
    assert_eq!(response.tag, tag);
    response
}

#[test]
fn session_over_a_socket_pair() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ShareConfig::new(dir.path().join("export"), dir.path().join("meta"));
    let door = ShareDoor::new(config.server_options()).expect("server");
    fs::write(door.root().join("hello.txt"), b"hi there").expect("seed");

    let (mut client, mut server_end) = UnixStream::pair().expect("pair");
    let server_door = door.clone();
    let worker = thread::spawn(move || serve_stream(&server_door, &mut server_end));

    let version = call(
        &mut client,
        1,
        RequestBody::Version {
            msize: 65536,
            version: VERSION.to_owned(),
        },
    );
    assert_eq!(
        version.body,
        ResponseBody::Version {
            msize: 65536,
            version: VERSION.to_owned()
        }
    );
    let attach = call(
        &mut client,
        2,
        RequestBody::Attach {
            fid: 1,
            afid: NOFID,
            uname: "guest".to_owned(),
            aname: String::new(),
            n_uname: 1000,
        },
    );
    assert!(matches!(attach.body, ResponseBody::Attach { qid } if qid.ty().is_directory()));
    let walk = call(
        &mut client,
        3,
        RequestBody::Walk {
            fid: 1,
            newfid: 2,
            wnames: vec!["hello.txt".to_owned()],
        },
    );
    assert!(matches!(walk.body, ResponseBody::Walk { ref qids } if qids.len() == 1));
    call(&mut client, 4, RequestBody::Lopen { fid: 2, flags: 0 });
    let read = call(
        &mut client,
        5,
        RequestBody::Read {
            fid: 2,
            offset: 3,
            count: 100,
        },
    );
    assert_eq!(
        read.body,
        ResponseBody::Read {
            data: b"there".to_vec()
        }
    );
    let missing = call(
        &mut client,
        6,
        RequestBody::Walk {
            fid: 1,
            newfid: 3,
            wnames: vec!["nope".to_owned()],
        },
    );
    assert_eq!(missing.body, ResponseBody::Error { ecode: ENOENT });

    drop(client);
    let frames = worker.join().expect("join").expect("serve");
    assert_eq!(frames, 6);
}

#[test]
fn malformed_prefix_ends_the_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let door = ShareDoor::new(
        ShareConfig::new(dir.path().join("export"), dir.path().join("meta")).server_options(),
    )
    .expect("server");
    let (mut client, mut server_end) = UnixStream::pair().expect("pair");
    let server_door = door.clone();
    let worker = thread::spawn(move || serve_stream(&server_door, &mut server_end));
    client.write_all(&[2, 0, 0, 0]).expect("send");
    drop(client);
    assert!(worker.join().expect("join").is_err());
}
