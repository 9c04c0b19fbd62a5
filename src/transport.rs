// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Frame 9P messages over byte streams and serve a Unix socket.
// Author: Lukas Bower

//! Stream transport for the share server.
//!
//! Each frame is read by its `size[4]` prefix and handed to
//! [`ShareDoor::serve`]; the reply is written back before the next frame is
//! read. Connections are served one at a time, each with a fresh fid table.

use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use share_door::ShareDoor;

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const HEADER_LEN: u32 = 7;

/// Read one complete frame. `Ok(None)` means the peer closed the stream
/// cleanly between frames.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    let size = u32::from_le_bytes(prefix);
    if !(HEADER_LEN..=MAX_FRAME_LEN).contains(&size) {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("frame size {size} out of range"),
        ));
    }
    let mut frame = vec![0u8; size as usize];
    frame[..4].copy_from_slice(&prefix);
    reader.read_exact(&mut frame[4..])?;
    Ok(Some(frame))
}

/// Serve frames from `stream` until the peer hangs up. Returns the number of
/// frames handled.
pub fn serve_stream<S: Read + Write>(door: &ShareDoor, stream: &mut S) -> io::Result<usize> {
    let mut handled = 0;
    while let Some(frame) = read_frame(stream)? {
        let mut written = Ok(());
        door.serve(&frame, |reply| {
            written = stream.write_all(reply).and_then(|()| stream.flush());
        });
        written?;
        handled += 1;
    }
    Ok(handled)
}

/// Bind `socket` and serve connections sequentially until accepting fails.
pub fn serve_socket(door: &ShareDoor, socket: &Path) -> Result<()> {
    if fs::symlink_metadata(socket).is_ok() {
        fs::remove_file(socket)
            .with_context(|| format!("removing stale socket {}", socket.display()))?;
    }
    let listener = UnixListener::bind(socket)
        .with_context(|| format!("binding {}", socket.display()))?;
    info!("serving {} on {}", door.root().display(), socket.display());
    for connection in listener.incoming() {
        let mut stream = connection.context("accepting connection")?;
        door.reset_session();
        match serve_stream(door, &mut stream) {
            Ok(frames) => debug!("connection closed after {frames} frames"),
            Err(err) => warn!("connection aborted: {err}"),
        }
        door.reset_session();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn clean_eof_between_frames() {
        let mut empty = Cursor::new(Vec::new());
        assert!(read_frame(&mut empty).expect("read").is_none());
    }

    #[test]
    fn eof_inside_a_frame_is_an_error() {
        let mut partial = Cursor::new(vec![11, 0]);
        assert_eq!(
            read_frame(&mut partial).expect_err("short prefix").kind(),
            ErrorKind::UnexpectedEof
        );
        let mut short_body = Cursor::new(vec![11, 0, 0, 0, 7, 1]);
        assert_eq!(
            read_frame(&mut short_body).expect_err("short body").kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn sizes_below_the_header_are_rejected() {
        let mut bogus = Cursor::new(vec![3, 0, 0, 0]);
        assert_eq!(
            read_frame(&mut bogus).expect_err("tiny frame").kind(),
            ErrorKind::InvalidData
        );
    }

    #[test]
    fn frames_are_split_by_prefix() {
        let mut stream = Cursor::new(vec![7, 0, 0, 0, 120, 1, 0, 8, 0, 0, 0, 9, 2, 0, 1]);
        let first = read_frame(&mut stream).expect("read").expect("frame");
        assert_eq!(first, vec![7, 0, 0, 0, 120, 1, 0]);
        let second = read_frame(&mut stream).expect("read").expect("frame");
        assert_eq!(second.len(), 8);
        assert!(read_frame(&mut stream).expect("read").is_none());
    }
}
