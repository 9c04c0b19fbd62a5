// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode 9P2000.L frames.
// Author: Lukas Bower

//! Encode/decode helpers for 9P2000.L messages.

use crate::fields::{WireReader, WireWriter};
use crate::types::*;

/// 9P2000.L message opcodes handled by this codec.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MessageType {
    Rlerror = 7,
    Tlopen = 12,
    Rlopen = 13,
    Tlcreate = 14,
    Rlcreate = 15,
    Tsymlink = 16,
    Rsymlink = 17,
    Tmknod = 18,
    Rmknod = 19,
    Treadlink = 22,
    Rreadlink = 23,
    Tgetattr = 24,
    Rgetattr = 25,
    Tsetattr = 26,
    Rsetattr = 27,
    Treaddir = 40,
    Rreaddir = 41,
    Tfsync = 50,
    Rfsync = 51,
    Tmkdir = 72,
    Rmkdir = 73,
    Trenameat = 74,
    Rrenameat = 75,
    Tunlinkat = 76,
    Runlinkat = 77,
    Tversion = 100,
    Rversion = 101,
    Tattach = 104,
    Rattach = 105,
    Tflush = 108,
    Rflush = 109,
    Twalk = 110,
    Rwalk = 111,
    Topen = 112,
    Ropen = 113,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            7 => Rlerror,
            12 => Tlopen,
            13 => Rlopen,
            14 => Tlcreate,
            15 => Rlcreate,
            16 => Tsymlink,
            17 => Rsymlink,
            18 => Tmknod,
            19 => Rmknod,
            22 => Treadlink,
            23 => Rreadlink,
            24 => Tgetattr,
            25 => Rgetattr,
            26 => Tsetattr,
            27 => Rsetattr,
            40 => Treaddir,
            41 => Rreaddir,
            50 => Tfsync,
            51 => Rfsync,
            72 => Tmkdir,
            73 => Rmkdir,
            74 => Trenameat,
            75 => Rrenameat,
            76 => Tunlinkat,
            77 => Runlinkat,
            100 => Tversion,
            101 => Rversion,
            104 => Tattach,
            105 => Rattach,
            108 => Tflush,
            109 => Rflush,
            110 => Twalk,
            111 => Rwalk,
            112 => Topen,
            113 => Ropen,
            116 => Tread,
            117 => Rread,
            118 => Twrite,
            119 => Rwrite,
            120 => Tclunk,
            121 => Rclunk,
            122 => Tremove,
            123 => Rremove,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

/// Stateless 9P2000.L codec shared by the server and the in-process client.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codec;

impl Codec {
    /// Encode a request into its wire representation.
    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        use MessageType as M;
        let tag = request.tag;
        match &request.body {
            RequestBody::Version { msize, version } => frame(M::Tversion, tag, |w| {
                w.put_u32(*msize);
                w.put_str(version)
            }),
            RequestBody::Attach {
                fid,
                afid,
                uname,
                aname,
                n_uname,
            } => frame(M::Tattach, tag, |w| {
                w.put_u32(*fid);
                w.put_u32(*afid);
                w.put_str(uname)?;
                w.put_str(aname)?;
                w.put_u32(*n_uname);
                Ok(())
            }),
            RequestBody::Flush { oldtag } => frame(M::Tflush, tag, |w| {
                w.put_u16(*oldtag);
                Ok(())
            }),
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => frame(M::Twalk, tag, |w| {
                if wnames.len() > MAX_WALK_ELEMENTS {
                    return Err(CodecError::InvalidPath);
                }
                w.put_u32(*fid);
                w.put_u32(*newfid);
                w.put_u16(wnames.len() as u16);
                for name in wnames {
                    w.put_str(name)?;
                }
                Ok(())
            }),
            RequestBody::Lopen { fid, flags } => frame(M::Tlopen, tag, |w| {
                w.put_u32(*fid);
                w.put_u32(*flags);
                Ok(())
            }),
            RequestBody::Open { fid, mode } => frame(M::Topen, tag, |w| {
                w.put_u32(*fid);
                w.put_u8(*mode);
                Ok(())
            }),
            RequestBody::Lcreate {
                fid,
                name,
                flags,
                mode,
                gid,
            } => frame(M::Tlcreate, tag, |w| {
                w.put_u32(*fid);
                w.put_str(name)?;
                w.put_u32(*flags);
                w.put_u32(*mode);
                w.put_u32(*gid);
                Ok(())
            }),
            RequestBody::Symlink {
                fid,
                name,
                target,
                gid,
            } => frame(M::Tsymlink, tag, |w| {
                w.put_u32(*fid);
                w.put_str(name)?;
                w.put_str(target)?;
                w.put_u32(*gid);
                Ok(())
            }),
            RequestBody::Mknod {
                dfid,
                name,
                mode,
                major,
                minor,
                gid,
            } => frame(M::Tmknod, tag, |w| {
                w.put_u32(*dfid);
                w.put_str(name)?;
                w.put_u32(*mode);
                w.put_u32(*major);
                w.put_u32(*minor);
                w.put_u32(*gid);
                Ok(())
            }),
            RequestBody::Readlink { fid } => frame(M::Treadlink, tag, |w| {
                w.put_u32(*fid);
                Ok(())
            }),
            RequestBody::Getattr { fid, request_mask } => frame(M::Tgetattr, tag, |w| {
                w.put_u32(*fid);
                w.put_u64(*request_mask);
                Ok(())
            }),
            RequestBody::Setattr { fid, attr } => frame(M::Tsetattr, tag, |w| {
                w.put_u32(*fid);
                w.put_u32(attr.valid);
                w.put_u32(attr.mode);
                w.put_u32(attr.uid);
                w.put_u32(attr.gid);
                w.put_u64(attr.size);
                w.put_u64(attr.atime_sec);
                w.put_u64(attr.atime_nsec);
                w.put_u64(attr.mtime_sec);
                w.put_u64(attr.mtime_nsec);
                Ok(())
            }),
            RequestBody::Readdir { fid, offset, count } => frame(M::Treaddir, tag, |w| {
                w.put_u32(*fid);
                w.put_u64(*offset);
                w.put_u32(*count);
                Ok(())
            }),
            RequestBody::Fsync { fid, datasync } => frame(M::Tfsync, tag, |w| {
                w.put_u32(*fid);
                w.put_u32(*datasync);
                Ok(())
            }),
            RequestBody::Mkdir {
                dfid,
                name,
                mode,
                gid,
            } => frame(M::Tmkdir, tag, |w| {
                w.put_u32(*dfid);
                w.put_str(name)?;
                w.put_u32(*mode);
                w.put_u32(*gid);
                Ok(())
            }),
            RequestBody::Renameat {
                olddirfid,
                oldname,
                newdirfid,
                newname,
            } => frame(M::Trenameat, tag, |w| {
                w.put_u32(*olddirfid);
                w.put_str(oldname)?;
                w.put_u32(*newdirfid);
                w.put_str(newname)
            }),
            RequestBody::Unlinkat {
                dirfid,
                name,
                flags,
            } => frame(M::Tunlinkat, tag, |w| {
                w.put_u32(*dirfid);
                w.put_str(name)?;
                w.put_u32(*flags);
                Ok(())
            }),
            RequestBody::Read { fid, offset, count } => frame(M::Tread, tag, |w| {
                w.put_u32(*fid);
                w.put_u64(*offset);
                w.put_u32(*count);
                Ok(())
            }),
            RequestBody::Write { fid, offset, data } => frame(M::Twrite, tag, |w| {
                w.put_u32(*fid);
                w.put_u64(*offset);
                w.put_blob(data)
            }),
            RequestBody::Clunk { fid } => frame(M::Tclunk, tag, |w| {
                w.put_u32(*fid);
                Ok(())
            }),
            RequestBody::Remove { fid } => frame(M::Tremove, tag, |w| {
                w.put_u32(*fid);
                Ok(())
            }),
            RequestBody::Unknown { op } => frame_raw(*op, tag, |_| Ok(())),
        }
    }

    /// Encode a response into its wire representation.
    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        use MessageType as M;
        let tag = response.tag;
        match &response.body {
            ResponseBody::Version { msize, version } => frame(M::Rversion, tag, |w| {
                w.put_u32(*msize);
                w.put_str(version)
            }),
            ResponseBody::Attach { qid } => frame(M::Rattach, tag, |w| {
                w.put_qid(qid);
                Ok(())
            }),
            ResponseBody::Flush => frame(M::Rflush, tag, |_| Ok(())),
            ResponseBody::Walk { qids } => frame(M::Rwalk, tag, |w| {
                let count: u16 = qids.len().try_into().map_err(|_| CodecError::InvalidPath)?;
                w.put_u16(count);
                for qid in qids {
                    w.put_qid(qid);
                }
                Ok(())
            }),
            ResponseBody::Lopen { qid, iounit } => frame(M::Rlopen, tag, |w| {
                w.put_qid(qid);
                w.put_u32(*iounit);
                Ok(())
            }),
            ResponseBody::Open { qid, iounit } => frame(M::Ropen, tag, |w| {
                w.put_qid(qid);
                w.put_u32(*iounit);
                Ok(())
            }),
            ResponseBody::Lcreate { qid, iounit } => frame(M::Rlcreate, tag, |w| {
                w.put_qid(qid);
                w.put_u32(*iounit);
                Ok(())
            }),
            ResponseBody::Symlink { qid } => frame(M::Rsymlink, tag, |w| {
                w.put_qid(qid);
                Ok(())
            }),
            ResponseBody::Mknod { qid } => frame(M::Rmknod, tag, |w| {
                w.put_qid(qid);
                Ok(())
            }),
            ResponseBody::Readlink { target } => frame(M::Rreadlink, tag, |w| w.put_str(target)),
            ResponseBody::Getattr(attr) => frame(M::Rgetattr, tag, |w| {
                put_attr(w, attr);
                Ok(())
            }),
            ResponseBody::Setattr => frame(M::Rsetattr, tag, |_| Ok(())),
            ResponseBody::Readdir { entries } => frame(M::Rreaddir, tag, |w| {
                let total: usize = entries.iter().map(DirEntry::encoded_len).sum();
                let count: u32 = total.try_into().map_err(|_| CodecError::TooLong(total))?;
                w.put_u32(count);
                for entry in entries {
                    w.put_qid(&entry.qid);
                    w.put_u64(entry.offset);
                    w.put_u8(entry.kind);
                    w.put_str(&entry.name)?;
                }
                Ok(())
            }),
            ResponseBody::Fsync => frame(M::Rfsync, tag, |_| Ok(())),
            ResponseBody::Mkdir { qid } => frame(M::Rmkdir, tag, |w| {
                w.put_qid(qid);
                Ok(())
            }),
            ResponseBody::Renameat => frame(M::Rrenameat, tag, |_| Ok(())),
            ResponseBody::Unlinkat => frame(M::Runlinkat, tag, |_| Ok(())),
            ResponseBody::Read { data } => frame(M::Rread, tag, |w| w.put_blob(data)),
            ResponseBody::Write { count } => frame(M::Rwrite, tag, |w| {
                w.put_u32(*count);
                Ok(())
            }),
            ResponseBody::Clunk => frame(M::Rclunk, tag, |_| Ok(())),
            ResponseBody::Remove => frame(M::Rremove, tag, |_| Ok(())),
            ResponseBody::Error { ecode } => frame(M::Rlerror, tag, |w| {
                w.put_u32(*ecode);
                Ok(())
            }),
        }
    }

    /// Decode only the frame header, validating the declared size.
    pub fn decode_header(&self, bytes: &[u8]) -> Result<FrameHeader, CodecError> {
        let (header, _) = split_frame(bytes)?;
        Ok(header)
    }

    /// Decode a request. Unknown message types decode to
    /// [`RequestBody::Unknown`] so the caller can still answer the tag.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        use MessageType as M;
        let (header, payload) = split_frame(bytes)?;
        let mut r = WireReader::new(payload);
        let ty = match MessageType::try_from(header.ty) {
            Ok(ty) => ty,
            Err(_) => {
                return Ok(Request {
                    tag: header.tag,
                    body: RequestBody::Unknown { op: header.ty },
                })
            }
        };
        let body = match ty {
            M::Tversion => RequestBody::Version {
                msize: r.read_u32()?,
                version: r.read_str()?,
            },
            M::Tattach => RequestBody::Attach {
                fid: r.read_u32()?,
                afid: r.read_u32()?,
                uname: r.read_str()?,
                aname: r.read_str()?,
                // Older clients omit n_uname.
                n_uname: if r.remaining() >= 4 { r.read_u32()? } else { NOFID },
            },
            M::Tflush => RequestBody::Flush {
                oldtag: r.read_u16()?,
            },
            M::Twalk => {
                let fid = r.read_u32()?;
                let newfid = r.read_u32()?;
                let nwname = r.read_u16()? as usize;
                if nwname > MAX_WALK_ELEMENTS {
                    return Err(CodecError::InvalidPath);
                }
                let mut wnames = Vec::with_capacity(nwname);
                for _ in 0..nwname {
                    wnames.push(r.read_str()?);
                }
                RequestBody::Walk {
                    fid,
                    newfid,
                    wnames,
                }
            }
            M::Tlopen => RequestBody::Lopen {
                fid: r.read_u32()?,
                flags: r.read_u32()?,
            },
            M::Topen => RequestBody::Open {
                fid: r.read_u32()?,
                mode: r.read_u8()?,
            },
            M::Tlcreate => RequestBody::Lcreate {
                fid: r.read_u32()?,
                name: r.read_str()?,
                flags: r.read_u32()?,
                mode: r.read_u32()?,
                gid: r.read_u32()?,
            },
            M::Tsymlink => RequestBody::Symlink {
                fid: r.read_u32()?,
                name: r.read_str()?,
                target: r.read_str()?,
                gid: r.read_u32()?,
            },
            M::Tmknod => RequestBody::Mknod {
                dfid: r.read_u32()?,
                name: r.read_str()?,
                mode: r.read_u32()?,
                major: r.read_u32()?,
                minor: r.read_u32()?,
                gid: r.read_u32()?,
            },
            M::Treadlink => RequestBody::Readlink { fid: r.read_u32()? },
            M::Tgetattr => RequestBody::Getattr {
                fid: r.read_u32()?,
                request_mask: r.read_u64()?,
            },
            M::Tsetattr => RequestBody::Setattr {
                fid: r.read_u32()?,
                attr: SetAttr {
                    valid: r.read_u32()?,
                    mode: r.read_u32()?,
                    uid: r.read_u32()?,
                    gid: r.read_u32()?,
                    size: r.read_u64()?,
                    atime_sec: r.read_u64()?,
                    atime_nsec: r.read_u64()?,
                    mtime_sec: r.read_u64()?,
                    mtime_nsec: r.read_u64()?,
                },
            },
            M::Treaddir => RequestBody::Readdir {
                fid: r.read_u32()?,
                offset: r.read_u64()?,
                count: r.read_u32()?,
            },
            M::Tfsync => RequestBody::Fsync {
                fid: r.read_u32()?,
                // Pre-5.x kernels send only the fid.
                datasync: if r.remaining() >= 4 { r.read_u32()? } else { 0 },
            },
            M::Tmkdir => RequestBody::Mkdir {
                dfid: r.read_u32()?,
                name: r.read_str()?,
                mode: r.read_u32()?,
                gid: r.read_u32()?,
            },
            M::Trenameat => RequestBody::Renameat {
                olddirfid: r.read_u32()?,
                oldname: r.read_str()?,
                newdirfid: r.read_u32()?,
                newname: r.read_str()?,
            },
            M::Tunlinkat => RequestBody::Unlinkat {
                dirfid: r.read_u32()?,
                name: r.read_str()?,
                flags: r.read_u32()?,
            },
            M::Tread => RequestBody::Read {
                fid: r.read_u32()?,
                offset: r.read_u64()?,
                count: r.read_u32()?,
            },
            M::Twrite => RequestBody::Write {
                fid: r.read_u32()?,
                offset: r.read_u64()?,
                data: r.read_blob()?,
            },
            M::Tclunk => RequestBody::Clunk { fid: r.read_u32()? },
            M::Tremove => RequestBody::Remove { fid: r.read_u32()? },
            other => RequestBody::Unknown { op: other as u8 },
        };
        Ok(Request {
            tag: header.tag,
            body,
        })
    }

    /// Decode a response from the wire representation.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        use MessageType as M;
        let (header, payload) = split_frame(bytes)?;
        let mut r = WireReader::new(payload);
        let body = match MessageType::try_from(header.ty)? {
            M::Rversion => ResponseBody::Version {
                msize: r.read_u32()?,
                version: r.read_str()?,
            },
            M::Rattach => ResponseBody::Attach { qid: r.read_qid()? },
            M::Rflush => ResponseBody::Flush,
            M::Rwalk => {
                let count = r.read_u16()? as usize;
                let mut qids = Vec::with_capacity(count);
                for _ in 0..count {
                    qids.push(r.read_qid()?);
                }
                ResponseBody::Walk { qids }
            }
            M::Rlopen => ResponseBody::Lopen {
                qid: r.read_qid()?,
                iounit: r.read_u32()?,
            },
            M::Ropen => ResponseBody::Open {
                qid: r.read_qid()?,
                iounit: r.read_u32()?,
            },
            M::Rlcreate => ResponseBody::Lcreate {
                qid: r.read_qid()?,
                iounit: r.read_u32()?,
            },
            M::Rsymlink => ResponseBody::Symlink { qid: r.read_qid()? },
            M::Rmknod => ResponseBody::Mknod { qid: r.read_qid()? },
            M::Rreadlink => ResponseBody::Readlink {
                target: r.read_str()?,
            },
            M::Rgetattr => ResponseBody::Getattr(Box::new(read_attr(&mut r)?)),
            M::Rsetattr => ResponseBody::Setattr,
            M::Rreaddir => {
                let count = r.read_u32()? as usize;
                let mut data = WireReader::new(r.read_bytes(count)?);
                let mut entries = Vec::new();
                while data.remaining() > 0 {
                    entries.push(DirEntry {
                        qid: data.read_qid()?,
                        offset: data.read_u64()?,
                        kind: data.read_u8()?,
                        name: data.read_str()?,
                    });
                }
                ResponseBody::Readdir { entries }
            }
            M::Rfsync => ResponseBody::Fsync,
            M::Rmkdir => ResponseBody::Mkdir { qid: r.read_qid()? },
            M::Rrenameat => ResponseBody::Renameat,
            M::Runlinkat => ResponseBody::Unlinkat,
            M::Rread => ResponseBody::Read {
                data: r.read_blob()?,
            },
            M::Rwrite => ResponseBody::Write {
                count: r.read_u32()?,
            },
            M::Rclunk => ResponseBody::Clunk,
            M::Rremove => ResponseBody::Remove,
            M::Rlerror => ResponseBody::Error {
                ecode: r.read_u32()?,
            },
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        Ok(Response {
            tag: header.tag,
            body,
        })
    }
}

/// Encode a request using the default codec.
pub fn encode_request(req: &Request) -> Result<Vec<u8>, CodecError> {
    Codec.encode_request(req)
}

/// Encode a response using the default codec.
pub fn encode_response(res: &Response) -> Result<Vec<u8>, CodecError> {
    Codec.encode_response(res)
}

/// Decode a frame header using the default codec.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, CodecError> {
    Codec.decode_header(bytes)
}

/// Decode a request using the default codec.
pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    Codec.decode_request(bytes)
}

/// Decode a response using the default codec.
pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    Codec.decode_response(bytes)
}

fn frame(
    ty: MessageType,
    tag: u16,
    body: impl FnOnce(&mut WireWriter) -> Result<(), CodecError>,
) -> Result<Vec<u8>, CodecError> {
    frame_raw(ty as u8, tag, body)
}

fn frame_raw(
    ty: u8,
    tag: u16,
    body: impl FnOnce(&mut WireWriter) -> Result<(), CodecError>,
) -> Result<Vec<u8>, CodecError> {
    let mut writer = WireWriter::with_capacity(64);
    writer.put_u32(0);
    writer.put_u8(ty);
    writer.put_u16(tag);
    body(&mut writer)?;
    let size: u32 = writer
        .len()
        .try_into()
        .map_err(|_| CodecError::TooLong(writer.len()))?;
    writer.patch_u32(0, size);
    Ok(writer.into_inner())
}

/// Split a buffer into its header and the payload after the tag. The buffer
/// may be longer than the declared size; trailing bytes are ignored.
fn split_frame(bytes: &[u8]) -> Result<(FrameHeader, &[u8]), CodecError> {
    let mut reader = WireReader::new(bytes);
    let size = reader.read_u32()?;
    let ty = reader.read_u8()?;
    let tag = reader.read_u16()?;
    let declared = size as usize;
    if declared < HEADER_LEN || declared > bytes.len() {
        return Err(CodecError::LengthMismatch {
            declared: size,
            actual: bytes.len(),
        });
    }
    Ok((FrameHeader { size, ty, tag }, &bytes[HEADER_LEN..declared]))
}

fn put_attr(w: &mut WireWriter, attr: &Attr) {
    w.put_u64(attr.valid);
    w.put_qid(&attr.qid);
    w.put_u32(attr.mode);
    w.put_u32(attr.uid);
    w.put_u32(attr.gid);
    for value in [
        attr.nlink,
        attr.rdev,
        attr.size,
        attr.blksize,
        attr.blocks,
        attr.atime_sec,
        attr.atime_nsec,
        attr.mtime_sec,
        attr.mtime_nsec,
        attr.ctime_sec,
        attr.ctime_nsec,
        attr.btime_sec,
        attr.btime_nsec,
        attr.gen,
        attr.data_version,
    ] {
        w.put_u64(value);
    }
}

fn read_attr(r: &mut WireReader<'_>) -> Result<Attr, CodecError> {
    Ok(Attr {
        valid: r.read_u64()?,
        qid: r.read_qid()?,
        mode: r.read_u32()?,
        uid: r.read_u32()?,
        gid: r.read_u32()?,
        nlink: r.read_u64()?,
        rdev: r.read_u64()?,
        size: r.read_u64()?,
        blksize: r.read_u64()?,
        blocks: r.read_u64()?,
        atime_sec: r.read_u64()?,
        atime_nsec: r.read_u64()?,
        mtime_sec: r.read_u64()?,
        mtime_nsec: r.read_u64()?,
        ctime_sec: r.read_u64()?,
        ctime_nsec: r.read_u64()?,
        btime_sec: r.read_u64()?,
        btime_nsec: r.read_u64()?,
        gen: r.read_u64()?,
        data_version: r.read_u64()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_oversized_walk_during_encoding() {
        let codec = Codec;
        let req = Request {
            tag: 1,
            body: RequestBody::Walk {
                fid: 1,
                newfid: 2,
                wnames: vec!["a".to_owned(); MAX_WALK_ELEMENTS + 1],
            },
        };
        assert_eq!(codec.encode_request(&req), Err(CodecError::InvalidPath));
    }

    #[test]
    fn reject_oversized_walk_during_decoding() {
        let codec = Codec;
        let req = Request {
            tag: 1,
            body: RequestBody::Walk {
                fid: 1,
                newfid: 2,
                wnames: vec!["valid".to_owned()],
            },
        };
        let mut frame = codec.encode_request(&req).expect("encode frame");
        // nwname sits right after the two fids.
        frame[15] = 17;
        frame[16] = 0;
        assert_eq!(codec.decode_request(&frame), Err(CodecError::InvalidPath));
    }

    #[test]
    fn detect_truncated_frames() {
        let codec = Codec;
        let req = Request {
            tag: 1,
            body: RequestBody::Lopen { fid: 1, flags: 0 },
        };
        let mut frame = codec.encode_request(&req).expect("encode frame");
        frame.truncate(3);
        assert_eq!(codec.decode_request(&frame), Err(CodecError::Truncated));
    }

    #[test]
    fn declared_size_beyond_buffer_is_rejected() {
        let codec = Codec;
        let mut frame = codec
            .encode_request(&Request {
                tag: 9,
                body: RequestBody::Clunk { fid: 3 },
            })
            .expect("encode frame");
        frame[0] = 0xff;
        assert!(matches!(
            codec.decode_header(&frame),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn trailing_bytes_after_declared_size_are_ignored() {
        let codec = Codec;
        let mut frame = codec
            .encode_request(&Request {
                tag: 4,
                body: RequestBody::Clunk { fid: 11 },
            })
            .expect("encode frame");
        frame.extend_from_slice(&[0xaa; 16]);
        let req = codec.decode_request(&frame).expect("decode");
        assert_eq!(req.body, RequestBody::Clunk { fid: 11 });
    }

    #[test]
    fn unknown_type_keeps_tag() {
        let frame = [7, 0, 0, 0, 255, 0x34, 0x12];
        let req = Codec.decode_request(&frame).expect("decode");
        assert_eq!(req.tag, 0x1234);
        assert_eq!(req.body, RequestBody::Unknown { op: 255 });
    }

    #[test]
    fn lerror_layout() {
        let frame = Codec
            .encode_response(&Response {
                tag: 5,
                body: ResponseBody::Error { ecode: 22 },
            })
            .expect("encode");
        assert_eq!(frame, vec![11, 0, 0, 0, 7, 5, 0, 22, 0, 0, 0]);
    }

    #[test]
    fn getattr_reply_has_fixed_size() {
        let frame = Codec
            .encode_response(&Response {
                tag: 1,
                body: ResponseBody::Getattr(Box::default()),
            })
            .expect("encode");
        // header + valid + qid + mode/uid/gid + 15 u64 fields
        assert_eq!(frame.len(), HEADER_LEN + 8 + QID_LEN + 12 + 15 * 8);
    }
}
