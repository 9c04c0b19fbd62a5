// Author: Lukas Bower
// Purpose: Provide 9P2000.L wire types and codec primitives for the host share server.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! 9P2000.L wire types and codec primitives used by the `share-door` server
//! and its in-process test client.
//!
//! Field encodings follow the protocol's letter codes: `b` (u8), `h` (u16),
//! `w` (u32), `d` (u64), `s` (u16-length string), `Q` (qid) and `B`
//! (u32-length byte blob). [`WireWriter`] and [`WireReader`] implement those
//! primitives; [`Codec`] builds whole frames on top of them.

mod codec;
mod fields;
mod types;

pub use codec::{
    decode_header, decode_request, decode_response, encode_request, encode_response, Codec,
    MessageType,
};
pub use fields::{WireReader, WireWriter};
pub use types::*;
