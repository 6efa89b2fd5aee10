use std::os::fd::OwnedFd;

use bytes::{Buf, BufMut, Bytes};

/// Fixed header: type (4) + flags (2) + peer id (4) + sender pid (4) +
/// total length (2) = 16 bytes, little-endian.
pub const HEADER_SIZE: usize = 16;

/// Upper bound on one frame, header included.
pub const MAX_FRAME_SIZE: usize = 16384;

/// Header flag: one descriptor accompanies this message.
pub const FLAG_HAS_DESCRIPTOR: u16 = 0x0001;

/// The fixed per-message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Application-defined message type.
    pub msg_type: u32,
    pub flags: u16,
    /// Opaque routing tag for the layer above the transport.
    pub peer_id: u32,
    /// Process id of the composer.
    pub sender_pid: u32,
    /// Length of header plus payload.
    pub total_len: u16,
}

impl Header {
    pub fn has_descriptor(&self) -> bool {
        self.flags & FLAG_HAS_DESCRIPTOR != 0
    }
}

/// One complete received message. Payload and descriptor belong to the
/// caller; the transport retains nothing.
#[derive(Debug)]
pub struct Message {
    pub msg_type: u32,
    pub peer_id: u32,
    pub sender_pid: u32,
    pub payload: Bytes,
    pub descriptor: Option<OwnedFd>,
}

/// Serialize a header into `dst`. `dst` must have room for
/// [`HEADER_SIZE`] bytes.
pub fn encode_header(hdr: &Header, mut dst: impl BufMut) {
    dst.put_u32_le(hdr.msg_type);
    dst.put_u16_le(hdr.flags);
    dst.put_u32_le(hdr.peer_id);
    dst.put_u32_le(hdr.sender_pid);
    dst.put_u16_le(hdr.total_len);
}

/// Deserialize a header from the front of `src`.
///
/// `src` must hold at least [`HEADER_SIZE`] bytes; length validation is the
/// parser's job.
pub fn decode_header(mut src: &[u8]) -> Header {
    debug_assert!(src.len() >= HEADER_SIZE);
    Header {
        msg_type: src.get_u32_le(),
        flags: src.get_u16_le(),
        peer_id: src.get_u32_le(),
        sender_pid: src.get_u32_le(),
        total_len: src.get_u16_le(),
    }
}
