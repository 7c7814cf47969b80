//! Binary codec for encoding and decoding RDTP packets.
//!
//! Wire format (all multi-byte integers are **little-endian**):
//!
//! ```text
//! [session_id:16][ttl+flags:4][seqnum:4][acknum:4][window:2][fid:1][fo:1][payload:N]
//! ```
//!
//! Total header size: 32 bytes.  The ttl-and-flags word packs the 27-bit
//! `session_ttl` into bits 0–26 and the five control flags into bits 27–31
//! (connect, revive, ack, accept_reject, more_fragments, in that order).
//!
//! No I/O happens here – this is pure data transformation.  Decoding never
//! fails on payload length alone: any input of at least 32 bytes is a
//! well-formed packet whose payload is everything beyond the header.

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::packet::{flag_bits, Packet, HEADER_SIZE, SESSION_TTL_MASK};

// Byte offsets of each field within the serialized header.
const OFF_SESSION_ID: usize = 0;
const OFF_TTL_FLAGS: usize = 16;
const OFF_SEQNUM: usize = 20;
const OFF_ACKNUM: usize = 24;
const OFF_WINDOW: usize = 28;
const OFF_FRAGMENT_ID: usize = 30;
const OFF_FRAGMENT_OFFSET: usize = 31;

/// Errors that can occur while decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the fixed header.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
}

/// Encodes a [`Packet`] into a byte vector including the 32-byte header.
///
/// `session_ttl` is masked to its 27-bit range so it can never clobber the
/// flag bits.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + packet.payload.len());

    buf.extend_from_slice(packet.session_id.as_bytes());

    let mut ttl_flags = packet.session_ttl & SESSION_TTL_MASK;
    if packet.connect {
        ttl_flags |= flag_bits::CONNECT;
    }
    if packet.revive {
        ttl_flags |= flag_bits::REVIVE;
    }
    if packet.ack {
        ttl_flags |= flag_bits::ACK;
    }
    if packet.accept_reject {
        ttl_flags |= flag_bits::ACCEPT_REJECT;
    }
    if packet.more_fragments {
        ttl_flags |= flag_bits::MORE_FRAGMENTS;
    }
    buf.extend_from_slice(&ttl_flags.to_le_bytes());

    buf.extend_from_slice(&packet.seqnum.to_le_bytes());
    buf.extend_from_slice(&packet.acknum.to_le_bytes());
    buf.extend_from_slice(&packet.window.to_le_bytes());
    buf.push(packet.fragment_id);
    buf.push(packet.fragment_offset);

    buf.extend_from_slice(&packet.payload);
    buf
}

/// Decodes one [`Packet`] from `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if `bytes` is shorter than
/// the 32-byte header.  Any longer input is well-formed; the payload is
/// every byte beyond the header (empty for an exactly-32-byte datagram).
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let session_id = Uuid::from_bytes(
        bytes[OFF_SESSION_ID..OFF_SESSION_ID + 16]
            .try_into()
            .expect("slice is exactly 16 bytes"),
    );

    let ttl_flags = u32::from_le_bytes(
        bytes[OFF_TTL_FLAGS..OFF_TTL_FLAGS + 4]
            .try_into()
            .expect("slice is exactly 4 bytes"),
    );

    let seqnum = u32::from_le_bytes(
        bytes[OFF_SEQNUM..OFF_SEQNUM + 4]
            .try_into()
            .expect("slice is exactly 4 bytes"),
    );
    let acknum = u32::from_le_bytes(
        bytes[OFF_ACKNUM..OFF_ACKNUM + 4]
            .try_into()
            .expect("slice is exactly 4 bytes"),
    );
    let window = u16::from_le_bytes(
        bytes[OFF_WINDOW..OFF_WINDOW + 2]
            .try_into()
            .expect("slice is exactly 2 bytes"),
    );

    Ok(Packet {
        session_id,
        session_ttl: ttl_flags & SESSION_TTL_MASK,
        connect: ttl_flags & flag_bits::CONNECT != 0,
        revive: ttl_flags & flag_bits::REVIVE != 0,
        ack: ttl_flags & flag_bits::ACK != 0,
        accept_reject: ttl_flags & flag_bits::ACCEPT_REJECT != 0,
        more_fragments: ttl_flags & flag_bits::MORE_FRAGMENTS != 0,
        seqnum,
        acknum,
        window,
        fragment_id: bytes[OFF_FRAGMENT_ID],
        fragment_offset: bytes[OFF_FRAGMENT_OFFSET],
        payload: bytes[HEADER_SIZE..].to_vec(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
