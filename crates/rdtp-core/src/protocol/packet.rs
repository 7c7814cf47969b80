//! The RDTP packet type and its local classification.
//!
//! A [`Packet`] is one framed protocol message: a fixed 32-byte header plus a
//! variable payload of at most [`MAX_PAYLOAD`] bytes.  The header layout is
//! defined in [`crate::protocol::codec`]; this module defines the in-memory
//! representation and the flag semantics.
//!
//! # Packet kind vs. wire flags
//!
//! The wire format carries no explicit type tag.  What a packet *means* is
//! encoded entirely in its flag combination: a bare `connect` flag is a
//! connection request, `connect + revive + ack` together mean "disconnect",
//! and so on.  [`PacketKind`] is therefore a purely local classification:
//! it is never transmitted, never stored on the [`Packet`] struct, and is
//! computed on demand from the flags by [`classify_response`] so it can
//! never fall out of sync with them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_SIZE: usize = 32;

/// Maximum payload bytes per packet.
///
/// 1440 = 1472 (typical safe UDP datagram payload ceiling) − 32 (header).
pub const MAX_PAYLOAD: usize = 1440;

/// Largest datagram the client ever sends or expects to receive.
pub const MAX_DATAGRAM: usize = HEADER_SIZE + MAX_PAYLOAD;

/// Mask selecting the 27-bit `session_ttl` field inside the packed
/// ttl-and-flags word (header bytes 16–19).
pub const SESSION_TTL_MASK: u32 = 0x07FF_FFFF;

/// Bit positions of the five control flags inside the packed ttl-and-flags
/// word.  Bits 0–26 hold `session_ttl`; bits 27–31 are reserved for flags.
pub mod flag_bits {
    /// Connection request (bit 27).
    pub const CONNECT: u32 = 1 << 27;
    /// Session revival (bit 28).
    pub const REVIVE: u32 = 1 << 28;
    /// Acknowledgment field is meaningful (bit 29).
    pub const ACK: u32 = 1 << 29;
    /// Remote's accept (`1`) / reject (`0`) decision (bit 30).
    pub const ACCEPT_REJECT: u32 = 1 << 30;
    /// More fragments of the same logical message follow (bit 31).
    pub const MORE_FRAGMENTS: u32 = 1 << 31;
}

/// One RDTP datagram: 32-byte header fields plus payload.
///
/// Fields are in host representation; [`crate::protocol::codec`] converts to
/// and from the little-endian wire layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Session identifier; [`Uuid::nil`] before a session exists.
    pub session_id: Uuid,
    /// Session time-to-live in milliseconds, 27-bit range
    /// (`0..=`[`SESSION_TTL_MASK`]).  Masked on encode.
    pub session_ttl: u32,
    /// Connection request flag.
    pub connect: bool,
    /// Session revival flag.
    pub revive: bool,
    /// Acknowledgment flag.
    pub ack: bool,
    /// Accept (`true`) / reject (`false`) decision from the remote.
    pub accept_reject: bool,
    /// Set on every fragment of a logical message except the last.
    pub more_fragments: bool,
    /// Packet sequence number.
    pub seqnum: u32,
    /// Acknowledgment sequence number.
    pub acknum: u32,
    /// Advertised receiver credit.
    pub window: u16,
    /// Groups fragments of one logical message.
    pub fragment_id: u8,
    /// 0-based position of a fragment within its group.
    pub fragment_offset: u8,
    /// Application bytes, `0..=`[`MAX_PAYLOAD`] per packet.
    pub payload: Vec<u8>,
}

/// Local classification of a packet's role in the protocol.
///
/// Never transmitted.  Outgoing packets get their kind from the builder
/// function that constructed them; incoming packets are classified on demand
/// by [`classify_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Connection request (client → server).
    Connect,
    /// The server's response to a connect, carrying session id/ttl/seq and
    /// the accept/reject decision.
    Setup,
    /// A payload-carrying packet.
    Data,
    /// An acknowledgment.
    Ack,
    /// Session teardown (`connect + revive + ack` flag combination).
    Disconnect,
    /// No classification.
    Raw,
}

/// Classifies an incoming packet from its flags.
///
/// The heuristic is deliberately coarse: a response without the `ack` flag
/// can only be a [`PacketKind::Setup`]; everything else is treated as an
/// [`PacketKind::Ack`].  Callers that need to tell a disconnect apart from a
/// plain acknowledgment must inspect the flag combination directly.
pub fn classify_response(packet: &Packet) -> PacketKind {
    if !packet.ack {
        PacketKind::Setup
    } else {
        PacketKind::Ack
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
