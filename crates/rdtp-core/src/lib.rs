//! # rdtp-core
//!
//! Shared library for the RDTP client containing the packet wire format,
//! the packet builder, and the receive matcher.
//!
//! This crate has zero dependencies on OS APIs or network sockets: it is
//! pure data transformation plus one lock-guarded buffer, which keeps every
//! protocol rule testable without touching a socket.
//!
//! # Architecture overview (for beginners)
//!
//! RDTP is a session-oriented reliable transport layered over UDP.  UDP
//! datagrams can be lost, duplicated, or reordered, so the protocol adds a
//! 32-byte header carrying a session id, sequence/acknowledgment numbers,
//! and control flags, and the client retries until the remote acknowledges.
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Packets are encoded
//!   into a compact binary format (32-byte header + payload) and decoded back
//!   into a typed Rust struct on receipt.  The `builder` submodule constructs
//!   well-formed packets for each protocol operation and fragments payloads
//!   larger than one datagram.
//!
//! - **`matcher`** – The rendezvous point between the background listener
//!   (which decodes everything the remote sends) and the request path (which
//!   waits for one specific response).  It is the only state shared between
//!   the two.

pub mod matcher;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `rdtp_core::Packet` instead of `rdtp_core::protocol::packet::Packet`.
pub use matcher::ReceiveMatcher;
pub use protocol::codec::{decode_packet, encode_packet, ProtocolError};
pub use protocol::packet::{classify_response, Packet, PacketKind, HEADER_SIZE, MAX_PAYLOAD};
