//! Constructors for every outgoing packet shape the client sends.
//!
//! These functions are pure and stateless: all sequencing and credit
//! counters are caller-supplied and builder-incremented, so the builder
//! performs no I/O and holds no session state.  That keeps every protocol
//! rule here testable in isolation.
//!
//! The kind of each constructed packet is explicit in the constructor used:
//! [`connect_packet`] builds the `Connect` kind, [`disconnect_packet`] the
//! `Disconnect` kind, and the two fragmenters build `Data` sequences (see
//! [`crate::protocol::packet::PacketKind`]).

use uuid::Uuid;

use crate::protocol::packet::{Packet, MAX_PAYLOAD};

/// Builds a connection-request packet.
///
/// No session exists yet, so the session id is nil and the ttl is zero; the
/// caller only advertises its receive `window`.
pub fn connect_packet(window: u16) -> Packet {
    Packet {
        session_id: Uuid::nil(),
        session_ttl: 0,
        connect: true,
        seqnum: 0,
        acknum: 0,
        window,
        fragment_id: 0,
        fragment_offset: 0,
        payload: Vec::new(),
        ..Packet::default()
    }
}

/// Builds a session-teardown packet.
///
/// The protocol has no dedicated disconnect flag; the combination
/// `connect + revive + ack` is its encoding of "disconnect".
pub fn disconnect_packet(session_id: Uuid, session_ttl: u32, seqnum: u32, acknum: u32) -> Packet {
    Packet {
        session_id,
        session_ttl,
        connect: true,
        revive: true,
        ack: true,
        seqnum,
        acknum,
        window: 0,
        fragment_id: 0,
        fragment_offset: 0,
        payload: Vec::new(),
        ..Packet::default()
    }
}

/// Splits `data` into an ordered sequence of data packets.
///
/// The split boundary is exactly [`MAX_PAYLOAD`] bytes per fragment, so a
/// message of length `L` yields `ceil(max(L, 1) / 1440)` packets – at least
/// one, even for an empty message.  Within the sequence:
///
/// - every packet carries the `ack` flag,
/// - `more_fragments` is set on every packet except the last,
/// - `seqnum` increments by 1 per fragment (wrapping),
/// - `window` decrements by 1 per fragment (wrapping) – a monotonic credit
///   signal, not a flow-control algorithm,
/// - `fragment_offset` counts 0, 1, 2, … and all fragments share
///   `fragment_id`.
pub fn fragment_data(
    session_id: Uuid,
    session_ttl: u32,
    seqnum: u32,
    acknum: u32,
    window: u16,
    fragment_id: u8,
    data: &[u8],
) -> Vec<Packet> {
    // chunks() yields nothing for an empty slice, but an empty message must
    // still produce one empty-payload packet.
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![&[]]
    } else {
        data.chunks(MAX_PAYLOAD).collect()
    };
    let last = chunks.len() - 1;

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| Packet {
            session_id,
            session_ttl,
            ack: true,
            more_fragments: i != last,
            seqnum: seqnum.wrapping_add(i as u32),
            acknum,
            window: window.wrapping_sub(i as u16),
            fragment_id,
            fragment_offset: i as u8,
            payload: chunk.to_vec(),
            ..Packet::default()
        })
        .collect()
}

/// Same as [`fragment_data`], but the first fragment additionally carries
/// the `revive` flag, asking the remote to re-establish an inactive session.
pub fn fragment_revive(
    session_id: Uuid,
    session_ttl: u32,
    seqnum: u32,
    acknum: u32,
    window: u16,
    fragment_id: u8,
    data: &[u8],
) -> Vec<Packet> {
    let mut packets = fragment_data(session_id, session_ttl, seqnum, acknum, window, fragment_id, data);
    if let Some(first) = packets.first_mut() {
        first.revive = true;
    }
    packets
}

// ── Tests ─────────────────────────────────────────────────────────────────────
