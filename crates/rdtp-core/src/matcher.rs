//! The receive matcher: a concurrency-safe holding buffer for decoded
//! incoming packets.
//!
//! # Why a matcher? (for beginners)
//!
//! The client has two concurrent parties interested in incoming packets:
//!
//! - The **background listener** decodes every datagram the remote sends,
//!   whenever it happens to arrive.
//! - The **request path** (connect / send / disconnect) waits for one
//!   specific response – "the Setup for my connect", "the Ack for sequence
//!   number 42" – and the remote may answer out of order, late, or never.
//!
//! The matcher decouples the two: the listener inserts everything it
//! decodes, and the request path polls with a `(kind, acknum)` key until its
//! response shows up or its retry budget runs out.  A successful lookup
//! *consumes* the packet, so two concurrent waiters for the same key can
//! never observe the same response twice.
//!
//! # Locking discipline
//!
//! One mutex guards the buffer.  Every scan, insert, and removal holds it
//! for the full duration of the operation, and nothing here blocks or
//! sleeps while holding it – both methods are short and synchronous.  The
//! waiting happens in the caller, between polls, with the lock released.

use std::sync::Mutex;

use tracing::trace;

use crate::protocol::packet::{classify_response, Packet, PacketKind};

/// A lock-guarded buffer of decoded incoming packets with consuming lookup.
#[derive(Debug, Default)]
pub struct ReceiveMatcher {
    buffer: Mutex<Vec<Packet>>,
}

impl ReceiveMatcher {
    /// Creates an empty matcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decoded packet to the buffer (producer side).
    pub fn insert(&self, packet: Packet) {
        let mut buffer = self.buffer.lock().expect("matcher lock poisoned");
        trace!(
            seqnum = packet.seqnum,
            acknum = packet.acknum,
            buffered = buffer.len() + 1,
            "buffering incoming packet"
        );
        buffer.push(packet);
    }

    /// Removes and returns the first buffered packet classifying as `kind`
    /// with a matching `acknum`, or `None` if no such packet is buffered.
    ///
    /// The kind of each buffered packet is computed from its flags by
    /// [`classify_response`] during the scan – it is never stored, so it can
    /// never disagree with the flags.  First match wins; no ordering beyond
    /// insertion order is guaranteed.
    pub fn take(&self, kind: PacketKind, acknum: u32) -> Option<Packet> {
        let mut buffer = self.buffer.lock().expect("matcher lock poisoned");
        let index = buffer
            .iter()
            .position(|p| p.acknum == acknum && classify_response(p) == kind)?;
        let packet = buffer.remove(index);
        trace!(?kind, acknum, buffered = buffer.len(), "matched incoming packet");
        Some(packet)
    }

    /// Number of packets currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.lock().expect("matcher lock poisoned").len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
