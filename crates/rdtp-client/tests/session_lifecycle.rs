//! Integration tests for the session state machine.
//!
//! # Purpose
//!
//! These tests drive a complete [`ConnectionSession`] – control path,
//! background listener, and receive matcher – against a scripted in-memory
//! transport, the way the binary drives it against a UDP socket.  They
//! verify:
//!
//! - The happy path: a Connect answered by an accepting Setup yields a
//!   `Connected` session carrying the granted id, sequence number, and ttl.
//! - The error paths: rejection, silence (retry exhaustion), and expiry all
//!   surface as typed errors and leave the session in a non-connected state.
//! - The wire behaviour: what was actually transmitted (fragment trains,
//!   flag combinations, retransmissions) is asserted on the recorded
//!   datagrams, byte-decoded with the real codec.
//!
//! # The scripted transport
//!
//! [`ScriptedTransport`] replaces the UDP socket with two in-memory queues:
//! every sent datagram is recorded for later inspection, and `receive`
//! hands out pre-queued replies, then behaves like a quiet network (a short
//! sleep and an empty read, exactly what a receive timeout looks like to
//! the listener).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdtp_core::{decode_packet, encode_packet, Packet};
use uuid::Uuid;

use rdtp_client::session::{ConnectionSession, SessionError, SessionStatus, SessionTuning};
use rdtp_client::transport::{Transport, TransportError};

/// In-memory transport: records sends, replays queued replies.
#[derive(Default)]
struct ScriptedTransport {
    /// Every datagram the session transmitted, in order.
    sent: Mutex<Vec<Vec<u8>>>,
    /// Replies handed to the listener, one per `receive` call.
    replies: Mutex<VecDeque<Vec<u8>>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn queue_reply(&self, datagram: Vec<u8>) {
        self.replies.lock().unwrap().push_back(datagram);
    }

    /// Decodes everything the session sent so far.
    fn sent_packets(&self) -> Vec<Packet> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| decode_packet(bytes).expect("session must send well-formed datagrams"))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    async fn receive(&self, _max_size: usize) -> Vec<u8> {
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        // Quiet network: behave like a short receive timeout.
        tokio::time::sleep(Duration::from_millis(5)).await;
        Vec::new()
    }

    async fn set_receive_timeout(
        &self,
        _seconds: u64,
        _microseconds: u32,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Short intervals so a full retry budget stays test-friendly.
fn fast_tuning() -> SessionTuning {
    SessionTuning {
        initial_window: 64,
        send_retries: 3,
        poll_retries: 10,
        poll_interval: Duration::from_millis(10),
        data_attempts: 5,
    }
}

fn session_over(transport: Arc<ScriptedTransport>) -> ConnectionSession {
    ConnectionSession::new(transport, fast_tuning())
}

fn remote_session_id() -> Uuid {
    Uuid::from_bytes(*b"remote-session-1")
}

/// The remote's Setup response to a Connect.
fn setup_reply(ttl: u32, seqnum: u32, accepted: bool) -> Vec<u8> {
    encode_packet(&Packet {
        session_id: remote_session_id(),
        session_ttl: ttl,
        connect: true,
        accept_reject: accepted,
        seqnum,
        acknum: 0,
        ..Packet::default()
    })
}

/// The remote's acknowledgment for the packet numbered `acknum`.
fn ack_reply(acknum: u32, next_seqnum: u32, accepted: bool) -> Vec<u8> {
    encode_packet(&Packet {
        session_id: remote_session_id(),
        ack: true,
        accept_reject: accepted,
        acknum,
        seqnum: next_seqnum,
        ..Packet::default()
    })
}

/// Connects a fresh session against a remote granting `ttl` ms and sequence
/// number 42.
async fn connected_session(transport: &Arc<ScriptedTransport>, ttl: u32) -> ConnectionSession {
    transport.queue_reply(setup_reply(ttl, 42, true));
    let mut session = session_over(Arc::clone(transport));
    session.connect().await.expect("connect must succeed");
    session
}

// ── Connect ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_connect_establishes_the_session() {
    let transport = ScriptedTransport::new();
    transport.queue_reply(setup_reply(5000, 42, true));
    let mut session = session_over(Arc::clone(&transport));

    let before = Instant::now();
    session.connect().await.expect("connect must succeed");

    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(session.session_id(), remote_session_id());
    assert_eq!(session.current_seqnum(), 42);

    // Expiration ≈ now + 5000 ms.
    let expiration = session.session_expiration().expect("deadline must be set");
    let granted = expiration.duration_since(before);
    assert!(granted > Duration::from_millis(4500), "granted {granted:?}");
    assert!(granted <= Duration::from_millis(5500), "granted {granted:?}");

    // Exactly one Connect went out: nil session id, connect flag alone.
    let sent = transport.sent_packets();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].session_id, Uuid::nil());
    assert!(sent[0].connect && !sent[0].revive && !sent[0].ack);
    assert_eq!(sent[0].window, 64);
}

#[tokio::test]
async fn connect_is_a_noop_while_the_session_is_alive() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    // No further replies queued: a real handshake would time out.
    session.connect().await.expect("second connect must be a no-op");

    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(transport.sent_packets().len(), 1, "no second Connect on the wire");
}

#[tokio::test]
async fn rejected_connect_leaves_the_session_offline() {
    let transport = ScriptedTransport::new();
    transport.queue_reply(setup_reply(5000, 42, false));
    let mut session = session_over(Arc::clone(&transport));

    let result = session.connect().await;

    assert!(matches!(result, Err(SessionError::Rejected)));
    assert_eq!(session.status(), SessionStatus::Offline);
    assert_eq!(session.session_id(), Uuid::nil());
}

#[tokio::test]
async fn silent_remote_times_out_the_connect() {
    let transport = ScriptedTransport::new();
    let mut session = session_over(Arc::clone(&transport));

    let result = session.connect().await;

    assert!(matches!(result, Err(SessionError::Timeout { .. })));
    assert_eq!(session.status(), SessionStatus::Offline);
}

// ── Send ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn acknowledged_send_advances_the_sequence_number() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    transport.queue_reply(ack_reply(42, 43, true));
    session.send_data(b"hello remote").await.expect("send must succeed");

    assert_eq!(session.current_seqnum(), 43);
    assert_eq!(session.status(), SessionStatus::Connected);

    let sent = transport.sent_packets();
    assert_eq!(sent.len(), 2, "one Connect, one data packet");
    let data = &sent[1];
    assert_eq!(data.session_id, remote_session_id());
    assert_eq!(data.seqnum, 42);
    assert!(data.ack && !data.connect && !data.revive && !data.more_fragments);
    assert_eq!(data.payload, b"hello remote");
}

#[tokio::test]
async fn unacknowledged_send_performs_exactly_the_budgeted_attempts() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    // The remote never acks: attempts_left = 2 ⇒ 3 logical attempts total.
    let result = session.send_data_with(b"lost", false, 2).await;

    assert!(matches!(result, Err(SessionError::Timeout { attempts: 3 })));
    let transmissions = transport
        .sent_packets()
        .iter()
        .filter(|p| p.seqnum == 42 && p.ack && !p.connect)
        .count();
    assert_eq!(transmissions, 3, "initial attempt plus two retries");
}

#[tokio::test]
async fn oversized_payload_is_fragmented_on_the_wire() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
    // Three fragments numbered 42, 43, 44; the ack addresses the last one.
    transport.queue_reply(ack_reply(44, 45, true));
    session.send_data(&payload).await.expect("fragmented send must succeed");

    assert_eq!(session.current_seqnum(), 45);

    let sent = transport.sent_packets();
    let fragments: Vec<&Packet> = sent.iter().filter(|p| !p.connect).collect();
    assert_eq!(fragments.len(), 3);
    assert!(fragments[0].more_fragments && fragments[1].more_fragments);
    assert!(!fragments[2].more_fragments);
    assert_eq!(
        fragments.iter().map(|p| p.seqnum).collect::<Vec<_>>(),
        vec![42, 43, 44]
    );
    assert!(fragments.iter().all(|p| p.fragment_id == fragments[0].fragment_id));

    let reassembled: Vec<u8> = fragments.iter().flat_map(|p| p.payload.clone()).collect();
    assert_eq!(reassembled, payload);
}

// ── Revive ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn accepted_revive_restores_the_connection() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    transport.queue_reply(ack_reply(42, 43, true));
    session.revive(b"waking up").await.expect("revive must succeed");

    assert_eq!(session.status(), SessionStatus::Connected);

    let sent = transport.sent_packets();
    let revive_packet = sent.iter().find(|p| p.revive && !p.connect).expect("revive on the wire");
    assert!(revive_packet.ack);
    assert_eq!(revive_packet.payload, b"waking up");
}

#[tokio::test]
async fn rejected_revive_takes_the_session_offline() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    transport.queue_reply(ack_reply(42, 43, false));
    let result = session.revive(b"please").await;

    assert!(matches!(result, Err(SessionError::Rejected)));
    assert_eq!(session.status(), SessionStatus::Offline);
}

#[tokio::test]
async fn expired_session_cannot_be_revived() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 30).await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!session.connection_still_alive());
    assert_eq!(session.status(), SessionStatus::Expired);

    let result = session.revive(b"too late").await;
    assert!(matches!(result, Err(SessionError::Expired)));
}

// ── Disconnect ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn acknowledged_disconnect_reports_success_and_goes_offline() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    transport.queue_reply(ack_reply(42, 43, true));
    session.disconnect().await.expect("acknowledged disconnect must succeed");

    assert_eq!(session.status(), SessionStatus::Offline);

    let sent = transport.sent_packets();
    let teardown = sent.last().expect("disconnect on the wire");
    assert!(teardown.connect && teardown.revive && teardown.ack);
    assert_eq!(teardown.window, 0);
    assert!(teardown.payload.is_empty());
    assert_eq!(teardown.session_id, remote_session_id());
}

#[tokio::test]
async fn unacknowledged_disconnect_still_goes_offline() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    let result = session.disconnect().await;

    assert!(matches!(result, Err(SessionError::Timeout { .. })));
    assert_eq!(session.status(), SessionStatus::Offline);
}

// ── Interplay ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reconnect_after_disconnect_starts_a_fresh_handshake() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    transport.queue_reply(ack_reply(42, 43, true));
    session.disconnect().await.expect("disconnect");
    assert_eq!(session.status(), SessionStatus::Offline);

    transport.queue_reply(setup_reply(8000, 100, true));
    session.connect().await.expect("reconnect");

    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(session.current_seqnum(), 100);

    let connects = transport
        .sent_packets()
        .iter()
        .filter(|p| p.connect && !p.revive && !p.ack)
        .count();
    assert_eq!(connects, 2, "one Connect per handshake");
}

#[tokio::test]
async fn late_reply_from_a_previous_wait_does_not_satisfy_a_new_one() {
    let transport = ScriptedTransport::new();
    let mut session = connected_session(&transport, 60_000).await;

    // The remote acks a sequence number nobody is waiting for.
    transport.queue_reply(ack_reply(7, 8, true));
    let result = session.send_data_with(b"data", false, 0).await;

    // The stray ack must not be mistaken for ours.
    assert!(matches!(result, Err(SessionError::Timeout { .. })));
    assert_eq!(session.current_seqnum(), 42, "sequence number must not advance");
}
