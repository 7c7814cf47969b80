//! The RDTP session state machine.
//!
//! A [`ConnectionSession`] owns the complete state for one logical session
//! with the remote endpoint and drives its lifecycle:
//!
//! ```text
//!             connect()                      ttl elapsed
//!  Offline ──────────────▶ Connecting ─┐   ┌───────────▶ Expired
//!     ▲                        │       │   │
//!     │           Setup accepted       │   │
//!     │                        ▼       │   │
//!     └──────────────────── Connected ─┴───┘
//!        disconnect() /        │  ▲
//!        rejected              │  │ revive accepted
//!                   revive ────┘  │
//!                 (Connecting again, new listener)
//! ```
//!
//! # Concurrency model (for beginners)
//!
//! There are exactly two parties per session:
//!
//! - The **control path**: `connect`, `send_data`, `disconnect` run
//!   sequentially on the caller's task.  Between matcher polls it sleeps
//!   with every lock released.
//! - The **listener**: one background task per session, started when the
//!   session begins connecting.  It blocks on the transport's bounded
//!   receive, decodes whatever arrives, and inserts it into the shared
//!   [`ReceiveMatcher`].  The matcher's single lock is the only channel
//!   between the two parties; the session status lives behind its own lock
//!   so the listener can observe transitions without touching the buffer.
//!
//! A revive swaps listeners: the old generation is signalled through its
//! private running flag and joined *before* the new one is spawned, so two
//! listeners can never append to the same buffer concurrently.  The status
//! check alone could not do this, because the status is already back to
//! `Connecting` while the old listener is still draining its last receive.
//!
//! Retries are attempt-counted, never wall-clock: a response wait costs at
//! most `poll_retries × poll_interval`, and an unacknowledged data send is
//! retransmitted at the protocol level up to `data_attempts` times.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rdtp_core::protocol::builder::{
    connect_packet, disconnect_packet, fragment_data, fragment_revive,
};
use rdtp_core::protocol::packet::MAX_DATAGRAM;
use rdtp_core::{decode_packet, encode_packet, Packet, PacketKind, ReceiveMatcher};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::transport::{Transport, TransportError};

/// Matcher poll attempts per response wait.
const N_RETRIES: u32 = 10;
/// Sleep between matcher polls.
const AWAIT_TIME: Duration = Duration::from_millis(100);
/// Transport-level transmission attempts per datagram.
const SEND_RETRIES: u32 = 5;
/// Protocol-level retries for an unacknowledged data send.
const DATA_ATTEMPTS: u32 = 5;
/// Receiver credit advertised when none is configured.
const DEFAULT_WINDOW: u16 = 1024;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session, or the last one was torn down.
    Offline,
    /// A connect or revive exchange is in flight.
    Connecting,
    /// The remote accepted; data can be sent.
    Connected,
    /// The granted ttl elapsed without a disconnect.
    Expired,
}

/// Errors surfaced by the public session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport could not deliver a datagram after all retries.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// No matching response arrived within the poll budget.
    #[error("no matching response within {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// The remote explicitly denied a connect or revive.
    #[error("request rejected by remote")]
    Rejected,

    /// A data send was attempted without an established session.
    #[error("session is not connected")]
    NotConnected,

    /// A revive was attempted after the session ttl fully elapsed.
    #[error("session has expired and cannot be revived")]
    Expired,
}

/// Timing and retry knobs, usually produced from the config file.
#[derive(Debug, Clone)]
pub struct SessionTuning {
    /// Receiver credit advertised on outgoing packets.
    pub initial_window: u16,
    /// Transport-level transmission attempts per datagram.
    pub send_retries: u32,
    /// Matcher poll attempts per response wait.
    pub poll_retries: u32,
    /// Sleep between matcher polls.
    pub poll_interval: Duration,
    /// Protocol-level retries for an unacknowledged data send.
    pub data_attempts: u32,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            initial_window: DEFAULT_WINDOW,
            send_retries: SEND_RETRIES,
            poll_retries: N_RETRIES,
            poll_interval: AWAIT_TIME,
            data_attempts: DATA_ATTEMPTS,
        }
    }
}

/// State shared between the control path and the listener task.
#[derive(Debug)]
struct SessionShared {
    /// Guarded separately from the matcher buffer: the listener reads it on
    /// every loop iteration while the control path writes transitions.
    status: Mutex<SessionStatus>,
    matcher: ReceiveMatcher,
    /// Acknowledgment number of the most recently decoded incoming packet.
    last_acknum: AtomicU32,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            status: Mutex::new(SessionStatus::Offline),
            matcher: ReceiveMatcher::new(),
            last_acknum: AtomicU32::new(0),
        }
    }

    fn status(&self) -> SessionStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().expect("status lock poisoned") = status;
    }

    fn last_acknum(&self) -> u32 {
        self.last_acknum.load(Ordering::Relaxed)
    }
}

/// One listener generation: the spawned task plus its private stop signal.
struct ListenerHandle {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// The session state machine.  One instance per logical session; operations
/// run sequentially on the owning task.
pub struct ConnectionSession {
    transport: Arc<dyn Transport>,
    shared: Arc<SessionShared>,
    tuning: SessionTuning,
    session_id: Uuid,
    session_ttl_ms: u32,
    current_seqnum: u32,
    session_expiration: Option<Instant>,
    next_fragment_id: u8,
    listener: Option<ListenerHandle>,
}

impl ConnectionSession {
    /// Creates a new session around a live transport, in `Offline` state.
    pub fn new(transport: Arc<dyn Transport>, tuning: SessionTuning) -> Self {
        Self {
            transport,
            shared: Arc::new(SessionShared::new()),
            tuning,
            session_id: Uuid::nil(),
            session_ttl_ms: 0,
            current_seqnum: 0,
            session_expiration: None,
            next_fragment_id: 0,
            listener: None,
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Session identifier granted by the remote; nil before a session exists.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Sequence number the next data send will start from.
    pub fn current_seqnum(&self) -> u32 {
        self.current_seqnum
    }

    /// Absolute deadline after which the session counts as expired.
    pub fn session_expiration(&self) -> Option<Instant> {
        self.session_expiration
    }

    /// Returns `true` while the granted ttl has not yet elapsed.
    ///
    /// When the ttl *has* elapsed this also performs the
    /// `Connected → Expired` transition, exactly once: a session left
    /// silently stale would have no recovery path.
    pub fn connection_still_alive(&mut self) -> bool {
        if let Some(expiration) = self.session_expiration {
            if Instant::now() < expiration {
                return true;
            }
        }
        {
            let mut status = self.shared.status.lock().expect("status lock poisoned");
            if *status == SessionStatus::Connected {
                warn!("session ttl elapsed; marking expired");
                *status = SessionStatus::Expired;
            }
        }
        false
    }

    /// Establishes a session: sends a Connect packet and waits for the
    /// remote's Setup response.
    ///
    /// Calling this on a session that is already connected and alive is a
    /// no-op returning success.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] when the request cannot be transmitted,
    /// [`SessionError::Timeout`] when no Setup arrives within the poll
    /// budget, and [`SessionError::Rejected`] when the remote denies the
    /// connection.  The session is left `Offline` on every failure.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        info!("requesting connection");

        if self.shared.status() == SessionStatus::Connected && self.connection_still_alive() {
            info!("session already established; nothing to do");
            return Ok(());
        }

        self.shared.set_status(SessionStatus::Connecting);
        self.stop_listener().await;
        self.spawn_listener();

        let request = connect_packet(self.tuning.initial_window);
        if let Err(e) = self.send_with_retry(&request).await {
            error!("connect request could not be transmitted");
            self.go_offline().await;
            return Err(e);
        }

        let Some(setup) = self.poll_matcher(PacketKind::Setup, 0).await else {
            error!("no setup response from remote");
            self.go_offline().await;
            return Err(SessionError::Timeout {
                attempts: self.tuning.poll_retries,
            });
        };

        if !setup.accept_reject {
            warn!("connection rejected by remote");
            self.go_offline().await;
            return Err(SessionError::Rejected);
        }

        // decode_packet already confines the ttl to its 27-bit range.
        self.session_id = setup.session_id;
        self.session_ttl_ms = setup.session_ttl;
        self.current_seqnum = setup.seqnum;
        self.session_expiration =
            Some(Instant::now() + Duration::from_millis(u64::from(setup.session_ttl)));
        self.shared.set_status(SessionStatus::Connected);

        info!(
            session_id = %self.session_id,
            ttl_ms = self.session_ttl_ms,
            seqnum = self.current_seqnum,
            "connection accepted"
        );
        Ok(())
    }

    /// Sends `payload` and waits for the remote's acknowledgment, with the
    /// default protocol-level retry budget.
    ///
    /// Payloads larger than one datagram are fragmented; the acknowledgment
    /// awaited is for the last fragment's sequence number.
    pub async fn send_data(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        self.send_data_with(payload, false, self.tuning.data_attempts)
            .await
    }

    /// Re-establishes an inactive-but-unexpired session by sending `payload`
    /// with the revive flag, with the default retry budget.
    pub async fn revive(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        self.send_data_with(payload, true, self.tuning.data_attempts)
            .await
    }

    /// Sends `payload`, optionally as a revive, retrying the whole exchange
    /// up to `attempts_left` additional times when no acknowledgment
    /// arrives (`attempts_left = 2` means three logical attempts in total).
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] for a plain send outside `Connected`;
    /// [`SessionError::Expired`] for a revive after the ttl fully elapsed;
    /// [`SessionError::Rejected`] when the remote denies a revive;
    /// [`SessionError::Timeout`] when the retry budget runs dry;
    /// [`SessionError::Transport`] when a datagram cannot be transmitted.
    /// A failed revive leaves the session `Offline`.
    pub async fn send_data_with(
        &mut self,
        payload: &[u8],
        revive: bool,
        attempts_left: u32,
    ) -> Result<(), SessionError> {
        if revive {
            if !self.connection_still_alive() {
                error!("cannot revive: session ttl has fully elapsed");
                return Err(SessionError::Expired);
            }
            info!("reviving session");
            self.shared.set_status(SessionStatus::Connecting);
            self.stop_listener().await;
            self.spawn_listener();
        } else if self.shared.status() != SessionStatus::Connected {
            error!("cannot send data: session is not connected");
            return Err(SessionError::NotConnected);
        }

        match self.transmit_until_acked(payload, revive, attempts_left).await {
            Ok(response) if revive => {
                if response.accept_reject {
                    self.shared.set_status(SessionStatus::Connected);
                    info!("session revived");
                    Ok(())
                } else {
                    warn!("revive rejected by remote");
                    self.go_offline().await;
                    Err(SessionError::Rejected)
                }
            }
            Ok(response) => {
                self.current_seqnum = response.seqnum;
                info!(seqnum = self.current_seqnum, "acknowledgment received; data delivered");
                Ok(())
            }
            Err(e) => {
                if revive {
                    self.go_offline().await;
                }
                Err(e)
            }
        }
    }

    /// Tears the session down.  The status becomes `Offline` whether or not
    /// the remote acknowledges; the result reports whether it did.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] when the single send attempt fails,
    /// [`SessionError::Timeout`] when no acknowledgment is observed.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        info!("requesting disconnect");

        let request = disconnect_packet(
            self.session_id,
            self.session_ttl_ms,
            self.current_seqnum,
            self.shared.last_acknum(),
        );

        // Single attempt: the session ends locally regardless of delivery.
        let sent = self
            .transport
            .send(&encode_packet(&request))
            .await
            .map_err(SessionError::from);

        let result = match sent {
            Err(e) => {
                warn!("disconnect could not be transmitted");
                Err(e)
            }
            Ok(()) => match self.poll_matcher(PacketKind::Ack, request.seqnum).await {
                Some(_) => {
                    info!("disconnect acknowledged");
                    Ok(())
                }
                None => {
                    error!("no acknowledgment for disconnect");
                    Err(SessionError::Timeout {
                        attempts: self.tuning.poll_retries,
                    })
                }
            },
        };

        self.session_expiration = None;
        self.go_offline().await;
        result
    }

    // ── Internals ─────────────────────────────────────────────────────────

    /// Builds the fragment train for one logical message and retransmits it
    /// until the last fragment is acknowledged or the budget runs dry.
    async fn transmit_until_acked(
        &mut self,
        payload: &[u8],
        revive: bool,
        attempts_left: u32,
    ) -> Result<Packet, SessionError> {
        let fragment_id = self.next_fragment_id;
        self.next_fragment_id = self.next_fragment_id.wrapping_add(1);

        let fragments = if revive {
            fragment_revive(
                self.session_id,
                self.session_ttl_ms,
                self.current_seqnum,
                self.shared.last_acknum(),
                self.tuning.initial_window,
                fragment_id,
                payload,
            )
        } else {
            fragment_data(
                self.session_id,
                self.session_ttl_ms,
                self.current_seqnum,
                self.shared.last_acknum(),
                self.tuning.initial_window,
                fragment_id,
                payload,
            )
        };
        let await_seq = fragments
            .last()
            .expect("builder yields at least one fragment")
            .seqnum;

        for attempt in 0..=attempts_left {
            if attempt > 0 {
                warn!(
                    remaining = attempts_left - attempt,
                    "no acknowledgment yet; retransmitting"
                );
            }
            info!(
                fragments = fragments.len(),
                seqnum = await_seq,
                revive,
                "transmitting data"
            );
            for fragment in &fragments {
                self.send_with_retry(fragment).await?;
            }

            if let Some(response) = self.poll_matcher(PacketKind::Ack, await_seq).await {
                return Ok(response);
            }
        }

        error!("retry budget exhausted; no acknowledgment from remote");
        Err(SessionError::Timeout {
            attempts: attempts_left + 1,
        })
    }

    /// Encodes and transmits one packet, retrying transport-level failures
    /// up to the configured number of attempts.
    async fn send_with_retry(&self, packet: &Packet) -> Result<(), SessionError> {
        let bytes = encode_packet(packet);
        let mut last_error = None;
        for attempt in 1..=self.tuning.send_retries {
            match self.transport.send(&bytes).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, "datagram send failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(SessionError::Transport(
            last_error.expect("at least one send attempt was made"),
        ))
    }

    /// Polls the matcher for `(kind, acknum)`, sleeping between attempts.
    /// The matcher lock is released for the whole sleep.
    async fn poll_matcher(&self, kind: PacketKind, acknum: u32) -> Option<Packet> {
        for _ in 0..self.tuning.poll_retries {
            if let Some(packet) = self.shared.matcher.take(kind, acknum) {
                return Some(packet);
            }
            tokio::time::sleep(self.tuning.poll_interval).await;
        }
        None
    }

    /// Spawns a fresh listener generation.
    fn spawn_listener(&mut self) {
        debug_assert!(self.listener.is_none(), "previous listener not stopped");
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(listener_loop(
            Arc::clone(&self.transport),
            Arc::clone(&self.shared),
            Arc::clone(&running),
        ));
        self.listener = Some(ListenerHandle { running, handle });
    }

    /// Signals the current listener generation to stop and waits for it to
    /// finish, so the next generation is guaranteed to be the only producer.
    async fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.running.store(false, Ordering::Relaxed);
            if let Err(e) = listener.handle.await {
                debug!("listener task ended abnormally: {e}");
            }
        }
    }

    /// Marks the session offline and reaps the listener.
    async fn go_offline(&mut self) {
        self.shared.set_status(SessionStatus::Offline);
        self.stop_listener().await;
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        // The task cannot be joined here; signalling is enough to let it
        // wind down on its next loop iteration.
        if let Some(listener) = &self.listener {
            listener.running.store(false, Ordering::Relaxed);
        }
    }
}

/// The background listener: decodes every datagram the remote sends and
/// feeds the shared matcher until its generation is stopped or the session
/// leaves the active states.  It never closes the transport.
async fn listener_loop(
    transport: Arc<dyn Transport>,
    shared: Arc<SessionShared>,
    running: Arc<AtomicBool>,
) {
    debug!("listener started");
    while running.load(Ordering::Relaxed)
        && matches!(
            shared.status(),
            SessionStatus::Connecting | SessionStatus::Connected
        )
    {
        let datagram = transport.receive(MAX_DATAGRAM).await;
        if datagram.is_empty() {
            // Receive timeout: expected steady-state, loop to re-check status.
            continue;
        }
        match decode_packet(&datagram) {
            Ok(packet) => {
                shared.last_acknum.store(packet.acknum, Ordering::Relaxed);
                shared.matcher.insert(packet);
            }
            Err(e) => debug!("dropping undecodable datagram: {e}"),
        }
    }
    debug!("listener stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
