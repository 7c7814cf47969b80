//! rdtp-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/` and
//! the binary entry point in `main.rs` share the same module tree.
//!
//! # What does rdtp-client do? (for beginners)
//!
//! RDTP is a session-oriented reliable transport layered over UDP.  The
//! server grants a session with a time-to-live; within that window the
//! client can send data and have every message acknowledged, and a session
//! that went quiet can be *revived* without a full reconnect.
//!
//! The client application:
//!
//! 1. Opens a UDP socket "connected" to the remote endpoint
//!    ([`transport::UdpTransport`]).
//! 2. Performs the connect handshake: a Connect packet out, a Setup packet
//!    back carrying the session id, ttl, and the accept/reject decision.
//! 3. Sends data with acknowledgment and bounded retry, fragmenting
//!    payloads larger than one datagram.
//! 4. Keeps a background listener decoding everything the remote sends into
//!    the shared receive matcher consumed by the request path.
//! 5. Tears the session down with a Disconnect packet.
//!
//! The state machine lives in [`session::ConnectionSession`]; everything
//! byte-level lives in the `rdtp-core` crate.

/// TOML configuration with per-field defaults.
pub mod config;

/// The session state machine and its background listener.
pub mod session;

/// The datagram transport seam and its UDP implementation.
pub mod transport;
