//! RDTP client application entry point.
//!
//! Wires together the configuration, the UDP transport, and the session
//! state machine, then forwards stdin lines to the remote as acknowledged
//! data messages:
//!
//! ```text
//! main()
//!  └─ ClientConfig::load()        -- TOML config, defaults on first run
//!  └─ UdpTransport::connect()     -- socket bound to the remote endpoint
//!  └─ ConnectionSession::connect()-- Connect/Setup handshake
//!  └─ line loop
//!       ├─ send_data(line)        -- fragment, send, await acknowledgment
//!       ├─ revive(line)           -- when the session went inactive
//!       └─ Ctrl-C / EOF           -- disconnect and exit
//! ```
//!
//! The optional first command-line argument is the config file path
//! (default `rdtp.toml` in the working directory; a missing file means
//! defaults).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rdtp_client::config::ClientConfig;
use rdtp_client::session::{ConnectionSession, SessionError};
use rdtp_client::transport::{Transport, UdpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("rdtp.toml"));
    let config = ClientConfig::load(&config_path)?;

    // Initialise structured logging.  RUST_LOG overrides the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.client.log_level.clone())),
        )
        .init();

    info!(
        "RDTP client starting; remote {}:{}",
        config.server.host, config.server.port
    );

    let transport = Arc::new(UdpTransport::connect(&config.server.host, config.server.port).await?);
    transport
        .set_receive_timeout(
            config.session.receive_timeout_ms / 1000,
            ((config.session.receive_timeout_ms % 1000) * 1000) as u32,
        )
        .await?;

    let mut session = ConnectionSession::new(transport, config.session.tuning());
    session.connect().await?;

    // ── Line loop: each stdin line becomes one acknowledged message ──────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break; // EOF
                };
                if line.is_empty() {
                    continue;
                }
                match session.send_data(line.as_bytes()).await {
                    Ok(()) => {}
                    Err(SessionError::NotConnected | SessionError::Expired) => {
                        warn!("session inactive; attempting revive");
                        if let Err(e) = session.revive(line.as_bytes()).await {
                            error!("revive failed: {e}");
                            break;
                        }
                    }
                    Err(e) => error!("send failed: {e}"),
                }
            }
        }
    }

    if let Err(e) = session.disconnect().await {
        warn!("disconnect not acknowledged: {e}");
    }

    info!("RDTP client stopped");
    Ok(())
}
