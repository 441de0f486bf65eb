// ===============================
// src/venue_ws.rs (JSON over WebSocket venue transport)
// ===============================
//
// Satu koneksi WS membawa dua arah:
// - inbound : VenueEvent JSON (type-tagged) -> channel trader
// - outbound: Command dari trader -> JSON text frame
// Reconnect dengan exponential backoff + jitter (seperti feed Binance lama).
//
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use url::Url;

use crate::domain::{Command, VenueEvent};
use crate::metrics::{WS_CONNECTED, WS_RECONNECTS};

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("bad venue url: {0}")]
    Url(#[from] url::ParseError),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub fn decode_event(txt: &str) -> Result<VenueEvent, VenueError> {
    Ok(serde_json::from_str(txt)?)
}

pub fn encode_command(cmd: &Command) -> Result<String, VenueError> {
    Ok(serde_json::to_string(cmd)?)
}

/// Why a session ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd { Disconnected, Shutdown }

async fn session(
    url: &Url,
    ev_tx: &mpsc::Sender<VenueEvent>,
    cmd_rx: &mut mpsc::Receiver<Command>,
) -> Result<SessionEnd, VenueError> {
    let (ws, _resp) = connect_async(url.as_str()).await?;
    info!(%url, "venue ws connected");
    WS_CONNECTED.set(1);
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(m)) if m.is_text() => {
                    let txt = m.into_text()?;
                    match decode_event(&txt) {
                        Ok(ev) => {
                            if ev_tx.send(ev).await.is_err() {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Err(e) => warn!(?e, %txt, "undecodable venue frame, skipped"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Disconnected),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(c) => {
                    let txt = encode_command(&c)?;
                    write.send(Message::Text(txt)).await?;
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            },
        }
    }
}

/// Keep a venue session alive until the trader goes away.
pub async fn run(ws_url: String, ev_tx: mpsc::Sender<VenueEvent>, mut cmd_rx: mpsc::Receiver<Command>) {
    let url = match Url::parse(&ws_url) {
        Ok(u) => u,
        Err(e) => {
            error!(?e, %ws_url, "bad venue ws url");
            return;
        }
    };

    let mut attempt: u32 = 0;
    loop {
        match session(&url, &ev_tx, &mut cmd_rx).await {
            Ok(SessionEnd::Shutdown) => {
                info!("venue ws: shutdown");
                WS_CONNECTED.set(0);
                return;
            }
            Ok(SessionEnd::Disconnected) => {
                warn!("venue ws disconnected, will reconnect…");
                attempt = 0;
            }
            Err(e) => error!(?e, "venue ws session failed"),
        }
        WS_CONNECTED.set(0);
        WS_RECONNECTS.inc();

        // Exponential backoff + jitter
        attempt = attempt.saturating_add(1);
        let shift = attempt.min(6);                  // 0..=6
        let factor = 1u64 << shift;                  // 1,2,4,...,64
        let base_ms = 500u64.saturating_mul(factor); // 0.5s..32s
        let jitter = rand::thread_rng().gen_range(0..=250);
        sleep(Duration::from_millis(base_ms + jitter)).await;
    }
}
