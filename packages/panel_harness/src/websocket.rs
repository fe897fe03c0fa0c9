use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::HarnessState;
use crate::channel::Outbox;
use crate::error::HarnessError;
use crate::protocol::ControlMessage;
use crate::session::Session;

/// How long the writer gets to flush queued frames after the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn handle_websocket(socket: WebSocket, state: HarnessState, peer: SocketAddr) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(
        session = %session_id,
        "[{}] Client connected from {}",
        Utc::now().to_rfc3339(),
        peer
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbox, mut outbox_rx) = Outbox::channel(state.config.session.outbox_capacity);

    let mut session = Session::new(session_id.clone(), state.config.panel.clone(), outbox.clone());
    if let Some(ref log) = state.playback {
        session = session.with_autoplay(log.clone());
    }
    let cancel = session.cancellation_token();

    // Single writer: session replies, heartbeat, and playback all funnel here
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            let json = match msg.encode() {
                Ok(json) => json,
                Err(e) => {
                    warn!("Dropping unencodable `{}` message: {}", msg.kind, e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let heartbeat = state
        .config
        .heartbeat_interval()
        .map(|period| tokio::spawn(heartbeat_loop(outbox, period, cancel.clone())));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = session.handle_text(text.as_str()).await {
                        report(&session_id, &e);
                        if e.is_terminal() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(session = %session_id, "Binary messages not supported");
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(
                        session = %session_id,
                        "[{}] Client disconnected",
                        Utc::now().to_rfc3339()
                    );
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let err = HarnessError::Channel(e.to_string());
                    error!(
                        session = %session_id,
                        "[{}] WebSocket error: {}",
                        Utc::now().to_rfc3339(),
                        err
                    );
                    break;
                }
            }
        }
    }

    // Cleanup
    session.close();
    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    drop(session);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
}

/// Log a failed inbound message. Protocol errors were already logged with the
/// raw frame by the session.
fn report(session_id: &str, err: &HarnessError) {
    match err {
        HarnessError::Protocol { .. } => {}
        HarnessError::Config(_) => {
            error!(session = %session_id, code = err.error_code(), "Request failed: {}", err)
        }
        HarnessError::Channel(_) => {
            error!(session = %session_id, code = err.error_code(), "Channel failed: {}", err)
        }
        _ => warn!(session = %session_id, code = err.error_code(), "{}", err),
    }
}

/// Periodically nudge the peer with `{"type":"active"}`.
async fn heartbeat_loop(outbox: Outbox, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if outbox.send(ControlMessage::active()).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn heartbeat_sends_active_until_cancelled() {
        let (outbox, mut rx) = Outbox::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(heartbeat_loop(
            outbox,
            Duration::from_millis(3000),
            cancel.clone(),
        ));

        let start = tokio::time::Instant::now();
        assert_eq!(rx.recv().await.unwrap(), ControlMessage::active());
        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert_eq!(rx.recv().await.unwrap(), ControlMessage::active());

        cancel.cancel();
        task.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
