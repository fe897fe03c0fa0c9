//! Session dispatcher
//!
//! One `Session` per connected peer. It owns that peer's panel state, decodes
//! inbound frames, routes them, and pushes replies into the outbox. Inbound
//! handling is sequential (`&mut self`), so the panel needs no locking; the
//! only concurrent piece is a spawned playback, which shares the outbox and is
//! tied to the session's cancellation token.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::Outbox;
use crate::error::{HarnessError, Result};
use crate::panel::{ACTIVE_ID, FOLLOW_ID, PanelConfig, PanelStore, QUIT_ID, TOGGLE_TOP_ID};
use crate::playback::{PlaybackEngine, PlaybackLog, PlaybackReport, capture_line};
use crate::protocol::{ControlMessage, Inbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Channel open, no valid message seen yet.
    Connected,
    /// At least one valid message handled.
    Active,
    /// Terminal.
    Closed,
}

pub struct Session {
    id: String,
    state: SessionState,
    panel: PanelStore,
    outbox: Outbox,
    cancel: CancellationToken,
    playback: PlaybackEngine,
    autoplay: Option<Arc<PlaybackLog>>,
    protocol_errors: u64,
}

impl Session {
    pub fn new(id: impl Into<String>, panel: PanelConfig, outbox: Outbox) -> Self {
        let cancel = CancellationToken::new();
        let playback = PlaybackEngine::new(outbox.clone(), cancel.child_token());
        Self {
            id: id.into(),
            state: SessionState::Connected,
            panel: PanelStore::new(panel),
            outbox,
            cancel,
            playback,
            autoplay: None,
            protocol_errors: 0,
        }
    }

    /// Replay `log` each time the peer reports `ready`.
    pub fn with_autoplay(mut self, log: Arc<PlaybackLog>) -> Self {
        self.autoplay = Some(log);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn panel(&self) -> &PanelConfig {
        self.panel.current()
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_running()
    }

    /// Token cancelled when the session closes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(HarnessError::Channel(format!(
                "session {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    /// Decode and dispatch one raw frame from the channel.
    pub async fn handle_text(&mut self, raw: &str) -> Result<()> {
        self.ensure_open()?;
        match ControlMessage::decode(raw) {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => Err(self.reject(e)),
        }
    }

    fn reject(&mut self, err: HarnessError) -> HarnessError {
        self.protocol_errors += 1;
        if let HarnessError::Protocol { reason, raw } = &err {
            warn!(session = %self.id, "Error parsing message: {}", reason);
            warn!(session = %self.id, "Raw message: {}", raw);
        }
        err
    }

    pub async fn dispatch(&mut self, msg: ControlMessage) -> Result<()> {
        self.ensure_open()?;
        let inbound = match Inbound::try_from(&msg) {
            Ok(inbound) => inbound,
            Err(e) => return Err(self.reject(e)),
        };
        // Field-free so the line stays replayable as a capture.
        if let Ok(line) = capture_line(Utc::now(), &msg) {
            info!("{}", line);
        }

        if self.state == SessionState::Connected {
            self.state = SessionState::Active;
        }

        let result = match inbound {
            Inbound::Ready => self.on_ready().await,
            Inbound::PanelButtonClick { id } => self.on_button_click(&id).await,
            Inbound::Other(kind) => {
                debug!(session = %self.id, "No handler for message type `{}`", kind);
                Ok(())
            }
        };

        if let Err(ref e) = result {
            if e.is_terminal() {
                error!(session = %self.id, "Closing session: {}", e);
                self.close();
            }
        }
        result
    }

    async fn send_panel(&self) -> Result<()> {
        self.outbox
            .send(ControlMessage::panel(self.panel.current())?)
            .await
    }

    async fn on_ready(&mut self) -> Result<()> {
        info!(session = %self.id, "Sending panel configuration with buttons...");
        self.send_panel().await?;
        info!(
            session = %self.id,
            "Panel configuration sent with {} buttons",
            self.panel.current().buttons.len()
        );

        if let Some(log) = self.autoplay.clone() {
            match self.start_playback(log) {
                Ok(_) => {}
                Err(HarnessError::PlaybackBusy) => {
                    warn!(session = %self.id, "Playback already running, not restarting");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn on_button_click(&mut self, id: &str) -> Result<()> {
        match id {
            FOLLOW_ID => {
                let following = self.panel.toggle_follow()?;
                debug!(session = %self.id, following, "Follow toggled");
                self.send_panel().await
            }
            QUIT_ID => {
                info!(session = %self.id, "Quit button clicked, sending quit command");
                self.outbox.send(ControlMessage::quit()).await
            }
            ACTIVE_ID => {
                info!(session = %self.id, "Active button clicked, sending active command");
                self.outbox.send(ControlMessage::active()).await
            }
            TOGGLE_TOP_ID => {
                let enable = self.panel.toggle_top()?;
                self.send_panel().await?;
                self.outbox.send(ControlMessage::top(enable)).await?;
                info!(session = %self.id, "Top command sent, window always-on-top: {}", enable);
                Ok(())
            }
            other => {
                debug!(session = %self.id, "No handler for button `{}`", other);
                Ok(())
            }
        }
    }

    /// Start replaying `log` to the peer. Rejected while another playback runs.
    pub fn start_playback(
        &self,
        log: Arc<PlaybackLog>,
    ) -> Result<JoinHandle<Result<PlaybackReport>>> {
        self.ensure_open()?;
        info!(session = %self.id, "Starting playback of {} events", log.len());
        self.playback.spawn(log)
    }

    /// End the session and abort any in-flight playback.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.cancel.cancel();
        self.state = SessionState::Closed;
        info!(session = %self.id, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
