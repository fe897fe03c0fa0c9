//! Send side of the message channel.
//!
//! The socket writer task owns the receiving half and serializes whatever the
//! session, heartbeat, and playback push into it, so sends from those three
//! never interleave mid-frame.

use tokio::sync::mpsc;

use crate::error::{HarnessError, Result};
use crate::protocol::ControlMessage;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<ControlMessage>,
}

impl Outbox {
    pub fn new(tx: mpsc::Sender<ControlMessage>) -> Self {
        Self { tx }
    }

    /// Create an outbox and the receiver the writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ControlMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send(&self, msg: ControlMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| HarnessError::Channel(format!("peer writer gone, dropped `{}`", e.0.kind)))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
