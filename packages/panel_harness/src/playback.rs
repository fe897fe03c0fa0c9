//! Timed replay of captured control events.
//!
//! A capture log is a list of lines shaped like
//!
//! ```text
//! [2026-02-06T02:06:54.248Z] Received Event:{"type":"touch_down","data":{...}}
//! ```
//!
//! Anything before the opening bracket is ignored, so the harness's own log
//! output (see [`capture_line`]) can be fed back in as a capture.
//!
//! The engine sends each payload to the peer, waiting between sends for the
//! same delta that separated the two captures. Non-positive deltas (duplicate
//! or out-of-order timestamps) are sent immediately.
//!
//! One playback runs per session at a time; a second request while one is in
//! flight is rejected with [`HarnessError::PlaybackBusy`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::Outbox;
use crate::error::{HarnessError, Result};
use crate::protocol::ControlMessage;

static CAPTURE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?P<ts>[^\[\]]+)\]\s*Received Event:(?P<json>.*)$")
        .expect("capture line pattern is valid")
});

/// Render `msg` as one capture line stamped with `at`.
pub fn capture_line(at: DateTime<Utc>, msg: &ControlMessage) -> Result<String> {
    Ok(format!(
        "[{}] Received Event:{}",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        msg.encode()?
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub payload: ControlMessage,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackLog {
    events: Vec<CapturedEvent>,
}

impl PlaybackLog {
    pub fn from_events(events: Vec<CapturedEvent>) -> Self {
        Self { events }
    }

    /// Parse capture text. Lines not matching the capture pattern are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut events = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let Some(caps) = CAPTURE_LINE.captures(line.trim()) else {
                continue;
            };
            let ts = &caps["ts"];
            let timestamp_ms = DateTime::parse_from_rfc3339(ts)
                .map_err(|e| HarnessError::PlaybackLog {
                    line: line_no,
                    reason: format!("bad timestamp `{ts}`: {e}"),
                })?
                .timestamp_millis();
            let payload =
                ControlMessage::decode(caps["json"].trim()).map_err(|e| HarnessError::PlaybackLog {
                    line: line_no,
                    reason: e.to_string(),
                })?;
            events.push(CapturedEvent {
                timestamp_ms,
                payload,
            });
        }
        Ok(Self { events })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let log = Self::parse(&text)?;
        info!(
            "Loaded {} captured events from {}",
            log.len(),
            path.display()
        );
        Ok(log)
    }

    pub fn events(&self) -> &[CapturedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// One sent event and its offset from the first capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStep {
    pub kind: String,
    pub offset_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    /// The session was cancelled mid-sequence; nothing after the last step was sent.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub steps: Vec<PlaybackStep>,
    pub outcome: PlaybackOutcome,
}

impl PlaybackReport {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            outcome: PlaybackOutcome::Completed,
        }
    }

    fn aborted(mut self) -> Self {
        self.outcome = PlaybackOutcome::Aborted;
        self
    }
}

/// Releases the engine's busy flag when a playback ends, however it ends.
struct PlaybackSlot {
    busy: Arc<AtomicBool>,
}

impl Drop for PlaybackSlot {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackEngine {
    outbox: Outbox,
    cancel: CancellationToken,
    busy: Arc<AtomicBool>,
}

impl PlaybackEngine {
    pub fn new(outbox: Outbox, cancel: CancellationToken) -> Self {
        Self {
            outbox,
            cancel,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<PlaybackSlot> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HarnessError::PlaybackBusy)?;
        Ok(PlaybackSlot {
            busy: self.busy.clone(),
        })
    }

    /// Replay `log` on the current task.
    pub async fn play(&self, log: &PlaybackLog) -> Result<PlaybackReport> {
        let _slot = self.acquire()?;
        self.run(log).await
    }

    /// Replay `log` on a new task. The busy check happens before spawning so a
    /// rejected request never starts.
    pub fn spawn(&self, log: Arc<PlaybackLog>) -> Result<JoinHandle<Result<PlaybackReport>>> {
        let slot = self.acquire()?;
        let engine = self.clone();
        Ok(tokio::spawn(async move {
            let _slot = slot;
            let result = engine.run(&log).await;
            match &result {
                Ok(report) => info!(
                    "[Playback] {:?} after {} of {} events",
                    report.outcome,
                    report.steps.len(),
                    log.len()
                ),
                Err(e) => warn!("[Playback] Stopped: {}", e),
            }
            result
        }))
    }

    async fn run(&self, log: &PlaybackLog) -> Result<PlaybackReport> {
        let mut report = PlaybackReport::new();
        let Some(first) = log.events().first() else {
            return Ok(report);
        };
        let baseline = first.timestamp_ms;
        let mut previous = baseline;

        for (i, event) in log.events().iter().enumerate() {
            let wait = if i == 0 {
                0
            } else {
                event.timestamp_ms - previous
            };
            previous = event.timestamp_ms;

            if wait > 0 {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Ok(report.aborted()),
                    _ = tokio::time::sleep(Duration::from_millis(wait as u64)) => {}
                }
            } else if i > 0 {
                debug!(
                    index = i,
                    delta_ms = wait,
                    "Non-positive capture delta, sending immediately"
                );
            }

            if self.cancel.is_cancelled() {
                return Ok(report.aborted());
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(report.aborted()),
                sent = self.outbox.send(event.payload.clone()) => sent?,
            }

            let offset_ms = event.timestamp_ms - baseline;
            info!("[Playback] Sent {} at +{}ms", event.payload.kind, offset_ms);
            report.steps.push(PlaybackStep {
                kind: event.payload.kind.clone(),
                offset_ms,
            });
        }

        Ok(report)
    }
}
