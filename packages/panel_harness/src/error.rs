//! Error taxonomy for the harness core.

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Inbound frame could not be decoded into a control message.
    #[error("protocol error: {reason}")]
    Protocol { reason: String, raw: String },

    /// Panel layout or startup configuration does not support the request.
    #[error("config error: {0}")]
    Config(String),

    /// The message channel to the peer failed or is gone.
    #[error("channel error: {0}")]
    Channel(String),

    #[error("playback already running on this session")]
    PlaybackBusy,

    #[error("playback log line {line}: {reason}")]
    PlaybackLog { line: usize, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound message could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn protocol(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            Self::Protocol { .. } => "protocol_error",
            Self::Config(_) => "config_error",
            Self::Channel(_) => "channel_error",
            Self::PlaybackBusy => "playback_busy",
            Self::PlaybackLog { .. } => "playback_log_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }

    /// Whether the session must end after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Channel(_))
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
