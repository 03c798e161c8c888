//! Error types for rocketscrape

use thiserror::Error;

use crate::messages::ChannelId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown channel or server: {0}")]
    UnknownChannelOrServer(String),

    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    #[error("Unsupported analysis: {0}")]
    UnsupportedAnalysis(String),

    #[error("Discord API error: {0}")]
    Client(String),

    #[error("Discord API error while streaming channel {channel}: {message}")]
    ChannelStream { channel: ChannelId, message: String },

    #[error("No API token found (set DISCORD_USER_TOKEN or token in config.yml)")]
    MissingToken,

    #[error("Message cache is locked by another process")]
    CacheLocked,

    #[error("Failed to acquire cache lock: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl Error {
    /// Attach the failing channel to a client error raised mid-stream.
    pub fn in_channel(self, channel: ChannelId) -> Self {
        match self {
            Error::Client(message) | Error::ChannelStream { message, .. } => {
                Error::ChannelStream { channel, message }
            }
            Error::HttpError(err) => Error::ChannelStream {
                channel,
                message: err.to_string(),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
