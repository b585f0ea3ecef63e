use crate::types::EntryId;
use thiserror::Error;

/// Result type for Atlas AZM operations
pub type Result<T> = std::result::Result<T, AzmError>;

/// Which transport an error relates to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// TCP control stream
    Tcp,
    /// UDP meter endpoint
    Udp,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Tcp => f.write_str("TCP"),
            Channel::Udp => f.write_str("UDP"),
        }
    }
}

/// Errors that can occur when talking to an Atlas AZM device
#[derive(Error, Debug)]
pub enum AzmError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No link to the device is open
    #[error("Not connected")]
    NotConnected,

    /// The link broke while sending
    #[error("Connection lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    /// Opening one of the two channels failed
    #[error("Failed to open {channel} channel to {addr}: {source}")]
    ConnectFailed {
        channel: Channel,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Config validation could not reach the device
    #[error("Cannot connect to {0}")]
    CannotConnect(String),

    /// Device setup failed because the device is unreachable
    #[error("Failed to connect to Atlas AZM at {0}")]
    NotReady(String),

    /// A device with this host is already set up
    #[error("Device already configured: {0}")]
    AlreadyConfigured(String),

    /// No device is registered under this entry id
    #[error("Unknown entry: {0}")]
    UnknownEntry(EntryId),

    /// Source name not present in the zone's source list
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

impl AzmError {
    /// Whether this error means the link to the device is unusable.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            AzmError::Io(_)
                | AzmError::NotConnected
                | AzmError::ConnectionLost(_)
                | AzmError::ConnectFailed { .. }
                | AzmError::CannotConnect(_)
                | AzmError::NotReady(_)
        )
    }
}
