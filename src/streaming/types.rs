// Common types for the streaming module

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur during streaming operations
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Sample at t={timestamp} not found in channel {channel}")]
    ValueNotFound { channel: String, timestamp: f64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: AcquisitionState,
    },

    #[error("Stream already running")]
    AlreadyRunning,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

/// One timestamped entry of a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in the source's time base (seconds)
    pub timestamp: f64,

    /// Channel value; scalar channels carry a single element
    pub value: Vec<f32>,
}

impl Sample {
    pub fn new(timestamp: f64, value: Vec<f32>) -> Self {
        Self { timestamp, value }
    }

    pub fn scalar(timestamp: f64, value: f32) -> Self {
        Self {
            timestamp,
            value: vec![value],
        }
    }
}

/// Bounds of a windowed query
///
/// `start_time` selects the first sample with `timestamp >= start_time`,
/// `num_samples` caps how many samples are returned from there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Window {
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub num_samples: Option<usize>,
}

impl Window {
    /// The whole channel history
    pub fn all() -> Self {
        Self::default()
    }

    /// Everything from `start_time` onward (nothing for a NaN start)
    pub fn from(start_time: f64) -> Self {
        Self {
            start_time: Some(start_time),
            num_samples: None,
        }
    }

    /// Cap the window to at most `num_samples` entries
    pub fn take(mut self, num_samples: usize) -> Self {
        self.num_samples = Some(num_samples);
        self
    }
}

/// Acquisition status of a stream session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    /// No source connection, no channels
    #[default]
    Disconnected,

    /// Channels established from source metadata, not ingesting
    Connected,

    /// Ingestion worker is running
    Streaming,

    /// Ingestion worker has been stopped, connection kept
    Stopped,
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Statistics about a streaming session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamStats {
    pub frames_received: u64,
    pub samples_appended: u64,
    pub samples_rejected: u64,
    pub channel_count: usize,
    pub uptime_seconds: Option<f64>,
    pub frame_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_builders() {
        assert_eq!(Window::all().start_time, None);
        assert_eq!(Window::all().num_samples, None);

        let w = Window::from(2.5).take(2);
        assert_eq!(w.start_time, Some(2.5));
        assert_eq!(w.num_samples, Some(2));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&AcquisitionState::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = StreamError::InvalidState {
            operation: "start",
            state: AcquisitionState::Disconnected,
        };
        assert_eq!(err.to_string(), "Cannot start while disconnected");
    }
}
