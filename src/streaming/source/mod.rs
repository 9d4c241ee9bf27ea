// Pluggable acquisition sources
//
// A `StreamSource` produces one multi-channel frame per pull. The controller's
// ingestion worker owns the source while streaming and fans each frame out to
// the buffer, one `add_data` per channel. New sources can be added by:
// 1. Implementing the StreamSource trait
// 2. Adding a variant to StreamSourceConfig
// 3. Registering in the factory function
//
// Current implementations:
// - Synthetic: generated sinusoids plus noise (no hardware needed)
// - File: replay of a recorded CSV session
// - TCP: newline-delimited JSON frames
// - LSL: Lab Streaming Layer inlet (feature `lsl-support`)

mod file;
#[cfg(feature = "lsl-support")]
mod lsl;
mod synthetic;
mod tcp;

use crate::streaming::channel_kind::{classify_channel_label, ChannelKind};
use crate::streaming::types::StreamResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use file::FileStreamSource;
#[cfg(feature = "lsl-support")]
pub use self::lsl::LslStreamSource;
pub use synthetic::{SyntheticSource, MUSE_CHANNELS};
pub use tcp::TcpStreamSource;

/// Configuration for different stream source types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamSourceConfig {
    /// Generated test signal
    #[serde(rename = "synthetic")]
    Synthetic {
        #[serde(default = "default_synthetic_channels")]
        channels: Vec<String>,
        #[serde(default = "default_sample_rate")]
        sample_rate: f64,
        /// Peak amplitude in microvolts
        #[serde(default = "default_amplitude")]
        amplitude: f32,
        /// Pace frames at `sample_rate` instead of producing them as fast as possible
        #[serde(default = "default_true")]
        realtime: bool,
        /// Stop after this many frames
        #[serde(default)]
        max_samples: Option<u64>,
        #[serde(default)]
        seed: Option<u64>,
    },

    /// CSV replay: header row, timestamp column first, one column per channel
    #[serde(rename = "file")]
    FileStream {
        path: String,
        /// Pace frames by their recorded timestamps
        #[serde(default)]
        realtime: bool,
        /// Restart from the beginning at EOF
        #[serde(default)]
        loop_playback: bool,
    },

    /// TCP socket carrying NDJSON frames
    #[serde(rename = "tcp")]
    TcpSocket {
        host: String,
        port: u16,
        channels: Vec<String>,
        #[serde(default = "default_sample_rate")]
        sample_rate: f64,
    },

    /// Lab Streaming Layer (LSL) stream
    #[cfg(feature = "lsl-support")]
    #[serde(rename = "lsl")]
    LslStream {
        /// Stream name to resolve (None for any)
        #[serde(default)]
        stream_name: Option<String>,
        /// Stream type (e.g., "EEG", "Markers")
        #[serde(default)]
        stream_type: Option<String>,
        /// Source ID (unique identifier)
        #[serde(default)]
        source_id: Option<String>,
        /// Resolution timeout in seconds
        #[serde(default)]
        resolve_timeout: Option<f64>,
    },
}

fn default_synthetic_channels() -> Vec<String> {
    MUSE_CHANNELS.iter().map(|s| s.to_string()).collect()
}

fn default_sample_rate() -> f64 {
    256.0
}

fn default_amplitude() -> f32 {
    50.0
}

fn default_true() -> bool {
    true
}

impl Default for StreamSourceConfig {
    fn default() -> Self {
        Self::Synthetic {
            channels: default_synthetic_channels(),
            sample_rate: default_sample_rate(),
            amplitude: default_amplitude(),
            realtime: true,
            max_samples: None,
            seed: None,
        }
    }
}

/// One pull from a source: a timestamp and one value per channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFrame {
    /// Timestamp in the source's clock (seconds)
    pub timestamp: f64,

    /// Values in metadata channel order
    pub values: Vec<f32>,
}

/// A channel as announced by source metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub label: String,
    pub kind: ChannelKind,
}

impl ChannelInfo {
    /// Describe a channel, classifying its kind from the label
    pub fn from_label(label: impl Into<String>) -> Self {
        let label = label.into();
        let kind = classify_channel_label(&label);
        Self { label, kind }
    }
}

/// Metadata about a streaming data source
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceMetadata {
    /// Stream name (e.g., device name)
    pub name: String,

    /// Stream type (e.g., "EEG", "Markers")
    pub stream_type: String,

    /// Channels in frame order
    pub channels: Vec<ChannelInfo>,

    /// Nominal sample rate in Hz (0 for irregular streams)
    pub sample_rate: f64,

    /// Source-specific properties (e.g., device name, connection info)
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl SourceMetadata {
    pub fn channel_labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    /// Channels that carry raw signal
    ///
    /// When the source declares no EEG channel at all, every non-marker
    /// channel is treated as signal.
    pub fn eeg_channel_labels(&self) -> Vec<String> {
        let eeg: Vec<String> = self
            .channels
            .iter()
            .filter(|c| c.kind.is_eeg())
            .map(|c| c.label.clone())
            .collect();

        if !eeg.is_empty() {
            return eeg;
        }

        self.channels
            .iter()
            .filter(|c| c.kind != ChannelKind::Marker)
            .map(|c| c.label.clone())
            .collect()
    }
}

/// Trait for all acquisition sources
///
/// `pull_frame` is called repeatedly by one ingestion worker. It should
/// return within a bounded time (one sample period, a read timeout) so the
/// worker can observe a stop request between pulls.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Establish connection to the source and load its metadata
    async fn connect(&mut self) -> StreamResult<()>;

    /// Pull the next frame; `Ok(None)` signals the end of the stream
    async fn pull_frame(&mut self) -> StreamResult<Option<SampleFrame>>;

    /// Close the connection
    async fn disconnect(&mut self) -> StreamResult<()>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Get metadata about this source (channels, sample rate, etc.)
    fn metadata(&self) -> SourceMetadata;

    /// Called by the ingestion worker before its first pull of a session
    ///
    /// Paced sources drop the ticks they missed while no one was pulling.
    async fn resume(&mut self) -> StreamResult<()> {
        Ok(())
    }

    /// Offset to add to frame timestamps to map them onto the local clock
    fn time_correction(&self) -> f64 {
        0.0
    }
}

/// Factory function to create a StreamSource from configuration
pub fn create_source(config: StreamSourceConfig) -> StreamResult<Box<dyn StreamSource>> {
    match config {
        StreamSourceConfig::Synthetic {
            channels,
            sample_rate,
            amplitude,
            realtime,
            max_samples,
            seed,
        } => Ok(Box::new(SyntheticSource::new(
            channels,
            sample_rate,
            amplitude,
            realtime,
            max_samples,
            seed,
        )?)),

        StreamSourceConfig::FileStream {
            path,
            realtime,
            loop_playback,
        } => Ok(Box::new(FileStreamSource::new(path, realtime, loop_playback))),

        StreamSourceConfig::TcpSocket {
            host,
            port,
            channels,
            sample_rate,
        } => Ok(Box::new(TcpStreamSource::new(
            host,
            port,
            channels,
            sample_rate,
        )?)),

        #[cfg(feature = "lsl-support")]
        StreamSourceConfig::LslStream {
            stream_name,
            stream_type,
            source_id,
            resolve_timeout,
        } => Ok(Box::new(LslStreamSource::new(
            stream_name,
            stream_type,
            source_id,
            resolve_timeout,
        ))),
    }
}
