// Real-time biosignal acquisition and buffering
//
// This module connects to a streaming source, fans every multi-channel frame
// out into a time-indexed buffer, and serves latest-value and windowed queries
// to any number of concurrent readers.
//
// Architecture:
// - `channel`: Per-channel sample storage with its own lock and change publisher
// - `channel_kind`: Channel type classification from labels (EEG, EOG, markers...)
// - `buffer`: The multi-channel stream buffer (ingestion, queries, waiting)
// - `source`: Trait-based system for pluggable sources (Synthetic, File, TCP, LSL)
// - `controller`: Lifecycle management and the ingestion worker

pub mod buffer;
pub mod channel;
pub mod channel_kind;
pub mod controller;
pub mod source;
pub mod types;

pub use buffer::{BufferMetrics, ChannelSummary, StreamBuffer};
pub use channel_kind::{classify_channel_label, ChannelKind};
pub use controller::{StreamController, StreamControllerConfig, StreamEvent};
pub use source::{
    create_source, ChannelInfo, SampleFrame, SourceMetadata, StreamSource, StreamSourceConfig,
};
pub use types::{AcquisitionState, Sample, StreamError, StreamResult, StreamStats, Window};
