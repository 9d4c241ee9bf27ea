// Multi-channel time-indexed stream buffer
//
// Ingests timestamped samples from one acquisition worker while serving
// latest-value and windowed queries from any number of threads or async tasks.
//
// Locking:
// - the channel map sits behind a buffer-level RwLock, held only long enough
//   to look up (and clone the Arc of) a channel or to add/remove one
// - each channel has its own RwLock, held only for a push or a slice copy
//
// Every query returns an owned copy; nothing hands out references into live
// storage.

use crate::streaming::channel::{Channel, ChannelStore};
use crate::streaming::channel_kind::{classify_channel_label, ChannelKind};
use crate::streaming::types::{Sample, StreamError, StreamResult, Window};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Counters describing buffer activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BufferMetrics {
    pub total_appended: u64,
    pub total_rejected: u64,
    pub total_removed: u64,
    pub channel_count: usize,
    pub total_samples: usize,
}

/// Summary of one channel's contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub name: String,
    pub kind: ChannelKind,
    pub num_samples: usize,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
}

/// Stream buffer owning all channels of one session
#[derive(Default)]
pub struct StreamBuffer {
    store: RwLock<ChannelStore>,

    // Raw signal channels as established from source metadata
    eeg_channels: RwLock<Vec<String>>,

    // Atomic counters for lock-free metrics
    total_appended: AtomicU64,
    total_rejected: AtomicU64,
    total_removed: AtomicU64,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.store.read().get(name)
    }

    fn require_channel(&self, name: &str) -> StreamResult<Arc<Channel>> {
        self.channel(name)
            .ok_or_else(|| StreamError::ChannelNotFound(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Channel lifecycle
    // ------------------------------------------------------------------

    /// Create an empty channel, classifying its kind from the label
    ///
    /// Returns false (and logs) if a channel with that name already exists.
    pub fn add_channel(&self, name: &str) -> bool {
        self.add_channel_with_kind(name, classify_channel_label(name))
    }

    /// Create an empty channel of an explicit kind
    pub fn add_channel_with_kind(&self, name: &str, kind: ChannelKind) -> bool {
        let created = self.store.write().insert(name, kind);
        if created {
            log::debug!("Added channel {} ({:?})", name, kind);
        } else {
            log::warn!("Channel with name {} already exists", name);
        }
        created
    }

    /// Delete a channel and its samples
    ///
    /// Returns false (and logs) if no such channel exists.
    pub fn remove_channel(&self, name: &str) -> bool {
        let removed = self.store.write().remove(name).is_some();
        if removed {
            self.eeg_channels.write().retain(|n| n != name);
            log::debug!("Removed channel {}", name);
        } else {
            log::warn!("Channel with name {} does not exist", name);
        }
        removed
    }

    /// Snapshot of channel names in insertion order
    pub fn list_channels(&self) -> Vec<String> {
        self.store.read().names()
    }

    pub fn channel_kind(&self, name: &str) -> Option<ChannelKind> {
        self.channel(name).map(|c| c.kind())
    }

    /// Record which channels carry raw signal for `get_eeg_data`
    pub fn set_eeg_channels(&self, names: Vec<String>) {
        *self.eeg_channels.write() = names;
    }

    pub fn eeg_channels(&self) -> Vec<String> {
        self.eeg_channels.read().clone()
    }

    /// Discard every channel, resetting the buffer to empty
    pub fn close(&self) {
        let dropped = {
            let mut store = self.store.write();
            let count = store.len();
            store.clear();
            count
        };
        self.eeg_channels.write().clear();
        log::info!("Stream buffer closed ({} channels discarded)", dropped);
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Append a sample to a channel
    ///
    /// Hot path: an unknown channel is dropped with a debug diagnostic and
    /// `false`, never an error.
    pub fn add_data(&self, channel: &str, timestamp: f64, value: Vec<f32>) -> bool {
        match self.channel(channel) {
            Some(ch) => {
                ch.push(Sample::new(timestamp, value));
                self.total_appended.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                log::debug!("Dropping sample for unknown channel {}", channel);
                false
            }
        }
    }

    /// Remove the first sample exactly matching `sample` (timestamp and value)
    pub fn remove_data(&self, channel: &str, sample: &Sample) -> StreamResult<()> {
        let ch = self.channel(channel).ok_or_else(|| {
            log::warn!("Channel with name {} does not exist", channel);
            StreamError::ChannelNotFound(channel.to_string())
        })?;

        if ch.remove_first(sample) {
            self.total_removed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            Err(StreamError::ValueNotFound {
                channel: channel.to_string(),
                timestamp: sample.timestamp,
            })
        }
    }

    /// True iff the channel exists and holds at least one sample
    pub fn has_data(&self, channel: &str) -> bool {
        self.channel(channel).is_some_and(|c| !c.is_empty())
    }

    pub fn channel_len(&self, channel: &str) -> Option<usize> {
        self.channel(channel).map(|c| c.len())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Most recent sample of a channel
    ///
    /// A missing or empty channel yields `None` with a diagnostic.
    pub fn get_latest_data(&self, channel: &str) -> Option<Sample> {
        let Some(ch) = self.channel(channel) else {
            log::debug!("No latest data: channel {} does not exist", channel);
            return None;
        };
        let latest = ch.latest();
        if latest.is_none() {
            log::debug!("No latest data: channel {} is empty", channel);
        }
        latest
    }

    /// Most recent sample of each requested channel
    pub fn get_latest_data_batch<S: AsRef<str>>(
        &self,
        channels: &[S],
    ) -> HashMap<String, Option<Sample>> {
        channels
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), self.get_latest_data(name))
            })
            .collect()
    }

    /// Samples of one channel selected by `window`
    ///
    /// Unlike the ingestion and latest paths, an unknown channel is an error.
    pub fn get_data(&self, channel: &str, window: Window) -> StreamResult<Vec<Sample>> {
        Ok(self.require_channel(channel)?.window(window))
    }

    /// Windowed samples for several channels, each computed independently
    ///
    /// Fails without returning partial results if any channel is unknown.
    pub fn get_data_batch<S: AsRef<str>>(
        &self,
        channels: &[S],
        window: Window,
    ) -> StreamResult<HashMap<String, Vec<Sample>>> {
        let resolved = {
            let store = self.store.read();
            channels
                .iter()
                .map(|name| {
                    let name = name.as_ref();
                    store
                        .get(name)
                        .map(|ch| (name.to_string(), ch))
                        .ok_or_else(|| StreamError::ChannelNotFound(name.to_string()))
                })
                .collect::<StreamResult<Vec<_>>>()?
        };

        Ok(resolved
            .into_iter()
            .map(|(name, ch)| (name, ch.window(window)))
            .collect())
    }

    /// Windowed samples for the raw EEG channel set
    pub fn get_eeg_data(&self, window: Window) -> StreamResult<HashMap<String, Vec<Sample>>> {
        let channels = self.eeg_channels();
        self.get_data_batch(&channels, window)
    }

    /// Per-channel summaries in insertion order
    pub fn summaries(&self) -> Vec<ChannelSummary> {
        let store = self.store.read();
        store
            .iter()
            .map(|ch| {
                let span = ch.time_span();
                ChannelSummary {
                    name: ch.name().to_string(),
                    kind: ch.kind(),
                    num_samples: ch.len(),
                    first_timestamp: span.map(|(first, _)| first),
                    last_timestamp: span.map(|(_, last)| last),
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    /// Wait until `channel` holds at least `min_len` samples
    ///
    /// Resolves with the channel length. Fails with `ChannelNotFound` if the
    /// channel is unknown or removed while waiting, `Timeout` once `timeout`
    /// elapses, and `Cancelled` when `cancel` fires.
    pub async fn wait_for_samples(
        &self,
        channel: &str,
        min_len: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> StreamResult<usize> {
        // Only the receiver is kept so removal drops the sender and wakes us
        let mut rx = self.require_channel(channel)?.subscribe();

        let wait = async {
            match rx.wait_for(|len| *len >= min_len).await {
                Ok(len) => Ok(*len),
                Err(_) => Err(StreamError::ChannelNotFound(channel.to_string())),
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(StreamError::Cancelled),

            result = tokio::time::timeout(timeout, wait) => match result {
                Ok(result) => result,
                Err(_) => Err(StreamError::Timeout(format!(
                    "channel {} did not reach {} samples within {:?}",
                    channel, min_len, timeout
                ))),
            },
        }
    }

    /// Wait until `channel` has data, then return its latest sample
    pub async fn wait_for_data(
        &self,
        channel: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> StreamResult<Sample> {
        self.wait_for_samples(channel, 1, timeout, cancel).await?;
        self.get_latest_data(channel)
            .ok_or_else(|| StreamError::ChannelNotFound(channel.to_string()))
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    pub fn metrics(&self) -> BufferMetrics {
        let store = self.store.read();
        BufferMetrics {
            total_appended: self.total_appended.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
            channel_count: store.len(),
            total_samples: store.iter().map(|c| c.len()).sum(),
        }
    }

    /// Reset metrics (useful for testing or session restart)
    pub fn reset_metrics(&self) {
        self.total_appended.store(0, Ordering::Relaxed);
        self.total_rejected.store(0, Ordering::Relaxed);
        self.total_removed.store(0, Ordering::Relaxed);
    }
}
