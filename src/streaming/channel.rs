// Channel store - named append-only sample sequences
//
// Each channel owns its own lock so ingestion on one channel never contends
// with queries on another. The store itself only maps names to channels and
// remembers insertion order; it has no locking policy of its own.

use crate::streaming::channel_kind::ChannelKind;
use crate::streaming::types::{Sample, Window};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// One named, time-ordered sequence of samples
pub struct Channel {
    name: String,
    kind: ChannelKind,
    samples: RwLock<Vec<Sample>>,

    // Publishes the sample count after every mutation
    published_len: watch::Sender<usize>,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        let (published_len, _) = watch::channel(0);
        Self {
            name: name.into(),
            kind,
            samples: RwLock::new(Vec::new()),
            published_len,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Append a sample and publish the new length
    pub fn push(&self, sample: Sample) {
        let len = {
            let mut samples = self.samples.write();
            samples.push(sample);
            samples.len()
        };
        self.published_len.send_replace(len);
    }

    /// Remove the first sample equal to `sample`; returns whether one was found
    pub fn remove_first(&self, sample: &Sample) -> bool {
        let len = {
            let mut samples = self.samples.write();
            match samples.iter().position(|s| s == sample) {
                Some(idx) => {
                    samples.remove(idx);
                    samples.len()
                }
                None => return false,
            }
        };
        self.published_len.send_replace(len);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.read().last().cloned()
    }

    /// Copy the samples selected by `window`
    ///
    /// Timestamps are non-decreasing, so the first sample at or after
    /// `start_time` is found by binary search.
    pub fn window(&self, window: Window) -> Vec<Sample> {
        let samples = self.samples.read();

        let start = match window.start_time {
            // No timestamp is at or after NaN
            Some(start_time) if start_time.is_nan() => return Vec::new(),
            Some(start_time) => samples.partition_point(|s| s.timestamp < start_time),
            None => 0,
        };

        let available = samples.len() - start;
        let count = window.num_samples.map_or(available, |n| n.min(available));

        samples[start..start + count].to_vec()
    }

    /// First and last timestamps, if the channel holds data
    pub fn time_span(&self) -> Option<(f64, f64)> {
        let samples = self.samples.read();
        match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Subscribe to sample count updates
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.published_len.subscribe()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}

/// Mapping from channel name to channel, in insertion order
#[derive(Debug, Default)]
pub struct ChannelStore {
    order: Vec<String>,
    channels: HashMap<String, Arc<Channel>>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an empty channel; returns false if the name is taken
    pub fn insert(&mut self, name: &str, kind: ChannelKind) -> bool {
        if self.channels.contains_key(name) {
            return false;
        }
        self.order.push(name.to_string());
        self.channels
            .insert(name.to_string(), Arc::new(Channel::new(name, kind)));
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Channel>> {
        let channel = self.channels.remove(name)?;
        self.order.retain(|n| n != name);
        Some(channel)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Channel>> {
        self.order.iter().filter_map(|name| self.channels.get(name))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.channels.clear();
    }
}
