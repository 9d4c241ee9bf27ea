// Lab Streaming Layer (LSL) source
//
// Resolves an LSL stream on the network and pulls samples from its inlet.
// LSL is synchronous, so a dedicated reader thread owns the inlet and forwards
// frames over a bounded channel; `pull_frame` only awaits that channel.
//
// The inlet's clock offset is refreshed periodically and exposed through
// `time_correction`, so buffered timestamps land on the local LSL clock.

use super::{ChannelInfo, SampleFrame, SourceMetadata, StreamSource};
use crate::streaming::types::{StreamError, StreamResult};
use async_trait::async_trait;
use ::lsl::{StreamInfo, StreamInlet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

const FRAME_QUEUE_CAPACITY: usize = 1024;
const PULL_CHUNK_SIZE: usize = 32;
const CORRECTION_REFRESH_CHUNKS: u64 = 256;

// Bounded wait so the ingestion worker can observe stop requests
const PULL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LslStreamSource {
    stream_name: Option<String>,
    stream_type: Option<String>,
    source_id: Option<String>,
    resolve_timeout: f64,
    metadata: Option<SourceMetadata>,
    frames: Option<mpsc::Receiver<SampleFrame>>,
    shutdown: Arc<AtomicBool>,
    // f64 bits of the latest inlet time correction
    correction: Arc<AtomicU64>,
}

impl LslStreamSource {
    pub fn new(
        stream_name: Option<String>,
        stream_type: Option<String>,
        source_id: Option<String>,
        resolve_timeout: Option<f64>,
    ) -> Self {
        Self {
            stream_name,
            stream_type,
            source_id,
            resolve_timeout: resolve_timeout.unwrap_or(30.0),
            metadata: None,
            frames: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            correction: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    /// Build the resolver predicate; EEG streams are the default target
    fn predicate(&self) -> String {
        let mut predicates = Vec::new();

        if let Some(ref name) = self.stream_name {
            predicates.push(format!("name='{}'", name));
        }

        match self.stream_type {
            Some(ref stream_type) => predicates.push(format!("type='{}'", stream_type)),
            None if self.stream_name.is_none() && self.source_id.is_none() => {
                predicates.push("type='EEG'".to_string())
            }
            None => {}
        }

        if let Some(ref source_id) = self.source_id {
            predicates.push(format!("source_id='{}'", source_id));
        }

        predicates.join(" and ")
    }

    fn resolve_stream(predicate: &str, resolve_timeout: f64) -> StreamResult<StreamInfo> {
        log::info!("Resolving LSL stream: {}", predicate);

        let streams = ::lsl::resolve_bypred(predicate, 1, resolve_timeout);

        if streams.len() > 1 {
            log::warn!(
                "Found {} LSL streams matching {}, using the first",
                streams.len(),
                predicate
            );
        }

        let stream_info = streams.into_iter().next().ok_or_else(|| {
            StreamError::Connection(format!(
                "Can't find LSL stream matching {} (timeout: {}s)",
                predicate, resolve_timeout
            ))
        })?;

        log::info!(
            "Resolved LSL stream: name='{}', type='{}', channels={}, rate={} Hz",
            stream_info.name(),
            stream_info.stream_type(),
            stream_info.channel_count(),
            stream_info.sampling_rate()
        );

        Ok(stream_info)
    }

    /// Extract channel labels from the stream description
    fn extract_channel_names(stream_info: &StreamInfo) -> Vec<String> {
        let channel_count = stream_info.channel_count().max(0) as usize;

        if let Ok(xml) = stream_info.as_xml() {
            let names: Vec<String> = xml
                .lines()
                .filter_map(|line| {
                    let start = line.find("<label>")?;
                    let end = line.find("</label>")?;
                    Some(line[start + 7..end].trim().to_string())
                })
                .collect();

            if names.len() == channel_count {
                return names;
            }
        }

        (0..channel_count).map(|i| format!("Ch{}", i + 1)).collect()
    }

    fn describe(stream_info: &StreamInfo) -> SourceMetadata {
        let mut properties = HashMap::new();
        properties.insert("source_id".to_string(), stream_info.source_id().to_string());
        properties.insert("hostname".to_string(), stream_info.hostname().to_string());

        SourceMetadata {
            name: stream_info.name().to_string(),
            stream_type: stream_info.stream_type().to_string(),
            channels: Self::extract_channel_names(stream_info)
                .into_iter()
                .map(ChannelInfo::from_label)
                .collect(),
            sample_rate: stream_info.sampling_rate(),
            properties,
        }
    }

    /// Reader thread body: resolve, open the inlet, forward frames
    fn run_reader(
        predicate: String,
        resolve_timeout: f64,
        ready: oneshot::Sender<StreamResult<SourceMetadata>>,
        frames: mpsc::Sender<SampleFrame>,
        shutdown: Arc<AtomicBool>,
        correction: Arc<AtomicU64>,
    ) {
        let stream_info = match Self::resolve_stream(&predicate, resolve_timeout) {
            Ok(info) => info,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let mut inlet = match StreamInlet::new(&stream_info, 360, PULL_CHUNK_SIZE as i32, true) {
            Ok(inlet) => inlet,
            Err(e) => {
                let _ = ready.send(Err(StreamError::Connection(format!(
                    "Failed to create inlet: {:?}",
                    e
                ))));
                return;
            }
        };

        let channel_count = stream_info.channel_count().max(0) as usize;
        if ready.send(Ok(Self::describe(&stream_info))).is_err() {
            return;
        }

        let mut sample_buffer = vec![0.0f32; PULL_CHUNK_SIZE * channel_count];
        let mut timestamp_buffer = vec![0.0f64; PULL_CHUNK_SIZE];
        let mut chunks: u64 = 0;

        while !shutdown.load(Ordering::Relaxed) {
            if chunks % CORRECTION_REFRESH_CHUNKS == 0 {
                if let Ok(offset) = inlet.time_correction(1.0) {
                    correction.store(offset.to_bits(), Ordering::Relaxed);
                }
            }

            let pulled = match inlet.pull_chunk_f32(&mut sample_buffer, Some(&mut timestamp_buffer)) {
                Ok(n) => n,
                Err(e) => {
                    log::error!("LSL pull error: {:?}", e);
                    break;
                }
            };
            chunks += 1;

            if pulled == 0 {
                std::thread::sleep(std::time::Duration::from_millis(1));
                continue;
            }

            for i in 0..pulled {
                let frame = SampleFrame {
                    timestamp: timestamp_buffer[i],
                    values: sample_buffer[i * channel_count..(i + 1) * channel_count].to_vec(),
                };
                if frames.blocking_send(frame).is_err() {
                    return;
                }
            }
        }

        log::info!("LSL reader thread stopped");
    }
}

#[async_trait]
impl StreamSource for LslStreamSource {
    async fn connect(&mut self) -> StreamResult<()> {
        if self.frames.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        self.shutdown = Arc::new(AtomicBool::new(false));

        let predicate = self.predicate();
        let resolve_timeout = self.resolve_timeout;
        let shutdown = Arc::clone(&self.shutdown);
        let correction = Arc::clone(&self.correction);

        std::thread::Builder::new()
            .name("lsl".to_string())
            .spawn(move || {
                Self::run_reader(
                    predicate,
                    resolve_timeout,
                    ready_tx,
                    frame_tx,
                    shutdown,
                    correction,
                )
            })?;

        let metadata = ready_rx
            .await
            .map_err(|_| StreamError::Connection("LSL reader thread exited".to_string()))??;

        log::info!(
            "LSL stream connected: {} channels @ {} Hz",
            metadata.channels.len(),
            metadata.sample_rate
        );

        self.metadata = Some(metadata);
        self.frames = Some(frame_rx);

        Ok(())
    }

    async fn pull_frame(&mut self) -> StreamResult<Option<SampleFrame>> {
        let frames = self
            .frames
            .as_mut()
            .ok_or_else(|| StreamError::Connection("LSL stream is not connected".to_string()))?;

        match timeout(PULL_TIMEOUT, frames.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(StreamError::Connection("LSL inlet closed".to_string())),
            Err(_) => Err(StreamError::Timeout(format!(
                "no LSL sample within {:?}",
                PULL_TIMEOUT
            ))),
        }
    }

    async fn resume(&mut self) -> StreamResult<()> {
        // Frames queued while stopped belong to no session
        if let Some(frames) = self.frames.as_mut() {
            let mut dropped = 0usize;
            while frames.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                log::debug!("Dropped {} LSL frames queued while stopped", dropped);
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        log::info!("Disconnecting LSL stream");
        self.shutdown.store(true, Ordering::Relaxed);
        self.frames = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.frames.is_some()
    }

    fn metadata(&self) -> SourceMetadata {
        self.metadata.clone().unwrap_or_default()
    }

    fn time_correction(&self) -> f64 {
        f64::from_bits(self.correction.load(Ordering::Relaxed))
    }
}
