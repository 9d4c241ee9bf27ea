// File-based source that replays a recorded session
//
// Reads a CSV file whose header names the channels:
//
//   timestamp,TP9,AF7,AF8,TP10
//   0.000,12.5,-3.1,4.0,7.7
//
// The first column is the timestamp, every other column is one channel.
// Useful for:
// - Testing streaming functionality without external hardware
// - Replaying recorded sessions

use super::{ChannelInfo, SampleFrame, SourceMetadata, StreamSource};
use crate::streaming::types::{StreamError, StreamResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::{sleep, Duration};

pub struct FileStreamSource {
    path: PathBuf,
    realtime: bool,
    loop_playback: bool,
    channels: Vec<String>,
    frames: Vec<SampleFrame>,
    metadata: Option<SourceMetadata>,
    is_connected: bool,
    current_position: usize,

    // Added to replayed timestamps so loops stay non-decreasing
    loop_offset: f64,
    last_emitted: Option<f64>,
}

impl FileStreamSource {
    pub fn new(path: String, realtime: bool, loop_playback: bool) -> Self {
        Self {
            path: PathBuf::from(path),
            realtime,
            loop_playback,
            channels: Vec::new(),
            frames: Vec::new(),
            metadata: None,
            is_connected: false,
            current_position: 0,
            loop_offset: 0.0,
            last_emitted: None,
        }
    }

    /// Time covered by one pass over the file, including one sample period
    fn loop_span(&self) -> f64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) if self.frames.len() > 1 => {
                let span = last.timestamp - first.timestamp;
                span + span / (self.frames.len() - 1) as f64
            }
            _ => 1.0,
        }
    }

    fn estimated_sample_rate(frames: &[SampleFrame]) -> f64 {
        match (frames.first(), frames.last()) {
            (Some(first), Some(last)) if frames.len() > 1 && last.timestamp > first.timestamp => {
                (frames.len() - 1) as f64 / (last.timestamp - first.timestamp)
            }
            _ => 0.0,
        }
    }
}

/// Parse a CSV session into channel labels and frames
pub(crate) fn read_csv_session(path: &Path) -> StreamResult<(Vec<String>, Vec<SampleFrame>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(StreamError::Parse(format!(
            "{}: expected a timestamp column and at least one channel column",
            path.display()
        )));
    }
    let channels: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

    let mut frames = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = row + 2;

        if record.len() != headers.len() {
            return Err(StreamError::Parse(format!(
                "{}:{}: expected {} columns, found {}",
                path.display(),
                line,
                headers.len(),
                record.len()
            )));
        }

        let timestamp: f64 = record[0].parse().map_err(|e| {
            StreamError::Parse(format!("{}:{}: bad timestamp: {}", path.display(), line, e))
        })?;

        let values = record
            .iter()
            .skip(1)
            .map(|field| {
                field.parse::<f32>().map_err(|e| {
                    StreamError::Parse(format!("{}:{}: bad value: {}", path.display(), line, e))
                })
            })
            .collect::<StreamResult<Vec<f32>>>()?;

        frames.push(SampleFrame { timestamp, values });
    }

    Ok((channels, frames))
}

#[async_trait]
impl StreamSource for FileStreamSource {
    async fn connect(&mut self) -> StreamResult<()> {
        if self.is_connected {
            return Ok(());
        }

        let path = self.path.clone();
        let (channels, frames) = tokio::task::spawn_blocking(move || read_csv_session(&path))
            .await
            .map_err(|e| StreamError::TaskJoin(e.to_string()))??;

        let sample_rate = Self::estimated_sample_rate(&frames);

        self.metadata = Some(SourceMetadata {
            name: self
                .path
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string(),
            stream_type: "EEG".to_string(),
            channels: channels.iter().map(|c| ChannelInfo::from_label(c.as_str())).collect(),
            sample_rate,
            properties: [
                ("file_path".to_string(), self.path.display().to_string()),
                ("total_samples".to_string(), frames.len().to_string()),
            ]
            .into_iter()
            .collect(),
        });

        log::info!(
            "Connected to file stream: {} ({} channels, {} samples, ~{:.1} Hz)",
            self.path.display(),
            channels.len(),
            frames.len(),
            sample_rate
        );

        self.channels = channels;
        self.frames = frames;
        self.current_position = 0;
        self.loop_offset = 0.0;
        self.last_emitted = None;
        self.is_connected = true;

        Ok(())
    }

    async fn pull_frame(&mut self) -> StreamResult<Option<SampleFrame>> {
        if !self.is_connected {
            return Err(StreamError::Connection(format!(
                "file stream {} is not connected",
                self.path.display()
            )));
        }

        if self.current_position >= self.frames.len() {
            if self.loop_playback && !self.frames.is_empty() {
                self.current_position = 0;
                self.loop_offset += self.loop_span();
                log::debug!("File stream looping (offset {:.3}s)", self.loop_offset);
            } else {
                log::info!("File stream reached EOF");
                return Ok(None);
            }
        }

        let mut frame = self.frames[self.current_position].clone();
        frame.timestamp += self.loop_offset;
        self.current_position += 1;

        if self.realtime {
            if let Some(previous) = self.last_emitted {
                let delay = frame.timestamp - previous;
                if delay > 0.0 {
                    sleep(Duration::from_secs_f64(delay)).await;
                }
            }
        }
        self.last_emitted = Some(frame.timestamp);

        Ok(Some(frame))
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        log::info!("Disconnecting file stream");
        self.is_connected = false;
        self.current_position = 0;
        self.frames.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn metadata(&self) -> SourceMetadata {
        self.metadata.clone().unwrap_or_default()
    }
}
