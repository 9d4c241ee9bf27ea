// Synthetic signal source
//
// Generates per-channel sinusoids (alpha band, one frequency per channel) plus
// uniform noise. Useful for:
// - Running the client without a headset attached
// - Deterministic tests (with a fixed seed and `realtime: false`)

use super::{ChannelInfo, SampleFrame, SourceMetadata, StreamSource};
use crate::streaming::types::{StreamError, StreamResult};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};

/// Muse headset channel layout
pub const MUSE_CHANNELS: &[&str] = &["TP9", "AF7", "AF8", "TP10", "Right AUX"];

const BASE_FREQUENCY_HZ: f64 = 10.0;
const NOISE_FRACTION: f32 = 0.1;

pub struct SyntheticSource {
    channels: Vec<String>,
    sample_rate: f64,
    amplitude: f32,
    realtime: bool,
    max_samples: Option<u64>,
    rng: StdRng,
    ticker: Option<Interval>,
    start_time: f64,
    samples_generated: u64,
    is_connected: bool,
}

impl SyntheticSource {
    pub fn new(
        channels: Vec<String>,
        sample_rate: f64,
        amplitude: f32,
        realtime: bool,
        max_samples: Option<u64>,
        seed: Option<u64>,
    ) -> StreamResult<Self> {
        if channels.is_empty() {
            return Err(StreamError::InvalidConfig(
                "synthetic source needs at least one channel".to_string(),
            ));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StreamError::InvalidConfig(format!(
                "invalid sample rate: {}",
                sample_rate
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            channels,
            sample_rate,
            amplitude,
            realtime,
            max_samples,
            rng,
            ticker: None,
            start_time: 0.0,
            samples_generated: 0,
            is_connected: false,
        })
    }

    fn next_frame(&mut self) -> SampleFrame {
        let t = self.samples_generated as f64 / self.sample_rate;
        let amplitude = self.amplitude;

        let values = (0..self.channels.len())
            .map(|i| {
                let phase = TAU * (BASE_FREQUENCY_HZ + i as f64) * t;
                let noise = self.rng.random_range(-1.0f32..=1.0) * amplitude * NOISE_FRACTION;
                amplitude * phase.sin() as f32 + noise
            })
            .collect();

        self.samples_generated += 1;

        SampleFrame {
            timestamp: self.start_time + t,
            values,
        }
    }
}

fn wall_clock_seconds() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0
}

#[async_trait]
impl StreamSource for SyntheticSource {
    async fn connect(&mut self) -> StreamResult<()> {
        if self.is_connected {
            return Ok(());
        }

        self.start_time = wall_clock_seconds();
        self.samples_generated = 0;

        if self.realtime {
            let mut ticker = interval(Duration::from_secs_f64(1.0 / self.sample_rate));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            self.ticker = Some(ticker);
        }

        self.is_connected = true;
        log::info!(
            "Connected to synthetic source ({} channels @ {} Hz)",
            self.channels.len(),
            self.sample_rate
        );

        Ok(())
    }

    async fn pull_frame(&mut self) -> StreamResult<Option<SampleFrame>> {
        if !self.is_connected {
            return Err(StreamError::Connection(
                "synthetic source is not connected".to_string(),
            ));
        }

        if let Some(max) = self.max_samples {
            if self.samples_generated >= max {
                log::info!("Synthetic source reached its {} sample limit", max);
                return Ok(None);
            }
        }

        if let Some(ticker) = self.ticker.as_mut() {
            ticker.tick().await;
        }

        Ok(Some(self.next_frame()))
    }

    async fn resume(&mut self) -> StreamResult<()> {
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.reset();
            // Next frame is stamped now, never earlier than the last one
            let elapsed = self.samples_generated as f64 / self.sample_rate;
            self.start_time = self.start_time.max(wall_clock_seconds() - elapsed);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        log::info!("Disconnecting synthetic source");
        self.is_connected = false;
        self.ticker = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: "Synthetic".to_string(),
            stream_type: "EEG".to_string(),
            channels: self
                .channels
                .iter()
                .map(|label| ChannelInfo::from_label(label.as_str()))
                .collect(),
            sample_rate: self.sample_rate,
            properties: [
                ("amplitude_uv".to_string(), self.amplitude.to_string()),
                ("realtime".to_string(), self.realtime.to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(max_samples: Option<u64>) -> SyntheticSource {
        let channels = MUSE_CHANNELS.iter().map(|s| s.to_string()).collect();
        SyntheticSource::new(channels, 256.0, 50.0, false, max_samples, Some(7)).unwrap()
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(SyntheticSource::new(vec![], 256.0, 1.0, false, None, None).is_err());
        assert!(SyntheticSource::new(vec!["Cz".into()], 0.0, 1.0, false, None, None).is_err());
    }

    #[tokio::test]
    async fn test_pull_before_connect_fails() {
        let mut source = source(None);
        assert!(matches!(
            source.pull_frame().await,
            Err(StreamError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_frames_are_evenly_spaced() {
        let mut source = source(Some(3));
        source.connect().await.unwrap();

        let mut frames = Vec::new();
        while let Some(frame) = source.pull_frame().await.unwrap() {
            assert_eq!(frame.values.len(), MUSE_CHANNELS.len());
            frames.push(frame);
        }

        assert_eq!(frames.len(), 3);
        let step = frames[1].timestamp - frames[0].timestamp;
        assert!((step - 1.0 / 256.0).abs() < 1e-5);
        assert!(frames[2].timestamp > frames[1].timestamp);
    }

    #[tokio::test]
    async fn test_resume_drops_ticks_missed_while_idle() {
        let mut source =
            SyntheticSource::new(vec!["Cz".into()], 100.0, 1.0, true, None, Some(3)).unwrap();
        source.connect().await.unwrap();
        source.resume().await.unwrap();

        let mut last = 0.0;
        for _ in 0..3 {
            last = source.pull_frame().await.unwrap().unwrap().timestamp;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        source.resume().await.unwrap();

        let started = std::time::Instant::now();
        let first = source.pull_frame().await.unwrap().unwrap().timestamp;
        for _ in 0..4 {
            source.pull_frame().await.unwrap();
        }

        // Five ticks at 100 Hz, not a burst of the twenty missed ones
        assert!(started.elapsed() >= std::time::Duration::from_millis(40));
        assert!(first - last > 0.15);
    }

    #[test]
    fn test_metadata_classifies_muse_layout() {
        let metadata = source(None).metadata();
        assert_eq!(metadata.channels.len(), 5);
        assert_eq!(
            metadata.eeg_channel_labels(),
            vec!["TP9", "AF7", "AF8", "TP10"]
        );
    }
}
