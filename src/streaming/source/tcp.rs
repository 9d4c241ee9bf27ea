// TCP socket source
//
// Connects to a TCP server and receives frames as newline-delimited JSON:
//
//   {"timestamp": 12.004, "values": [1.0, 2.0, 3.0, 4.0]}
//
// The wire carries no metadata, so channel labels and the nominal sample rate
// come from configuration.

use super::{ChannelInfo, SampleFrame, SourceMetadata, StreamSource};
use crate::streaming::types::{StreamError, StreamResult};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// A sender silent for this long is treated as disconnected
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpStreamSource {
    host: String,
    port: u16,
    channels: Vec<String>,
    sample_rate: f64,
    reader: Option<BufReader<TcpStream>>,
    line: String,
}

impl TcpStreamSource {
    pub fn new(
        host: String,
        port: u16,
        channels: Vec<String>,
        sample_rate: f64,
    ) -> StreamResult<Self> {
        if channels.is_empty() {
            return Err(StreamError::InvalidConfig(
                "tcp source needs at least one channel label".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            channels,
            sample_rate,
            reader: None,
            line: String::new(),
        })
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn parse_line(line: &str) -> StreamResult<SampleFrame> {
        serde_json::from_str(line).map_err(|e| StreamError::Parse(format!("Invalid JSON: {}", e)))
    }
}

#[async_trait]
impl StreamSource for TcpStreamSource {
    async fn connect(&mut self) -> StreamResult<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        let addr = self.address();
        log::info!("Connecting to TCP: {}", addr);

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| StreamError::Timeout(format!("TCP connection to {} timed out", addr)))?
            .map_err(|e| StreamError::Network(format!("TCP connection failed: {}", e)))?;

        self.reader = Some(BufReader::new(stream));
        log::info!("TCP connected successfully");

        Ok(())
    }

    async fn pull_frame(&mut self) -> StreamResult<Option<SampleFrame>> {
        let addr = self.address();
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| StreamError::Connection(format!("TCP {} is not connected", addr)))?;

        loop {
            self.line.clear();

            let read = timeout(READ_TIMEOUT, reader.read_line(&mut self.line))
                .await
                .map_err(|_| {
                    StreamError::Timeout(format!("no frame from {} within {:?}", addr, READ_TIMEOUT))
                })?
                .map_err(|e| StreamError::Network(format!("TCP read error: {}", e)))?;

            if read == 0 {
                log::info!("TCP connection closed by server");
                return Ok(None);
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            match Self::parse_line(line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => {
                    // Skip the malformed frame and keep reading
                    log::warn!("Failed to parse TCP message: {}", e);
                }
            }
        }
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        log::info!("Disconnecting TCP stream");
        self.reader = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: self.address(),
            stream_type: "EEG".to_string(),
            channels: self
                .channels
                .iter()
                .map(|label| ChannelInfo::from_label(label.as_str()))
                .collect(),
            sample_rate: self.sample_rate,
            properties: [("address".to_string(), self.address())]
                .into_iter()
                .collect(),
        }
    }
}
