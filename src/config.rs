use crate::streaming::{StreamControllerConfig, StreamSourceConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Environment variable pointing at a JSON client configuration file
pub const CONFIG_ENV_VAR: &str = "NEUROSTACK_CONFIG";

/// Client configuration, loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identifier attached to controller events
    #[serde(default = "default_stream_id")]
    pub stream_id: String,
    /// Where samples come from
    #[serde(default)]
    pub source: StreamSourceConfig,
    /// Interval between CLI progress reports in milliseconds
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Emit a `SamplesReceived` event every this many frames (0 disables it)
    #[serde(default = "default_event_every_frames")]
    pub event_every_frames: u64,
}

fn default_stream_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_report_interval_ms() -> u64 {
    1000
}

fn default_event_every_frames() -> u64 {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stream_id: default_stream_id(),
            source: StreamSourceConfig::default(),
            report_interval_ms: default_report_interval_ms(),
            event_every_frames: default_event_every_frames(),
        }
    }
}

impl ClientConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `$NEUROSTACK_CONFIG`, or defaults when unset
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_optional_path(env::var(CONFIG_ENV_VAR).ok())
    }

    fn from_optional_path(path: Option<String>) -> Result<Self, ConfigError> {
        match path.filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                log::info!("Loading configuration from {}", path);
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "stream_id must not be empty".to_string(),
            ));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "report_interval_ms must be greater than 0".to_string(),
            ));
        }

        match &self.source {
            StreamSourceConfig::Synthetic {
                channels,
                sample_rate,
                ..
            } => {
                if channels.is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "synthetic source needs at least one channel".to_string(),
                    ));
                }
                validate_sample_rate(*sample_rate)?;
            }
            StreamSourceConfig::FileStream { path, .. } => {
                if path.trim().is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "file source needs a path".to_string(),
                    ));
                }
            }
            StreamSourceConfig::TcpSocket {
                host,
                port,
                channels,
                sample_rate,
            } => {
                if host.trim().is_empty() || *port == 0 {
                    return Err(ConfigError::InvalidValue(format!(
                        "invalid tcp address {}:{}",
                        host, port
                    )));
                }
                if channels.is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "tcp source needs at least one channel label".to_string(),
                    ));
                }
                validate_sample_rate(*sample_rate)?;
            }
            #[cfg(feature = "lsl-support")]
            StreamSourceConfig::LslStream {
                resolve_timeout, ..
            } => {
                if matches!(resolve_timeout, Some(t) if *t <= 0.0) {
                    return Err(ConfigError::InvalidValue(
                        "resolve_timeout must be positive".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn controller_config(&self) -> StreamControllerConfig {
        StreamControllerConfig {
            stream_id: self.stream_id.clone(),
            source_config: self.source.clone(),
            event_every_frames: self.event_every_frames,
        }
    }
}

fn validate_sample_rate(sample_rate: f64) -> Result<(), ConfigError> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(format!(
            "sample_rate must be positive, got {}",
            sample_rate
        )))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert!(uuid::Uuid::parse_str(&config.stream_id).is_ok());
        assert_eq!(config.report_interval_ms, 1000);
    }

    #[test]
    fn test_load_file_source() {
        let file = write_config(
            r#"{"stream_id":"s1","source":{"type":"file","path":"rec.csv"},"report_interval_ms":250}"#,
        );
        let config = ClientConfig::load(file.path()).unwrap();

        assert_eq!(config.stream_id, "s1");
        assert_eq!(config.report_interval_ms, 250);
        assert_eq!(config.event_every_frames, 256);
        assert!(matches!(config.source, StreamSourceConfig::FileStream { .. }));
        assert_eq!(config.controller_config().stream_id, "s1");
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let file = write_config("{ not json");
        assert!(matches!(
            ClientConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ClientConfig::load("/nonexistent/neurostack.json"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig {
            report_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            source: StreamSourceConfig::TcpSocket {
                host: "localhost".to_string(),
                port: 5000,
                channels: vec![],
                sample_rate: 256.0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unset_env_path_uses_defaults() {
        assert!(ClientConfig::from_optional_path(None).is_ok());
        assert!(ClientConfig::from_optional_path(Some("  ".to_string())).is_ok());
        assert!(ClientConfig::from_optional_path(Some("/nonexistent.json".to_string())).is_err());
    }
}
