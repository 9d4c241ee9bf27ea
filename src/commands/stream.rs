use crate::cli::StreamArgs;
use crate::exit_codes;
use crate::output;
use neurostack::streaming::{AcquisitionState, Sample, StreamStats};
use neurostack::{ClientConfig, StreamController, StreamSourceConfig, Window};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Serialize)]
struct StreamReport {
    stream_id: String,
    state: AcquisitionState,
    stats: StreamStats,
    latest: BTreeMap<String, Option<Sample>>,
    window_seconds: f64,
    window_sizes: BTreeMap<String, usize>,
}

pub async fn execute(args: StreamArgs) -> i32 {
    let config = match build_config(&args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if !(args.window.is_finite() && args.window > 0.0) {
        eprintln!("Error: --window must be a positive number of seconds");
        return exit_codes::INPUT_ERROR;
    }

    let mut controller = match StreamController::new(config.controller_config()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Err(e) = controller.connect().await {
        eprintln!("Failed to connect to source: {}", e);
        return exit_codes::SOURCE_ERROR;
    }

    if !args.quiet {
        let metadata = controller.metadata();
        eprintln!(
            "Connected to {} ({} channels @ {} Hz)",
            metadata.name,
            metadata.channels.len(),
            metadata.sample_rate
        );
    }

    if let Err(e) = controller.start().await {
        eprintln!("Failed to start streaming: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    run_until_done(&controller, &config, &args).await;

    let stop_result = controller.stop().await;

    let report = build_report(&controller, args.window);
    let exit_code = match output::emit(&report, args.compact, None) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    };

    if let Err(e) = controller.close().await {
        log::warn!("Failed to close source cleanly: {}", e);
    }

    match stop_result {
        Ok(()) => exit_code,
        Err(e) => {
            eprintln!("Stream ended with error: {}", e);
            exit_codes::SOURCE_ERROR
        }
    }
}

/// Report periodically until the duration elapses, the source ends, or Ctrl-C
async fn run_until_done(controller: &StreamController, config: &ClientConfig, args: &StreamArgs) {
    let deadline = args
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs_f64(secs.max(0.0)));

    let mut ticker = tokio::time::interval(Duration::from_millis(config.report_interval_ms));
    // The first tick completes immediately
    ticker.tick().await;

    // Finite sources are noticed within this delay
    let mut poll = tokio::time::interval(Duration::from_millis(20));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let until_deadline = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupted, stopping stream");
                break;
            }
            _ = until_deadline => break,
            _ = ticker.tick() => {
                if !args.quiet {
                    let report = build_report(controller, args.window);
                    if let Err(e) = output::emit(&report, true, None) {
                        log::warn!("{}", e);
                    }
                }
            }
            _ = poll.tick() => {
                if !controller.is_ingesting() {
                    break;
                }
            }
        }
    }
}

fn build_report(controller: &StreamController, window_seconds: f64) -> StreamReport {
    let buffer = controller.buffer();
    let channels = buffer.eeg_channels();

    let latest: BTreeMap<String, Option<Sample>> =
        buffer.get_latest_data_batch(&channels).into_iter().collect();

    let window_sizes = latest
        .iter()
        .map(|(name, sample)| {
            let count = match sample {
                Some(sample) => buffer
                    .get_data(name, Window::from(sample.timestamp - window_seconds))
                    .map(|data| data.len())
                    .unwrap_or(0),
                None => 0,
            };
            (name.clone(), count)
        })
        .collect();

    StreamReport {
        stream_id: controller.id.clone(),
        state: controller.get_state(),
        stats: controller.get_stats(),
        latest,
        window_seconds,
        window_sizes,
    }
}

fn build_config(args: &StreamArgs) -> Result<ClientConfig, String> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path),
        None => ClientConfig::from_env(),
    }
    .map_err(|e| e.to_string())?;

    if let Some(path) = &args.file {
        config.source = StreamSourceConfig::FileStream {
            path: path.clone(),
            realtime: !args.fast,
            loop_playback: args.loop_playback,
        };
    } else if let Some(address) = &args.tcp {
        let (host, port) = parse_address(address)?;
        config.source = StreamSourceConfig::TcpSocket {
            host,
            port,
            channels: args
                .channels
                .clone()
                .ok_or_else(|| "--tcp requires --channels".to_string())?,
            sample_rate: args.rate.unwrap_or(256.0),
        };
    } else if args.synthetic {
        config.source = StreamSourceConfig::default();
    }

    if let StreamSourceConfig::Synthetic {
        channels,
        sample_rate,
        realtime,
        max_samples,
        ..
    } = &mut config.source
    {
        if let Some(labels) = &args.channels {
            *channels = labels.clone();
        }
        if let Some(rate) = args.rate {
            *sample_rate = rate;
        }
        if args.fast {
            *realtime = false;
        }
        if args.samples.is_some() {
            *max_samples = args.samples;
        }
    }

    if let Some(report_ms) = args.report_ms {
        config.report_interval_ms = report_ms;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn parse_address(address: &str) -> Result<(String, u16), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("Invalid address '{}': expected HOST:PORT", address))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| format!("Invalid port in '{}'", address))?;
    if host.is_empty() {
        return Err(format!("Invalid address '{}': missing host", address));
    }
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_args() -> StreamArgs {
        StreamArgs {
            config: None,
            synthetic: false,
            file: None,
            tcp: None,
            channels: None,
            rate: None,
            samples: None,
            fast: false,
            loop_playback: false,
            duration: None,
            report_ms: None,
            window: 1.0,
            compact: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("127.0.0.1:5000").unwrap(),
            ("127.0.0.1".to_string(), 5000)
        );
        assert!(parse_address("localhost").is_err());
        assert!(parse_address(":5000").is_err());
        assert!(parse_address("host:99999").is_err());
    }

    fn empty_config_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{}").unwrap();
        file
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let mut args = make_test_args();
        args.config = Some("/nonexistent/neurostack.json".to_string());
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_synthetic_overrides() {
        let file = empty_config_file();
        let mut args = make_test_args();
        args.config = Some(file.path().to_string_lossy().to_string());
        args.synthetic = true;
        args.channels = Some(vec!["Cz".to_string()]);
        args.rate = Some(128.0);
        args.samples = Some(10);
        args.fast = true;
        args.report_ms = Some(50);

        let config = build_config(&args).unwrap();
        assert_eq!(config.report_interval_ms, 50);
        match config.source {
            StreamSourceConfig::Synthetic {
                channels,
                sample_rate,
                realtime,
                max_samples,
                ..
            } => {
                assert_eq!(channels, vec!["Cz"]);
                assert_eq!(sample_rate, 128.0);
                assert!(!realtime);
                assert_eq!(max_samples, Some(10));
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_tcp_requires_channels() {
        let file = empty_config_file();
        let mut args = make_test_args();
        args.config = Some(file.path().to_string_lossy().to_string());
        args.tcp = Some("localhost:5000".to_string());
        assert!(build_config(&args).is_err());

        args.channels = Some(vec!["Cz".to_string(), "Pz".to_string()]);
        let config = build_config(&args).unwrap();
        assert!(matches!(
            config.source,
            StreamSourceConfig::TcpSocket { port: 5000, .. }
        ));
    }
}
