use crate::cli::InspectArgs;
use crate::exit_codes;
use crate::output;
use neurostack::streaming::{ChannelSummary, Sample, StreamControllerConfig};
use neurostack::{StreamController, StreamError, StreamSourceConfig, Window};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Serialize)]
struct InspectOutput {
    file: String,
    sample_rate: f64,
    eeg_channels: Vec<String>,
    channels: Vec<ChannelSummary>,
    window: Window,
    data: BTreeMap<String, Vec<Sample>>,
}

pub async fn execute(args: InspectArgs) -> i32 {
    if !Path::new(&args.file).is_file() {
        eprintln!("Error: File not found: {}", args.file);
        return exit_codes::INPUT_ERROR;
    }

    let config = StreamControllerConfig {
        source_config: StreamSourceConfig::FileStream {
            path: args.file.clone(),
            realtime: false,
            loop_playback: false,
        },
        event_every_frames: 0,
        ..Default::default()
    };

    let mut controller = match StreamController::new(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    // Parse failures surface here, before any channel exists
    if let Err(e) = controller.connect().await {
        eprintln!("Failed to load {}: {}", args.file, e);
        return exit_codes::SOURCE_ERROR;
    }

    let replay = match controller.start().await {
        Ok(()) => controller.finish().await,
        Err(e) => Err(e),
    };
    if let Err(e) = replay {
        eprintln!("Replay failed: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    let buffer = controller.buffer();
    let window = Window {
        start_time: args.start,
        num_samples: args.num,
    };
    let channels = args.channels.clone().unwrap_or_else(|| buffer.eeg_channels());

    let data = match buffer.get_data_batch(&channels, window) {
        Ok(data) => data.into_iter().collect(),
        Err(StreamError::ChannelNotFound(name)) => {
            eprintln!(
                "Error: Unknown channel '{}' (available: {})",
                name,
                buffer.list_channels().join(", ")
            );
            return exit_codes::INPUT_ERROR;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let result = InspectOutput {
        file: args.file.clone(),
        sample_rate: controller.metadata().sample_rate,
        eeg_channels: buffer.eeg_channels(),
        channels: buffer.summaries(),
        window,
        data,
    };

    let exit_code = match output::emit(&result, args.compact, args.output.as_deref()) {
        Ok(()) => {
            if let Some(ref path) = args.output {
                eprintln!("Results written to {}", path);
            }
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    };

    if let Err(e) = controller.close().await {
        log::warn!("Failed to close file source: {}", e);
    }

    exit_code
}
