use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "neurostack",
    version,
    about = "EEG acquisition client with a time-indexed stream buffer",
    long_about = "Acquire multi-channel EEG samples from a synthetic generator, a recorded CSV\n\
                  session, a TCP sender or an LSL stream, and query them by timestamp.\n\
                  Set $NEUROSTACK_CONFIG or use --config to load a JSON configuration."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect to a source, stream into the buffer and report progress
    Stream(StreamArgs),
    /// Replay a CSV session into a buffer and print a windowed query
    Inspect(InspectArgs),
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").args(["synthetic", "file", "tcp"])))]
pub struct StreamArgs {
    /// JSON configuration file, default $NEUROSTACK_CONFIG (flags below override it)
    #[arg(long)]
    pub config: Option<String>,

    /// Use the synthetic signal generator
    #[arg(long, default_value_t = false)]
    pub synthetic: bool,

    /// Replay a recorded CSV session
    #[arg(long)]
    pub file: Option<String>,

    /// Receive NDJSON frames from HOST:PORT
    #[arg(long)]
    pub tcp: Option<String>,

    /// Channel labels (synthetic and tcp sources)
    #[arg(long, num_args = 1..)]
    pub channels: Option<Vec<String>>,

    /// Nominal sample rate in Hz (synthetic and tcp sources)
    #[arg(long)]
    pub rate: Option<f64>,

    /// Stop the synthetic source after this many frames
    #[arg(long)]
    pub samples: Option<u64>,

    /// Produce frames as fast as possible instead of in real time
    #[arg(long, default_value_t = false)]
    pub fast: bool,

    /// Restart file replay at end of file
    #[arg(long = "loop", default_value_t = false)]
    pub loop_playback: bool,

    /// Stop after this many seconds (default: until the source ends or Ctrl-C)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Interval between progress reports in milliseconds
    #[arg(long)]
    pub report_ms: Option<u64>,

    /// Length in seconds of the trailing window counted in each report
    #[arg(long, default_value_t = 1.0)]
    pub window: f64,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Only print the final report
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    /// CSV session file (timestamp column first, one column per channel)
    #[arg(long)]
    pub file: String,

    /// Window start time in seconds (default: first sample)
    #[arg(long)]
    pub start: Option<f64>,

    /// Maximum number of samples per channel
    #[arg(long)]
    pub num: Option<usize>,

    /// Channels to query (default: EEG channels)
    #[arg(long, num_args = 1..)]
    pub channels: Option<Vec<String>>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}
