//! Command-line interface for the BIN log parser.
//!
//! This binary decodes one ArduPilot .BIN flight log and reports record
//! and warning counts; it exists mainly to exercise the library end to end.

use anyhow::Result;
use binlog_parser::{DecoderConfig, ParallelBinDecoder, RunningMode};
use clap::Parser;
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Decode ArduPilot .BIN flight logs in parallel",
    long_about = "A high-performance parallel decoder for ArduPilot binary flight logs.\n\n\
                  The file is segmented on frame boundaries, decoded by a worker pool\n\
                  and merged into a single TimeUS-ordered record stream."
)]
struct Args {
    /// Path to the .BIN log file
    #[arg(value_name = "LOG_FILE")]
    log_file: PathBuf,

    /// Load all options from a JSON config file instead (other flags ignored)
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Number of parallel workers (defaults to the hardware parallelism)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Worker execution strategy
    #[arg(long, value_enum, default_value = "process")]
    mode: Mode,

    /// Round f32/f64 fields to 4 decimal digits
    #[arg(long)]
    round_floats: bool,

    /// Only decode these message types (comma-separated, e.g. GPS,IMU,ATT)
    #[arg(long, value_delimiter = ',')]
    filter: Option<Vec<String>>,

    /// Directory for per-segment spill files (temporary when omitted)
    #[arg(long, value_name = "DIR")]
    spill_dir: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Process,
    Thread,
}

impl From<Mode> for RunningMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Process => RunningMode::Process,
            Mode::Thread => RunningMode::Thread,
        }
    }
}

fn build_config(args: &Args) -> Result<DecoderConfig> {
    if let Some(config_path) = &args.config {
        return Ok(DecoderConfig::from_file(config_path)?);
    }

    let mut config = DecoderConfig::new(&args.log_file)
        .running_mode(args.mode.into())
        .round_floats(args.round_floats);
    if let Some(workers) = args.workers {
        config = config.num_workers(workers);
    }
    if let Some(filter) = &args.filter {
        config = config.message_filter(filter.iter().cloned());
    }
    if let Some(dir) = &args.spill_dir {
        config = config.spill_dir(dir);
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    info!("📄 Decoding: {}", config.file_path.display());
    info!(
        "   ├─ {} worker(s), {} mode",
        config.num_workers, config.running_mode
    );

    let start_time = Instant::now();
    let decoder = ParallelBinDecoder::new(config);
    let mut stream = decoder.run()?;

    let warnings = stream.take_warnings();
    let mut total = 0u64;
    let mut first: Option<String> = None;
    for record in &mut stream {
        let record = record?;
        if first.is_none() {
            first = Some(format!(
                "{} @ {:?}",
                record.message_type,
                record.time_us()
            ));
        }
        total += 1;
    }

    info!("   ├─ Decoded {} records in {:.2?}", total, start_time.elapsed());
    if let Some(first) = first {
        info!("   ├─ First record: {}", first);
    }
    if warnings.is_empty() {
        info!("   └─ ✓ No warnings");
    } else {
        info!("   └─ ⚠ {} warning(s)", warnings.len());
        for warning in &warnings {
            log::warn!("{}", warning);
        }
    }

    Ok(())
}
