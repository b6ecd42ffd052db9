//! Decoder configuration.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::RunningMode;

fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_running_mode() -> RunningMode {
    RunningMode::Process
}

fn default_collect_warnings() -> bool {
    true
}

/// Options for one file-decoding run.
///
/// # Examples
///
/// ```no_run
/// use binlog_parser::{DecoderConfig, RunningMode};
///
/// let config = DecoderConfig::new("flight.bin")
///     .num_workers(8)
///     .running_mode(RunningMode::Thread)
///     .round_floats(true);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Path to the .BIN input file
    pub file_path: PathBuf,

    /// Worker count; defaults to the hardware parallelism
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Worker execution strategy
    #[serde(default = "default_running_mode")]
    pub running_mode: RunningMode,

    /// Round every f32/f64 field to 4 decimal digits
    #[serde(default)]
    pub round_floats: bool,

    /// When set, only these message-type names are decoded
    #[serde(default)]
    pub message_filter: Option<HashSet<String>>,

    /// Accumulate warnings in memory; when false they are logged and dropped
    #[serde(default = "default_collect_warnings")]
    pub collect_warnings: bool,

    /// Directory for per-segment spill files; a temporary directory is used
    /// when unset
    #[serde(default)]
    pub spill_dir: Option<PathBuf>,
}

impl DecoderConfig {
    /// Create a configuration with defaults for everything but the input path.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            num_workers: default_num_workers(),
            running_mode: default_running_mode(),
            round_floats: false,
            message_filter: None,
            collect_warnings: default_collect_warnings(),
            spill_dir: None,
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Set the worker count.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the worker execution strategy.
    pub fn running_mode(mut self, mode: RunningMode) -> Self {
        self.running_mode = mode;
        self
    }

    /// Enable or disable 4-digit float rounding.
    pub fn round_floats(mut self, round: bool) -> Self {
        self.round_floats = round;
        self
    }

    /// Restrict decoding to the named message types.
    pub fn message_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable in-memory warning collection.
    pub fn collect_warnings(mut self, collect: bool) -> Self {
        self.collect_warnings = collect;
        self
    }

    /// Use a fixed spill directory instead of a temporary one.
    pub fn spill_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.spill_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}
