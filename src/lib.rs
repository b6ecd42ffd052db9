//! # BIN Log Parser
//!
//! A high-performance Rust library for decoding ArduPilot binary flight
//! logs (`.BIN`) into a single time-ordered stream of typed telemetry
//! records.
//!
//! ## Features
//!
//! - **Self-describing format**: the per-message schema table is discovered
//!   from the file's own FMT frames, including FMTU/FUNIT unit multipliers
//! - **Parallel decoding**: the file is segmented on frame boundaries and
//!   decoded by a worker pool over a shared memory mapping
//! - **Deterministic output**: the merged stream is ordered by `TimeUS`
//!   with stable tie-breaks, identical for any worker count
//! - **Bounded memory**: workers spill decoded records to per-segment
//!   files that feed a lazy k-way merge
//! - **Warnings, not aborts**: unknown types, truncated tails and
//!   undecodable schemas become warnings; only structural failures are fatal
//!
//! ## Quick Start
//!
//! ```no_run
//! use binlog_parser::ParallelBinDecoder;
//!
//! let mut stream = ParallelBinDecoder::from_file("flight.bin").run()?;
//!
//! for record in &mut stream {
//!     let record = record?;
//!     println!("{} @ {:?}", record.message_type, record.time_us());
//! }
//! # Ok::<(), binlog_parser::Error>(())
//! ```
//!
//! ## Configuration
//!
//! Every option of a run is carried by [`DecoderConfig`]:
//!
//! ```no_run
//! use binlog_parser::{DecoderConfig, ParallelBinDecoder, RunningMode};
//!
//! let config = DecoderConfig::new("flight.bin")
//!     .num_workers(8)
//!     .running_mode(RunningMode::Thread)
//!     .message_filter(["GPS", "IMU"])
//!     .round_floats(true);
//!
//! let stream = ParallelBinDecoder::new(config).run()?;
//! println!("{} records decoded", stream.record_count());
//! # Ok::<(), binlog_parser::Error>(())
//! ```
//!
//! ## Warnings
//!
//! Per-frame problems never abort a run; they accumulate alongside the
//! stream:
//!
//! ```no_run
//! use binlog_parser::ParallelBinDecoder;
//!
//! let stream = ParallelBinDecoder::from_file("flight.bin").run()?;
//! for warning in stream.warnings() {
//!     eprintln!("{}", warning);
//! }
//! # Ok::<(), binlog_parser::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! A run either yields the complete ordered stream (with a possibly empty
//! warning list) or a single fatal [`Error`]:
//!
//! ```no_run
//! use binlog_parser::{Error, ParallelBinDecoder};
//!
//! match ParallelBinDecoder::from_file("flight.bin").run() {
//!     Ok(stream) => {
//!         // Process the stream...
//!     }
//!     Err(Error::InvalidFormat(msg)) => {
//!         eprintln!("Not a decodable BIN log: {}", msg);
//!     }
//!     Err(Error::Segment { segment_id, detail }) => {
//!         eprintln!("Worker {} failed: {}", segment_id, detail);
//!     }
//!     Err(err) => {
//!         eprintln!("Error: {}", err);
//!     }
//! }
//! ```

// Public API modules
pub mod config;
pub mod decoder;
pub mod error;

// Re-export commonly used types
pub use config::DecoderConfig;
pub use decoder::{CancelToken, DecodedStream, ParallelBinDecoder};
pub use error::{Error, Result};
pub use models::{ByteRange, DecodedRecord, RunningMode, Value, Warning, WarningKind};
pub use registry::{FormatRegistry, MessageSchema};

// Internal modules (public but not part of the high-level API)
pub mod format;
pub mod models;
pub mod registry;
pub mod scanner;
pub mod segment;
pub mod spill;
