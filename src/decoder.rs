//! The parallel orchestrator: preload, scan, split, fan-out, merge.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use log::{debug, error, warn};
use memmap2::Mmap;
use rayon::prelude::*;
use tempfile::TempDir;

use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use crate::models::{ByteRange, DecodedRecord, RunningMode, Warning};
use crate::registry::FormatRegistry;
use crate::scanner::{find_valid_sync_positions, split_ranges};
use crate::segment::SegmentDecoder;
use crate::spill::{SpillReader, SpillWriter};

/// Shared handle for cancelling a running decode.
///
/// Workers check the token once per frame and stop after completing the
/// current one; a cancelled run fails with [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every worker to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One completed worker's spill output.
struct SegmentSpill {
    path: PathBuf,
    records: u64,
}

/// Parallel BIN log file decoder.
///
/// Drives the whole pipeline: memory-map the file, preload the format
/// registry, scan for frame boundaries, split the file into frame-aligned
/// segments, decode them on a worker pool, and merge the per-segment spill
/// files into a single timestamp-ordered stream.
///
/// # Examples
///
/// ```no_run
/// use binlog_parser::{DecoderConfig, ParallelBinDecoder};
///
/// let config = DecoderConfig::new("flight.bin").num_workers(8);
/// let mut stream = ParallelBinDecoder::new(config).run()?;
///
/// println!("{} warnings", stream.warnings().len());
/// for record in &mut stream {
///     let record = record?;
///     println!("{} @ {:?}", record.message_type, record.time_us());
/// }
/// # Ok::<(), binlog_parser::Error>(())
/// ```
pub struct ParallelBinDecoder {
    config: DecoderConfig,
    cancel: CancelToken,
}

impl ParallelBinDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Decoder with default options for the given file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        Self::new(DecoderConfig::new(path))
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// A handle that cancels this decoder's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Decode the whole file.
    ///
    /// Returns the lazily merged record stream together with the collected
    /// warnings, or the first fatal error.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] on file open/map/spill failures
    /// - [`Error::InvalidFormat`] when the self-describing FMT schema
    ///   cannot be decoded
    /// - [`Error::Segment`] when a worker fails hard
    /// - [`Error::Cancelled`] when the cancel handle fired
    pub fn run(&self) -> Result<DecodedStream> {
        let start = Instant::now();

        let file = File::open(&self.config.file_path)?;
        let data = unsafe { Mmap::map(&file)? };

        let mut registry = FormatRegistry::bootstrap();
        let mut warnings = Vec::new();
        let fmt_count = registry
            .preload(&data, &mut warnings)
            .map_err(|err| Error::InvalidFormat(err.to_string()))?;
        debug!("Preloaded {} FMT definitions", fmt_count);

        let positions = find_valid_sync_positions(&data, &registry);
        let num_workers = self.config.num_workers.max(1);
        let ranges = split_ranges(&positions, num_workers, data.len());

        let (spill_dir, spill_guard) = match &self.config.spill_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let tmp = tempfile::tempdir()?;
                (tmp.path().to_path_buf(), Some(tmp))
            }
        };

        debug!(
            "Dispatching {} segment(s) to {} {} worker(s)",
            ranges.len(),
            num_workers,
            self.config.running_mode
        );
        let outputs = self.run_workers(&data, &registry, &ranges, &spill_dir, &mut warnings)?;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut spills = Vec::with_capacity(outputs.len());
        for (segment_id, output) in outputs.into_iter().enumerate() {
            match output {
                Ok(spill) => spills.push(spill),
                Err(err) => {
                    error!("Worker failed (segment {}): {}", segment_id, err);
                    return Err(Error::Segment {
                        segment_id,
                        detail: err.to_string(),
                    });
                }
            }
        }

        warnings.sort_by_key(|w| (w.segment_id, w.offset));
        if !self.config.collect_warnings {
            for warning in warnings.drain(..) {
                warn!("{}", warning);
            }
        }

        let stream = DecodedStream::open(spills, warnings, spill_guard)?;
        debug!(
            "Decoded {} messages in {:.2?}",
            stream.record_count(),
            start.elapsed()
        );
        Ok(stream)
    }

    /// Fan the ranges out to the worker pool and join.
    fn run_workers(
        &self,
        data: &Mmap,
        registry: &FormatRegistry,
        ranges: &[ByteRange],
        spill_dir: &Path,
        warnings: &mut Vec<Warning>,
    ) -> Result<Vec<anyhow::Result<SegmentSpill>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ranges.len().min(self.config.num_workers.max(1)))
            .thread_name(|index| format!("binlog-worker-{}", index))
            .build()
            .map_err(|err| Error::Other(format!("failed to create worker pool: {}", err)))?;

        let (warn_tx, warn_rx) = crossbeam_channel::unbounded();

        let outputs: Vec<anyhow::Result<SegmentSpill>> = pool.install(|| {
            ranges
                .par_iter()
                .enumerate()
                .map(|(segment_id, &range)| match self.config.running_mode {
                    RunningMode::Thread => {
                        self.decode_segment(data, registry, segment_id, range, spill_dir, &warn_tx)
                    }
                    RunningMode::Process => {
                        // Mappings are not portably inheritable across
                        // processes: re-open, re-map and copy the schema
                        // table per worker.
                        let file = File::open(&self.config.file_path)?;
                        let local_map = unsafe { Mmap::map(&file)? };
                        let local_registry = registry.clone();
                        self.decode_segment(
                            &local_map,
                            &local_registry,
                            segment_id,
                            range,
                            spill_dir,
                            &warn_tx,
                        )
                    }
                })
                .collect()
        });

        drop(warn_tx);
        warnings.extend(warn_rx.try_iter());
        Ok(outputs)
    }

    /// Decode one byte range, sort it by merge key and spill it to disk.
    fn decode_segment(
        &self,
        data: &[u8],
        registry: &FormatRegistry,
        segment_id: usize,
        range: ByteRange,
        spill_dir: &Path,
        warn_tx: &Sender<Warning>,
    ) -> anyhow::Result<SegmentSpill> {
        let start = Instant::now();

        let mut decoder = SegmentDecoder::new(
            data,
            registry,
            segment_id,
            range,
            self.config.message_filter.as_ref(),
            self.config.round_floats,
        );

        let mut records = Vec::new();
        for record in &mut decoder {
            if self.cancel.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            records.push(record);
        }
        records.sort_by_key(|r| (r.merge_time_us, r.offset));

        let mut writer = SpillWriter::create(spill_dir, segment_id)?;
        for record in &records {
            writer.write(record)?;
        }
        let (path, count) = writer.finish()?;

        for warning in decoder.take_warnings() {
            let _ = warn_tx.send(warning);
        }

        debug!(
            "Segment {} ({}..{}): decoded {} records in {:.2?}",
            segment_id, range.start, range.end, count, start.elapsed()
        );
        Ok(SegmentSpill {
            path,
            records: count,
        })
    }
}

/// Heap entry for the k-way merge, ordered by
/// `(TimeUS, segment_id, offset)`.
struct MergeEntry {
    segment_id: usize,
    record: DecodedRecord,
}

impl MergeEntry {
    fn key(&self) -> (u64, usize, usize) {
        (self.record.merge_time_us, self.segment_id, self.record.offset)
    }
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

/// The lazily merged, timestamp-ordered record stream of one run.
///
/// Records are pulled from the per-segment spill files on demand; nothing
/// is buffered beyond one record per segment. The stream is finite and
/// non-restartable. Warnings are complete before the first record is read.
pub struct DecodedStream {
    heap: BinaryHeap<Reverse<MergeEntry>>,
    readers: Vec<SpillReader>,
    warnings: Vec<Warning>,
    record_count: u64,
    _spill_guard: Option<TempDir>,
}

impl DecodedStream {
    fn open(
        spills: Vec<SegmentSpill>,
        warnings: Vec<Warning>,
        spill_guard: Option<TempDir>,
    ) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(spills.len());
        let mut readers = Vec::with_capacity(spills.len());
        let mut record_count = 0;

        for (segment_id, spill) in spills.into_iter().enumerate() {
            record_count += spill.records;
            let mut reader =
                SpillReader::open(&spill.path).map_err(|err| Error::Spill(err.to_string()))?;
            if let Some(first) = reader.next() {
                let record = first.map_err(|err| Error::Spill(err.to_string()))?;
                heap.push(Reverse(MergeEntry { segment_id, record }));
            }
            readers.push(reader);
        }

        Ok(Self {
            heap,
            readers,
            warnings,
            record_count,
            _spill_guard: spill_guard,
        })
    }

    /// Warnings collected during the run, ordered by segment then offset.
    /// Empty when the configuration disabled collection.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Total number of records the stream will yield.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }
}

impl Iterator for DecodedStream {
    type Item = Result<DecodedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(entry) = self.heap.pop()?;
        if let Some(next) = self.readers[entry.segment_id].next() {
            match next {
                Ok(record) => self.heap.push(Reverse(MergeEntry {
                    segment_id: entry.segment_id,
                    record,
                })),
                Err(err) => return Some(Err(Error::Spill(err.to_string()))),
            }
        }
        Some(Ok(entry.record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.heap.len(), Some(self.record_count as usize))
    }
}
