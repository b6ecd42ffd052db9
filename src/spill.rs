//! Per-segment spill files.
//!
//! Each worker writes its decoded records to one JSON-Lines file keyed by
//! segment index, decoupling producer speed from consumer memory; the
//! orchestrator reads them back lazily for the final merge.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::DecodedRecord;

fn spill_path(dir: &Path, segment_id: usize) -> PathBuf {
    dir.join(format!("segment_{:04}.jsonl", segment_id))
}

/// Single-writer spill file for one segment.
pub struct SpillWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    records: u64,
}

impl SpillWriter {
    pub fn create(dir: &Path, segment_id: usize) -> Result<Self> {
        let path = spill_path(dir, segment_id);
        let file = File::create(&path)
            .with_context(|| format!("failed to create spill file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            records: 0,
        })
    }

    pub fn write(&mut self, record: &DecodedRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Flush and return the spill path plus the record count.
    pub fn finish(mut self) -> Result<(PathBuf, u64)> {
        self.writer.flush()?;
        Ok((self.path, self.records))
    }
}

/// Single-reader lazy iterator over one segment's spilled records.
pub struct SpillReader {
    reader: BufReader<File>,
    path: PathBuf,
    line: String,
}

impl SpillReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("failed to open spill file {}", path.display()))?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
            line: String::new(),
        })
    }
}

impl Iterator for SpillReader {
    type Item = Result<DecodedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => None,
            Ok(_) => Some(
                serde_json::from_str(&self.line)
                    .with_context(|| format!("corrupt spill record in {}", self.path.display())),
            ),
            Err(err) => Some(Err(err.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn sample_record(offset: usize, time_us: u64) -> DecodedRecord {
        DecodedRecord {
            message_type: "GPS".to_string(),
            fields: vec![
                ("TimeUS".to_string(), Value::UInt(time_us)),
                ("Lat".to_string(), Value::Float(12.3457)),
                ("Note".to_string(), Value::Text("hello".to_string())),
            ],
            offset,
            merge_time_us: time_us,
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpillWriter::create(dir.path(), 3).unwrap();
        let records = vec![sample_record(0, 100), sample_record(32, 200)];
        for record in &records {
            writer.write(record).unwrap();
        }
        let (path, count) = writer.finish().unwrap();
        assert_eq!(count, 2);

        let read_back: Vec<_> = SpillReader::open(path)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(read_back, records);
    }

    #[test]
    fn test_empty_spill() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SpillWriter::create(dir.path(), 0).unwrap();
        let (path, count) = writer.finish().unwrap();
        assert_eq!(count, 0);
        assert_eq!(SpillReader::open(path).unwrap().count(), 0);
    }
}
