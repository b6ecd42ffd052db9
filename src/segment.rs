//! Per-segment frame decoding.
//!
//! A [`SegmentDecoder`] walks one frame-aligned byte range and yields
//! decoded records in file order, accumulating warnings for anything it
//! cannot turn into a record.

use std::collections::HashSet;

use crate::models::{ByteRange, DecodedRecord, Value, Warning, WarningKind};
use crate::registry::{FormatRegistry, FMT_TYPE_ID};

/// Iterator over the decoded records of one byte range.
pub struct SegmentDecoder<'a> {
    data: &'a [u8],
    registry: &'a FormatRegistry,
    segment_id: usize,
    range: ByteRange,
    position: usize,
    filter: Option<&'a HashSet<String>>,
    round_floats: bool,
    last_time_us: u64,
    warnings: Vec<Warning>,
    halted: bool,
}

impl<'a> SegmentDecoder<'a> {
    pub fn new(
        data: &'a [u8],
        registry: &'a FormatRegistry,
        segment_id: usize,
        range: ByteRange,
        filter: Option<&'a HashSet<String>>,
        round_floats: bool,
    ) -> Self {
        Self {
            data,
            registry,
            segment_id,
            range,
            position: range.start,
            filter,
            round_floats,
            last_time_us: 0,
            warnings: Vec::new(),
            halted: false,
        }
    }

    /// Warnings collected so far. Complete once the iterator is exhausted.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    fn push_warning(&mut self, offset: usize, kind: WarningKind, detail: String) {
        self.warnings.push(Warning {
            segment_id: Some(self.segment_id),
            offset,
            kind,
            detail,
        });
    }

    /// Advance to the next sync prefix at or after `position`, staying
    /// inside the range.
    fn find_next_sync(&self, from: usize) -> Option<usize> {
        let mut position = from;
        while position + 1 < self.range.end {
            if self.data[position] == 0xA3 && self.data[position + 1] == 0x95 {
                return Some(position);
            }
            position += 1;
        }
        None
    }

    /// Decode the payload of one frame into a record. `None` plus a warning
    /// when the payload cannot be interpreted.
    fn decode_frame(&mut self, offset: usize, type_id: u8) -> Option<DecodedRecord> {
        let schema = self
            .registry
            .get(type_id)
            .unwrap_or_else(|| unreachable!("caller checked the schema exists"));

        let Some(codec) = schema.codec() else {
            self.push_warning(
                offset,
                WarningKind::BadFormat,
                format!("{} has an undecodable format string", schema.name),
            );
            return None;
        };

        let payload = &self.data[offset + 3..offset + schema.frame_length];
        let values = match codec.decode(payload) {
            Ok(values) => values,
            Err(err) => {
                self.push_warning(offset, WarningKind::DecodeError, err.to_string());
                return None;
            }
        };

        let mut fields = Vec::with_capacity(values.len());
        for (index, (value, code)) in values.into_iter().zip(codec.codes()).enumerate() {
            let explicit = schema
                .scale_factors
                .get(index)
                .copied()
                .filter(|&f| f != 1.0 && f != 0.0);
            let scale = explicit.or_else(|| code.implicit_scale());

            let mut value = match (scale, value.as_f64()) {
                (Some(factor), Some(raw)) => Value::Float(raw * factor),
                _ => value,
            };
            if self.round_floats {
                if let Value::Float(v) = value {
                    value = Value::Float((v * 10_000.0).round() / 10_000.0);
                }
            }
            fields.push((schema.field_names[index].clone(), value));
        }

        let mut record = DecodedRecord {
            message_type: schema.name.clone(),
            fields,
            offset,
            merge_time_us: self.last_time_us,
        };
        if let Some(time_us) = record.time_us() {
            self.last_time_us = time_us;
            record.merge_time_us = time_us;
        }
        Some(record)
    }
}

impl Iterator for SegmentDecoder<'_> {
    type Item = DecodedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.halted && self.position < self.range.end {
            let offset = self.position;

            // Sync prefix check; on mismatch resync to the next marker.
            let in_sync = offset + 1 < self.range.end
                && self.data[offset] == 0xA3
                && self.data[offset + 1] == 0x95;
            if !in_sync {
                // Resync to the next marker; trailing unframed bytes simply
                // end the segment.
                match self.find_next_sync(offset) {
                    Some(next) => {
                        self.position = next;
                        continue;
                    }
                    None => {
                        self.halted = true;
                        return None;
                    }
                }
            }

            if offset + 3 > self.range.end {
                self.push_warning(
                    offset,
                    WarningKind::ShortRead,
                    "frame header truncated at segment end".to_string(),
                );
                self.halted = true;
                return None;
            }
            let type_id = self.data[offset + 2];

            let Some(schema) = self.registry.get(type_id) else {
                self.push_warning(
                    offset,
                    WarningKind::UnknownType,
                    format!("unknown message type_id {}", type_id),
                );
                self.position = offset + 3;
                continue;
            };
            let frame_length = schema.frame_length;

            if offset + frame_length > self.range.end {
                self.push_warning(
                    offset,
                    WarningKind::ShortRead,
                    format!(
                        "truncated frame: expected {} bytes, {} available",
                        frame_length,
                        self.range.end - offset
                    ),
                );
                self.halted = true;
                return None;
            }

            // FMT frames only carry schemas; they never become records.
            if type_id == FMT_TYPE_ID {
                self.position = offset + frame_length;
                continue;
            }

            if let Some(filter) = self.filter {
                if !filter.contains(&schema.name) {
                    self.position = offset + frame_length;
                    continue;
                }
            }

            self.position = offset + frame_length;
            if let Some(record) = self.decode_frame(offset, type_id) {
                return Some(record);
            }
        }
        None
    }
}
