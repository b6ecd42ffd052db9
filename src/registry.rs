//! The self-describing format subsystem: message schemas, the format
//! registry, and the FMT preload scan.
//!
//! ArduPilot BIN logs carry their own schema table as FMT frames
//! (`type_id = 0x80`). The registry is bootstrap-populated with the FMT
//! schema itself, then a linear scan over the whole file discovers every
//! FMT frame and inserts the schema it describes. The scan covers the whole
//! file because a segment handed to one worker may reference types whose
//! FMT frame lies in another worker's segment.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{debug, warn};

use crate::format::{multiplier_for, FrameCodec};
use crate::models::{Warning, WarningKind};

/// Two-byte marker preceding every frame.
pub const SYNC_MARKER: [u8; 2] = [0xA3, 0x95];
/// Type identifier of the self-describing FMT message.
pub const FMT_TYPE_ID: u8 = 0x80;
/// Total FMT frame length: 3-byte header + BBnNZ payload.
pub const FMT_FRAME_LENGTH: usize = 89;

/// The decoding schema for one message type.
#[derive(Debug, Clone)]
pub struct MessageSchema {
    /// One-byte message type identifier
    pub type_id: u8,
    /// Short ASCII name, up to 4 characters
    pub name: String,
    /// Total frame length in bytes, including the 3-byte header
    pub frame_length: usize,
    /// Raw ArduPilot format string
    pub format: String,
    /// Field names in schema order
    pub field_names: Vec<String>,
    /// Explicit per-field multipliers from FMTU/FUNIT frames; empty until
    /// one is seen. A factor of 1.0 means "no explicit scaling" for that
    /// field, letting the field code's implicit scale apply.
    pub scale_factors: Vec<f64>,
    codec: Option<Arc<FrameCodec>>,
}

impl MessageSchema {
    /// The compiled payload decoder, or `None` when the schema was marked
    /// undecodable (unsupported format code or field-count mismatch).
    pub fn codec(&self) -> Option<&FrameCodec> {
        self.codec.as_deref()
    }

    /// Index of a field by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }
}

/// Mapping from message type identifier to schema, shared read-only by all
/// workers after [`preload`](FormatRegistry::preload).
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    schemas: HashMap<u8, MessageSchema>,
    codecs: HashMap<String, Arc<FrameCodec>>,
}

impl FormatRegistry {
    /// Create a registry seeded with the hard-coded schema for the FMT
    /// message itself. This must exist before any scanning.
    pub fn bootstrap() -> Self {
        let mut registry = Self {
            schemas: HashMap::new(),
            codecs: HashMap::new(),
        };
        let format = "BBnNZ";
        let codec = registry
            .codec_for(format)
            .unwrap_or_else(|_| unreachable!("bootstrap FMT format always compiles"));
        registry.schemas.insert(
            FMT_TYPE_ID,
            MessageSchema {
                type_id: FMT_TYPE_ID,
                name: "FMT".to_string(),
                frame_length: FMT_FRAME_LENGTH,
                format: format.to_string(),
                field_names: vec![
                    "Type".to_string(),
                    "Length".to_string(),
                    "Name".to_string(),
                    "Format".to_string(),
                    "Columns".to_string(),
                ],
                scale_factors: Vec::new(),
                codec: Some(codec),
            },
        );
        registry
    }

    /// Look up the schema for a message type.
    pub fn get(&self, type_id: u8) -> Option<&MessageSchema> {
        self.schemas.get(&type_id)
    }

    /// Number of known schemas (including the FMT bootstrap entry).
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Iterate over all schemas.
    pub fn schemas(&self) -> impl Iterator<Item = &MessageSchema> {
        self.schemas.values()
    }

    /// Linear bootstrap scan: discover every FMT frame in the file, insert
    /// the schemas they describe, validate compiled widths, then apply
    /// FMTU/FUNIT multipliers. Returns the number of FMT frames parsed.
    ///
    /// The only fatal condition is a FMT frame that redefines the FMT
    /// schema itself with a format the compiler rejects.
    pub fn preload(&mut self, data: &[u8], warnings: &mut Vec<Warning>) -> Result<usize> {
        debug!("Scanning FMT messages in file of {} bytes...", data.len());

        let mut fmt_count = 0;
        let mut position = 0;
        while let Some(found) = find_pattern(data, position, &[0xA3, 0x95, FMT_TYPE_ID]) {
            if found + FMT_FRAME_LENGTH > data.len() {
                // Truncated trailing FMT; the segment decoder reports it.
                break;
            }
            if self.parse_fmt_frame(data, found, warnings)? {
                fmt_count += 1;
            }
            position = found + FMT_FRAME_LENGTH;
        }

        self.validate_schemas();
        self.apply_unit_multipliers(data, warnings);

        debug!("Total FMT definitions found: {}", fmt_count);
        Ok(fmt_count)
    }

    /// Parse one FMT frame and insert the schema it describes.
    ///
    /// Returns `false` when the frame is a sync false positive (its name is
    /// not plain alphanumeric ASCII).
    fn parse_fmt_frame(
        &mut self,
        data: &[u8],
        offset: usize,
        warnings: &mut Vec<Warning>,
    ) -> Result<bool> {
        let type_id = data[offset + 3];
        let frame_length = data[offset + 4] as usize;
        let name = trim_ascii(&data[offset + 5..offset + 9]);
        let format = trim_ascii(&data[offset + 9..offset + 25]);
        let field_names = extract_field_names(&data[offset + 25..offset + 89]);

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Ok(false);
        }
        if frame_length < 3 {
            warnings.push(Warning {
                segment_id: None,
                offset,
                kind: WarningKind::BadFormat,
                detail: format!("FMT for {} declares frame length {}", name, frame_length),
            });
            return Ok(false);
        }

        let codec = match self.codec_for(&format) {
            Ok(codec) => {
                if codec.field_count() != field_names.len() {
                    warnings.push(Warning {
                        segment_id: None,
                        offset,
                        kind: WarningKind::BadFormat,
                        detail: format!(
                            "{}: {} format codes vs {} field names",
                            name,
                            codec.field_count(),
                            field_names.len()
                        ),
                    });
                    None
                } else {
                    Some(codec)
                }
            }
            Err(err) => {
                if type_id == FMT_TYPE_ID {
                    return Err(anyhow!("FMT schema itself is undecodable: {}", err));
                }
                warnings.push(Warning {
                    segment_id: None,
                    offset,
                    kind: WarningKind::BadFormat,
                    detail: err.to_string(),
                });
                None
            }
        };

        debug!(
            "FMT {:<3} {:<8} Fields={}",
            type_id,
            name,
            field_names.len()
        );

        self.schemas.insert(
            type_id,
            MessageSchema {
                type_id,
                name,
                frame_length,
                format,
                field_names,
                scale_factors: Vec::new(),
                codec,
            },
        );
        Ok(true)
    }

    /// Compile (or fetch from cache) the codec for a format string.
    fn codec_for(&mut self, format: &str) -> Result<Arc<FrameCodec>> {
        if let Some(codec) = self.codecs.get(format) {
            return Ok(Arc::clone(codec));
        }
        let codec = Arc::new(FrameCodec::compile(format)?);
        self.codecs.insert(format.to_string(), Arc::clone(&codec));
        Ok(codec)
    }

    /// Check every decodable schema's compiled width against its declared
    /// frame length. Mismatches are logged, not fatal.
    fn validate_schemas(&self) {
        for schema in self.schemas.values() {
            if let Some(codec) = schema.codec() {
                let expected = schema.frame_length.saturating_sub(3);
                if codec.payload_len() != expected {
                    warn!(
                        "Payload width mismatch for {} (ID {}): format \"{}\" is {} bytes, frame declares {}",
                        schema.name,
                        schema.type_id,
                        schema.format,
                        codec.payload_len(),
                        expected
                    );
                }
            }
        }
    }

    /// Decode every FMTU/FUNIT frame in the file and overwrite the target
    /// schema's explicit multipliers.
    fn apply_unit_multipliers(&mut self, data: &[u8], warnings: &mut Vec<Warning>) {
        let carriers: Vec<u8> = self
            .schemas
            .values()
            .filter(|s| (s.name == "FMTU" || s.name == "FUNIT") && s.codec.is_some())
            .map(|s| s.type_id)
            .collect();

        for carrier_id in carriers {
            let carrier = self.schemas[&carrier_id].clone();
            let (Some(type_field), Some(mult_field)) = (
                carrier.field_index("FmtType"),
                carrier
                    .field_index("MultIds")
                    .or_else(|| carrier.field_index("Mult")),
            ) else {
                continue;
            };
            let codec = carrier.codec().unwrap_or_else(|| unreachable!());

            let mut position = 0;
            while let Some(found) = find_pattern(data, position, &[0xA3, 0x95, carrier_id]) {
                position = found + 1;
                if found + 3 + codec.payload_len() > data.len() {
                    break;
                }
                // Same two-stage check as the sync scanner, so multiplier
                // traffic faked by payload bytes is ignored.
                let frame_end = found + carrier.frame_length;
                if frame_end > data.len() || (frame_end < data.len() && data[frame_end] != 0xA3) {
                    continue;
                }
                let payload = &data[found + 3..found + 3 + codec.payload_len()];
                let Ok(values) = codec.decode(payload) else {
                    continue;
                };

                let Some(target_id) = values[type_field].as_u64() else {
                    continue;
                };
                let mult_ids = match &values[mult_field] {
                    crate::models::Value::Text(s) => s.clone(),
                    _ => continue,
                };

                match self.schemas.get_mut(&(target_id as u8)) {
                    Some(target) => {
                        let mut factors = vec![1.0; target.field_names.len()];
                        for (i, id) in mult_ids.chars().enumerate() {
                            if i >= factors.len() {
                                break;
                            }
                            if let Some(factor) = multiplier_for(id) {
                                factors[i] = factor;
                            }
                        }
                        target.scale_factors = factors;
                    }
                    None => {
                        warnings.push(Warning {
                            segment_id: None,
                            offset: found,
                            kind: WarningKind::UnknownType,
                            detail: format!(
                                "{} references unknown type_id {}",
                                carrier.name, target_id
                            ),
                        });
                    }
                }
            }
        }
    }
}

/// Find the next occurrence of `pattern` at or after `from`.
fn find_pattern(data: &[u8], from: usize, pattern: &[u8]) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map(|p| from + p)
}

/// Decode NUL-padded ASCII, trimming NULs and dropping non-ASCII bytes.
fn trim_ascii(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    bytes[..end]
        .iter()
        .filter(|b| b.is_ascii() && **b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Extract field names from the 64-byte Columns block: the content ends at
/// the first run of two or more NULs; spaces are stripped and names are
/// comma-separated.
fn extract_field_names(raw: &[u8]) -> Vec<String> {
    let end = raw
        .windows(2)
        .position(|pair| pair == [0, 0])
        .unwrap_or(raw.len());
    let text: String = raw[..end]
        .iter()
        .filter(|b| b.is_ascii() && **b != 0 && **b != b' ')
        .map(|&b| b as char)
        .collect();
    text.split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_contains_fmt() {
        let registry = FormatRegistry::bootstrap();
        let fmt = registry.get(FMT_TYPE_ID).unwrap();
        assert_eq!(fmt.name, "FMT");
        assert_eq!(fmt.frame_length, FMT_FRAME_LENGTH);
        assert_eq!(fmt.field_names.len(), 5);
        assert!(fmt.codec().is_some());
        // BBnNZ payload is 86 bytes; plus the 3-byte header -> 89
        assert_eq!(fmt.codec().unwrap().payload_len() + 3, FMT_FRAME_LENGTH);
    }

    #[test]
    fn test_extract_field_names() {
        let mut raw = [0u8; 64];
        raw[..21].copy_from_slice(b"TimeUS, Val1,Val2,Lat");
        assert_eq!(
            extract_field_names(&raw),
            vec!["TimeUS", "Val1", "Val2", "Lat"]
        );
    }

    #[test]
    fn test_extract_field_names_stops_at_nul_run() {
        let mut raw = [0u8; 64];
        raw[..6].copy_from_slice(b"TimeUS");
        raw[8..11].copy_from_slice(b"abc"); // garbage after the NUL run
        assert_eq!(extract_field_names(&raw), vec!["TimeUS"]);
    }

    #[test]
    fn test_find_pattern() {
        let data = [0x00, 0xA3, 0x95, 0x80, 0x00, 0xA3, 0x95, 0x80];
        assert_eq!(find_pattern(&data, 0, &[0xA3, 0x95, 0x80]), Some(1));
        assert_eq!(find_pattern(&data, 2, &[0xA3, 0x95, 0x80]), Some(5));
        assert_eq!(find_pattern(&data, 6, &[0xA3, 0x95, 0x80]), None);
    }
}
