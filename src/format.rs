//! The ArduPilot field-format alphabet and the format-string compiler.
//!
//! Every character of a schema's format string denotes one fixed-width,
//! little-endian field. [`FrameCodec::compile`] turns a format string into a
//! reusable decoder; the registry caches compiled codecs keyed by the raw
//! format string so schemas sharing a format share the codec.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::models::Value;

/// One field code from the ArduPilot format alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCode {
    /// `b`: i8
    Int8,
    /// `B`: u8
    UInt8,
    /// `h`: i16
    Int16,
    /// `H`: u16
    UInt16,
    /// `i`: i32
    Int32,
    /// `I`: u32
    UInt32,
    /// `q`: i64
    Int64,
    /// `Q`: u64
    UInt64,
    /// `f`: f32
    Float32,
    /// `d`: f64
    Float64,
    /// `n`: 4-byte NUL-padded ASCII
    Char4,
    /// `N`: 16-byte NUL-padded ASCII
    Char16,
    /// `Z`: 64-byte NUL-padded ASCII
    Char64,
    /// `c`: i16 scaled by 0.01
    CentiInt16,
    /// `C`: u16 scaled by 0.01
    CentiUInt16,
    /// `e`: i32 scaled by 0.01
    CentiInt32,
    /// `E`: u32 scaled by 0.01
    CentiUInt32,
    /// `L`: i32 latitude/longitude scaled by 1e-7
    LatLon,
    /// `M`: u8 flight mode
    FlightMode,
    /// `a`: 32 x i16 array
    Int16Array,
}

impl FieldCode {
    /// Map a format character onto its field code.
    pub fn from_char(code: char) -> Option<Self> {
        match code {
            'b' => Some(FieldCode::Int8),
            'B' => Some(FieldCode::UInt8),
            'h' => Some(FieldCode::Int16),
            'H' => Some(FieldCode::UInt16),
            'i' => Some(FieldCode::Int32),
            'I' => Some(FieldCode::UInt32),
            'q' => Some(FieldCode::Int64),
            'Q' => Some(FieldCode::UInt64),
            'f' => Some(FieldCode::Float32),
            'd' => Some(FieldCode::Float64),
            'n' => Some(FieldCode::Char4),
            'N' => Some(FieldCode::Char16),
            'Z' => Some(FieldCode::Char64),
            'c' => Some(FieldCode::CentiInt16),
            'C' => Some(FieldCode::CentiUInt16),
            'e' => Some(FieldCode::CentiInt32),
            'E' => Some(FieldCode::CentiUInt32),
            'L' => Some(FieldCode::LatLon),
            'M' => Some(FieldCode::FlightMode),
            'a' => Some(FieldCode::Int16Array),
            _ => None,
        }
    }

    /// Field width in bytes.
    pub fn width(self) -> usize {
        match self {
            FieldCode::Int8 | FieldCode::UInt8 | FieldCode::FlightMode => 1,
            FieldCode::Int16
            | FieldCode::UInt16
            | FieldCode::CentiInt16
            | FieldCode::CentiUInt16 => 2,
            FieldCode::Int32
            | FieldCode::UInt32
            | FieldCode::Float32
            | FieldCode::CentiInt32
            | FieldCode::CentiUInt32
            | FieldCode::LatLon
            | FieldCode::Char4 => 4,
            FieldCode::Int64 | FieldCode::UInt64 | FieldCode::Float64 => 8,
            FieldCode::Char16 => 16,
            FieldCode::Char64 | FieldCode::Int16Array => 64,
        }
    }

    /// Scaling baked into the field code itself, if any.
    ///
    /// An explicit FMTU multiplier on the same field replaces this.
    pub fn implicit_scale(self) -> Option<f64> {
        match self {
            FieldCode::CentiInt16
            | FieldCode::CentiUInt16
            | FieldCode::CentiInt32
            | FieldCode::CentiUInt32 => Some(0.01),
            FieldCode::LatLon => Some(1e-7),
            _ => None,
        }
    }

    /// Decode one raw (unscaled) field from exactly [`width`](Self::width) bytes.
    pub fn decode(self, bytes: &[u8]) -> Value {
        match self {
            FieldCode::Int8 => Value::Int(bytes[0] as i8 as i64),
            FieldCode::UInt8 | FieldCode::FlightMode => Value::UInt(bytes[0] as u64),
            FieldCode::Int16 | FieldCode::CentiInt16 => {
                Value::Int(LittleEndian::read_i16(bytes) as i64)
            }
            FieldCode::UInt16 | FieldCode::CentiUInt16 => {
                Value::UInt(LittleEndian::read_u16(bytes) as u64)
            }
            FieldCode::Int32 | FieldCode::CentiInt32 | FieldCode::LatLon => {
                Value::Int(LittleEndian::read_i32(bytes) as i64)
            }
            FieldCode::UInt32 | FieldCode::CentiUInt32 => {
                Value::UInt(LittleEndian::read_u32(bytes) as u64)
            }
            FieldCode::Int64 => Value::Int(LittleEndian::read_i64(bytes)),
            FieldCode::UInt64 => Value::UInt(LittleEndian::read_u64(bytes)),
            FieldCode::Float32 => Value::Float(LittleEndian::read_f32(bytes) as f64),
            FieldCode::Float64 => Value::Float(LittleEndian::read_f64(bytes)),
            FieldCode::Char4 | FieldCode::Char16 | FieldCode::Char64 => {
                Value::Text(decode_text(bytes))
            }
            FieldCode::Int16Array => {
                let mut values = Vec::with_capacity(32);
                for chunk in bytes.chunks_exact(2) {
                    values.push(LittleEndian::read_i16(chunk));
                }
                Value::Array(values)
            }
        }
    }
}

/// Decode a NUL-padded ASCII field, trimming trailing NULs and dropping
/// non-ASCII bytes.
fn decode_text(bytes: &[u8]) -> String {
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

/// A compiled fixed-width frame decoder for one format string.
#[derive(Debug)]
pub struct FrameCodec {
    codes: Vec<FieldCode>,
    payload_len: usize,
}

impl FrameCodec {
    /// Compile a format string into a decoder.
    ///
    /// Fails on the first unsupported format character; the caller turns
    /// that into a `bad-format` warning and marks the schema undecodable.
    pub fn compile(format: &str) -> Result<Self> {
        let mut codes = Vec::with_capacity(format.len());
        let mut payload_len = 0;
        for code in format.chars() {
            let field = FieldCode::from_char(code)
                .ok_or_else(|| anyhow!("unsupported format code '{}' in \"{}\"", code, format))?;
            payload_len += field.width();
            codes.push(field);
        }
        Ok(Self { codes, payload_len })
    }

    /// Total payload width in bytes (frame length minus the 3-byte header).
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Field codes in schema order.
    pub fn codes(&self) -> &[FieldCode] {
        &self.codes
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.codes.len()
    }

    /// Decode an exact-length payload slice into raw field values.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<Value>> {
        if payload.len() < self.payload_len {
            return Err(anyhow!(
                "payload too short: expected {} bytes, got {}",
                self.payload_len,
                payload.len()
            ));
        }
        let mut values = Vec::with_capacity(self.codes.len());
        let mut pos = 0;
        for code in &self.codes {
            let width = code.width();
            values.push(code.decode(&payload[pos..pos + width]));
            pos += width;
        }
        Ok(values)
    }
}

/// Translate an FMTU multiplier identifier into a scale factor.
///
/// `-`, `?` and the identity factors mean "no explicit scaling"; for those
/// the field code's implicit scale still applies.
pub fn multiplier_for(id: char) -> Option<f64> {
    match id {
        '2' => Some(1e2),
        '3' => Some(1e3),
        '4' => Some(1e4),
        '5' => Some(1e5),
        '6' => Some(1e6),
        '7' => Some(1e7),
        'A' => Some(1e-1),
        'B' => Some(1e-2),
        'C' => Some(1e-3),
        'D' => Some(1e-4),
        'E' => Some(1e-5),
        'F' => Some(1e-6),
        'G' => Some(1e-7),
        // m/s -> km/h and hours -> seconds conversions
        '!' => Some(3.6),
        '/' => Some(3600.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_widths() {
        let codec = FrameCodec::compile("QbBhHiIfdnNZ").unwrap();
        assert_eq!(
            codec.payload_len(),
            8 + 1 + 1 + 2 + 2 + 4 + 4 + 4 + 8 + 4 + 16 + 64
        );
        assert_eq!(codec.field_count(), 12);
    }

    #[test]
    fn test_compile_rejects_unknown_code() {
        let err = FrameCodec::compile("Qx").unwrap_err();
        assert!(err.to_string().contains('x'));
    }

    #[test]
    fn test_decode_scalars() {
        let codec = FrameCodec::compile("bBhH").unwrap();
        let payload = [0xFF, 0xFF, 0xFE, 0xFF, 0xFE, 0xFF];
        let values = codec.decode(&payload).unwrap();
        assert_eq!(values[0], Value::Int(-1));
        assert_eq!(values[1], Value::UInt(255));
        assert_eq!(values[2], Value::Int(-2));
        assert_eq!(values[3], Value::UInt(65534));
    }

    #[test]
    fn test_decode_text_trims_trailing_nuls() {
        let mut bytes = [0u8; 16];
        bytes[..5].copy_from_slice(b"hello");
        assert_eq!(FieldCode::Char16.decode(&bytes), Value::Text("hello".into()));
    }

    #[test]
    fn test_decode_short_array() {
        let codec = FrameCodec::compile("a").unwrap();
        let mut payload = [0u8; 64];
        payload[0] = 0x01; // first element = 1
        payload[62] = 0xFF;
        payload[63] = 0xFF; // last element = -1
        let values = codec.decode(&payload).unwrap();
        match &values[0] {
            Value::Array(items) => {
                assert_eq!(items.len(), 32);
                assert_eq!(items[0], 1);
                assert_eq!(items[31], -1);
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let codec = FrameCodec::compile("I").unwrap();
        assert!(codec.decode(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn test_implicit_scales() {
        assert_eq!(FieldCode::LatLon.implicit_scale(), Some(1e-7));
        assert_eq!(FieldCode::CentiInt16.implicit_scale(), Some(0.01));
        assert_eq!(FieldCode::UInt32.implicit_scale(), None);
    }
}
