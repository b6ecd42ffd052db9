/// Test utilities for building synthetic ArduPilot BIN logs
use binlog_parser::format::FieldCode;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

pub const SYNC_MARKER: [u8; 2] = [0xA3, 0x95];
pub const FMT_TYPE_ID: u8 = 0x80;

/// Builder for creating BIN test files
pub struct BinLogBuilder {
    data: Vec<u8>,
}

impl BinLogBuilder {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Add a FMT frame describing `type_id`; the declared frame length is
    /// computed from the format string.
    pub fn fmt(self, type_id: u8, name: &str, format: &str, columns: &str) -> Self {
        let payload_len: usize = format
            .chars()
            .map(|c| {
                FieldCode::from_char(c)
                    .map(FieldCode::width)
                    .unwrap_or_else(|| panic!("unknown format code {:?}", c))
            })
            .sum();
        self.fmt_with_length(type_id, name, format, columns, (payload_len + 3) as u8)
    }

    /// Add a FMT frame with an explicit declared frame length.
    pub fn fmt_with_length(
        mut self,
        type_id: u8,
        name: &str,
        format: &str,
        columns: &str,
        frame_length: u8,
    ) -> Self {
        assert!(name.len() <= 4, "name must be at most 4 bytes");
        assert!(format.len() <= 16, "format must be at most 16 bytes");
        assert!(columns.len() <= 64, "columns must be at most 64 bytes");
        self.data.extend_from_slice(&SYNC_MARKER);
        self.data.push(FMT_TYPE_ID);
        self.data.push(type_id);
        self.data.push(frame_length);
        self.push_padded(name.as_bytes(), 4);
        self.push_padded(format.as_bytes(), 16);
        self.push_padded(columns.as_bytes(), 64);
        self
    }

    /// Add a data frame: sync marker + type_id + raw payload.
    pub fn frame(mut self, type_id: u8, payload: &[u8]) -> Self {
        self.data.extend_from_slice(&SYNC_MARKER);
        self.data.push(type_id);
        self.data.extend_from_slice(payload);
        self
    }

    /// Add raw bytes verbatim (for fabricating corruption).
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    fn push_padded(&mut self, bytes: &[u8], width: usize) {
        self.data.extend_from_slice(bytes);
        self.data.resize(self.data.len() - bytes.len() + width, 0);
    }

    /// Build and return the final BIN data
    pub fn build(self) -> Vec<u8> {
        self.data
    }

    /// Write the log to a temporary .bin file and return its handle.
    pub fn write_temp(self) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".bin")
            .tempfile()
            .expect("create temp .bin file");
        file.write_all(&self.data).expect("write temp .bin file");
        file.flush().expect("flush temp .bin file");
        file
    }
}

impl Default for BinLogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for fixed-width little-endian frame payloads
pub struct PayloadBuilder {
    data: Vec<u8>,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.data.push(value);
        self
    }

    pub fn i16(mut self, value: i16) -> Self {
        self.data.write_i16::<LittleEndian>(value).unwrap();
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.data.write_u32::<LittleEndian>(value).unwrap();
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.data.write_i32::<LittleEndian>(value).unwrap();
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.data.write_u64::<LittleEndian>(value).unwrap();
        self
    }

    pub fn f32(mut self, value: f32) -> Self {
        self.data.write_f32::<LittleEndian>(value).unwrap();
        self
    }

    pub fn f64(mut self, value: f64) -> Self {
        self.data.write_f64::<LittleEndian>(value).unwrap();
        self
    }

    /// NUL-padded ASCII text of a fixed width.
    pub fn text(mut self, value: &str, width: usize) -> Self {
        assert!(value.len() <= width);
        self.data.extend_from_slice(value.as_bytes());
        self.data
            .resize(self.data.len() - value.len() + width, 0);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_frame_is_89_bytes() {
        let data = BinLogBuilder::new()
            .fmt(200, "TST", "QB", "TimeUS,Flag")
            .build();
        assert_eq!(data.len(), 89);
        assert_eq!(&data[..3], &[0xA3, 0x95, 0x80]);
        assert_eq!(data[3], 200);
        assert_eq!(data[4] as usize, 3 + 8 + 1);
        assert_eq!(&data[5..8], b"TST");
    }

    #[test]
    fn test_payload_builder_little_endian() {
        let payload = PayloadBuilder::new().u32(0x0102_0304).build();
        assert_eq!(payload, vec![0x04, 0x03, 0x02, 0x01]);
    }
}
