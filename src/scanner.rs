//! Sync-boundary scanning and byte-range splitting for parallel decode.

use log::debug;

use crate::models::ByteRange;
use crate::registry::FormatRegistry;

/// Enumerate the byte offsets at which a valid message frame begins.
///
/// An offset is accepted when the two-byte sync prefix matches, the type
/// identifier is known to the registry, the whole frame fits in the file,
/// and the byte right after the frame is either EOF or the start of another
/// sync prefix. The second stage rejects sync-like byte patterns that occur
/// inside payloads. Run this after the registry preload; unknown type
/// identifiers are rejected silently here, not warned.
pub fn find_valid_sync_positions(data: &[u8], registry: &FormatRegistry) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut position = 0;

    while position + 3 < data.len() {
        if data[position] != 0xA3 || data[position + 1] != 0x95 {
            position += 1;
            continue;
        }
        if let Some(schema) = registry.get(data[position + 2]) {
            let frame_end = position + schema.frame_length;
            if frame_end <= data.len() && (frame_end == data.len() || data[frame_end] == 0xA3) {
                positions.push(position);
            }
        }
        position += 1;
    }

    debug!(
        "Sync scan: {} valid frame starts in {} bytes",
        positions.len(),
        data.len()
    );
    positions
}

/// Partition the sorted offset list into up to `num_parts` contiguous,
/// frame-aligned, half-open byte ranges of approximately equal frame count.
///
/// The last range always ends at EOF; empty chunks are dropped by
/// construction (the part count is clamped to the offset count). With no
/// valid offsets at all, the whole file becomes a single range that decodes
/// to nothing.
pub fn split_ranges(positions: &[usize], num_parts: usize, file_size: usize) -> Vec<ByteRange> {
    if positions.is_empty() {
        return vec![ByteRange::new(0, file_size)];
    }

    let num_parts = num_parts.clamp(1, positions.len());
    let per_part = positions.len() / num_parts;
    let remainder = positions.len() % num_parts;

    let mut ranges = Vec::with_capacity(num_parts);
    let mut index = 0;
    for part in 0..num_parts {
        let take = per_part + usize::from(part < remainder);
        let start = positions[index];
        let next = index + take;
        let end = if next >= positions.len() {
            file_size
        } else {
            positions[next]
        };
        ranges.push(ByteRange::new(start, end));
        index = next;
    }

    ranges
}
