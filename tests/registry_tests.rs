mod common;

use binlog_parser::registry::{FormatRegistry, FMT_FRAME_LENGTH, FMT_TYPE_ID};
use binlog_parser::scanner::{find_valid_sync_positions, split_ranges};
use binlog_parser::{Value, WarningKind};
use common::{BinLogBuilder, PayloadBuilder};

fn preload(data: &[u8]) -> (FormatRegistry, Vec<binlog_parser::Warning>) {
    let mut registry = FormatRegistry::bootstrap();
    let mut warnings = Vec::new();
    registry.preload(data, &mut warnings).unwrap();
    (registry, warnings)
}

// ============================================================================
// BOOTSTRAP AND PRELOAD TESTS
// ============================================================================

#[test]
fn test_bootstrap_fmt_schema() {
    let registry = FormatRegistry::bootstrap();
    let fmt = registry.get(FMT_TYPE_ID).unwrap();
    assert_eq!(fmt.name, "FMT");
    assert_eq!(fmt.format, "BBnNZ");
    assert_eq!(fmt.frame_length, FMT_FRAME_LENGTH);
    assert_eq!(
        fmt.field_names,
        vec!["Type", "Length", "Name", "Format", "Columns"]
    );
}

#[test]
fn test_preload_single_fmt() {
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "QffZ", "TimeUS,Val1,Val2,Note")
        .build();
    let (registry, warnings) = preload(&data);

    assert!(warnings.is_empty());
    let schema = registry.get(200).unwrap();
    assert_eq!(schema.name, "TST");
    assert_eq!(schema.frame_length, 3 + 8 + 4 + 4 + 64);
    assert_eq!(schema.field_names, vec!["TimeUS", "Val1", "Val2", "Note"]);
    assert!(schema.codec().is_some());
    assert!(schema.scale_factors.is_empty());
}

#[test]
fn test_preload_finds_fmt_after_data_frames() {
    // A worker's segment may reference a type whose FMT frame lies later in
    // the file; the preload scan must cover the whole file.
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "B", "Flag")
        .frame(200, &[1])
        .fmt(201, "OTH", "B", "Flag")
        .frame(201, &[2])
        .build();
    let (registry, warnings) = preload(&data);

    assert!(warnings.is_empty());
    assert!(registry.get(200).is_some());
    assert!(registry.get(201).is_some());
}

#[test]
fn test_preload_rejects_non_alphanumeric_name() {
    let data = BinLogBuilder::new()
        .fmt(200, "T-ST", "B", "Flag")
        .build();
    let (registry, _) = preload(&data);
    assert!(registry.get(200).is_none());
}

#[test]
fn test_preload_unknown_format_code_marks_undecodable() {
    let data = BinLogBuilder::new()
        .fmt_with_length(200, "TST", "Qx", "TimeUS,Bad", 13)
        .build();
    let (registry, warnings) = preload(&data);

    let schema = registry.get(200).unwrap();
    assert!(schema.codec().is_none());
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::BadFormat);
    assert_eq!(warnings[0].segment_id, None);
}

#[test]
fn test_preload_field_count_mismatch_marks_undecodable() {
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "QB", "TimeUS")
        .build();
    let (registry, warnings) = preload(&data);

    assert!(registry.get(200).unwrap().codec().is_none());
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::BadFormat);
}

#[test]
fn test_preload_shared_format_shares_codec() {
    let data = BinLogBuilder::new()
        .fmt(200, "AAA", "Qff", "TimeUS,X,Y")
        .fmt(201, "BBB", "Qff", "TimeUS,U,V")
        .build();
    let (registry, _) = preload(&data);

    let a = registry.get(200).unwrap().codec().unwrap();
    let b = registry.get(201).unwrap().codec().unwrap();
    assert!(std::ptr::eq(a, b));
}

// ============================================================================
// FMTU MULTIPLIER TESTS
// ============================================================================

#[test]
fn test_fmtu_overrides_scale_factors() {
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "Qh", "TimeUS,Dist")
        .fmt(201, "FMTU", "QBNN", "TimeUS,FmtType,UnitIds,MultIds")
        .frame(
            201,
            &PayloadBuilder::new()
                .u64(5)
                .u8(200)
                .text("sm", 16)
                .text("?B", 16)
                .build(),
        )
        .build();
    let (registry, warnings) = preload(&data);

    assert!(warnings.is_empty());
    let schema = registry.get(200).unwrap();
    assert_eq!(schema.scale_factors, vec![1.0, 1e-2]);
}

#[test]
fn test_fmtu_unknown_target_warns() {
    let data = BinLogBuilder::new()
        .fmt(201, "FMTU", "QBNN", "TimeUS,FmtType,UnitIds,MultIds")
        .frame(
            201,
            &PayloadBuilder::new()
                .u64(5)
                .u8(99)
                .text("s", 16)
                .text("?", 16)
                .build(),
        )
        .build();
    let (_, warnings) = preload(&data);

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::UnknownType);
    assert!(warnings[0].detail.contains("99"));
}

#[test]
fn test_fmtu_explicit_multiplier_replaces_implicit_scale() {
    // An 'L' field implicitly scales by 1e-7; an explicit 'B' multiplier
    // (1e-2) replaces that.
    let data = BinLogBuilder::new()
        .fmt(200, "POS", "QL", "TimeUS,Lat")
        .fmt(201, "FMTU", "QBNN", "TimeUS,FmtType,UnitIds,MultIds")
        .frame(
            201,
            &PayloadBuilder::new()
                .u64(5)
                .u8(200)
                .text("sD", 16)
                .text("?B", 16)
                .build(),
        )
        .frame(200, &PayloadBuilder::new().u64(10).i32(500).build())
        .build();
    let (registry, _) = preload(&data);
    assert_eq!(registry.get(200).unwrap().scale_factors, vec![1.0, 1e-2]);

    let range = binlog_parser::ByteRange::new(0, data.len());
    let records: Vec<_> =
        binlog_parser::segment::SegmentDecoder::new(&data, &registry, 0, range, None, false)
            .collect();
    // The FMTU frame itself also decodes as an ordinary record.
    assert_eq!(records.len(), 2);
    let pos = records.iter().find(|r| r.message_type == "POS").unwrap();
    assert_eq!(pos.get("Lat"), Some(&Value::Float(5.0)));
}

// ============================================================================
// SYNC SCANNER TESTS
// ============================================================================

#[test]
fn test_scanner_accepts_chained_frames() {
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "B", "Flag")
        .frame(200, &[1])
        .frame(200, &[2])
        .build();
    let (registry, _) = preload(&data);

    let positions = find_valid_sync_positions(&data, &registry);
    assert_eq!(positions, vec![0, 89, 93]);
}

#[test]
fn test_scanner_rejects_unknown_type() {
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "B", "Flag")
        .raw(&[0xA3, 0x95, 0x42, 0x00])
        .build();
    let (registry, _) = preload(&data);

    let positions = find_valid_sync_positions(&data, &registry);
    assert_eq!(positions, vec![0]);
}

#[test]
fn test_scanner_rejects_sync_inside_payload() {
    // The payload fakes a sync prefix with a known type_id, but the frame
    // it would imply ends in the middle of real data, not at a sync.
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "I", "Word")
        .frame(200, &[0xA3, 0x95, 200, 0x00])
        .frame(200, &PayloadBuilder::new().u32(7).build())
        .build();
    let (registry, _) = preload(&data);

    let positions = find_valid_sync_positions(&data, &registry);
    assert_eq!(positions, vec![0, 89, 96]);
}

#[test]
fn test_scanner_rejects_truncated_tail_frame() {
    let data = BinLogBuilder::new()
        .fmt(200, "TST", "Q", "TimeUS")
        .frame(200, &[0x01, 0x02]) // 5 of 11 bytes
        .build();
    let (registry, _) = preload(&data);

    let positions = find_valid_sync_positions(&data, &registry);
    assert_eq!(positions, vec![0]);
}

#[test]
fn test_subrange_decode_matches_whole_file_slice() {
    let mut builder = BinLogBuilder::new().fmt(200, "TST", "QB", "TimeUS,Flag");
    for i in 0..8u8 {
        builder = builder.frame(
            200,
            &PayloadBuilder::new().u64(1_000 + i as u64).u8(i).build(),
        );
    }
    let data = builder.build();
    let (registry, _) = preload(&data);
    let positions = find_valid_sync_positions(&data, &registry);

    let whole: Vec<_> = binlog_parser::segment::SegmentDecoder::new(
        &data,
        &registry,
        0,
        binlog_parser::ByteRange::new(0, data.len()),
        None,
        false,
    )
    .collect();

    // positions[0] is the FMT frame; data frames start at positions[1].
    let sub_range = binlog_parser::ByteRange::new(positions[3], positions[7]);
    let sub: Vec<_> =
        binlog_parser::segment::SegmentDecoder::new(&data, &registry, 0, sub_range, None, false)
            .collect();

    assert_eq!(sub.as_slice(), &whole[2..6]);
}

// ============================================================================
// RANGE SPLITTER TESTS
// ============================================================================

#[test]
fn test_split_ranges_are_frame_aligned_and_disjoint() {
    let mut builder = BinLogBuilder::new().fmt(200, "TST", "B", "Flag");
    for i in 0..10 {
        builder = builder.frame(200, &[i]);
    }
    let data = builder.build();
    let (registry, _) = preload(&data);

    let positions = find_valid_sync_positions(&data, &registry);
    assert_eq!(positions.len(), 11);

    let ranges = split_ranges(&positions, 3, data.len());
    assert_eq!(ranges.len(), 3);
    assert_eq!(ranges[0].start, 0);
    assert_eq!(ranges.last().unwrap().end, data.len());
    for window in ranges.windows(2) {
        assert_eq!(window[0].end, window[1].start);
        assert!(positions.contains(&window[1].start));
    }
}
