//! SAM adapter property tests
//!
//! Parsing of generated SAM lines and end-to-end queries over SAM files,
//! plain and gzip-compressed.

use fast_pileup::core::{flags, CacheConfig, CachingReader, CancellationToken, Strand};
use fast_pileup::formats::{parse_sam_line, AlignmentSource, SamHeader, SamSource};
use fast_pileup::layout::RowPacker;
use proptest::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

// ============================================================================
// Generators
// ============================================================================

fn arb_cigar() -> impl Strategy<Value = (String, u64)> {
    prop::collection::vec((prop_oneof![Just('M'), Just('I'), Just('D'), Just('S'), Just('N')], 1u32..60), 1..6)
        .prop_map(|ops| {
            let text: String = ops.iter().map(|(op, n)| format!("{}{}", n, op)).collect();
            let span = ops
                .iter()
                .filter(|(op, _)| matches!(op, 'M' | 'D' | 'N'))
                .map(|(_, n)| *n as u64)
                .sum();
            (text, span)
        })
}

fn sam_text(records: &[(u64, &str)]) -> String {
    let mut text = String::from("@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:chr1\tLN:1000000\n");
    for (i, (pos, cigar)) in records.iter().enumerate() {
        text.push_str(&format!("r{}\t0\tchr1\t{}\t60\t{}\t*\t0\t0\t*\t*\n", i, pos, cigar));
    }
    text
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Parsed coordinates are 0-based with the CIGAR's reference span
    #[test]
    fn test_parse_coordinates(pos in 1u64..1_000_000, (cigar, span) in arb_cigar(), reverse in any::<bool>()) {
        let flag = if reverse { flags::REVERSE } else { 0 };
        let line = format!("read\t{}\tchr1\t{}\t60\t{}\t*\t0\t0\t*\t*", flag, pos, cigar);
        let record = parse_sam_line(line.as_bytes(), &SamHeader::default(), 1).unwrap();
        prop_assert_eq!(record.start, pos - 1);
        prop_assert_eq!(record.end, pos - 1 + span);
        prop_assert_eq!(record.strand(), if reverse { Strand::Minus } else { Strand::Plus });
    }

    /// Property: Unmapped reads take no reference space
    #[test]
    fn test_unmapped_zero_length(pos in 1u64..1_000_000) {
        let line = format!("u\t4\tchr1\t{}\t0\t*\t*\t0\t0\tACGT\t*", pos);
        let record = parse_sam_line(line.as_bytes(), &SamHeader::default(), 1).unwrap();
        prop_assert_eq!(record.start, record.end);
        prop_assert!(!record.is_mapped());
    }
}

#[test]
fn test_sam_file_through_cache() {
    let text = sam_text(&[(101, "50M"), (131, "50M"), (171, "20M"), (5001, "50M")]);
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(text.as_bytes()).unwrap();
    temp.flush().unwrap();

    let source = SamSource::open(temp.path()).unwrap();
    let mut reader = CachingReader::new(source, CacheConfig::default().seed(1));
    let result = reader.query("chr1", 100, 200, 100, None, &CancellationToken::new()).unwrap();
    let alignments: Vec<_> = result.alignments.collect();
    let names: Vec<&str> = alignments.iter().map(|r| r.read_name.as_str()).collect();
    assert_eq!(names, vec!["r0", "r1", "r2"]);

    // r0 [100,150) and r2 [170,190) share a row, r1 [130,180) gets its own
    let rows = RowPacker::default().pack(&alignments, 200);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 2);
}

#[test]
fn test_gzip_sam_source() {
    let text = sam_text(&[(11, "10M"), (21, "10M")]);
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut temp = tempfile::Builder::new().suffix(".sam.gz").tempfile().unwrap();
    temp.write_all(&compressed).unwrap();
    temp.flush().unwrap();

    let mut source = SamSource::open(temp.path()).unwrap();
    assert_eq!(source.sequence_names(), vec!["chr1"]);
    let count = source.query("chr1", 0, 100).unwrap().filter(|r| r.is_ok()).count();
    assert_eq!(count, 2);
}

#[test]
fn test_malformed_line_surfaces_as_data_load() {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(b"@SQ\tSN:chr1\tLN:1000\nbad\tline\tchr1\n").unwrap();
    temp.flush().unwrap();

    let source = SamSource::open(temp.path()).unwrap();
    let mut reader = CachingReader::new(source, CacheConfig::default());
    match reader.query("chr1", 0, 100, 10, None, &CancellationToken::new()) {
        Err(fast_pileup::FastPileupError::DataLoad { message }) => assert!(message.contains("line 2")),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("malformed input loaded"),
    }
}
