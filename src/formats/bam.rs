//! Indexed BAM/CRAM adapter
//!
//! Uses rust-htslib for region fetches. Library and sample come from the
//! header's `@RG` lines, keyed by each record's `RG` tag.

use crate::core::error::{SourceError, SourceResult};
use crate::core::record::{flags, AlignmentRecord, CigarOp, MateInfo, Strand};
use crate::formats::sam::SamHeader;
use crate::formats::source::{AlignmentSource, RecordIter};
use rust_htslib::bam::record::{Aux, Cigar};
use rust_htslib::bam::{self, Read, Record};
use std::path::Path;

impl From<rust_htslib::errors::Error> for SourceError {
    fn from(e: rust_htslib::errors::Error) -> Self {
        SourceError::Htslib(e.to_string())
    }
}

impl CigarOp {
    pub fn from_htslib(cigar: &Cigar) -> Self {
        match cigar {
            Cigar::Match(n) => CigarOp::Match(*n),
            Cigar::Ins(n) => CigarOp::Insertion(*n),
            Cigar::Del(n) => CigarOp::Deletion(*n),
            Cigar::RefSkip(n) => CigarOp::Skip(*n),
            Cigar::SoftClip(n) => CigarOp::SoftClip(*n),
            Cigar::HardClip(n) => CigarOp::HardClip(*n),
            Cigar::Pad(n) => CigarOp::Padding(*n),
            Cigar::Equal(n) => CigarOp::Equal(*n),
            Cigar::Diff(n) => CigarOp::Diff(*n),
        }
    }
}

/// Sequence names and read-group metadata of an open file
#[derive(Debug, Clone, Default)]
struct HeaderInfo {
    names: Vec<String>,
    groups: SamHeader,
}

impl HeaderInfo {
    fn from_view(view: &bam::HeaderView) -> Self {
        let names = view
            .target_names()
            .iter()
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .collect();
        let mut groups = SamHeader::default();
        for line in String::from_utf8_lossy(view.as_bytes()).lines() {
            if line.starts_with("@RG") {
                groups.parse_line(line);
            }
        }
        Self { names, groups }
    }

    fn name(&self, tid: i32) -> Option<&str> {
        usize::try_from(tid).ok().and_then(|t| self.names.get(t)).map(String::as_str)
    }

    fn convert(&self, record: &Record) -> SourceResult<AlignmentRecord> {
        let chrom = self
            .name(record.tid())
            .ok_or_else(|| SourceError::UnknownSequence(format!("tid {}", record.tid())))?
            .to_string();
        let flag = record.flags();
        let start = record.pos().max(0) as u64;
        let cigar: Vec<CigarOp> = record.cigar().iter().map(CigarOp::from_htslib).collect();
        let end = if flag & flags::UNMAPPED != 0 {
            start
        } else {
            record.cigar().end_pos().max(record.pos()) as u64
        };

        let mate = if flag & flags::PAIRED != 0 {
            self.name(record.mtid()).map(|mate_chrom| MateInfo {
                chrom: mate_chrom.to_string(),
                start: record.mpos().max(0) as u64,
                mapped: flag & flags::MATE_UNMAPPED == 0,
                strand: if flag & flags::MATE_REVERSE != 0 { Strand::Minus } else { Strand::Plus },
            })
        } else {
            None
        };

        let read_group = match record.aux(b"RG") {
            Ok(Aux::String(rg)) => Some(rg.to_string()),
            _ => None,
        };
        let group_info = read_group.as_ref().and_then(|rg| self.groups.read_groups.get(rg));

        let mut converted = AlignmentRecord::new(String::from_utf8_lossy(record.qname()), chrom, start, end)
            .with_flags(flag)
            .with_mapping_quality(record.mapq())
            .with_sequence(record.seq().as_bytes())
            .with_insert_size(record.insert_size());
        converted.cigar = cigar;
        converted.mate = mate;
        converted.library = group_info.and_then(|g| g.library.clone());
        converted.sample = group_info.and_then(|g| g.sample.clone());
        converted.read_group = read_group;
        Ok(converted)
    }
}

/// Indexed BAM or CRAM file
pub struct BamSource {
    reader: bam::IndexedReader,
    header: HeaderInfo,
}

impl BamSource {
    /// Open a file with its `.bai`/`.csi`/`.crai` index alongside
    pub fn open<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        let reader = bam::IndexedReader::from_path(path.as_ref())?;
        let header = HeaderInfo::from_view(reader.header());
        log::debug!(
            "Opened {:?}: {} sequences, {} read groups",
            path.as_ref(), header.names.len(), header.groups.read_groups.len()
        );
        Ok(Self { reader, header })
    }

    /// Decode with extra htslib threads
    pub fn set_threads(&mut self, threads: usize) -> SourceResult<()> {
        self.reader.set_threads(threads)?;
        Ok(())
    }
}

impl AlignmentSource for BamSource {
    fn query(&mut self, chrom: &str, start: u64, end: u64) -> SourceResult<RecordIter<'_>> {
        if !self.header.names.iter().any(|n| n == chrom) {
            return Err(SourceError::UnknownSequence(chrom.to_string()));
        }
        self.reader.fetch((chrom, start as i64, end as i64))?;
        let header = &self.header;
        Ok(Box::new(self.reader.records().map(move |result| {
            let record = result?;
            header.convert(&record)
        })))
    }

    fn sequence_names(&self) -> Vec<String> {
        self.header.names.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::record::CigarString;

    #[test]
    fn test_cigar_op_from_htslib() {
        assert_eq!(CigarOp::from_htslib(&Cigar::Match(10)), CigarOp::Match(10));
        assert_eq!(CigarOp::from_htslib(&Cigar::Ins(5)), CigarOp::Insertion(5));
        assert_eq!(CigarOp::from_htslib(&Cigar::RefSkip(300)), CigarOp::Skip(300));
    }

    #[test]
    fn test_open_missing_file() {
        match BamSource::open("/nonexistent/reads.bam") {
            Err(SourceError::Htslib(_)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("opening a missing file succeeded"),
        }
    }

    #[test]
    fn test_convert_record() {
        let mut groups = SamHeader::default();
        groups.parse_line("@RG\tID:rg1\tLB:lib1\tSM:s1");
        let header = HeaderInfo { names: vec!["chr1".into(), "chr2".into()], groups };

        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::SoftClip(2), Cigar::Match(8), Cigar::Del(2)]);
        record.set(b"read1", Some(&cigar), b"ACGTACGTAC", &[30; 10]);
        record.set_tid(0);
        record.set_pos(99);
        record.set_mtid(1);
        record.set_mpos(499);
        record.set_mapq(42);
        record.set_flags(flags::PAIRED | flags::MATE_REVERSE);
        record.push_aux(b"RG", Aux::String("rg1")).unwrap();

        let converted = header.convert(&record).unwrap();
        assert_eq!(converted.read_name, "read1");
        assert_eq!((converted.start, converted.end), (99, 109));
        assert_eq!(converted.mapping_quality, 42);
        assert_eq!(converted.sequence, b"ACGTACGTAC");
        assert_eq!(converted.library.as_deref(), Some("lib1"));
        let mate = converted.mate.unwrap();
        assert_eq!((mate.chrom.as_str(), mate.start, mate.strand), ("chr2", 499, Strand::Minus));
    }
}
