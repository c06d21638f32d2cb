//! SAM text adapter
//!
//! Reads coordinate-sorted SAM, optionally gzip or bzip2 compressed. Each
//! query re-reads the file from the top and stops once it walks past the
//! requested range, so this adapter suits small inputs and tests; indexed
//! BAM/CRAM goes through the `bam` adapter.

use crate::core::error::{SourceError, SourceResult};
use crate::core::io::{open_text, ByteLineIterator};
use crate::core::record::{flags, AlignmentRecord, CigarOp, MateInfo, Strand};
use crate::formats::source::{overlaps, AlignmentSource, RecordIter};
use memchr::memchr_iter;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Library and sample declared by an `@RG` header line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadGroupInfo {
    pub library: Option<String>,
    pub sample: Option<String>,
}

/// `@RG` and `@SQ` information from a SAM header
#[derive(Debug, Clone, Default)]
pub struct SamHeader {
    pub read_groups: HashMap<String, ReadGroupInfo>,
    pub sequences: Vec<String>,
}

impl SamHeader {
    /// Add one `@`-line to the header
    pub fn parse_line(&mut self, line: &str) {
        let mut fields = line.split('\t');
        match fields.next() {
            Some("@SQ") => {
                if let Some(name) = fields.find_map(|f| f.strip_prefix("SN:")) {
                    self.sequences.push(name.to_string());
                }
            }
            Some("@RG") => {
                let mut id = None;
                let mut info = ReadGroupInfo::default();
                for field in fields {
                    if let Some(v) = field.strip_prefix("ID:") {
                        id = Some(v.to_string());
                    } else if let Some(v) = field.strip_prefix("LB:") {
                        info.library = Some(v.to_string());
                    } else if let Some(v) = field.strip_prefix("SM:") {
                        info.sample = Some(v.to_string());
                    }
                }
                if let Some(id) = id {
                    self.read_groups.insert(id, info);
                }
            }
            _ => {}
        }
    }
}

fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    let mut fields = Vec::with_capacity(16);
    let mut last = 0;
    for pos in memchr_iter(b'\t', line) {
        fields.push(&line[last..pos]);
        last = pos + 1;
    }
    fields.push(&line[last..]);
    fields
}

fn field_str<'a>(field: &'a [u8], line: usize, name: &str) -> SourceResult<&'a str> {
    std::str::from_utf8(field).map_err(|_| SourceError::MalformedRecord {
        line,
        message: format!("{} is not valid UTF-8", name),
    })
}

fn field_num<T: std::str::FromStr>(field: &[u8], line: usize, name: &str) -> SourceResult<T> {
    field_str(field, line, name)?
        .parse::<T>()
        .map_err(|_| SourceError::MalformedRecord {
            line,
            message: format!("invalid {} '{}'", name, String::from_utf8_lossy(field)),
        })
}

/// Parse one SAM alignment line
pub fn parse_sam_line(line: &[u8], header: &SamHeader, line_number: usize) -> SourceResult<AlignmentRecord> {
    let fields = split_fields(line);
    if fields.len() < 11 {
        return Err(SourceError::MalformedRecord {
            line: line_number,
            message: format!("expected at least 11 fields, found {}", fields.len()),
        });
    }

    let read_name = field_str(fields[0], line_number, "QNAME")?.to_string();
    let flag: u16 = field_num(fields[1], line_number, "FLAG")?;
    let chrom = field_str(fields[2], line_number, "RNAME")?.to_string();
    let pos: u64 = field_num(fields[3], line_number, "POS")?;
    let mapping_quality: u8 = field_num(fields[4], line_number, "MAPQ")?;
    let cigar_text = field_str(fields[5], line_number, "CIGAR")?;
    let cigar = CigarOp::parse_cigar(cigar_text).ok_or_else(|| SourceError::MalformedRecord {
        line: line_number,
        message: format!("invalid CIGAR '{}'", cigar_text),
    })?;
    let rnext = field_str(fields[6], line_number, "RNEXT")?;
    let pnext: u64 = field_num(fields[7], line_number, "PNEXT")?;
    let insert_size: i64 = field_num(fields[8], line_number, "TLEN")?;
    let sequence = if fields[9] == b"*" { Vec::new() } else { fields[9].to_vec() };

    let start = pos.saturating_sub(1);
    let end = if flag & flags::UNMAPPED != 0 {
        start
    } else {
        start + CigarOp::reference_length(&cigar) as u64
    };

    let mate = if flag & flags::PAIRED != 0 && rnext != "*" {
        Some(MateInfo {
            chrom: if rnext == "=" { chrom.clone() } else { rnext.to_string() },
            start: pnext.saturating_sub(1),
            mapped: flag & flags::MATE_UNMAPPED == 0,
            strand: if flag & flags::MATE_REVERSE != 0 { Strand::Minus } else { Strand::Plus },
        })
    } else {
        None
    };

    let read_group = fields[11..]
        .iter()
        .find_map(|tag| tag.strip_prefix(b"RG:Z:"))
        .map(|v| String::from_utf8_lossy(v).into_owned());
    let group_info = read_group.as_ref().and_then(|rg| header.read_groups.get(rg));

    let mut record = AlignmentRecord::new(read_name, chrom, start, end)
        .with_flags(flag)
        .with_mapping_quality(mapping_quality)
        .with_sequence(sequence)
        .with_insert_size(insert_size);
    record.cigar = cigar;
    record.mate = mate;
    record.library = group_info.and_then(|g| g.library.clone());
    record.sample = group_info.and_then(|g| g.sample.clone());
    record.read_group = read_group;
    Ok(record)
}

/// Coordinate-sorted SAM file source
#[derive(Debug, Clone)]
pub struct SamSource {
    path: PathBuf,
    header: Arc<SamHeader>,
}

impl SamSource {
    /// Open a SAM file and read its header
    pub fn open<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut lines = ByteLineIterator::new(open_text(&path)?);
        let mut header = SamHeader::default();
        while let Some(line) = lines.next_line() {
            let line = line?;
            if !line.starts_with(b"@") {
                break;
            }
            header.parse_line(&String::from_utf8_lossy(line));
        }
        log::debug!(
            "Opened {:?}: {} sequences, {} read groups",
            path, header.sequences.len(), header.read_groups.len()
        );
        Ok(Self { path, header: Arc::new(header) })
    }

    pub fn header(&self) -> &SamHeader {
        &self.header
    }
}

struct SamRecords {
    lines: ByteLineIterator<Box<dyn BufRead + Send>>,
    header: Arc<SamHeader>,
    chrom: String,
    start: u64,
    end: u64,
    in_chrom: bool,
    done: bool,
}

impl Iterator for SamRecords {
    type Item = SourceResult<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next_line()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            if line.is_empty() || line.starts_with(b"@") {
                continue;
            }
            // Cheap chromosome check before a full parse
            let rname = line.split(|&b| b == b'\t').nth(2).unwrap_or_default();
            if rname != self.chrom.as_bytes() {
                if self.in_chrom {
                    self.done = true;
                }
                continue;
            }
            self.in_chrom = true;
            let line = line.to_vec();
            let line_number = self.lines.line_number();
            let record = match parse_sam_line(&line, &self.header, line_number) {
                Ok(record) => record,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if record.start >= self.end {
                self.done = true;
                return None;
            }
            if overlaps(&record, self.start, self.end) {
                return Some(Ok(record));
            }
        }
        None
    }
}

impl AlignmentSource for SamSource {
    fn query(&mut self, chrom: &str, start: u64, end: u64) -> SourceResult<RecordIter<'_>> {
        let lines = ByteLineIterator::new(open_text(&self.path)?);
        Ok(Box::new(SamRecords {
            lines,
            header: Arc::clone(&self.header),
            chrom: chrom.to_string(),
            start,
            end,
            in_chrom: false,
            done: false,
        }))
    }

    fn sequence_names(&self) -> Vec<String> {
        self.header.sequences.clone()
    }
}
