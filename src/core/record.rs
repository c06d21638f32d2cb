//! Alignment records
//!
//! The immutable record type every other module works with. Records are
//! produced by an [`AlignmentSource`](crate::formats::AlignmentSource) and
//! shared behind `Arc` between tiles, query results and packed rows.

use std::sync::OnceLock;

/// SAM flag bits used by the cache and the packer
pub mod flags {
    pub const PAIRED: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
    pub const VENDOR_FAILED: u16 = 0x200;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Strand orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Strand {
    #[default]
    Plus,
    Minus,
}

impl Strand {
    /// Get the complement strand
    ///
    /// # Examples
    /// ```
    /// use fast_pileup::core::Strand;
    /// assert_eq!(Strand::Plus.complement(), Strand::Minus);
    /// ```
    pub fn complement(&self) -> Self {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
        }
    }

    /// Parse strand from char
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Strand::Plus),
            '-' => Some(Strand::Minus),
            _ => None,
        }
    }

    /// Convert to char
    pub fn to_char(&self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// CIGAR operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    Match(u32),
    Insertion(u32),
    Deletion(u32),
    Skip(u32),
    SoftClip(u32),
    HardClip(u32),
    Padding(u32),
    Equal(u32),
    Diff(u32),
}

impl CigarOp {
    pub fn len(&self) -> u32 {
        match self {
            CigarOp::Match(n) | CigarOp::Insertion(n) | CigarOp::Deletion(n) |
            CigarOp::Skip(n) | CigarOp::SoftClip(n) | CigarOp::HardClip(n) |
            CigarOp::Padding(n) | CigarOp::Equal(n) | CigarOp::Diff(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn consumes_reference(&self) -> bool {
        matches!(self, CigarOp::Match(_) | CigarOp::Deletion(_) |
                 CigarOp::Skip(_) | CigarOp::Equal(_) | CigarOp::Diff(_))
    }

    pub fn consumes_query(&self) -> bool {
        matches!(self, CigarOp::Match(_) | CigarOp::Insertion(_) |
                 CigarOp::SoftClip(_) | CigarOp::Equal(_) | CigarOp::Diff(_))
    }

    /// Operation aligns read bases against reference bases
    pub fn is_aligned(&self) -> bool {
        matches!(self, CigarOp::Match(_) | CigarOp::Equal(_) | CigarOp::Diff(_))
    }

    /// Parse a SAM CIGAR string such as `10S90M2D5M`
    ///
    /// `*` parses to an empty vector.
    pub fn parse_cigar(s: &str) -> Option<Vec<CigarOp>> {
        if s == "*" {
            return Some(Vec::new());
        }
        let mut ops = Vec::new();
        let mut len: u32 = 0;
        let mut has_digits = false;
        for b in s.bytes() {
            if b.is_ascii_digit() {
                len = len.checked_mul(10)?.checked_add((b - b'0') as u32)?;
                has_digits = true;
                continue;
            }
            if !has_digits {
                return None;
            }
            ops.push(match b {
                b'M' => CigarOp::Match(len),
                b'I' => CigarOp::Insertion(len),
                b'D' => CigarOp::Deletion(len),
                b'N' => CigarOp::Skip(len),
                b'S' => CigarOp::SoftClip(len),
                b'H' => CigarOp::HardClip(len),
                b'P' => CigarOp::Padding(len),
                b'=' => CigarOp::Equal(len),
                b'X' => CigarOp::Diff(len),
                _ => return None,
            });
            len = 0;
            has_digits = false;
        }
        if has_digits {
            return None;
        }
        Some(ops)
    }

    /// Number of reference bases spanned by a CIGAR
    pub fn reference_length(cigar: &[CigarOp]) -> u32 {
        cigar.iter().filter(|op| op.consumes_reference()).map(|op| op.len()).sum()
    }
}

/// Where the mate of a paired read sits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MateInfo {
    pub chrom: String,
    /// 0-based mate start
    pub start: u64,
    pub mapped: bool,
    pub strand: Strand,
}

/// A single aligned (or unmapped but placed) read
#[derive(Debug, Default)]
pub struct AlignmentRecord {
    pub read_name: String,
    pub chrom: String,
    /// 0-based alignment start
    pub start: u64,
    /// 0-based exclusive alignment end
    pub end: u64,
    pub flags: u16,
    pub mapping_quality: u8,
    pub cigar: Vec<CigarOp>,
    /// Read bases, empty when the source did not store them
    pub sequence: Vec<u8>,
    pub read_group: Option<String>,
    pub library: Option<String>,
    pub sample: Option<String>,
    pub mate: Option<MateInfo>,
    /// Signed template length as reported by the aligner
    pub insert_size: i64,
    mate_sequence: OnceLock<Vec<u8>>,
}

impl Clone for AlignmentRecord {
    fn clone(&self) -> Self {
        let mate_sequence = OnceLock::new();
        if let Some(seq) = self.mate_sequence.get() {
            let _ = mate_sequence.set(seq.clone());
        }
        Self {
            read_name: self.read_name.clone(),
            chrom: self.chrom.clone(),
            start: self.start,
            end: self.end,
            flags: self.flags,
            mapping_quality: self.mapping_quality,
            cigar: self.cigar.clone(),
            sequence: self.sequence.clone(),
            read_group: self.read_group.clone(),
            library: self.library.clone(),
            sample: self.sample.clone(),
            mate: self.mate.clone(),
            insert_size: self.insert_size,
            mate_sequence,
        }
    }
}

impl AlignmentRecord {
    /// Create a mapped, unpaired record covering `[start, end)` with a
    /// single `M` operation
    pub fn new(read_name: impl Into<String>, chrom: impl Into<String>, start: u64, end: u64) -> Self {
        let len = end.saturating_sub(start) as u32;
        Self {
            read_name: read_name.into(),
            chrom: chrom.into(),
            start,
            end,
            mapping_quality: 60,
            cigar: vec![CigarOp::Match(len)],
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_mapping_quality(mut self, mapq: u8) -> Self {
        self.mapping_quality = mapq;
        self
    }

    pub fn with_sequence(mut self, sequence: impl Into<Vec<u8>>) -> Self {
        self.sequence = sequence.into();
        self
    }

    pub fn with_mate(mut self, mate: MateInfo) -> Self {
        self.mate = Some(mate);
        self
    }

    pub fn with_read_group(mut self, read_group: impl Into<String>) -> Self {
        self.read_group = Some(read_group.into());
        self
    }

    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = Some(sample.into());
        self
    }

    pub fn with_insert_size(mut self, insert_size: i64) -> Self {
        self.insert_size = insert_size;
        self
    }

    pub fn is_paired(&self) -> bool {
        self.flags & flags::PAIRED != 0
    }

    pub fn is_proper_pair(&self) -> bool {
        self.flags & flags::PROPER_PAIR != 0
    }

    pub fn is_mapped(&self) -> bool {
        self.flags & flags::UNMAPPED == 0
    }

    pub fn is_duplicate(&self) -> bool {
        self.flags & flags::DUPLICATE != 0
    }

    pub fn is_vendor_failed(&self) -> bool {
        self.flags & flags::VENDOR_FAILED != 0
    }

    pub fn is_first_of_pair(&self) -> bool {
        self.flags & flags::FIRST_IN_PAIR != 0
    }

    pub fn is_mate_mapped(&self) -> bool {
        match &self.mate {
            Some(mate) => mate.mapped,
            None => false,
        }
    }

    pub fn strand(&self) -> Strand {
        if self.flags & flags::REVERSE != 0 {
            Strand::Minus
        } else {
            Strand::Plus
        }
    }

    /// Reference span length
    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Sequence of the unmapped mate, copied over during a tile load
    pub fn mate_sequence(&self) -> Option<&[u8]> {
        self.mate_sequence.get().map(|s| s.as_slice())
    }

    /// Attach the unmapped mate's bases. Only the first call has an effect.
    pub fn set_mate_sequence(&self, sequence: Vec<u8>) -> bool {
        self.mate_sequence.set(sequence).is_ok()
    }

    /// Walk aligned blocks as `(reference_start, read_offset, op)` triples
    pub fn blocks(&self) -> impl Iterator<Item = (u64, usize, CigarOp)> + '_ {
        let mut ref_pos = self.start;
        let mut read_pos = 0usize;
        self.cigar.iter().map(move |op| {
            let block = (ref_pos, read_pos, *op);
            if op.consumes_reference() {
                ref_pos += op.len() as u64;
            }
            if op.consumes_query() {
                read_pos += op.len() as usize;
            }
            block
        })
    }
}
