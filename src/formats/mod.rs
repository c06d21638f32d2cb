//! Alignment sources
//!
//! In-memory records, SAM text (plain, gzip or bzip2) and indexed BAM/CRAM.

#[cfg(feature = "bam")]
pub mod bam;
pub mod sam;
pub mod source;

#[cfg(feature = "bam")]
pub use bam::BamSource;
pub use sam::{parse_sam_line, ReadGroupInfo, SamHeader, SamSource};
pub use source::{AlignmentSource, MemorySource, RecordIter};
