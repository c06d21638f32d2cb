//! Locus strings (`chr1:1,000-2,000`)

use crate::core::error::LocusError;
use std::fmt;
use std::str::FromStr;

/// A 0-based, half-open range on one sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locus {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Locus {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self { chrom: chrom.into(), start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Last base of the range, for APIs taking a closed `[start, end]`
    pub fn inclusive_end(&self) -> u64 {
        self.end.saturating_sub(1).max(self.start)
    }
}

fn parse_position(s: &str) -> Result<u64, LocusError> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<u64>()
        .map_err(|_| LocusError::InvalidCoordinate(s.to_string()))
}

/// Parses 1-based inclusive coordinates; `chr:pos` selects one base
impl FromStr for Locus {
    type Err = LocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LocusError::Empty);
        }
        let Some((chrom, range)) = s.rsplit_once(':') else {
            return Err(LocusError::InvalidCoordinate(s.to_string()));
        };
        if chrom.is_empty() {
            return Err(LocusError::Empty);
        }
        let (start, end) = match range.split_once('-') {
            Some((a, b)) => (parse_position(a)?, parse_position(b)?),
            None => {
                let pos = parse_position(range)?;
                (pos, pos)
            }
        };
        if start == 0 {
            return Err(LocusError::InvalidCoordinate(range.to_string()));
        }
        if start > end {
            return Err(LocusError::InvalidRange { start, end });
        }
        Ok(Locus::new(chrom, start - 1, end))
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start + 1, self.end)
    }
}
