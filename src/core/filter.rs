//! Read filtering applied while tiles load

use crate::core::record::AlignmentRecord;
use std::collections::HashSet;

/// Decides which read groups are hidden
pub trait ReadGroupFilter: Send + Sync + std::fmt::Debug {
    fn rejects(&self, record: &AlignmentRecord) -> bool;
}

/// Hide every read whose `RG` is in the set
impl ReadGroupFilter for HashSet<String> {
    fn rejects(&self, record: &AlignmentRecord) -> bool {
        match &record.read_group {
            Some(rg) => self.contains(rg),
            None => false,
        }
    }
}

/// Filter settings for a load pass
#[derive(Debug)]
pub struct ReadFilter {
    pub show_duplicates: bool,
    pub filter_vendor_failed: bool,
    pub min_mapping_quality: u8,
    pub read_group_filter: Option<Box<dyn ReadGroupFilter>>,
}

impl Default for ReadFilter {
    fn default() -> Self {
        Self {
            show_duplicates: false,
            filter_vendor_failed: true,
            min_mapping_quality: 0,
            read_group_filter: None,
        }
    }
}

impl ReadFilter {
    /// True when the record must not be added to any tile
    pub fn rejects(&self, record: &AlignmentRecord) -> bool {
        if !record.is_mapped() {
            return true;
        }
        if record.is_duplicate() && !self.show_duplicates {
            return true;
        }
        if record.is_vendor_failed() && self.filter_vendor_failed {
            return true;
        }
        if record.mapping_quality < self.min_mapping_quality {
            return true;
        }
        match &self.read_group_filter {
            Some(f) => f.rejects(record),
            None => false,
        }
    }

    pub fn with_hidden_read_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = groups.into_iter().map(Into::into).collect();
        self.read_group_filter = Some(Box::new(set));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::flags;

    #[test]
    fn test_default_filter() {
        let filter = ReadFilter::default();
        let base = AlignmentRecord::new("r", "chr1", 0, 10);
        assert!(!filter.rejects(&base));
        assert!(filter.rejects(&base.clone().with_flags(flags::UNMAPPED)));
        assert!(filter.rejects(&base.clone().with_flags(flags::DUPLICATE)));
        assert!(filter.rejects(&base.clone().with_flags(flags::VENDOR_FAILED)));
    }

    #[test]
    fn test_toggles() {
        let filter = ReadFilter {
            show_duplicates: true,
            filter_vendor_failed: false,
            min_mapping_quality: 20,
            read_group_filter: None,
        };
        let base = AlignmentRecord::new("r", "chr1", 0, 10);
        assert!(!filter.rejects(&base.clone().with_flags(flags::DUPLICATE)));
        assert!(!filter.rejects(&base.clone().with_flags(flags::VENDOR_FAILED)));
        assert!(filter.rejects(&base.clone().with_mapping_quality(19)));
        assert!(!filter.rejects(&base.with_mapping_quality(20)));
    }

    #[test]
    fn test_read_group_filter() {
        let filter = ReadFilter::default().with_hidden_read_groups(["rg2"]);
        let base = AlignmentRecord::new("r", "chr1", 0, 10);
        assert!(!filter.rejects(&base));
        assert!(!filter.rejects(&base.clone().with_read_group("rg1")));
        assert!(filter.rejects(&base.with_read_group("rg2")));
    }
}
