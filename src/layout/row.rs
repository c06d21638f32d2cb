//! Display rows and the units placed in them

use crate::core::record::AlignmentRecord;
use std::sync::Arc;

/// Two mates laid out as one unit
///
/// Spans from the first mate's start to the furthest end of either mate.
#[derive(Debug, Clone)]
pub struct PairedAlignment {
    pub first: Arc<AlignmentRecord>,
    pub second: Option<Arc<AlignmentRecord>>,
}

impl PairedAlignment {
    pub fn new(first: Arc<AlignmentRecord>) -> Self {
        Self { first, second: None }
    }

    pub fn start(&self) -> u64 {
        self.first.start
    }

    pub fn end(&self) -> u64 {
        match &self.second {
            Some(second) => self.first.end.max(second.end),
            None => self.first.end,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.second.is_some()
    }
}

/// One unit of a row: a lone alignment or a mate pair
#[derive(Debug, Clone)]
pub enum PackedAlignment {
    Single(Arc<AlignmentRecord>),
    Pair(PairedAlignment),
}

impl PackedAlignment {
    pub fn start(&self) -> u64 {
        match self {
            PackedAlignment::Single(r) => r.start,
            PackedAlignment::Pair(p) => p.start(),
        }
    }

    pub fn end(&self) -> u64 {
        match self {
            PackedAlignment::Single(r) => r.end,
            PackedAlignment::Pair(p) => p.end(),
        }
    }

    pub fn length(&self) -> u64 {
        self.end().saturating_sub(self.start())
    }

    /// Record used for grouping and labelling
    pub fn primary(&self) -> &Arc<AlignmentRecord> {
        match self {
            PackedAlignment::Single(r) => r,
            PackedAlignment::Pair(p) => &p.first,
        }
    }

    /// Every record in this unit
    pub fn records(&self) -> Vec<&Arc<AlignmentRecord>> {
        match self {
            PackedAlignment::Single(r) => vec![r],
            PackedAlignment::Pair(p) => {
                let mut v = vec![&p.first];
                if let Some(second) = &p.second {
                    v.push(second);
                }
                v
            }
        }
    }
}

/// Non-overlapping alignments sharing one rendering lane
#[derive(Debug, Clone, Default)]
pub struct Row {
    alignments: Vec<PackedAlignment>,
    last_end: u64,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, alignment: PackedAlignment, spacing: u64) {
        self.last_end = alignment.end() + spacing;
        self.alignments.push(alignment);
    }

    pub fn alignments(&self) -> &[PackedAlignment] {
        &self.alignments
    }

    /// Rightmost occupied coordinate plus spacing
    pub fn last_end(&self) -> u64 {
        self.last_end
    }

    pub fn start(&self) -> Option<u64> {
        self.alignments.first().map(|a| a.start())
    }

    pub fn len(&self) -> usize {
        self.alignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alignments.is_empty()
    }
}
