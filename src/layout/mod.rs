//! Row layout for pileup display

pub mod packer;
pub mod row;

pub use packer::{GroupBy, RowPacker};
pub use row::{PackedAlignment, PairedAlignment, Row};
