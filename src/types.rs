//src/types.rs

use crate::consensus::ConsensusMethod;

/// One aligned sequence as handed over by the alignment reader.
///
/// `sites` is already normalized (upper case, one gap glyph, `U` folded to `T`).
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    pub label: String,
    pub metadata: Option<String>,
    pub sites: Vec<u8>,
}

impl SequenceRecord {
    pub fn new(label: impl Into<String>, metadata: Option<String>, sites: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            metadata,
            sites,
        }
    }
}

/// A structured representation of one row of the entropy table.
///   Name  Status  Level  Total  Children  Leaves  Sequences  Entropy
#[derive(Debug, Clone)]
pub struct EntropyReportRow {
    pub name: String,
    pub status: char,       // 'B', 'I' or 'O'
    pub level: usize,
    pub total_taxa: usize,
    pub children: usize,
    pub leaves: usize,
    pub sequences: u64,
    pub entropy: f64,
}

/// All consensus sequences produced by one method (one output collection).
#[derive(Debug, Clone)]
pub struct ConsensusSet {
    /// Method that produced the sequences; `method.label()` names the collection
    pub method: ConsensusMethod,
    /// `(path key, consensus sequence)` pairs in taxonomy pre-order
    pub sequences: Vec<(String, String)>,
}
