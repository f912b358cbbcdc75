// src/error.rs

use thiserror::Error;

/// Everything that can abort a run.
///
/// Unresolved sequence labels are deliberately absent: those are counted by the
/// aggregator and skipped.
#[derive(Error, Debug)]
pub enum TaxconsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("taxonomy line {line}: {reason}")]
    TaxonomyFormat { line: usize, reason: String },

    #[error("duplicate taxon: {0}")]
    DuplicateTaxon(String),

    #[error("FASTA line {line}: {reason}")]
    FastaFormat { line: usize, reason: String },

    #[error("sequence record {index} has an empty label")]
    EmptyLabel { index: u64 },

    #[error("sequence `{label}` has no taxonomic metadata")]
    EmptyMetadata { label: String },

    #[error("sequence `{label}` has {found} sites, expected {expected}")]
    SiteLengthMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),

    #[error("no statistics for taxon `{0}`")]
    MissingStatistics(String),

    #[error("crop set invariant violated: {0}")]
    CropInvariant(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TaxconsError>;
