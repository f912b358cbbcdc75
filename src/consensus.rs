// src/consensus.rs

use rayon::prelude::*;

use crate::error::{Result, TaxconsError};
use crate::site_counts::SiteCounts;
use crate::taxonomy::{TaxonId, Taxonomy};
use crate::types::ConsensusSet;

/// Emitted for sites without any informative character.
pub const GAP_CHAR: u8 = b'-';

/// The only alphabet for which ambiguity codes are defined.
pub const NUCLEOTIDES: &[u8] = b"ACGT";

/// IUPAC codes indexed by a bit set over `ACGT` (A = 1, C = 2, G = 4, T = 8).
const AMBIGUITY_CODES: [u8; 16] = [
    GAP_CHAR, b'A', b'C', b'M', b'G', b'R', b'S', b'V', b'T', b'W', b'Y', b'H', b'K', b'D', b'B',
    b'N',
];

/// How a single consensus sequence is derived from a count matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsensusMethod {
    /// Most frequent character per site
    Majority,
    /// Smallest set of characters covering the given fraction of a site
    Threshold(f64),
    /// Cavener's dominance rules
    Cavener,
    /// All characters whose count is at least the given fraction of the maximum
    Ambiguity(f64),
}

impl ConsensusMethod {
    /// Name of the output collection for this method.
    pub fn label(&self) -> String {
        match self {
            ConsensusMethod::Majority => "majorities".to_string(),
            ConsensusMethod::Threshold(t) => format!("threshold_{}", t),
            ConsensusMethod::Cavener => "cavener".to_string(),
            ConsensusMethod::Ambiguity(f) => format!("ambiguity_{}", f),
        }
    }

    pub fn uses_ambiguity_codes(&self) -> bool {
        !matches!(self, ConsensusMethod::Majority)
    }

    /// Checks the method parameter and, for ambiguity-based methods, the alphabet.
    pub fn validate(&self, alphabet: &[u8]) -> Result<()> {
        match *self {
            ConsensusMethod::Threshold(v) | ConsensusMethod::Ambiguity(v)
                if !(v > 0.0 && v <= 1.0) =>
            {
                return Err(TaxconsError::Config(format!(
                    "{}: parameter must be in (0, 1]",
                    self.label()
                )));
            }
            _ => {}
        }
        if self.uses_ambiguity_codes() && alphabet != NUCLEOTIDES {
            return Err(TaxconsError::InvalidAlphabet(format!(
                "{} needs the alphabet ACGT, got {}",
                self.label(),
                String::from_utf8_lossy(alphabet)
            )));
        }
        Ok(())
    }

    /// Derives the consensus of `counts`. Never modifies the matrix.
    pub fn apply(&self, counts: &SiteCounts) -> Result<String> {
        match *self {
            ConsensusMethod::Majority => Ok(consensus_with_majorities(counts)),
            ConsensusMethod::Threshold(t) => consensus_with_threshold(counts, t),
            ConsensusMethod::Cavener => consensus_cavener(counts),
            ConsensusMethod::Ambiguity(f) => consensus_with_ambiguities(counts, f),
        }
    }
}

/// IUPAC code for a set of nucleotides given as a bit set over `ACGT`.
pub fn ambiguity_code(nucleotide_mask: u8) -> u8 {
    AMBIGUITY_CODES[(nucleotide_mask & 0x0f) as usize]
}

fn require_nucleotides(counts: &SiteCounts) -> Result<()> {
    if counts.characters() != NUCLEOTIDES {
        return Err(TaxconsError::InvalidAlphabet(format!(
            "ambiguity codes need the alphabet ACGT, got {}",
            String::from_utf8_lossy(counts.characters())
        )));
    }
    Ok(())
}

/// Character indices of a site sorted by count, highest first; ties keep alphabet order.
fn ranked(site: &[u32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..site.len()).collect();
    order.sort_by(|&a, &b| site[b].cmp(&site[a]));
    order
}

/// Majority rule: per site the character with the highest count, ties going to
/// the character that comes first in the alphabet.
pub fn consensus_with_majorities(counts: &SiteCounts) -> String {
    let chars = counts.characters();
    let mut out = String::with_capacity(counts.length());

    for site in 0..counts.length() {
        let mut best: Option<(usize, u32)> = None;
        for (idx, &c) in counts.site_counts(site).iter().enumerate() {
            if c > 0 && best.map_or(true, |(_, b)| c > b) {
                best = Some((idx, c));
            }
        }
        out.push(best.map_or(GAP_CHAR, |(idx, _)| chars[idx]) as char);
    }
    out
}

/// Tolerance for products like `0.7 * 10` that land just above an integer.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Smallest count that reaches `threshold` of `total`, at least one.
fn required_count(threshold: f64, total: u64) -> u64 {
    ((threshold * total as f64 - THRESHOLD_EPSILON).ceil() as u64).clamp(1, total)
}

/// Threshold rule: per site, the fewest characters (taken by descending count)
/// whose counts add up to at least `threshold` of the site total.
pub fn consensus_with_threshold(counts: &SiteCounts, threshold: f64) -> Result<String> {
    require_nucleotides(counts)?;
    let mut out = String::with_capacity(counts.length());

    for site in 0..counts.length() {
        let site_counts = counts.site_counts(site);
        let total: u64 = site_counts.iter().map(|&c| c as u64).sum();
        if total == 0 {
            out.push(GAP_CHAR as char);
            continue;
        }

        let needed = required_count(threshold, total);
        let mut covered = 0u64;
        let mut mask = 0u8;
        for idx in ranked(site_counts) {
            if site_counts[idx] == 0 {
                break;
            }
            covered += site_counts[idx] as u64;
            mask |= 1 << idx;
            if covered >= needed {
                break;
            }
        }
        out.push(ambiguity_code(mask) as char);
    }
    Ok(out)
}

/// Cavener's rules (Cavener 1987): a single base if it is present in more than
/// half of the sequences and more than twice as often as the runner-up; a double
/// code if the two most frequent bases together exceed three quarters; a triple
/// code if exactly one base is absent; `N` otherwise.
pub fn consensus_cavener(counts: &SiteCounts) -> Result<String> {
    require_nucleotides(counts)?;
    let mut out = String::with_capacity(counts.length());

    for site in 0..counts.length() {
        let site_counts = counts.site_counts(site);
        let total: u64 = site_counts.iter().map(|&c| c as u64).sum();
        if total == 0 {
            out.push(GAP_CHAR as char);
            continue;
        }

        let order = ranked(site_counts);
        let c: Vec<u64> = order.iter().map(|&i| site_counts[i] as u64).collect();
        let bit = |rank: usize| 1u8 << order[rank];

        let code = if 2 * c[0] > total && c[0] > 2 * c[1] {
            ambiguity_code(bit(0))
        } else if 4 * (c[0] + c[1]) > 3 * total {
            ambiguity_code(bit(0) | bit(1))
        } else if c[3] == 0 {
            ambiguity_code(bit(0) | bit(1) | bit(2))
        } else {
            b'N'
        };
        out.push(code as char);
    }
    Ok(out)
}

/// Per site, every base whose count reaches `similarity_factor` times the
/// count of the most frequent base.
pub fn consensus_with_ambiguities(counts: &SiteCounts, similarity_factor: f64) -> Result<String> {
    require_nucleotides(counts)?;
    let mut out = String::with_capacity(counts.length());

    for site in 0..counts.length() {
        let site_counts = counts.site_counts(site);
        let max = site_counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            out.push(GAP_CHAR as char);
            continue;
        }

        let limit = similarity_factor * max as f64;
        let mask = site_counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0 && c as f64 >= limit)
            .fold(0u8, |m, (idx, _)| m | 1 << idx);
        out.push(ambiguity_code(mask) as char);
    }
    Ok(out)
}

/// Which taxa receive a consensus sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaxonFilter {
    All,
    /// Taxa whose matrix received at least one sequence
    #[default]
    WithSequences,
    /// Leaf taxa whose matrix received at least one sequence
    Leaves,
}

impl TaxonFilter {
    fn accepts(&self, taxonomy: &Taxonomy, id: TaxonId) -> bool {
        let taxon = taxonomy.taxon(id);
        match self {
            TaxonFilter::All => true,
            TaxonFilter::WithSequences => taxon.counts.added_sequences() > 0,
            TaxonFilter::Leaves => taxon.is_leaf() && taxon.counts.added_sequences() > 0,
        }
    }

    /// Accepted taxa in pre-order.
    pub fn select(&self, taxonomy: &Taxonomy) -> Vec<TaxonId> {
        taxonomy
            .preorder_ids()
            .into_iter()
            .filter(|&id| self.accepts(taxonomy, id))
            .collect()
    }
}

/// Consensus of every taxon in `ids` under one method, as `(path key, sequence)`
/// pairs in the order of `ids`. Taxa are processed in parallel.
pub fn consensus_for(
    taxonomy: &Taxonomy,
    ids: &[TaxonId],
    method: ConsensusMethod,
) -> Result<ConsensusSet> {
    method.validate(taxonomy.alphabet())?;
    let sequences = ids
        .par_iter()
        .map(|&id| {
            method
                .apply(&taxonomy.taxon(id).counts)
                .map(|seq| (taxonomy.path_key(id), seq))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ConsensusSet { method, sequences })
}

/// One `ConsensusSet` per method over the taxa accepted by `filter`.
/// The matrices are only read.
pub fn consensus_sets(
    taxonomy: &Taxonomy,
    methods: &[ConsensusMethod],
    filter: TaxonFilter,
) -> Result<Vec<ConsensusSet>> {
    for method in methods {
        method.validate(taxonomy.alphabet())?;
    }

    let selected = filter.select(taxonomy);
    methods
        .iter()
        .map(|&method| {
            log::info!("Making consensus sequences: {}", method.label());
            consensus_for(taxonomy, &selected, method)
        })
        .collect()
}
