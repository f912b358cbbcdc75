// src/entropy.rs

use rayon::prelude::*;

use crate::site_counts::SiteCounts;
use crate::taxonomy::Taxonomy;

/// How per-site entropies are combined into one value per taxon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyMode {
    /// Plain mean over all sites of the alignment
    PositionAveraged,
    /// Mean weighted by the number of informative characters at each site
    CountWeighted,
}

/// One way of summarizing a count matrix into a single entropy value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropyEstimator {
    pub mode: EntropyMode,
    /// Treat the sequences without an alphabet character at a site as one more symbol
    pub include_gaps: bool,
    /// Scale site entropies into [0, 1]
    pub normalized: bool,
}

impl EntropyEstimator {
    pub const AVERAGED: Self = Self::new(EntropyMode::PositionAveraged, false);
    pub const AVERAGED_GAPS: Self = Self::new(EntropyMode::PositionAveraged, true);
    pub const WEIGHTED: Self = Self::new(EntropyMode::CountWeighted, false);
    pub const WEIGHTED_GAPS: Self = Self::new(EntropyMode::CountWeighted, true);

    /// The four standard estimators.
    pub const VARIANTS: [Self; 4] = [
        Self::AVERAGED,
        Self::AVERAGED_GAPS,
        Self::WEIGHTED,
        Self::WEIGHTED_GAPS,
    ];

    pub const fn new(mode: EntropyMode, include_gaps: bool) -> Self {
        Self {
            mode,
            include_gaps,
            normalized: false,
        }
    }

    pub fn name(&self) -> String {
        let mut name = match self.mode {
            EntropyMode::PositionAveraged => "averaged".to_string(),
            EntropyMode::CountWeighted => "weighted".to_string(),
        };
        if self.include_gaps {
            name.push_str("_gaps");
        }
        if self.normalized {
            name.push_str("_norm");
        }
        name
    }

    pub fn estimate(&self, counts: &SiteCounts) -> f64 {
        match self.mode {
            EntropyMode::PositionAveraged => {
                averaged_entropy(counts, self.include_gaps, self.normalized)
            }
            EntropyMode::CountWeighted => {
                weighted_entropy(counts, self.include_gaps, self.normalized)
            }
        }
    }
}

impl Default for EntropyEstimator {
    fn default() -> Self {
        Self::AVERAGED
    }
}

/// Shannon entropy (bits) of one site.
///
/// Character frequencies are relative to the number of added sequences, so
/// sites with little information have low entropy unless `include_gaps` turns
/// the missing mass into a symbol of its own.
pub fn site_entropy(counts: &SiteCounts, site: usize, include_gaps: bool, normalized: bool) -> f64 {
    let n = counts.added_sequences();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;

    let mut entropy = 0.0;
    let mut informative = 0u64;
    for &c in counts.site_counts(site) {
        informative += c as u64;
        if c > 0 {
            let p = c as f64 / n;
            entropy -= p * p.log2();
        }
    }

    let mut symbols = counts.characters().len();
    if include_gaps {
        symbols += 1;
        let gaps = n - informative as f64;
        if gaps > 0.0 {
            let p = gaps / n;
            entropy -= p * p.log2();
        }
    }

    if normalized && symbols > 1 {
        entropy /= (symbols as f64).log2();
    }
    entropy
}

/// Sum of all site entropies.
pub fn absolute_entropy(counts: &SiteCounts, include_gaps: bool, normalized: bool) -> f64 {
    (0..counts.length())
        .map(|s| site_entropy(counts, s, include_gaps, normalized))
        .sum()
}

/// Mean site entropy over all sites.
pub fn averaged_entropy(counts: &SiteCounts, include_gaps: bool, normalized: bool) -> f64 {
    if counts.length() == 0 {
        return 0.0;
    }
    absolute_entropy(counts, include_gaps, normalized) / counts.length() as f64
}

/// Site entropies weighted by the informative character count of each site.
pub fn weighted_entropy(counts: &SiteCounts, include_gaps: bool, normalized: bool) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for site in 0..counts.length() {
        let weight = counts.site_total(site) as f64;
        if weight > 0.0 {
            weighted_sum += weight * site_entropy(counts, site, include_gaps, normalized);
            weight_total += weight;
        }
    }
    if weight_total == 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}

/// Entropy of every taxon, indexed by `TaxonId`. Taxa are processed in parallel.
pub fn taxon_entropies(taxonomy: &Taxonomy, estimator: EntropyEstimator) -> Vec<f64> {
    log::info!("Entropy calculations ({})", estimator.name());
    let ids: Vec<_> = taxonomy.ids().collect();
    ids.par_iter()
        .map(|&id| estimator.estimate(&taxonomy.taxon(id).counts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn matrix(seqs: &[&[u8]]) -> SiteCounts {
        let mut counts = SiteCounts::new("ACGT", seqs[0].len()).unwrap();
        for s in seqs {
            counts.add_sequence(s).unwrap();
        }
        counts
    }

    #[test]
    fn test_uniform_site_has_two_bits() {
        let counts = matrix(&[b"A", b"C", b"G", b"T"]);
        assert!((site_entropy(&counts, 0, false, false) - 2.0).abs() < EPS);
        assert!((site_entropy(&counts, 0, false, true) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_conserved_site_has_zero_entropy() {
        let counts = matrix(&[b"AA", b"AC"]);
        assert!(site_entropy(&counts, 0, false, false).abs() < EPS);
        assert!((site_entropy(&counts, 1, false, false) - 1.0).abs() < EPS);
        assert!((averaged_entropy(&counts, false, false) - 0.5).abs() < EPS);
        assert!((absolute_entropy(&counts, false, false) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_gaps_as_symbol() {
        let counts = matrix(&[b"A", b"-"]);
        assert!((site_entropy(&counts, 0, false, false) - 0.5).abs() < EPS);
        assert!((site_entropy(&counts, 0, true, false) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_weighted_ignores_empty_sites() {
        // site 0 mixed (1 bit, weight 2), site 1 empty, site 2 conserved (weight 2)
        let counts = matrix(&[b"A-C", b"C-C"]);
        assert!((averaged_entropy(&counts, false, false) - 1.0 / 3.0).abs() < EPS);
        assert!((weighted_entropy(&counts, false, false) - 0.5).abs() < EPS);
    }

    #[test]
    fn test_empty_matrix_is_zero_for_every_variant() {
        let counts = SiteCounts::new("ACGT", 10).unwrap();
        for estimator in EntropyEstimator::VARIANTS {
            assert_eq!(estimator.estimate(&counts), 0.0, "{}", estimator.name());
        }
    }

    #[test]
    fn test_variant_names_are_distinct() {
        let names: Vec<String> = EntropyEstimator::VARIANTS.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["averaged", "averaged_gaps", "weighted", "weighted_gaps"]);
    }

    #[test]
    fn test_mixed_taxon_scores_higher() {
        let mut tax = Taxonomy::new("ACGT", 3).unwrap();
        let pure = tax.add_child(None, "Pure").unwrap();
        let mixed = tax.add_child(None, "Mixed").unwrap();
        for s in [b"ACG", b"ACG", b"ACG"] {
            tax.taxon_mut(pure).counts.add_sequence(s).unwrap();
        }
        for s in [b"ACG", b"TGA", b"CAT"] {
            tax.taxon_mut(mixed).counts.add_sequence(s).unwrap();
        }

        for estimator in EntropyEstimator::VARIANTS {
            let entropies = taxon_entropies(&tax, estimator);
            assert_eq!(entropies.len(), 2);
            assert!(entropies[mixed.0] > entropies[pure.0]);
            assert!(entropies[pure.0].abs() < EPS);
        }
    }
}
