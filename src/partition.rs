// src/partition.rs

use std::collections::BTreeSet;

use crate::error::{Result, TaxconsError};
use crate::taxonomy::{TaxonId, Taxonomy, Visit};

/// How the crop frontier is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropStrategy {
    /// Top-down: crop at the first taxon whose subtree sequences fit into the target
    TargetSize(u64),
    /// Greedy: keep splitting the crop taxon with the highest entropy while the
    /// crop set stays within the given number of taxa
    EntropySplit(usize),
}

impl Default for CropStrategy {
    fn default() -> Self {
        CropStrategy::TargetSize(2000)
    }
}

/// Role of a taxon relative to a crop set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneStatus {
    /// Strict ancestor of a crop taxon
    Inside,
    /// Member of the crop set
    Border,
    /// Below the frontier, or in a subtree without data
    Outside,
}

impl PruneStatus {
    pub fn abbreviation(&self) -> char {
        match self {
            PruneStatus::Inside => 'I',
            PruneStatus::Border => 'B',
            PruneStatus::Outside => 'O',
        }
    }
}

/// Result of partitioning a taxonomy.
#[derive(Debug, Clone)]
pub struct Partition {
    /// The frontier; no member is an ancestor of another
    pub crop: BTreeSet<TaxonId>,
    /// `crop` plus every strict ancestor of its members, for printing paths
    pub full_crop: BTreeSet<TaxonId>,
    /// Entropy per taxon, indexed by `TaxonId`
    pub entropies: Vec<f64>,
    /// Resolved sequences per subtree, indexed by `TaxonId`
    pub sequence_totals: Vec<u64>,
}

impl Partition {
    pub fn status(&self, id: TaxonId) -> PruneStatus {
        if self.crop.contains(&id) {
            PruneStatus::Border
        } else if self.full_crop.contains(&id) {
            PruneStatus::Inside
        } else {
            PruneStatus::Outside
        }
    }

    pub fn entropy(&self, id: TaxonId) -> f64 {
        self.entropies[id.0]
    }

    pub fn count_with_status(&self, status: PruneStatus) -> usize {
        (0..self.entropies.len())
            .filter(|&i| self.status(TaxonId(i)) == status)
            .count()
    }
}

/// Adds every strict ancestor of the crop taxa to a copy of the crop set.
pub fn fill_parents(taxonomy: &Taxonomy, crop: &BTreeSet<TaxonId>) -> BTreeSet<TaxonId> {
    let mut full = crop.clone();
    for &id in crop {
        for ancestor in taxonomy.ancestors(id) {
            // ancestors of an already added taxon are already in as well
            if !full.insert(ancestor) {
                break;
            }
        }
    }
    full
}

/// Checks that `crop` is an antichain and that its subtrees together hold every
/// sequence resolved anywhere in the taxonomy.
pub fn validate_crop(
    taxonomy: &Taxonomy,
    crop: &BTreeSet<TaxonId>,
    sequence_totals: &[u64],
) -> Result<()> {
    for &id in crop {
        if let Some(ancestor) = taxonomy.ancestors(id).find(|a| crop.contains(a)) {
            return Err(TaxconsError::CropInvariant(format!(
                "`{}` lies below crop taxon `{}`",
                taxonomy.taxopath(id),
                taxonomy.taxopath(ancestor)
            )));
        }
    }

    let retained: u64 = crop.iter().map(|id| sequence_totals[id.0]).sum();
    let total = taxonomy.total_sequences();
    if retained != total {
        return Err(TaxconsError::CropInvariant(format!(
            "crop subtrees hold {} sequences, the taxonomy holds {}",
            retained, total
        )));
    }
    Ok(())
}

/// Chooses crop frontiers for a taxonomy with finalized count matrices.
pub struct Partitioner<'a> {
    taxonomy: &'a Taxonomy,
    entropies: Vec<f64>,
    sequence_totals: Vec<u64>,
}

impl<'a> Partitioner<'a> {
    /// `entropies` must hold one value per taxon, indexed by `TaxonId`.
    pub fn new(taxonomy: &'a Taxonomy, entropies: Vec<f64>) -> Result<Self> {
        if entropies.len() < taxonomy.len() {
            return Err(TaxconsError::MissingStatistics(
                taxonomy.taxopath(TaxonId(entropies.len())),
            ));
        }
        if entropies.len() > taxonomy.len() {
            return Err(TaxconsError::MissingStatistics(format!(
                "{} entropy values for {} taxa",
                entropies.len(),
                taxonomy.len()
            )));
        }
        Ok(Self {
            taxonomy,
            entropies,
            sequence_totals: taxonomy.subtree_sequence_totals(),
        })
    }

    pub fn sequence_totals(&self) -> &[u64] {
        &self.sequence_totals
    }

    /// Top-down crop: a taxon whose subtree sequences fit into `target` ends the
    /// descent, as does a leaf of any size. A taxon holding sequences of its own
    /// is never descended into, since its children do not carry them. Subtrees
    /// without sequences are left out below an informative ancestor.
    pub fn crop_by_target_size(&self, target: u64) -> BTreeSet<TaxonId> {
        let mut crop = BTreeSet::new();
        self.taxonomy
            .traverse_preorder(self.taxonomy.top_level(), |id| {
                let taxon = self.taxonomy.taxon(id);
                let total = self.sequence_totals[id.0];

                if total == 0 && taxon.parent.is_some() {
                    return Visit::Skip;
                }
                if total <= target || taxon.is_leaf() || taxon.direct_sequences > 0 {
                    crop.insert(id);
                    return Visit::Skip;
                }
                Visit::Descend
            });
        crop
    }

    /// Children that replace `id` when it is split, or `None` if it cannot be
    /// split without losing sequences.
    fn split_children(&self, id: TaxonId) -> Option<Vec<TaxonId>> {
        let taxon = self.taxonomy.taxon(id);
        if taxon.direct_sequences > 0 {
            return None;
        }
        let children: Vec<TaxonId> = taxon
            .children
            .iter()
            .copied()
            .filter(|c| self.sequence_totals[c.0] > 0)
            .collect();
        (!children.is_empty()).then_some(children)
    }

    /// Greedy crop: starting at the top level, replace the crop taxon with the
    /// highest entropy by its children with sequences, choosing among those
    /// whose split keeps the crop set within `max_crop` taxa.
    pub fn split_by_entropy(&self, max_crop: usize) -> BTreeSet<TaxonId> {
        let top = self.taxonomy.top_level();
        let mut crop: BTreeSet<TaxonId> = top
            .iter()
            .copied()
            .filter(|id| self.sequence_totals[id.0] > 0)
            .collect();
        if crop.is_empty() {
            crop.extend(top.iter().copied());
        }
        if crop.len() > max_crop {
            log::warn!(
                "{} top-level taxa already exceed the crop size of {}",
                crop.len(),
                max_crop
            );
        }

        loop {
            let size = crop.len();
            let candidate = crop
                .iter()
                .filter_map(|&id| self.split_children(id).map(|children| (id, children)))
                .filter(|(_, children)| size - 1 + children.len() <= max_crop)
                .max_by(|(a, _), (b, _)| self.entropies[a.0].total_cmp(&self.entropies[b.0]));
            let Some((candidate, children)) = candidate else {
                break;
            };

            crop.remove(&candidate);
            crop.extend(children);
        }
        crop
    }

    /// Runs `strategy`, adds the parents for printing and validates the result.
    pub fn partition(self, strategy: CropStrategy) -> Result<Partition> {
        let crop = match strategy {
            CropStrategy::TargetSize(target) => self.crop_by_target_size(target),
            CropStrategy::EntropySplit(max_crop) => self.split_by_entropy(max_crop),
        };
        validate_crop(self.taxonomy, &crop, &self.sequence_totals)?;

        let full_crop = fill_parents(self.taxonomy, &crop);
        let partition = Partition {
            crop,
            full_crop,
            entropies: self.entropies,
            sequence_totals: self.sequence_totals,
        };
        log::info!(
            "Crop set: {} border, {} inside, {} outside taxa",
            partition.count_with_status(PruneStatus::Border),
            partition.count_with_status(PruneStatus::Inside),
            partition.count_with_status(PruneStatus::Outside)
        );
        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregationMode, Aggregator};
    use crate::resolver::LabelResolver;
    use crate::types::SequenceRecord;

    /// Root -> {P -> {p1: 5, p2: 7}, Q -> {q1: 1, q2: 0, q3: 2}, R: 20}
    fn three_levels() -> (Taxonomy, Vec<TaxonId>) {
        let mut tax = Taxonomy::new("ACGT", 1).unwrap();
        let root = tax.add_child(None, "Root").unwrap();
        let p = tax.add_child(Some(root), "P").unwrap();
        let q = tax.add_child(Some(root), "Q").unwrap();
        let r = tax.add_child(Some(root), "R").unwrap();
        let p1 = tax.add_child(Some(p), "p1").unwrap();
        let p2 = tax.add_child(Some(p), "p2").unwrap();
        let q1 = tax.add_child(Some(q), "q1").unwrap();
        let q2 = tax.add_child(Some(q), "q2").unwrap();
        let q3 = tax.add_child(Some(q), "q3").unwrap();

        for (id, n) in [(p1, 5), (p2, 7), (q1, 1), (q2, 0), (q3, 2), (r, 20)] {
            tax.taxon_mut(id).direct_sequences = n;
        }
        (tax, vec![root, p, q, r, p1, p2, q1, q2, q3])
    }

    fn assert_antichain(tax: &Taxonomy, crop: &BTreeSet<TaxonId>) {
        for &id in crop {
            assert!(tax.ancestors(id).all(|a| !crop.contains(&a)));
        }
    }

    #[test]
    fn test_target_size_crop() {
        let (tax, ids) = three_levels();
        let (p, q, r, q2) = (ids[1], ids[2], ids[3], ids[7]);
        let partitioner = Partitioner::new(&tax, vec![0.0; tax.len()]).unwrap();

        let crop = partitioner.crop_by_target_size(12);
        assert_eq!(crop, BTreeSet::from([p, q, r]));
        assert_antichain(&tax, &crop);
        assert!(!crop.contains(&q2));

        let total: u64 = crop.iter().map(|id| partitioner.sequence_totals()[id.0]).sum();
        assert_eq!(total, 35);
    }

    #[test]
    fn test_small_target_splits_down_to_leaves() {
        let (tax, ids) = three_levels();
        let partitioner = Partitioner::new(&tax, vec![0.0; tax.len()]).unwrap();

        let crop = partitioner.crop_by_target_size(4);
        // p1 and p2 exceed the target but are leaves; q2 holds nothing
        let expected: BTreeSet<TaxonId> =
            [ids[3], ids[4], ids[5], ids[2]].into_iter().collect();
        assert_eq!(crop, expected);
        assert!(validate_crop(&tax, &crop, partitioner.sequence_totals()).is_ok());
    }

    #[test]
    fn test_large_target_keeps_root() {
        let (tax, ids) = three_levels();
        let partition = Partitioner::new(&tax, vec![0.0; tax.len()])
            .unwrap()
            .partition(CropStrategy::TargetSize(1000))
            .unwrap();
        assert_eq!(partition.crop, BTreeSet::from([ids[0]]));
        assert_eq!(partition.full_crop, BTreeSet::from([ids[0]]));
        assert_eq!(partition.status(ids[1]), PruneStatus::Outside);
    }

    #[test]
    fn test_fill_parents_and_status() {
        let (tax, ids) = three_levels();
        let (root, p, q, r, p1) = (ids[0], ids[1], ids[2], ids[3], ids[4]);
        let crop = BTreeSet::from([p1, ids[5], q, r]);
        let full = fill_parents(&tax, &crop);
        assert_eq!(full, BTreeSet::from([root, p, q, r, p1, ids[5]]));

        let partition = Partition {
            crop,
            full_crop: full,
            entropies: vec![0.0; tax.len()],
            sequence_totals: tax.subtree_sequence_totals(),
        };
        assert_eq!(partition.status(root), PruneStatus::Inside);
        assert_eq!(partition.status(p), PruneStatus::Inside);
        assert_eq!(partition.status(p1), PruneStatus::Border);
        assert_eq!(partition.status(ids[6]), PruneStatus::Outside);
        assert_eq!(partition.count_with_status(PruneStatus::Border), 4);
    }

    #[test]
    fn test_validation_failures() {
        let (tax, ids) = three_levels();
        let totals = tax.subtree_sequence_totals();

        let nested = BTreeSet::from([ids[1], ids[4]]);
        assert!(matches!(
            validate_crop(&tax, &nested, &totals),
            Err(TaxconsError::CropInvariant(_))
        ));

        let missing = BTreeSet::from([ids[1], ids[2]]);
        assert!(matches!(
            validate_crop(&tax, &missing, &totals),
            Err(TaxconsError::CropInvariant(_))
        ));
    }

    #[test]
    fn test_entropy_split_prefers_high_entropy() {
        let (tax, ids) = three_levels();
        let (root, p, q, r) = (ids[0], ids[1], ids[2], ids[3]);
        let mut entropies = vec![0.0; tax.len()];
        entropies[root.0] = 1.0;
        entropies[p.0] = 0.2;
        entropies[q.0] = 0.8;

        let partitioner = Partitioner::new(&tax, entropies).unwrap();
        // Root -> {P, Q, R}, then Q -> {q1, q3}; splitting P would exceed 4
        let crop = partitioner.split_by_entropy(4);
        assert_eq!(crop, BTreeSet::from([p, r, ids[6], ids[8]]));
        assert!(validate_crop(&tax, &crop, partitioner.sequence_totals()).is_ok());

        let crop = partitioner.split_by_entropy(2);
        assert_eq!(crop, BTreeSet::from([root]));
    }

    #[test]
    fn test_missing_entropies_are_fatal() {
        let (tax, _) = three_levels();
        assert!(matches!(
            Partitioner::new(&tax, vec![0.0; 3]),
            Err(TaxconsError::MissingStatistics(_))
        ));
    }

    #[test]
    fn test_entropy_split_skips_oversized_candidates() {
        // X has the highest entropy but five children; Y fits with two
        let mut tax = Taxonomy::new("ACGT", 1).unwrap();
        let x = tax.add_child(None, "X").unwrap();
        let y = tax.add_child(None, "Y").unwrap();
        for i in 0..5 {
            let child = tax.add_child(Some(x), &format!("x{}", i)).unwrap();
            tax.taxon_mut(child).direct_sequences = 1;
        }
        let y0 = tax.add_child(Some(y), "y0").unwrap();
        let y1 = tax.add_child(Some(y), "y1").unwrap();
        tax.taxon_mut(y0).direct_sequences = 2;
        tax.taxon_mut(y1).direct_sequences = 3;

        let mut entropies = vec![0.0; tax.len()];
        entropies[x.0] = 1.0;
        entropies[y.0] = 0.1;
        let partitioner = Partitioner::new(&tax, entropies).unwrap();

        let crop = partitioner.split_by_entropy(3);
        assert_eq!(crop, BTreeSet::from([x, y0, y1]));
        assert!(validate_crop(&tax, &crop, partitioner.sequence_totals()).is_ok());

        let crop = partitioner.split_by_entropy(6);
        assert_eq!(crop.len(), 6);
        assert!(crop.contains(&y));
    }

    #[test_log::test]
    fn test_sequences_at_inner_taxa_are_kept() {
        // Root -> {A, B -> {b1}}; the species below B is unknown to the taxonomy
        let mut tax = Taxonomy::new("ACGT", 2).unwrap();
        let root = tax.add_child(None, "Root").unwrap();
        let a = tax.add_child(Some(root), "A").unwrap();
        let b = tax.add_child(Some(root), "B").unwrap();
        tax.add_child(Some(b), "b1").unwrap();

        let resolver = LabelResolver::new(&tax).unwrap();
        let mut aggregator = Aggregator::new(&mut tax, &resolver, AggregationMode::FoundingTaxon);
        for i in 0..5 {
            let record =
                SequenceRecord::new(format!("a{}", i), Some("Root;A;".to_string()), b"AC".to_vec());
            assert_eq!(aggregator.add_record(&record).unwrap(), Some(a));
        }
        for i in 0..10 {
            let record = SequenceRecord::new(
                format!("b{}", i),
                Some("Root;B;Unknown species".to_string()),
                b"GT".to_vec(),
            );
            assert_eq!(aggregator.add_record(&record).unwrap(), Some(b));
        }
        let stats = aggregator.finish();
        assert_eq!(stats.resolved, 15);

        let partitioner = Partitioner::new(&tax, vec![0.0; tax.len()]).unwrap();
        assert_eq!(partitioner.sequence_totals()[root.0], 15);
        assert_eq!(partitioner.sequence_totals()[b.0], 10);

        let crop = partitioner.crop_by_target_size(3);
        assert_eq!(crop, BTreeSet::from([a, b]));
        let retained: u64 = crop.iter().map(|id| partitioner.sequence_totals()[id.0]).sum();
        assert_eq!(retained, stats.resolved);

        // B holds the sequences itself, so splitting it would drop them
        let crop = partitioner.split_by_entropy(10);
        assert_eq!(crop, BTreeSet::from([a, b]));
        assert!(partitioner.partition(CropStrategy::TargetSize(3)).is_ok());
    }

    #[test]
    fn test_validation_counts_inner_sequences() {
        let (mut tax, ids) = three_levels();
        let (p, q, r) = (ids[1], ids[2], ids[3]);
        tax.taxon_mut(ids[0]).direct_sequences = 4;
        let totals = tax.subtree_sequence_totals();

        // the sequences at Root are outside every child subtree
        let children = BTreeSet::from([p, q, r]);
        assert!(matches!(
            validate_crop(&tax, &children, &totals),
            Err(TaxconsError::CropInvariant(_))
        ));
        assert!(validate_crop(&tax, &BTreeSet::from([ids[0]]), &totals).is_ok());
    }
}
