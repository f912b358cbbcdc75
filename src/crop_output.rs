// src/crop_output.rs

use crate::consensus::{consensus_for, ConsensusMethod, TaxonFilter};
use crate::error::Result;
use crate::partition::{Partition, PruneStatus};
use crate::taxonomy::{TaxonId, Taxonomy, Visit};
use crate::types::ConsensusSet;

/// Consensus collections written next to each partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropCollection {
    /// Every taxon, with or without sequences
    All,
    /// Members of the crop set
    Border,
    /// Members of the crop set and their ancestors
    Selected,
    /// Leaf taxa that received sequences
    Leaves,
    /// Members of the crop set, similar counts merged into ambiguity codes
    BorderAmbiguity,
}

impl CropCollection {
    pub const ALL: [CropCollection; 5] = [
        CropCollection::All,
        CropCollection::Leaves,
        CropCollection::Border,
        CropCollection::BorderAmbiguity,
        CropCollection::Selected,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            CropCollection::All => "tax_cons_all.fasta",
            CropCollection::Border => "tax_cons_border.fasta",
            CropCollection::Selected => "tax_cons_selected.fasta",
            CropCollection::Leaves => "tax_cons_leaves.fasta",
            CropCollection::BorderAmbiguity => "tax_cons_border_amb.fasta",
        }
    }

    /// Taxa of this collection in pre-order.
    pub fn taxa(&self, taxonomy: &Taxonomy, partition: &Partition) -> Vec<TaxonId> {
        match self {
            CropCollection::All => TaxonFilter::All.select(taxonomy),
            CropCollection::Leaves => TaxonFilter::Leaves.select(taxonomy),
            CropCollection::Border | CropCollection::BorderAmbiguity => {
                border_taxa(taxonomy, partition)
            }
            CropCollection::Selected => selected_taxa(taxonomy, partition),
        }
    }
}

/// Crop set members in pre-order.
pub fn border_taxa(taxonomy: &Taxonomy, partition: &Partition) -> Vec<TaxonId> {
    taxonomy
        .preorder_ids()
        .into_iter()
        .filter(|&id| partition.status(id) == PruneStatus::Border)
        .collect()
}

/// Taxa of the pruned taxonomy: crop set members and their ancestors, in pre-order.
pub fn selected_taxa(taxonomy: &Taxonomy, partition: &Partition) -> Vec<TaxonId> {
    taxonomy
        .preorder_ids()
        .into_iter()
        .filter(|&id| partition.status(id) != PruneStatus::Outside)
        .collect()
}

/// Crop set members that have descendants. Each of them gets its own
/// sub-alignment and sub-taxonomy.
pub fn subtree_roots(taxonomy: &Taxonomy, partition: &Partition) -> Vec<TaxonId> {
    border_taxa(taxonomy, partition)
        .into_iter()
        .filter(|&id| !taxonomy.taxon(id).is_leaf())
        .collect()
}

/// Leaf taxa below `id` that received sequences, in pre-order.
pub fn subtree_leaves(taxonomy: &Taxonomy, id: TaxonId) -> Vec<TaxonId> {
    let mut leaves = Vec::new();
    taxonomy.traverse_preorder(&[id], |t| {
        let taxon = taxonomy.taxon(t);
        if taxon.is_leaf() && taxon.counts.added_sequences() > 0 {
            leaves.push(t);
        }
        Visit::Descend
    });
    leaves
}

/// Consensus of one collection. `BorderAmbiguity` always uses the ambiguity
/// rule with `ambiguity_factor`; every other collection uses `method`.
pub fn crop_consensus(
    taxonomy: &Taxonomy,
    partition: &Partition,
    collection: CropCollection,
    method: ConsensusMethod,
    ambiguity_factor: f64,
) -> Result<ConsensusSet> {
    let method = match collection {
        CropCollection::BorderAmbiguity => ConsensusMethod::Ambiguity(ambiguity_factor),
        _ => method,
    };
    consensus_for(taxonomy, &collection.taxa(taxonomy, partition), method)
}

/// Consensus of the leaves with sequences below the crop taxon `root`.
pub fn sub_alignment(
    taxonomy: &Taxonomy,
    root: TaxonId,
    method: ConsensusMethod,
) -> Result<ConsensusSet> {
    consensus_for(taxonomy, &subtree_leaves(taxonomy, root), method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{CropStrategy, Partitioner};

    /// Root -> {A: AA, AC; B -> {b1: GG, b2: -}}, cropped at {A, B}
    fn cropped() -> (Taxonomy, Partition, Vec<TaxonId>) {
        let mut tax = Taxonomy::new("ACGT", 2).unwrap();
        let root = tax.add_child(None, "Root").unwrap();
        let a = tax.add_child(Some(root), "A").unwrap();
        let b = tax.add_child(Some(root), "B").unwrap();
        let b1 = tax.add_child(Some(b), "b1").unwrap();
        let b2 = tax.add_child(Some(b), "b2").unwrap();

        for sites in [b"AA", b"AC"] {
            tax.taxon_mut(a).counts.add_sequence(sites).unwrap();
            tax.taxon_mut(a).direct_sequences += 1;
        }
        tax.taxon_mut(b1).counts.add_sequence(b"GG").unwrap();
        tax.taxon_mut(b1).direct_sequences += 1;

        let partition = Partitioner::new(&tax, vec![0.0; tax.len()])
            .unwrap()
            .partition(CropStrategy::TargetSize(2))
            .unwrap();
        (tax, partition, vec![root, a, b, b1, b2])
    }

    fn keys(set: &ConsensusSet) -> Vec<&str> {
        set.sequences.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_collection_taxa() {
        let (tax, partition, ids) = cropped();
        let (root, a, b, b1) = (ids[0], ids[1], ids[2], ids[3]);

        assert_eq!(CropCollection::All.taxa(&tax, &partition).len(), 5);
        assert_eq!(CropCollection::Border.taxa(&tax, &partition), vec![a, b]);
        assert_eq!(CropCollection::Selected.taxa(&tax, &partition), vec![root, a, b]);
        assert_eq!(CropCollection::Leaves.taxa(&tax, &partition), vec![a, b1]);
        assert_eq!(subtree_roots(&tax, &partition), vec![b]);
        assert_eq!(subtree_leaves(&tax, b), vec![b1]);
    }

    #[test]
    fn test_crop_consensus_collections() {
        let (tax, partition, _) = cropped();
        let method = ConsensusMethod::Threshold(0.9);

        let border = crop_consensus(&tax, &partition, CropCollection::Border, method, 0.75).unwrap();
        assert_eq!(border.method, method);
        assert_eq!(keys(&border), vec!["Root_A", "Root_B"]);
        assert_eq!(border.sequences[0].1, "AM");
        // B received nothing itself
        assert_eq!(border.sequences[1].1, "--");

        let amb =
            crop_consensus(&tax, &partition, CropCollection::BorderAmbiguity, method, 0.75).unwrap();
        assert_eq!(amb.method, ConsensusMethod::Ambiguity(0.75));
        assert_eq!(amb.sequences[0].1, "AM");

        let all = crop_consensus(&tax, &partition, CropCollection::All, method, 0.75).unwrap();
        assert_eq!(keys(&all), vec!["Root", "Root_A", "Root_B", "Root_B_b1", "Root_B_b2"]);

        let sub = sub_alignment(&tax, partition.crop.iter().copied().max().unwrap(), method).unwrap();
        assert_eq!(sub.sequences, vec![("Root_B_b1".to_string(), "GG".to_string())]);
    }
}
