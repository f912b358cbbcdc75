// src/report.rs

use std::fmt::Write as _;

use crate::partition::Partition;
use crate::taxonomy::{TaxonId, Taxonomy, Visit};
use crate::types::{ConsensusSet, EntropyReportRow};

/// FASTA text of a consensus set, sequence lines wrapped at `width` characters.
pub fn render_fasta(set: &ConsensusSet, width: usize) -> String {
    let width = width.max(1);
    let mut output = String::new();
    for (key, sequence) in &set.sequences {
        let _ = writeln!(output, ">{}", key);
        let bytes = sequence.as_bytes();
        for chunk in bytes.chunks(width) {
            output.push_str(&String::from_utf8_lossy(chunk));
            output.push('\n');
        }
    }
    output
}

/// One entropy table row per taxon, in pre-order.
pub fn entropy_rows(taxonomy: &Taxonomy, partition: &Partition) -> Vec<EntropyReportRow> {
    taxonomy
        .preorder_ids()
        .into_iter()
        .map(|id| {
            let taxon = taxonomy.taxon(id);
            EntropyReportRow {
                name: taxonomy.taxopath(id),
                status: partition.status(id).abbreviation(),
                level: taxonomy.level(id),
                total_taxa: taxonomy.total_taxa(id),
                children: taxon.children.len(),
                leaves: taxonomy.leaf_count(id),
                sequences: taxon.counts.added_sequences(),
                entropy: partition.entropy(id),
            }
        })
        .collect()
}

/// Tab separated entropy table with a header line.
pub fn render_entropy_table(taxonomy: &Taxonomy, partition: &Partition) -> String {
    let mut output = String::new();
    output.push_str("Name\tStatus\tLevel\tTotal\tChildren\tLeaves\tSequences\tEntropy\n");
    for row in entropy_rows(taxonomy, partition) {
        let _ = writeln!(
            output,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.6}",
            row.name,
            row.status,
            row.level,
            row.total_taxa,
            row.children,
            row.leaves,
            row.sequences,
            row.entropy
        );
    }
    output
}

/// Indented tree of the crop set and its ancestors, four spaces per level.
/// Crop taxa are annotated with the size of their subtree.
pub fn render_crop_tree(taxonomy: &Taxonomy, partition: &Partition) -> String {
    let mut output = String::new();
    taxonomy.traverse_preorder(taxonomy.top_level(), |id| {
        if !partition.full_crop.contains(&id) {
            return Visit::Skip;
        }

        let indent = " ".repeat(taxonomy.level(id) * 4);
        let _ = write!(
            output,
            "{}{} ({:.6})",
            indent,
            taxonomy.taxon(id).name,
            partition.entropy(id)
        );
        if partition.crop.contains(&id) {
            let _ = write!(
                output,
                " subtree: {} leaves: {} sequences: {}",
                taxonomy.total_taxa(id),
                taxonomy.leaf_count(id),
                partition.sequence_totals[id.0]
            );
        }
        output.push('\n');
        Visit::Descend
    });
    output
}

/// One `Path;To;Taxon;` line per taxon.
pub fn render_taxopaths(taxonomy: &Taxonomy, ids: &[TaxonId]) -> String {
    let mut output = String::new();
    for &id in ids {
        let _ = writeln!(output, "{}", taxonomy.taxopath(id));
    }
    output
}

/// Assignment table: the key a consensus sequence is written under, a tab, and
/// the taxonomic path it stands for.
pub fn render_assignments(taxonomy: &Taxonomy, ids: &[TaxonId]) -> String {
    let mut output = String::new();
    for &id in ids {
        let _ = writeln!(output, "{}\t{}", taxonomy.path_key(id), taxonomy.taxopath(id));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusMethod;
    use crate::partition::{CropStrategy, Partitioner};

    fn partitioned() -> (Taxonomy, Partition) {
        let mut tax = Taxonomy::new("ACGT", 2).unwrap();
        let root = tax.add_child(None, "Root").unwrap();
        let a = tax.add_child(Some(root), "A").unwrap();
        let b = tax.add_child(Some(root), "B").unwrap();
        let b1 = tax.add_child(Some(b), "b1").unwrap();
        tax.add_child(Some(b), "b2").unwrap();

        tax.taxon_mut(a).direct_sequences = 3;
        tax.taxon_mut(b1).direct_sequences = 1;
        tax.taxon_mut(a).counts.add_sequence(b"AC").unwrap();

        let mut entropies = vec![0.0; tax.len()];
        entropies[a.0] = 0.25;
        let partition = Partitioner::new(&tax, entropies)
            .unwrap()
            .partition(CropStrategy::TargetSize(3))
            .unwrap();
        (tax, partition)
    }

    #[test]
    fn test_render_fasta_wraps_lines() {
        let set = ConsensusSet {
            method: ConsensusMethod::Majority,
            sequences: vec![
                ("Root_A".to_string(), "ACGTACGTAC".to_string()),
                ("Root_B".to_string(), "TT".to_string()),
            ],
        };
        assert_eq!(
            render_fasta(&set, 4),
            ">Root_A\nACGT\nACGT\nAC\n>Root_B\nTT\n"
        );
    }

    #[test]
    fn test_entropy_table() {
        let (tax, partition) = partitioned();
        let table = render_entropy_table(&tax, &partition);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "Name\tStatus\tLevel\tTotal\tChildren\tLeaves\tSequences\tEntropy");
        assert_eq!(lines[1], "Root;\tI\t0\t4\t2\t3\t0\t0.000000");
        assert_eq!(lines[2], "Root;A;\tB\t1\t0\t0\t1\t1\t0.250000");
        assert_eq!(lines[3], "Root;B;\tB\t1\t2\t2\t2\t0\t0.000000");
        assert!(lines[4].starts_with("Root;B;b1;\tO\t2"));
    }

    #[test]
    fn test_pruned_taxonomy_and_assignments() {
        let (tax, partition) = partitioned();
        let selected = crate::crop_output::selected_taxa(&tax, &partition);
        assert_eq!(render_taxopaths(&tax, &selected), "Root;\nRoot;A;\nRoot;B;\n");

        let border = crate::crop_output::border_taxa(&tax, &partition);
        assert_eq!(
            render_assignments(&tax, &border),
            "Root_A\tRoot;A;\nRoot_B\tRoot;B;\n"
        );
    }

    #[test]
    fn test_crop_tree() {
        let (tax, partition) = partitioned();
        assert_eq!(
            render_crop_tree(&tax, &partition),
            "Root (0.000000)\n    \
             A (0.250000) subtree: 0 leaves: 1 sequences: 3\n    \
             B (0.000000) subtree: 2 leaves: 2 sequences: 1\n"
        );
    }
}
