// src/lib.rs
pub mod aggregate;
pub mod config;
pub mod consensus;
pub mod crop_output;
pub mod entropy;
pub mod error;
pub mod fasta;
pub mod partition;
pub mod report;
pub mod resolver;
pub mod site_counts;
pub mod taxonomy;
pub mod types;

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::aggregate::{AggregationStats, Aggregator};
use crate::config::PipelineConfig;
use crate::consensus::{consensus_sets, ConsensusMethod, TaxonFilter};
use crate::crop_output::{
    border_taxa, crop_consensus, selected_taxa, sub_alignment, subtree_leaves, subtree_roots,
    CropCollection,
};
use crate::entropy::{taxon_entropies, EntropyEstimator};
use crate::error::Result;
use crate::fasta::FastaReader;
use crate::partition::{Partition, Partitioner};
use crate::report::{
    render_assignments, render_crop_tree, render_entropy_table, render_fasta, render_taxopaths,
};
use crate::resolver::LabelResolver;
use crate::taxonomy::Taxonomy;
use crate::types::{ConsensusSet, SequenceRecord};

pub use crate::error::TaxconsError;

/// Line width of FASTA output.
pub const FASTA_LINE_WIDTH: usize = 80;

/// Everything a run produces. Text is only generated on demand.
#[derive(Debug)]
pub struct PipelineResults {
    /// Taxonomy with its finalized count matrices
    pub taxonomy: Taxonomy,
    /// Record counters of the aggregation phase
    pub stats: AggregationStats,
    /// One collection per consensus method, in configuration order
    pub consensus_sets: Vec<ConsensusSet>,
    /// One partition per entropy estimator, in configuration order
    pub partitions: Vec<(EntropyEstimator, Partition)>,
    /// Method of the per-partition collections and sub-alignments
    pub crop_consensus_method: ConsensusMethod,
    /// Similarity factor of the border ambiguity collection
    pub border_ambiguity: Option<f64>,
}

impl PipelineResults {
    /// Generate the FASTA text of the `idx`-th consensus collection
    pub fn get_consensus_fasta(&self, idx: usize) -> Option<String> {
        self.consensus_sets
            .get(idx)
            .map(|set| render_fasta(set, FASTA_LINE_WIDTH))
    }

    /// Generate the entropy table of the `idx`-th partition
    pub fn get_entropy_table(&self, idx: usize) -> Option<String> {
        self.partitions
            .get(idx)
            .map(|(_, partition)| render_entropy_table(&self.taxonomy, partition))
    }

    /// Generate the indented crop tree of the `idx`-th partition
    pub fn get_crop_tree(&self, idx: usize) -> Option<String> {
        self.partitions
            .get(idx)
            .map(|(_, partition)| render_crop_tree(&self.taxonomy, partition))
    }

    /// Generate the FASTA text of one collection of the `idx`-th partition.
    /// `None` for an unknown partition or a switched off collection.
    pub fn get_crop_consensus_fasta(
        &self,
        idx: usize,
        collection: CropCollection,
    ) -> Result<Option<String>> {
        let Some((_, partition)) = self.partitions.get(idx) else {
            return Ok(None);
        };
        let factor = match (collection, self.border_ambiguity) {
            (CropCollection::BorderAmbiguity, None) => return Ok(None),
            (_, factor) => factor.unwrap_or_default(),
        };
        let set = crop_consensus(
            &self.taxonomy,
            partition,
            collection,
            self.crop_consensus_method,
            factor,
        )?;
        Ok(Some(render_fasta(&set, FASTA_LINE_WIDTH)))
    }

    /// Generate the pruned taxonomy (crop taxa and their ancestors) of the `idx`-th partition
    pub fn get_pruned_taxonomy(&self, idx: usize) -> Option<String> {
        self.partitions.get(idx).map(|(_, partition)| {
            render_taxopaths(&self.taxonomy, &selected_taxa(&self.taxonomy, partition))
        })
    }

    /// Generate the assignment table of the crop taxa of the `idx`-th partition
    pub fn get_assignments(&self, idx: usize) -> Option<String> {
        self.partitions.get(idx).map(|(_, partition)| {
            render_assignments(&self.taxonomy, &border_taxa(&self.taxonomy, partition))
        })
    }

    /// Generate the assignment table of all leaf taxa with sequences
    pub fn get_leaf_assignments(&self) -> String {
        render_assignments(&self.taxonomy, &TaxonFilter::Leaves.select(&self.taxonomy))
    }

    /// Generate `(key, FASTA text)` for every crop taxon with descendants of the
    /// `idx`-th partition, holding the consensus of the leaves below it
    pub fn get_sub_alignments(&self, idx: usize) -> Result<Vec<(String, String)>> {
        let Some((_, partition)) = self.partitions.get(idx) else {
            return Ok(Vec::new());
        };
        subtree_roots(&self.taxonomy, partition)
            .into_iter()
            .map(|root| {
                let set = sub_alignment(&self.taxonomy, root, self.crop_consensus_method)?;
                Ok((self.taxonomy.path_key(root), render_fasta(&set, FASTA_LINE_WIDTH)))
            })
            .collect()
    }

    /// Generate `(key, taxonomy, assignments)` of the leaves with sequences below
    /// every crop taxon with descendants of the `idx`-th partition
    pub fn get_sub_taxonomies(&self, idx: usize) -> Vec<(String, String, String)> {
        let Some((_, partition)) = self.partitions.get(idx) else {
            return Vec::new();
        };
        subtree_roots(&self.taxonomy, partition)
            .into_iter()
            .map(|root| {
                let leaves = subtree_leaves(&self.taxonomy, root);
                (
                    self.taxonomy.path_key(root),
                    render_taxopaths(&self.taxonomy, &leaves),
                    render_assignments(&self.taxonomy, &leaves),
                )
            })
            .collect()
    }
}

fn reading_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.green} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message("Reading sequences...");
    spinner
}

/// Runs aggregation, consensus and partitioning on an already loaded taxonomy.
pub fn run_with_taxonomy<I>(
    mut taxonomy: Taxonomy,
    records: I,
    config: &PipelineConfig,
) -> Result<PipelineResults>
where
    I: IntoIterator<Item = Result<SequenceRecord>>,
{
    config.validate()?;

    // 1. Resolve labels and count sites
    let resolver = LabelResolver::new(&taxonomy)?;
    if resolver.is_empty() {
        return Err(TaxconsError::Config("taxonomy holds no taxa".to_string()));
    }
    log::info!("{} taxon keys available for label matching", resolver.len());
    let progress = if config.show_progress {
        reading_spinner()
    } else {
        ProgressBar::hidden()
    };
    let mut aggregator =
        Aggregator::new(&mut taxonomy, &resolver, config.aggregation).with_progress(progress);
    aggregator.add_records(records)?;
    let stats = aggregator.finish();

    // 2. Consensus sequences, one collection per method
    let consensus_sets = consensus_sets(
        &taxonomy,
        &config.consensus_methods,
        TaxonFilter::WithSequences,
    )?;

    // 3. Entropy and crop set, once per estimator
    let mut partitions = Vec::with_capacity(config.estimators.len());
    for &estimator in &config.estimators {
        let entropies = taxon_entropies(&taxonomy, estimator);
        let partition = Partitioner::new(&taxonomy, entropies)?.partition(config.crop_strategy)?;
        partitions.push((estimator, partition));
    }

    Ok(PipelineResults {
        taxonomy,
        stats,
        consensus_sets,
        partitions,
        crop_consensus_method: config.crop_consensus_method,
        border_ambiguity: config.border_ambiguity,
    })
}

/// Unified entry point: loads the taxonomy and streams the alignment file.
pub fn run_pipeline<P: AsRef<Path>, Q: AsRef<Path>>(
    taxonomy_path: P,
    alignment_path: Q,
    config: &PipelineConfig,
) -> Result<PipelineResults> {
    config.validate()?;

    let mut taxonomy = Taxonomy::from_file(taxonomy_path, &config.alphabet, config.site_length)?;
    taxonomy.sort_by_name();

    let reader = FastaReader::from_path(alignment_path)?;
    run_with_taxonomy(taxonomy, reader, config)
}
