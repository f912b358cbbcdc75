use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use taxcons_rs::aggregate::AggregationMode;
use taxcons_rs::config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_THRESHOLDS};
use taxcons_rs::consensus::ConsensusMethod;
use taxcons_rs::crop_output::CropCollection;
use taxcons_rs::partition::CropStrategy;
use taxcons_rs::{run_pipeline, PipelineResults};

/// Per-taxon consensus sequences and entropy-based taxonomy partitions
#[derive(Parser, Debug)]
#[command(name = "taxcons-rs", version, about)]
struct Cli {
    /// Taxonomy file, one `Path;To;Taxon;` per line (optionally gzipped)
    #[arg(long)]
    taxonomy: PathBuf,

    /// Aligned FASTA file, headers carry the taxonomic path (optionally gzipped)
    #[arg(long)]
    alignment: PathBuf,

    /// Output directory
    #[arg(long, default_value = "taxcons_out")]
    out_dir: PathBuf,

    /// Characters counted per site
    #[arg(long, default_value = "ACGT")]
    alphabet: String,

    /// Number of alignment columns
    #[arg(long, default_value_t = 50000)]
    site_length: usize,

    /// Count every sequence at all ancestors of its taxon as well
    #[arg(long)]
    whole_path: bool,

    /// Threshold-rule consensus fractions
    #[arg(long, value_delimiter = ',')]
    thresholds: Option<Vec<f64>>,

    /// Subtree sequence target for the top-down crop
    #[arg(long, default_value_t = 2000, conflicts_with = "entropy_split")]
    target_size: u64,

    /// Use the greedy entropy split with at most this many crop taxa instead
    #[arg(long)]
    entropy_split: Option<usize>,

    /// Show a spinner while reading the alignment
    #[arg(long)]
    progress: bool,
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template(&format!("{{spinner:.{}}} {{msg}}", color))
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg);
    spinner
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let thresholds = cli
        .thresholds
        .clone()
        .unwrap_or_else(|| DEFAULT_THRESHOLDS.to_vec());
    let mut methods = vec![ConsensusMethod::Majority, ConsensusMethod::Cavener];
    methods.extend(thresholds.into_iter().map(ConsensusMethod::Threshold));
    if let Some(factors) = &cli.ambiguity_factors {
        methods.extend(factors.iter().map(|&f| ConsensusMethod::Ambiguity(f)));
    }

    let crop_strategy = match cli.entropy_split {
        Some(max_crop) => CropStrategy::EntropySplit(max_crop),
        None => CropStrategy::TargetSize(cli.target_size),
    };
    let aggregation = if cli.whole_path {
        AggregationMode::WholePath
    } else {
        AggregationMode::FoundingTaxon
    };

    let config = PipelineConfigBuilder::default()
        .alphabet(cli.alphabet.clone())
        .site_length(cli.site_length)
        .aggregation(aggregation)
        .consensus_methods(methods)
        .crop_strategy(crop_strategy)
        .crop_consensus_method(ConsensusMethod::Threshold(cli.crop_threshold))
        .border_ambiguity(Some(cli.border_ambiguity))
        .show_progress(cli.progress)
        .build()?;
    Ok(config)
}

fn write_partition_outputs(
    results: &PipelineResults,
    idx: usize,
    dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(text) = results.get_entropy_table(idx) {
        fs::write(dir.join("tax_entropy.tsv"), text)?;
    }
    if let Some(text) = results.get_crop_tree(idx) {
        fs::write(dir.join("crop_tree.txt"), text)?;
    }
    if let Some(text) = results.get_pruned_taxonomy(idx) {
        fs::write(dir.join("tax_pruned.txt"), text)?;
    }
    if let Some(text) = results.get_assignments(idx) {
        fs::write(dir.join("tax_assign.txt"), text)?;
    }
    fs::write(dir.join("tax_assign_leaves.txt"), results.get_leaf_assignments())?;

    for collection in CropCollection::ALL {
        if let Some(text) = results.get_crop_consensus_fasta(idx, collection)? {
            fs::write(dir.join(collection.file_name()), text)?;
        }
    }

    let sub_alignments = dir.join("sub_alignments");
    fs::create_dir_all(&sub_alignments)?;
    for (key, text) in results.get_sub_alignments(idx)? {
        fs::write(sub_alignments.join(format!("{}.fasta", key)), text)?;
    }

    let sub_taxonomies = dir.join("sub_taxonomies");
    fs::create_dir_all(&sub_taxonomies)?;
    for (key, taxonomy, assignments) in results.get_sub_taxonomies(idx) {
        fs::write(sub_taxonomies.join(format!("{}_tax.txt", key)), taxonomy)?;
        fs::write(sub_taxonomies.join(format!("{}_assign.txt", key)), assignments)?;
    }
    Ok(())
}

fn write_outputs(results: &PipelineResults, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    for (idx, set) in results.consensus_sets.iter().enumerate() {
        let dir = out_dir.join(set.method.label());
        fs::create_dir_all(&dir)?;
        if let Some(text) = results.get_consensus_fasta(idx) {
            fs::write(dir.join("consensus.fasta"), text)?;
        }
    }

    for (idx, (estimator, _)) in results.partitions.iter().enumerate() {
        let dir = out_dir.join(format!("entropy_{}", estimator.name()));
        fs::create_dir_all(&dir)?;
        write_partition_outputs(results, idx, &dir)?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&cli)?;

    // 1. Aggregation, consensus and partitioning
    let results = run_pipeline(&cli.taxonomy, &cli.alignment, &config)?;
    log::info!(
        "{} sequences processed, {} without taxon",
        results.stats.processed,
        results.stats.unresolved
    );

    // 2. Output files
    let writing = spinner("yellow", "Writing output files...");
    write_outputs(&results, &cli.out_dir)?;
    writing.finish_with_message(format!("Output written to {}", cli.out_dir.display()));
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
