// src/aggregate.rs

use indicatif::ProgressBar;

use crate::error::{Result, TaxconsError};
use crate::resolver::{candidate_text, LabelResolver};
use crate::taxonomy::{TaxonId, Taxonomy};
use crate::types::SequenceRecord;

const PROGRESS_TICK: u64 = 10_000;
const LOG_INTERVAL: u64 = 50_000;

/// Which count matrices a resolved sequence is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMode {
    /// Only the taxon the label resolved to
    #[default]
    FoundingTaxon,
    /// The resolved taxon and every ancestor up to the top level
    WholePath,
}

/// Running record counters, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub processed: u64,
    pub resolved: u64,
    pub unresolved: u64,
}

/// Streams sequence records into the count matrices of a taxonomy.
///
/// Records are handled strictly one after another; every update is complete
/// before the next record is looked at.
pub struct Aggregator<'a> {
    taxonomy: &'a mut Taxonomy,
    resolver: &'a LabelResolver,
    mode: AggregationMode,
    stats: AggregationStats,
    progress: ProgressBar,
}

impl<'a> Aggregator<'a> {
    pub fn new(taxonomy: &'a mut Taxonomy, resolver: &'a LabelResolver, mode: AggregationMode) -> Self {
        Self {
            taxonomy,
            resolver,
            mode,
            stats: AggregationStats::default(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports progress on `progress` (typically a spinner) instead of staying silent.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn stats(&self) -> AggregationStats {
        self.stats
    }

    /// Adds one record. Returns the taxon it was counted at, or `None` if the
    /// label matched no taxon; such records are skipped and counted as unresolved.
    ///
    /// # Errors
    /// * `EmptyLabel`, `EmptyMetadata` for records without a usable label
    /// * `SiteLengthMismatch` if the record does not span the full alignment
    pub fn add_record(&mut self, record: &SequenceRecord) -> Result<Option<TaxonId>> {
        let index = self.stats.processed;
        self.stats.processed += 1;
        self.report_progress();

        if record.label.trim().is_empty() {
            return Err(TaxconsError::EmptyLabel { index });
        }
        let text = candidate_text(&record.label, record.metadata.as_deref());
        if text.is_empty() {
            return Err(TaxconsError::EmptyMetadata {
                label: record.label.clone(),
            });
        }
        if record.sites.len() != self.taxonomy.site_length() {
            return Err(TaxconsError::SiteLengthMismatch {
                label: record.label.clone(),
                expected: self.taxonomy.site_length(),
                found: record.sites.len(),
            });
        }

        let Some(taxon_id) = self.resolver.resolve(text) else {
            self.stats.unresolved += 1;
            log::debug!("No taxon for sequence {} ({})", record.label, text);
            return Ok(None);
        };
        self.stats.resolved += 1;
        self.taxonomy.taxon_mut(taxon_id).direct_sequences += 1;

        let mut current = Some(taxon_id);
        while let Some(id) = current {
            self.taxonomy
                .taxon_mut(id)
                .counts
                .add_sequence(&record.sites)?;
            current = match self.mode {
                AggregationMode::FoundingTaxon => None,
                AggregationMode::WholePath => self.taxonomy.taxon(id).parent,
            };
        }

        Ok(Some(taxon_id))
    }

    /// Adds every record of `records`, stopping at the first error.
    pub fn add_records<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
    {
        for record in records {
            self.add_record(&record?)?;
        }
        Ok(())
    }

    /// Logs a summary and hands back the final counters.
    pub fn finish(self) -> AggregationStats {
        self.progress.finish_and_clear();
        log::info!(
            "Done reading: {} sequences, {} resolved, {} without taxon",
            self.stats.processed,
            self.stats.resolved,
            self.stats.unresolved
        );
        self.stats
    }

    fn report_progress(&self) {
        let n = self.stats.processed;
        if n % PROGRESS_TICK == 0 {
            self.progress.set_message(format!(
                "{} sequences ({} resolved, {} without taxon)",
                n, self.stats.resolved, self.stats.unresolved
            ));
            self.progress.tick();
        }
        if n % LOG_INTERVAL == 0 {
            log::info!("At sequence {}", n);
        }
    }
}
