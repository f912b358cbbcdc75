/*!
Configuration of a pipeline run.
Typical usage is to use the builder, e.g.
```
use taxcons_rs::aggregate::AggregationMode;
use taxcons_rs::config::{PipelineConfig, PipelineConfigBuilder};
let config: PipelineConfig = PipelineConfigBuilder::default()
    .site_length(1000)
    .aggregation(AggregationMode::WholePath)
    .build()
    .unwrap();
assert!(config.validate().is_ok());
```
*/

use crate::aggregate::AggregationMode;
use crate::consensus::ConsensusMethod;
use crate::entropy::EntropyEstimator;
use crate::error::{Result, TaxconsError};
use crate::partition::CropStrategy;
use crate::site_counts::SiteCounts;

/// Thresholds for which threshold-rule consensus sequences are produced by default.
pub const DEFAULT_THRESHOLDS: [f64; 6] = [0.5, 0.6, 0.7, 0.8, 0.9, 0.95];

#[derive(derive_builder::Builder, Clone, Debug)]
#[builder(default)]
pub struct PipelineConfig {
    /// Characters counted per site; everything else carries no information
    pub alphabet: String,
    /// Number of alignment columns every sequence must have
    pub site_length: usize,
    /// Count a sequence at its taxon only, or along its whole path
    pub aggregation: AggregationMode,
    /// One output collection per method
    pub consensus_methods: Vec<ConsensusMethod>,
    /// One partition per estimator
    pub estimators: Vec<EntropyEstimator>,
    /// How the crop frontier is chosen
    pub crop_strategy: CropStrategy,
    /// Method of the per-partition collections (all, leaves, border, selected)
    /// and of the sub-alignments
    pub crop_consensus_method: ConsensusMethod,
    /// Similarity factor of the border ambiguity collection; `None` leaves it out
    pub border_ambiguity: Option<f64>,
    /// Show a spinner while reading the alignment
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut consensus_methods = vec![ConsensusMethod::Majority, ConsensusMethod::Cavener];
        consensus_methods.extend(DEFAULT_THRESHOLDS.iter().map(|&t| ConsensusMethod::Threshold(t)));

        Self {
            alphabet: "ACGT".to_string(),
            // wide enough for the full SILVA alignment
            site_length: 50000,
            aggregation: AggregationMode::FoundingTaxon,
            consensus_methods,
            estimators: EntropyEstimator::VARIANTS.to_vec(),
            crop_strategy: CropStrategy::TargetSize(2000),
            crop_consensus_method: ConsensusMethod::Threshold(0.9),
            border_ambiguity: Some(0.75),
            show_progress: false,
        }
    }
}

impl PipelineConfig {
    /// Rejects settings that would make the run meaningless or fail half-way.
    pub fn validate(&self) -> Result<()> {
        if self.site_length == 0 {
            return Err(TaxconsError::Config("site length must be positive".to_string()));
        }
        let alphabet = SiteCounts::new(&self.alphabet, 0)?;
        for method in &self.consensus_methods {
            method.validate(alphabet.characters())?;
        }
        self.crop_consensus_method.validate(alphabet.characters())?;
        if let Some(factor) = self.border_ambiguity {
            ConsensusMethod::Ambiguity(factor).validate(alphabet.characters())?;
        }
        match self.crop_strategy {
            CropStrategy::TargetSize(0) | CropStrategy::EntropySplit(0) => {
                return Err(TaxconsError::Config("crop target must be positive".to_string()));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.consensus_methods.len(), 8);
        assert_eq!(config.estimators.len(), 4);
    }

    #[test]
    fn test_builder_overrides() {
        let config = PipelineConfigBuilder::default()
            .alphabet("acgt".to_string())
            .site_length(4)
            .crop_strategy(CropStrategy::EntropySplit(10))
            .build()
            .unwrap();
        assert_eq!(config.site_length, 4);
        assert_eq!(config.aggregation, AggregationMode::FoundingTaxon);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            PipelineConfigBuilder::default().site_length(0).build().unwrap(),
            PipelineConfigBuilder::default().alphabet("AAC".to_string()).build().unwrap(),
            PipelineConfigBuilder::default()
                .consensus_methods(vec![ConsensusMethod::Threshold(0.0)])
                .build()
                .unwrap(),
            PipelineConfigBuilder::default()
                .crop_strategy(CropStrategy::TargetSize(0))
                .build()
                .unwrap(),
            PipelineConfigBuilder::default().border_ambiguity(Some(1.5)).build().unwrap(),
            // ambiguity codes only exist for ACGT
            PipelineConfigBuilder::default()
                .alphabet("ACGU".to_string())
                .build()
                .unwrap(),
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }

        let majority_only = PipelineConfigBuilder::default()
            .alphabet("ACGU".to_string())
            .consensus_methods(vec![ConsensusMethod::Majority])
            .crop_consensus_method(ConsensusMethod::Majority)
            .border_ambiguity(None)
            .build()
            .unwrap();
        assert!(majority_only.validate().is_ok());
    }
}
