//! Engine configuration.

use std::sync::Arc;

use crate::error::Error;
use crate::mapping::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::migration::TargetConfig;
use crate::schema::AnalysisOptions;
use crate::validation::ValidationConfig;
use crate::vocabulary::Vocabulary;

/// Configuration shared by every stage of the engine.
///
/// The vocabulary is immutable once built; two engines with different
/// vocabularies can run side by side.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Entity patterns and column vocabularies.
    pub vocabulary: Arc<Vocabulary>,

    /// Default analysis options.
    pub analysis: AnalysisOptions,

    /// Confidence below which a mapping needs review.
    pub confidence_threshold: f64,

    /// Default target sizing for plans.
    pub target: TargetConfig,

    /// Validation settings.
    pub validation: ValidationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vocabulary: Arc::new(Vocabulary::standard()),
            analysis: AnalysisOptions::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            target: TargetConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Use a custom vocabulary.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = Arc::new(vocabulary);
        self
    }

    /// Set the default analysis options.
    pub fn with_analysis(mut self, options: AnalysisOptions) -> Self {
        self.analysis = options;
        self
    }

    /// Set the review threshold.
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the default target configuration.
    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.target = target;
        self
    }

    /// Set the validation settings.
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.target.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }
        if self.target.parallel_workers == 0 {
            return Err(Error::Config("parallel workers must be positive".to_string()));
        }
        if self.vocabulary.entities.is_empty() {
            return Err(Error::Config("vocabulary has no entity patterns".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.target.batch_size, 1000);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = EngineConfig::default().with_confidence_threshold(1.5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = EngineConfig::default().with_target(TargetConfig {
            batch_size: 0,
            ..TargetConfig::default()
        });
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
