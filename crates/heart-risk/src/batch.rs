//! Batch Assessment API
//!
//! Scores many submissions or dataset rows against one engine. Supports
//! parallel processing via rayon when the `parallel` feature is enabled.
//!
//! # Example
//!
//! ```ignore
//! use heart_risk::batch::{BatchAssessor, BatchConfig};
//!
//! let config = BatchConfig::default()
//!     .with_parallel(true)
//!     .with_skip_invalid(true);
//!
//! let assessor = BatchAssessor::new(&engine, config);
//! let result = assessor.assess_inputs(&submissions)?;
//! println!("Assessed {} of {}", result.success_count(), result.total_count());
//! ```

use crate::input::{FeatureRecord, RawInput};
use crate::pipeline::{RiskAssessment, RiskEngine, RiskThreshold};
use crate::RiskError;
use serde::Serialize;

/// Configuration for batch assessment
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Enable parallel processing
    pub parallel: bool,
    /// Minimum items per rayon task
    pub chunk_size: usize,
    /// Record indices of items with invalid or unencodable data instead of
    /// aborting the batch; engine errors still abort
    pub skip_invalid: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            parallel: false,
            chunk_size: 256,
            skip_invalid: false,
        }
    }
}

impl BatchConfig {
    /// Enable/disable parallel processing
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Set chunk size for parallel batching
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Skip invalid items
    pub fn with_skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }
}

/// One successful item and its position in the input
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchItem<T> {
    pub index: usize,
    pub value: T,
}

/// Result from batch assessment
#[derive(Clone, Debug, Serialize)]
pub struct BatchResult<T> {
    /// Successful items, in input order
    pub items: Vec<BatchItem<T>>,
    /// Indices of failed items (only populated with `skip_invalid`)
    pub failed_indices: Vec<usize>,
    /// Processing statistics
    pub stats: BatchStats,
}

impl<T> BatchResult<T> {
    /// Get the number of successful items
    pub fn success_count(&self) -> usize {
        self.items.len()
    }

    /// Get the total number of processed items
    pub fn total_count(&self) -> usize {
        self.items.len() + self.failed_indices.len()
    }

    /// Get the success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_count() == 0 {
            0.0
        } else {
            self.items.len() as f64 / self.total_count() as f64
        }
    }

    /// Successful values without their indices
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|item| &item.value)
    }
}

/// Statistics from batch processing
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchStats {
    /// Total processing time in milliseconds
    pub processing_time_ms: u64,
    /// Number of parallel chunks processed
    pub chunks_processed: usize,
    /// Average time per item in microseconds
    pub avg_item_time_us: f64,
}

/// Batch assessor over a shared engine
pub struct BatchAssessor<'a> {
    engine: &'a RiskEngine,
    config: BatchConfig,
    threshold: RiskThreshold,
}

impl<'a> BatchAssessor<'a> {
    /// Create a batch assessor using the engine's threshold
    pub fn new(engine: &'a RiskEngine, config: BatchConfig) -> Self {
        BatchAssessor {
            engine,
            config,
            threshold: engine.threshold(),
        }
    }

    /// Label against a different threshold
    pub fn with_threshold(mut self, threshold: RiskThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Assess form submissions
    pub fn assess_inputs(
        &self,
        inputs: &[RawInput],
    ) -> Result<BatchResult<RiskAssessment>, RiskError> {
        let threshold = self.threshold;
        self.run(inputs, |raw| self.engine.assess_with_threshold(raw, threshold))
    }

    /// Positive-class probabilities of assembled records
    pub fn score_records(&self, records: &[FeatureRecord]) -> Result<BatchResult<f64>, RiskError> {
        self.run(records, |record| self.engine.score_record(record))
    }

    fn run<I, T, F>(&self, inputs: &[I], score_fn: F) -> Result<BatchResult<T>, RiskError>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> Result<T, RiskError> + Sync,
    {
        let start_time = std::time::Instant::now();

        let (items, failed_indices) = if self.config.parallel {
            self.run_parallel(inputs, score_fn)?
        } else {
            self.run_sequential(inputs, score_fn)?
        };

        let elapsed = start_time.elapsed();
        let chunk_size = self.config.chunk_size.max(1);
        let stats = BatchStats {
            processing_time_ms: elapsed.as_millis() as u64,
            chunks_processed: if self.config.parallel {
                inputs.len().div_ceil(chunk_size)
            } else {
                1
            },
            avg_item_time_us: if inputs.is_empty() {
                0.0
            } else {
                elapsed.as_micros() as f64 / inputs.len() as f64
            },
        };

        log::debug!(
            "Batch of {} finished: {} ok, {} failed in {} ms",
            inputs.len(),
            items.len(),
            failed_indices.len(),
            stats.processing_time_ms
        );

        Ok(BatchResult {
            items,
            failed_indices,
            stats,
        })
    }

    /// Score with parallel processing
    #[cfg(feature = "parallel")]
    fn run_parallel<I, T, F>(
        &self,
        inputs: &[I],
        score_fn: F,
    ) -> Result<(Vec<BatchItem<T>>, Vec<usize>), RiskError>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> Result<T, RiskError> + Sync,
    {
        use rayon::prelude::*;

        let results: Vec<_> = inputs
            .par_iter()
            .with_min_len(self.config.chunk_size.max(1))
            .map(&score_fn)
            .collect();

        self.partition(results.into_iter().enumerate())
    }

    /// Fallback when parallel feature is disabled
    #[cfg(not(feature = "parallel"))]
    fn run_parallel<I, T, F>(
        &self,
        inputs: &[I],
        score_fn: F,
    ) -> Result<(Vec<BatchItem<T>>, Vec<usize>), RiskError>
    where
        F: Fn(&I) -> Result<T, RiskError>,
    {
        self.run_sequential(inputs, score_fn)
    }

    /// Sequential scoring; stops at the first error unless skipping
    fn run_sequential<I, T, F>(
        &self,
        inputs: &[I],
        score_fn: F,
    ) -> Result<(Vec<BatchItem<T>>, Vec<usize>), RiskError>
    where
        F: Fn(&I) -> Result<T, RiskError>,
    {
        self.partition(inputs.iter().map(score_fn).enumerate())
    }

    fn partition<T>(
        &self,
        results: impl Iterator<Item = (usize, Result<T, RiskError>)>,
    ) -> Result<(Vec<BatchItem<T>>, Vec<usize>), RiskError> {
        let mut items = Vec::new();
        let mut failed = Vec::new();

        for (index, result) in results {
            match result {
                Ok(value) => items.push(BatchItem { index, value }),
                Err(e) if self.config.skip_invalid && is_row_error(&e) => {
                    log::debug!("Skipping batch item {}: {}", index, e);
                    failed.push(index);
                }
                Err(e) => return Err(e),
            }
        }

        Ok((items, failed))
    }
}

/// Errors caused by one item's data; anything else is a broken engine
fn is_row_error(err: &RiskError) -> bool {
    err.is_recoverable() || matches!(err, RiskError::Encoding { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::tests::sample_input;
    use crate::pipeline::tests::survey_engine;
    use crate::pipeline::RiskLabel;

    fn inputs() -> Vec<RawInput> {
        let mut older = sample_input();
        older.age_category = "80 or older".to_string();
        older.stroke = true;

        let mut invalid = sample_input();
        invalid.height_in = 0.0;

        let mut smoker = sample_input();
        smoker.smoking = true;

        vec![sample_input(), invalid, older, smoker]
    }

    #[test]
    fn test_first_error_aborts() {
        let engine = survey_engine();
        let assessor = BatchAssessor::new(&engine, BatchConfig::default());

        let err = assessor.assess_inputs(&inputs()).unwrap_err();
        assert_eq!(err.field(), Some("height_in"));
    }

    #[test]
    fn test_skip_invalid_keeps_order() {
        let engine = survey_engine();
        let assessor =
            BatchAssessor::new(&engine, BatchConfig::default().with_skip_invalid(true));

        let result = assessor.assess_inputs(&inputs()).unwrap();
        assert_eq!(result.success_count(), 3);
        assert_eq!(result.failed_indices, vec![1]);
        assert_eq!(result.total_count(), 4);

        let indices: Vec<_> = result.items.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 2, 3]);

        // Each item matches a single assessment of the same input
        for item in &result.items {
            assert_eq!(item.value, engine.assess(&inputs()[item.index]).unwrap());
        }
    }

    #[test]
    fn test_skip_invalid_still_aborts_on_engine_errors() {
        let engine = survey_engine();
        let assessor =
            BatchAssessor::new(&engine, BatchConfig::default().with_skip_invalid(true));

        let unencodable = vec![
            (0, Ok(0.2)),
            (
                1,
                Err(RiskError::Encoding {
                    field: "Race".into(),
                    value: "Martian".into(),
                }),
            ),
            (2, Ok(0.7)),
        ];
        let (items, failed) = assessor.partition(unencodable.into_iter()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(failed, vec![1]);

        for fatal in [
            RiskError::SchemaMismatch("width".into()),
            RiskError::Prediction("NaN".into()),
            RiskError::ArtifactLoad {
                artifact: "classifier".into(),
                message: "gone".into(),
            },
        ] {
            let results = vec![(0, Ok(0.2)), (1, Err(fatal.clone()))];
            let err = assessor.partition(results.into_iter()).unwrap_err();
            assert_eq!(err, fatal);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let engine = survey_engine();
        let many: Vec<_> = inputs().into_iter().cycle().take(64).collect();
        let config = BatchConfig::default().with_skip_invalid(true).with_chunk_size(4);

        let seq = BatchAssessor::new(&engine, config.clone())
            .assess_inputs(&many)
            .unwrap();
        let par = BatchAssessor::new(&engine, config.with_parallel(true))
            .assess_inputs(&many)
            .unwrap();

        assert_eq!(seq.items, par.items);
        assert_eq!(seq.failed_indices, par.failed_indices);
        assert_eq!(seq.failed_indices.len(), 16);
    }

    #[test]
    fn test_threshold_override() {
        let engine = survey_engine();
        let assessor = BatchAssessor::new(&engine, BatchConfig::default())
            .with_threshold(RiskThreshold::new(0.0).unwrap());

        let result = assessor.assess_inputs(&[sample_input()]).unwrap();
        assert!(result.values().all(|a| a.label == RiskLabel::AtRisk));
    }

    #[test]
    fn test_score_records() {
        let engine = survey_engine();
        let records: Vec<_> = [sample_input(), sample_input()]
            .iter()
            .map(|raw| FeatureRecord::from_input(raw).unwrap())
            .collect();

        let result = BatchAssessor::new(&engine, BatchConfig::default())
            .score_records(&records)
            .unwrap();
        let scores: Vec<f64> = result.values().copied().collect();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], scores[1]);
        assert!((0.0..=1.0).contains(&scores[0]));
    }

    #[test]
    fn test_empty_batch() {
        let engine = survey_engine();
        let result = BatchAssessor::new(&engine, BatchConfig::default())
            .assess_inputs(&[])
            .unwrap();
        assert_eq!(result.total_count(), 0);
        assert_eq!(result.success_rate(), 0.0);
    }
}
