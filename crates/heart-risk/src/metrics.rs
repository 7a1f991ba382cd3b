//! Model evaluation against a labelled dataset
//!
//! Scores every dataset row through the engine and reports the confusion
//! matrix, accuracy, ROC-AUC, a per-class precision/recall/F1 table and the
//! classifier's most important features.
//! Ratios with a zero denominator are reported as 0.0.

use crate::batch::{BatchAssessor, BatchConfig};
use crate::importance::{FeatureImportance, DEFAULT_TOP_FEATURES};
use crate::pipeline::{RiskEngine, RiskThreshold};
use crate::reference::ReferenceDataset;
use crate::RiskError;
use serde::Serialize;

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Binary confusion counts, "Yes" being the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Count outcomes with `prediction >= threshold` as positive
    pub fn from_scores(predictions: &[f64], labels: &[bool], threshold: f64) -> Self {
        let mut matrix = ConfusionMatrix::default();

        for (&pred, &label) in predictions.iter().zip(labels.iter()) {
            match (pred >= threshold, label) {
                (true, true) => matrix.tp += 1,
                (true, false) => matrix.fp += 1,
                (false, false) => matrix.tn += 1,
                (false, true) => matrix.fn_ += 1,
            }
        }

        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Report for the positive ("Yes") class
    pub fn positive_report(&self) -> ClassReport {
        ClassReport::new(self.tp, self.fp, self.fn_)
    }

    /// Report for the negative ("No") class
    pub fn negative_report(&self) -> ClassReport {
        ClassReport::new(self.tn, self.fn_, self.fp)
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Rows whose true label is this class
    pub support: usize,
}

impl ClassReport {
    fn new(hits: usize, false_alarms: usize, misses: usize) -> Self {
        let precision = ratio(hits, hits + false_alarms);
        let recall = ratio(hits, hits + misses);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        ClassReport {
            precision,
            recall,
            f1,
            support: hits + misses,
        }
    }
}

/// ROC-AUC via the Mann-Whitney statistic; tied scores count half
///
/// Returns 0.5 when either class is absent.
pub fn roc_auc(predictions: &[f64], labels: &[bool]) -> f64 {
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;

    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    // Sort by predictions ascending
    let mut pairs: Vec<(f64, bool)> = predictions
        .iter()
        .zip(labels.iter())
        .map(|(&p, &l)| (p, l))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut auc = 0.0;
    let mut negatives_below = 0usize;
    let mut i = 0;

    while i < pairs.len() {
        // Group of tied scores
        let mut j = i;
        let mut pos_in_group = 0usize;
        let mut neg_in_group = 0usize;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            if pairs[j].1 {
                pos_in_group += 1;
            } else {
                neg_in_group += 1;
            }
            j += 1;
        }

        auc += pos_in_group as f64 * (negatives_below as f64 + 0.5 * neg_in_group as f64);
        negatives_below += neg_in_group;
        i = j;
    }

    auc / (n_pos as f64 * n_neg as f64)
}

/// Classifier quality on a labelled dataset
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Rows that were scored
    pub rows: usize,
    /// Rows that could not be scored
    pub skipped: usize,
    pub threshold: f64,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub roc_auc: f64,
    /// Report for the "No" class
    pub no: ClassReport,
    /// Report for the "Yes" class
    pub yes: ClassReport,
    /// Most important encoded features, empty when built from bare scores
    pub top_features: Vec<FeatureImportance>,
}

impl EvaluationReport {
    /// Build from scores and true labels
    pub fn from_scores(predictions: &[f64], labels: &[bool], threshold: RiskThreshold) -> Self {
        let confusion = ConfusionMatrix::from_scores(predictions, labels, threshold.value());

        EvaluationReport {
            rows: confusion.total(),
            skipped: 0,
            threshold: threshold.value(),
            confusion,
            accuracy: confusion.accuracy(),
            roc_auc: roc_auc(predictions, labels),
            no: confusion.negative_report(),
            yes: confusion.positive_report(),
            top_features: Vec::new(),
        }
    }
}

/// Score every dataset row and compare against its `HeartDisease` label
pub fn evaluate(
    engine: &RiskEngine,
    dataset: &ReferenceDataset,
    threshold: RiskThreshold,
    config: BatchConfig,
) -> Result<EvaluationReport, RiskError> {
    let labels = dataset
        .rows()
        .iter()
        .map(|row| row.outcome())
        .collect::<Result<Vec<bool>, RiskError>>()?;
    let records: Vec<_> = dataset.rows().iter().map(|row| row.to_feature_record()).collect();

    let result = BatchAssessor::new(engine, config).score_records(&records)?;

    let predictions: Vec<f64> = result.values().copied().collect();
    let scored_labels: Vec<bool> = result.items.iter().map(|item| labels[item.index]).collect();

    let mut report = EvaluationReport::from_scores(&predictions, &scored_labels, threshold);
    report.skipped = result.failed_indices.len();
    report.top_features = engine
        .feature_importance()?
        .truncated(DEFAULT_TOP_FEATURES)
        .features;

    log::info!(
        "Evaluated {} rows ({} skipped): accuracy {:.4}, ROC-AUC {:.4}",
        report.rows,
        report.skipped,
        report.accuracy,
        report.roc_auc
    );

    Ok(report)
}
