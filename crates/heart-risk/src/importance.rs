//! Feature importance of the loaded classifier
//!
//! Pairs the classifier's per-slot importances with the slot names of the
//! encoding transform, so a one-hot slot reads as `Race: White` instead of
//! an index. The measure depends on the model family: absolute weight for
//! logistic models, input-to-output connection weight for MLPs and split
//! counts for boosted trees.

use crate::classifier::Classifier;
use crate::transform::EncodingTransform;
use crate::RiskError;
use serde::Serialize;

/// Features shown when no count is requested
pub const DEFAULT_TOP_FEATURES: usize = 10;

/// Importance of one encoded slot, or of a whole column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    /// `column` or `column: category`
    pub feature: String,
    pub column: String,
    pub importance: f64,
}

/// Importances sorted from most to least important
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceReport {
    pub model: String,
    pub method: String,
    pub features: Vec<FeatureImportance>,
}

impl ImportanceReport {
    /// Name the classifier's importances with the transform's slots
    pub fn new(
        transform: &dyn EncodingTransform,
        classifier: &dyn Classifier,
    ) -> Result<Self, RiskError> {
        let slots = transform.slots();
        let importances = classifier.feature_importances();
        if slots.len() != importances.len() {
            return Err(RiskError::SchemaMismatch(format!(
                "transform names {} slots, {} classifier reports {} importances",
                slots.len(),
                classifier.kind(),
                importances.len()
            )));
        }

        let mut features: Vec<FeatureImportance> = slots
            .into_iter()
            .zip(importances)
            .map(|(slot, importance)| FeatureImportance {
                feature: slot.to_string(),
                column: slot.column,
                importance,
            })
            .collect();
        // Stable sort keeps slot order among ties
        features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        Ok(ImportanceReport {
            model: classifier.kind().to_string(),
            method: classifier.importance_method().to_string(),
            features,
        })
    }

    /// The `n` most important slots
    pub fn top(&self, n: usize) -> &[FeatureImportance] {
        &self.features[..n.min(self.features.len())]
    }

    /// Keep only the `n` most important slots
    pub fn truncated(mut self, n: usize) -> Self {
        self.features.truncate(n);
        self
    }

    /// Slot importances summed per column, most important first
    pub fn by_column(&self) -> Self {
        let mut columns: Vec<FeatureImportance> = Vec::new();
        for f in &self.features {
            match columns.iter_mut().find(|c| c.column == f.column) {
                Some(c) => c.importance += f.importance,
                None => columns.push(FeatureImportance {
                    feature: f.column.clone(),
                    column: f.column.clone(),
                    importance: f.importance,
                }),
            }
        }
        columns.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        ImportanceReport {
            model: self.model.clone(),
            method: self.method.clone(),
            features: columns,
        }
    }
}
