//! Descriptive statistics of the reference dataset
//!
//! Outcome balance, per-category counts split by outcome, and numeric
//! column statistics. Used by the `summary` command.

use crate::input::FeatureValue;
use crate::reference::ReferenceDataset;
use crate::RiskError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rows with and without the condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub with_condition: usize,
    pub without_condition: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: bool) {
        if outcome {
            self.with_condition += 1;
        } else {
            self.without_condition += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.with_condition + self.without_condition
    }
}

/// Statistics of one numeric column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0.0 for fewer than two rows
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl NumericSummary {
    fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return NumericSummary {
                count,
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            var.sqrt()
        };

        NumericSummary {
            count,
            mean,
            std_dev,
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Overview of a labelled survey dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    /// Rows reporting heart disease
    pub positive: usize,
    /// Share of rows reporting heart disease
    pub positive_share: f64,
    /// Column -> category -> outcome counts
    pub categories: BTreeMap<String, BTreeMap<String, OutcomeCounts>>,
    /// Column -> statistics
    pub numeric: BTreeMap<String, NumericSummary>,
}

impl DatasetSummary {
    pub fn from_dataset(dataset: &ReferenceDataset) -> Result<Self, RiskError> {
        let mut positive = 0;
        let mut categories: BTreeMap<String, BTreeMap<String, OutcomeCounts>> = BTreeMap::new();
        let mut numeric_values: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();

        for row in dataset.rows() {
            let outcome = row.outcome()?;
            if outcome {
                positive += 1;
            }

            for (column, _, value) in row.to_feature_record().iter() {
                match value {
                    FeatureValue::Numeric(v) => numeric_values.entry(column).or_default().push(*v),
                    FeatureValue::Category(c) => categories
                        .entry(column.to_string())
                        .or_default()
                        .entry(c.clone())
                        .or_default()
                        .record(outcome),
                }
            }
        }

        let numeric = numeric_values
            .into_iter()
            .map(|(column, values)| (column.to_string(), NumericSummary::from_values(&values)))
            .collect();

        let rows = dataset.len();
        Ok(DatasetSummary {
            rows,
            positive,
            positive_share: if rows == 0 {
                0.0
            } else {
                positive as f64 / rows as f64
            },
            categories,
            numeric,
        })
    }
}
