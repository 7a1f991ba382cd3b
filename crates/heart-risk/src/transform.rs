//! Fitted encoding transform
//!
//! Maps a [`FeatureRecord`] to the numeric vector the classifier was trained
//! on. The transform is fitted offline and exported as JSON:
//!
//! ```json
//! {
//!   "schema_version": "heart-2020/v1",
//!   "columns": [
//!     { "name": "BMI", "encoding": "numeric", "mean": 28.3, "scale": 6.4 },
//!     { "name": "Smoking", "encoding": "one_hot", "categories": ["No", "Yes"] },
//!     { "name": "GenHealth", "encoding": "ordinal",
//!       "categories": ["Poor", "Fair", "Good", "Very good", "Excellent"] }
//!   ]
//! }
//! ```
//!
//! `numeric` standardizes as `(x - mean) / scale`, `one_hot` emits one slot
//! per category (minus the first when `drop_first` is set) and `ordinal`
//! emits the category's position.

use crate::artifact::{self, Fingerprint};
use crate::input::{FeatureRecord, FeatureValue};
use crate::schema::FEATURE_SCHEMA;
use crate::RiskError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A fitted function from feature records to numeric vectors
pub trait EncodingTransform: Send + Sync {
    /// Schema version the transform was fitted against
    fn schema_version(&self) -> &str;

    /// Column names in the order the transform consumes them
    fn columns(&self) -> Vec<&str>;

    /// Width of the encoded vector
    fn output_dim(&self) -> usize;

    /// Whether the transform has an encoding for `category` in `column`
    fn knows_category(&self, column: &str, category: &str) -> bool;

    /// Encode one record
    fn encode(&self, record: &FeatureRecord) -> Result<Vec<f64>, RiskError>;

    /// Name of every encoded slot, in output order
    fn slots(&self) -> Vec<Slot>;
}

/// Source of one encoded slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub column: String,
    /// One-hot category, `None` for numeric and ordinal columns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.category {
            Some(category) => write!(f, "{}: {}", self.column, category),
            None => write!(f, "{}", self.column),
        }
    }
}

fn unit_scale() -> f64 {
    1.0
}

/// Encoding step for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum ColumnStep {
    /// Standardized numeric passthrough
    Numeric {
        name: String,
        #[serde(default)]
        mean: f64,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
    /// One slot per category
    OneHot {
        name: String,
        categories: Vec<String>,
        #[serde(default)]
        drop_first: bool,
    },
    /// Position of the category in an ordered list
    Ordinal { name: String, categories: Vec<String> },
}

impl ColumnStep {
    pub fn name(&self) -> &str {
        match self {
            ColumnStep::Numeric { name, .. }
            | ColumnStep::OneHot { name, .. }
            | ColumnStep::Ordinal { name, .. } => name,
        }
    }

    /// Number of output slots
    pub fn width(&self) -> usize {
        match self {
            ColumnStep::Numeric { .. } | ColumnStep::Ordinal { .. } => 1,
            ColumnStep::OneHot {
                categories,
                drop_first,
                ..
            } => categories.len().saturating_sub(usize::from(*drop_first)),
        }
    }

    fn categories(&self) -> Option<&[String]> {
        match self {
            ColumnStep::Numeric { .. } => None,
            ColumnStep::OneHot { categories, .. } | ColumnStep::Ordinal { categories, .. } => {
                Some(categories)
            }
        }
    }
}

/// Serializable transform artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformFile {
    pub schema_version: String,
    pub columns: Vec<ColumnStep>,
}

/// Transform loaded from a JSON artifact
#[derive(Debug, Clone)]
pub struct FittedTransform {
    schema_version: String,
    steps: Vec<ColumnStep>,
    /// Per step: category -> position
    lookups: Vec<HashMap<String, usize>>,
    output_dim: usize,
    fingerprint: Fingerprint,
}

impl FittedTransform {
    /// Build from an in-memory artifact
    pub fn new(file: TransformFile) -> Result<Self, RiskError> {
        let bytes = serde_json::to_vec(&file).map_err(|e| RiskError::ArtifactLoad {
            artifact: "transform".to_string(),
            message: e.to_string(),
        })?;
        let fingerprint = Fingerprint::of_bytes("transform", "<memory>", &bytes);
        Self::from_parts(file, fingerprint)
    }

    /// Load a transform artifact file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RiskError> {
        let (file, fingerprint) = artifact::load_json::<TransformFile, _>("transform", path)?;
        Self::from_parts(file, fingerprint)
    }

    /// Parse a transform artifact from JSON bytes
    pub fn from_json(bytes: &[u8]) -> Result<Self, RiskError> {
        let (file, fingerprint) = artifact::parse_json::<TransformFile>("transform", "<memory>", bytes)?;
        Self::from_parts(file, fingerprint)
    }

    fn from_parts(file: TransformFile, fingerprint: Fingerprint) -> Result<Self, RiskError> {
        let malformed = |message: String| RiskError::ArtifactLoad {
            artifact: "transform".to_string(),
            message,
        };

        let mut lookups = Vec::with_capacity(file.columns.len());
        for step in &file.columns {
            if let ColumnStep::Numeric { name, mean, scale } = step {
                if !mean.is_finite() || !scale.is_finite() || *scale == 0.0 {
                    return Err(malformed(format!(
                        "column '{}' has invalid mean/scale ({}, {})",
                        name, mean, scale
                    )));
                }
            }

            let mut lookup = HashMap::new();
            if let Some(categories) = step.categories() {
                if categories.is_empty() {
                    return Err(malformed(format!("column '{}' has no categories", step.name())));
                }
                for (idx, category) in categories.iter().enumerate() {
                    if lookup.insert(category.clone(), idx).is_some() {
                        return Err(malformed(format!(
                            "column '{}' lists category '{}' twice",
                            step.name(),
                            category
                        )));
                    }
                }
            }
            lookups.push(lookup);
        }

        let output_dim = file.columns.iter().map(ColumnStep::width).sum();

        Ok(FittedTransform {
            schema_version: file.schema_version,
            steps: file.columns,
            lookups,
            output_dim,
            fingerprint,
        })
    }

    /// Fingerprint of the artifact this transform was loaded from
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Encoding steps in column order
    pub fn steps(&self) -> &[ColumnStep] {
        &self.steps
    }
}

impl EncodingTransform for FittedTransform {
    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn columns(&self) -> Vec<&str> {
        self.steps.iter().map(ColumnStep::name).collect()
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn knows_category(&self, column: &str, category: &str) -> bool {
        self.steps
            .iter()
            .position(|s| s.name() == column)
            .map(|idx| self.lookups[idx].contains_key(category))
            .unwrap_or(false)
    }

    fn slots(&self) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(self.output_dim);
        for step in &self.steps {
            match step {
                ColumnStep::Numeric { name, .. } | ColumnStep::Ordinal { name, .. } => {
                    slots.push(Slot {
                        column: name.clone(),
                        category: None,
                    });
                }
                ColumnStep::OneHot {
                    name,
                    categories,
                    drop_first,
                } => {
                    slots.extend(categories.iter().skip(usize::from(*drop_first)).map(|c| Slot {
                        column: name.clone(),
                        category: Some(c.clone()),
                    }));
                }
            }
        }
        slots
    }

    fn encode(&self, record: &FeatureRecord) -> Result<Vec<f64>, RiskError> {
        if self.steps.len() != FEATURE_SCHEMA.len() {
            return Err(RiskError::SchemaMismatch(format!(
                "transform has {} columns, feature record has {}",
                self.steps.len(),
                FEATURE_SCHEMA.len()
            )));
        }

        let mut output = Vec::with_capacity(self.output_dim);

        for ((step, lookup), (column, _, value)) in
            self.steps.iter().zip(&self.lookups).zip(record.iter())
        {
            if step.name() != column {
                return Err(RiskError::SchemaMismatch(format!(
                    "transform expects column '{}' where the record has '{}'",
                    step.name(),
                    column
                )));
            }

            match (step, value) {
                (ColumnStep::Numeric { mean, scale, .. }, FeatureValue::Numeric(x)) => {
                    if !x.is_finite() {
                        return Err(RiskError::Encoding {
                            field: column.to_string(),
                            value: x.to_string(),
                        });
                    }
                    output.push((x - mean) / scale);
                }
                (ColumnStep::OneHot { drop_first, .. }, FeatureValue::Category(c)) => {
                    let idx = *lookup.get(c).ok_or_else(|| RiskError::Encoding {
                        field: column.to_string(),
                        value: c.clone(),
                    })?;
                    let start = output.len();
                    output.resize(start + step.width(), 0.0);
                    if *drop_first {
                        if idx > 0 {
                            output[start + idx - 1] = 1.0;
                        }
                    } else {
                        output[start + idx] = 1.0;
                    }
                }
                (ColumnStep::Ordinal { .. }, FeatureValue::Category(c)) => {
                    let idx = *lookup.get(c).ok_or_else(|| RiskError::Encoding {
                        field: column.to_string(),
                        value: c.clone(),
                    })?;
                    output.push(idx as f64);
                }
                (step, value) => {
                    return Err(RiskError::SchemaMismatch(format!(
                        "column '{}' cannot apply {} encoding to '{}'",
                        column,
                        match step {
                            ColumnStep::Numeric { .. } => "numeric",
                            ColumnStep::OneHot { .. } => "one_hot",
                            ColumnStep::Ordinal { .. } => "ordinal",
                        },
                        value
                    )));
                }
            }
        }

        Ok(output)
    }
}
