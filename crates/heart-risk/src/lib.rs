//! Heart Risk - survey based heart disease risk inference
//!
//! Turns the answers of a health questionnaire into a heart disease risk
//! score using two pre-fitted artifacts: an encoding transform (one-hot /
//! ordinal encoding of the survey fields) and a binary classifier.
//!
//! # Pipeline
//!
//! 1. Validate the raw answers against the reference dataset profile
//! 2. Derive body-mass index from weight (lb) and height (in)
//! 3. Assemble the fixed-order feature record
//! 4. Encode it with the fitted transform
//! 5. Take the positive-class probability from the classifier
//! 6. Label it against the configured threshold
//!
//! # Example
//!
//! ```ignore
//! use heart_risk::{EngineConfig, RawInput, RiskEngine};
//!
//! let config = EngineConfig::load(Some("heart-risk.toml".as_ref()))?;
//! let engine = RiskEngine::from_config(&config)?;
//!
//! let answers: RawInput = serde_json::from_str(&form_json)?;
//! let assessment = engine.assess(&answers)?;
//! println!("{} ({:.1}%)", assessment.label, assessment.probability * 100.0);
//! ```

pub mod artifact;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod importance;
pub mod input;
pub mod metrics;
pub mod pipeline;
pub mod reference;
pub mod schema;
pub mod summary;
pub mod transform;

// Re-export commonly used types for convenience
pub use classifier::{Classifier, ClassifierArtifact};
pub use config::EngineConfig;
pub use importance::{FeatureImportance, ImportanceReport};
pub use input::{body_mass_index, FeatureRecord, FeatureValue, RawInput, Sex};
pub use pipeline::{assess, RiskAssessment, RiskEngine, RiskLabel, RiskThreshold};
pub use reference::{InputIssue, ReferenceDataset, ReferenceProfile};
pub use schema::{FEATURE_SCHEMA, SCHEMA_VERSION};
pub use transform::{EncodingTransform, FittedTransform, Slot};

/// Imperial BMI conversion factor (lb/in² to kg/m²)
pub const BMI_FACTOR: f64 = 703.0;

/// Default decision threshold; favours recall for a screening tool
pub const DEFAULT_RISK_THRESHOLD: f64 = 0.4;

/// Errors that can occur while loading artifacts or assessing risk
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    /// A form answer is missing, out of range, or not a known category
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    /// The transform has no encoding for a categorical value
    #[error("Cannot encode '{value}' for column '{field}'")]
    Encoding { field: String, value: String },

    /// The feature record disagrees with the loaded artifacts
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A transform or classifier artifact could not be loaded
    #[error("Failed to load {artifact}: {message}")]
    ArtifactLoad { artifact: String, message: String },

    /// The classifier did not produce a probability
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// The reference dataset is unreadable or malformed
    #[error("Reference data error: {0}")]
    ReferenceData(String),

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RiskError {
    /// Shorthand for an input validation failure
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the end user can fix this by correcting the form
    ///
    /// Everything else needs operator intervention; retrying gives the same result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RiskError::InvalidInput { .. })
    }

    /// Offending field for input and encoding errors
    pub fn field(&self) -> Option<&str> {
        match self {
            RiskError::InvalidInput { field, .. } | RiskError::Encoding { field, .. } => Some(field),
            _ => None,
        }
    }
}
