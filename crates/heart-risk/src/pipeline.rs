//! Risk inference pipeline
//!
//! [`assess`] runs validate → BMI → feature record → encode → predict →
//! label for one submission. [`RiskEngine`] bundles the loaded artifacts and
//! the reference profile, and refuses to start when they disagree.

use crate::artifact::Fingerprint;
use crate::classifier::{Classifier, ClassifierArtifact};
use crate::config::EngineConfig;
use crate::importance::ImportanceReport;
use crate::input::{FeatureRecord, RawInput};
use crate::reference::{InputIssue, ReferenceDataset, ReferenceProfile};
use crate::schema::{self, SCHEMA_VERSION};
use crate::transform::{EncodingTransform, FittedTransform};
use crate::{RiskError, DEFAULT_RISK_THRESHOLD};
use serde::{Deserialize, Serialize};

/// Decision threshold on the positive-class probability
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RiskThreshold(f64);

impl RiskThreshold {
    /// A threshold in `[0, 1]`
    pub fn new(value: f64) -> Result<Self, RiskError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(RiskError::Config(format!(
                "threshold must be within [0, 1], got {}",
                value
            )));
        }
        Ok(RiskThreshold(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// At Risk iff `probability >= threshold`
    pub fn classify(&self, probability: f64) -> RiskLabel {
        if probability >= self.0 {
            RiskLabel::AtRisk
        } else {
            RiskLabel::NotAtRisk
        }
    }
}

impl Default for RiskThreshold {
    fn default() -> Self {
        RiskThreshold(DEFAULT_RISK_THRESHOLD)
    }
}

impl TryFrom<f64> for RiskThreshold {
    type Error = RiskError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        RiskThreshold::new(value)
    }
}

impl From<RiskThreshold> for f64 {
    fn from(threshold: RiskThreshold) -> Self {
        threshold.0
    }
}

/// Binary risk label shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Not at Risk")]
    NotAtRisk,
}

impl RiskLabel {
    pub fn is_at_risk(&self) -> bool {
        matches!(self, RiskLabel::AtRisk)
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLabel::AtRisk => write!(f, "At Risk"),
            RiskLabel::NotAtRisk => write!(f, "Not at Risk"),
        }
    }
}

/// Outcome of one assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Probability of the positive class, in `[0, 1]`
    pub probability: f64,
    pub label: RiskLabel,
    /// Body-mass index derived from the submission
    pub bmi: f64,
    /// Threshold the label was decided against
    pub threshold: RiskThreshold,
}

/// Encode a record and take the positive-class probability
pub fn score_record(
    record: &FeatureRecord,
    transform: &dyn EncodingTransform,
    classifier: &dyn Classifier,
) -> Result<f64, RiskError> {
    let encoded = transform.encode(record)?;
    let probability = classifier.predict_proba(&encoded)?;
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(RiskError::Prediction(format!(
            "{} classifier returned {}, not a probability",
            classifier.kind(),
            probability
        )));
    }
    Ok(probability)
}

/// Assess one submission
pub fn assess(
    raw: &RawInput,
    profile: &ReferenceProfile,
    transform: &dyn EncodingTransform,
    classifier: &dyn Classifier,
    threshold: RiskThreshold,
) -> Result<RiskAssessment, RiskError> {
    profile.validate(raw)?;
    let record = FeatureRecord::from_input(raw)?;
    let probability = score_record(&record, transform, classifier)?;
    let label = threshold.classify(probability);

    log::debug!(
        "Assessed bmi={:.2} p={:.4} threshold={} -> {}",
        record.bmi(),
        probability,
        threshold.value(),
        label
    );

    Ok(RiskAssessment {
        probability,
        label,
        bmi: record.bmi(),
        threshold,
    })
}

/// Verify that profile, transform and classifier agree
///
/// Any disagreement is a [`RiskError::SchemaMismatch`].
pub fn self_check(
    profile: &ReferenceProfile,
    transform: &dyn EncodingTransform,
    classifier: &dyn Classifier,
) -> Result<(), RiskError> {
    if transform.schema_version() != SCHEMA_VERSION {
        return Err(RiskError::SchemaMismatch(format!(
            "transform was fitted for schema '{}', expected '{}'",
            transform.schema_version(),
            SCHEMA_VERSION
        )));
    }

    let columns = transform.columns();
    let expected: Vec<&str> = schema::column_names().collect();
    if columns != expected {
        return Err(RiskError::SchemaMismatch(format!(
            "transform columns [{}] differ from the feature schema [{}]",
            columns.join(", "),
            expected.join(", ")
        )));
    }

    if transform.output_dim() != classifier.input_dim() {
        return Err(RiskError::SchemaMismatch(format!(
            "transform produces {} features, {} classifier expects {}",
            transform.output_dim(),
            classifier.kind(),
            classifier.input_dim()
        )));
    }

    for (column, vocabulary) in profile.vocabularies() {
        for category in vocabulary {
            if !transform.knows_category(column, category) {
                return Err(RiskError::SchemaMismatch(format!(
                    "reference category '{}' of column '{}' has no encoding",
                    category, column
                )));
            }
        }
    }

    for probe in profile.probe_records()? {
        score_record(&probe, transform, classifier).map_err(|e| match e {
            RiskError::SchemaMismatch(_) => e,
            other => RiskError::SchemaMismatch(format!("probe record failed: {}", other)),
        })?;
    }

    Ok(())
}

/// Artifacts, reference profile and threshold shared by every assessment
///
/// Built once at startup and passed by reference; never mutated afterwards.
pub struct RiskEngine {
    profile: ReferenceProfile,
    transform: Box<dyn EncodingTransform>,
    classifier: Box<dyn Classifier>,
    threshold: RiskThreshold,
    fingerprints: Vec<Fingerprint>,
}

/// Static description of a running engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub schema_version: String,
    pub columns: Vec<String>,
    pub encoded_width: usize,
    pub classifier: String,
    pub threshold: f64,
    /// 0 when the built-in profile is in use
    pub reference_rows: usize,
    pub fingerprints: Vec<Fingerprint>,
}

impl RiskEngine {
    /// Bundle the parts and run the startup self-check
    pub fn new(
        profile: ReferenceProfile,
        transform: Box<dyn EncodingTransform>,
        classifier: Box<dyn Classifier>,
        threshold: RiskThreshold,
    ) -> Result<Self, RiskError> {
        self_check(&profile, transform.as_ref(), classifier.as_ref())?;
        log::info!(
            "Risk engine ready: {} columns -> {} features -> {} classifier, threshold {}",
            transform.columns().len(),
            transform.output_dim(),
            classifier.kind(),
            threshold.value()
        );

        Ok(RiskEngine {
            profile,
            transform,
            classifier,
            threshold,
            fingerprints: Vec::new(),
        })
    }

    /// Load every artifact named by the configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self, RiskError> {
        let threshold = RiskThreshold::new(config.threshold)?;
        let transform = FittedTransform::load(&config.transform_path)?;
        let classifier = ClassifierArtifact::load(&config.classifier_path)?;

        let profile = match &config.dataset_path {
            Some(path) => ReferenceProfile::from_dataset(&ReferenceDataset::load(path)?)?,
            None => {
                log::warn!("No reference dataset configured, validating against the built-in survey profile");
                ReferenceProfile::survey_2020()
            }
        };

        let fingerprints = vec![transform.fingerprint().clone(), classifier.fingerprint().clone()];
        let mut engine = Self::new(profile, Box::new(transform), Box::new(classifier), threshold)?;
        engine.fingerprints = fingerprints;
        Ok(engine)
    }

    /// Assess against the configured threshold
    pub fn assess(&self, raw: &RawInput) -> Result<RiskAssessment, RiskError> {
        self.assess_with_threshold(raw, self.threshold)
    }

    /// Assess against a caller-supplied threshold
    pub fn assess_with_threshold(
        &self,
        raw: &RawInput,
        threshold: RiskThreshold,
    ) -> Result<RiskAssessment, RiskError> {
        assess(
            raw,
            &self.profile,
            self.transform.as_ref(),
            self.classifier.as_ref(),
            threshold,
        )
    }

    /// Positive-class probability of an already assembled record
    pub fn score_record(&self, record: &FeatureRecord) -> Result<f64, RiskError> {
        score_record(record, self.transform.as_ref(), self.classifier.as_ref())
    }

    /// Every validation problem with a submission
    pub fn issues(&self, raw: &RawInput) -> Vec<InputIssue> {
        self.profile.issues(raw)
    }

    /// Re-run the startup self-check
    pub fn check(&self) -> Result<(), RiskError> {
        self_check(&self.profile, self.transform.as_ref(), self.classifier.as_ref())
    }

    /// Classifier feature importances named by encoded slot
    pub fn feature_importance(&self) -> Result<ImportanceReport, RiskError> {
        ImportanceReport::new(self.transform.as_ref(), self.classifier.as_ref())
    }

    pub fn threshold(&self) -> RiskThreshold {
        self.threshold
    }

    pub fn profile(&self) -> &ReferenceProfile {
        &self.profile
    }

    /// Fingerprints of artifacts loaded from disk
    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            schema_version: self.transform.schema_version().to_string(),
            columns: self.transform.columns().iter().map(|c| c.to_string()).collect(),
            encoded_width: self.transform.output_dim(),
            classifier: self.classifier.kind().to_string(),
            threshold: self.threshold.value(),
            reference_rows: self.profile.source_rows,
            fingerprints: self.fingerprints.clone(),
        }
    }
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("schema_version", &self.transform.schema_version())
            .field("encoded_width", &self.transform.output_dim())
            .field("classifier", &self.classifier.kind())
            .field("threshold", &self.threshold)
            .field("fingerprints", &self.fingerprints)
            .finish()
    }
}
