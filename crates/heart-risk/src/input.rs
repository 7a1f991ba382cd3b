//! Form answers and the derived feature record
//!
//! A [`RawInput`] is one questionnaire submission. It is turned into a
//! [`FeatureRecord`] by replacing weight and height with body-mass index and
//! laying every answer out in [`FEATURE_SCHEMA`] order.

use crate::reference::InputIssue;
use crate::schema::{FieldKind, FEATURE_COUNT, FEATURE_SCHEMA, NO, YES};
use crate::{RiskError, BMI_FACTOR};
use serde::{Deserialize, Serialize};

/// Sex as recorded in the survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    /// Dataset label
    pub fn label(&self) -> &'static str {
        match self {
            Sex::Female => "Female",
            Sex::Male => "Male",
        }
    }
}

/// One questionnaire submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInput {
    /// Body weight in pounds
    pub weight_lb: f64,
    /// Height in inches
    pub height_in: f64,
    pub smoking: bool,
    pub alcohol_drinking: bool,
    /// History of stroke
    pub stroke: bool,
    /// Days of poor physical health in the last 30
    pub physical_health_days: u32,
    /// Days of poor mental health in the last 30
    pub mental_health_days: u32,
    /// Difficulty walking or climbing stairs
    pub diff_walking: bool,
    pub sex: Sex,
    /// Age bracket label, e.g. "40-44"
    pub age_category: String,
    pub race: String,
    /// Diabetic status label, e.g. "No, borderline diabetes"
    pub diabetic: String,
    /// Physical activity in the last 30 days
    pub physical_activity: bool,
    /// Self-rated general health, e.g. "Very good"
    pub gen_health: String,
    /// Average sleep per night
    pub sleep_hours: u32,
    pub asthma: bool,
    pub kidney_disease: bool,
    pub skin_cancer: bool,
}

impl RawInput {
    /// Check weight and height, the two answers BMI is derived from
    pub fn measurement_issues(&self) -> Vec<InputIssue> {
        let mut issues = Vec::new();

        if !self.weight_lb.is_finite() {
            issues.push(InputIssue::new("weight_lb", "weight must be a finite number"));
        } else if self.weight_lb < 0.0 {
            issues.push(InputIssue::new(
                "weight_lb",
                format!("weight must not be negative (got {})", self.weight_lb),
            ));
        }

        if !self.height_in.is_finite() {
            issues.push(InputIssue::new("height_in", "height must be a finite number"));
        } else if self.height_in <= 0.0 {
            issues.push(InputIssue::new(
                "height_in",
                format!("height must be greater than zero (got {})", self.height_in),
            ));
        }

        // Both answers are individually fine but their ratio may still overflow
        if issues.is_empty() && !body_mass_index(self.weight_lb, self.height_in).is_finite() {
            let squared = self.height_in * self.height_in;
            if !squared.is_normal() {
                issues.push(InputIssue::new(
                    "height_in",
                    format!("height is too small to derive BMI (got {})", self.height_in),
                ));
            } else {
                issues.push(InputIssue::new(
                    "weight_lb",
                    format!("weight is too large to derive BMI (got {})", self.weight_lb),
                ));
            }
        }

        issues
    }

    /// Body-mass index from the weight and height answers
    pub fn bmi(&self) -> Result<f64, RiskError> {
        match self.measurement_issues().into_iter().next() {
            Some(issue) => Err(issue.into()),
            None => Ok(body_mass_index(self.weight_lb, self.height_in)),
        }
    }
}

/// Imperial BMI: `703 × weight / height²`, weight in pounds and height in inches
///
/// Callers must ensure `height_in > 0`; [`RawInput::bmi`] does.
pub fn body_mass_index(weight_lb: f64, height_in: f64) -> f64 {
    BMI_FACTOR * weight_lb / (height_in * height_in)
}

fn yes_no(answer: bool) -> &'static str {
    if answer {
        YES
    } else {
        NO
    }
}

/// A single feature value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Category(String),
}

impl FeatureValue {
    /// Numeric value, if this is a number
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Category(_) => None,
        }
    }

    /// Category label, if this is a category
    pub fn as_category(&self) -> Option<&str> {
        match self {
            FeatureValue::Category(s) => Some(s),
            FeatureValue::Numeric(_) => None,
        }
    }
}

impl std::fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureValue::Numeric(v) => write!(f, "{}", v),
            FeatureValue::Category(s) => write!(f, "{}", s),
        }
    }
}

/// Fixed-schema record consumed by the encoding transform
///
/// Values are stored in [`FEATURE_SCHEMA`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    values: Vec<FeatureValue>,
}

impl FeatureRecord {
    /// Validate the measurements, derive BMI and assemble the record
    pub fn from_input(raw: &RawInput) -> Result<Self, RiskError> {
        let bmi = raw.bmi()?;
        Ok(Self::assemble(raw, bmi))
    }

    /// Assemble a record around an already derived BMI
    pub(crate) fn assemble(raw: &RawInput, bmi: f64) -> Self {
        let values = vec![
            FeatureValue::Numeric(bmi),
            FeatureValue::Category(yes_no(raw.smoking).to_string()),
            FeatureValue::Category(yes_no(raw.alcohol_drinking).to_string()),
            FeatureValue::Category(yes_no(raw.stroke).to_string()),
            FeatureValue::Numeric(raw.physical_health_days as f64),
            FeatureValue::Numeric(raw.mental_health_days as f64),
            FeatureValue::Category(yes_no(raw.diff_walking).to_string()),
            FeatureValue::Category(raw.sex.label().to_string()),
            FeatureValue::Category(raw.age_category.clone()),
            FeatureValue::Category(raw.race.clone()),
            FeatureValue::Category(raw.diabetic.clone()),
            FeatureValue::Category(yes_no(raw.physical_activity).to_string()),
            FeatureValue::Category(raw.gen_health.clone()),
            FeatureValue::Numeric(raw.sleep_hours as f64),
            FeatureValue::Category(yes_no(raw.asthma).to_string()),
            FeatureValue::Category(yes_no(raw.kidney_disease).to_string()),
            FeatureValue::Category(yes_no(raw.skin_cancer).to_string()),
        ];
        FeatureRecord { values }
    }

    /// Build a record from values already in schema order
    ///
    /// Checks the count and that numeric/categorical kinds line up with the schema.
    pub fn from_values(values: Vec<FeatureValue>) -> Result<Self, RiskError> {
        if values.len() != FEATURE_COUNT {
            return Err(RiskError::SchemaMismatch(format!(
                "expected {} feature values, got {}",
                FEATURE_COUNT,
                values.len()
            )));
        }

        for (spec, value) in FEATURE_SCHEMA.iter().zip(values.iter()) {
            let categorical = spec.kind.is_categorical();
            let ok = match value {
                FeatureValue::Numeric(_) => !categorical,
                FeatureValue::Category(_) => categorical,
            };
            if !ok {
                return Err(RiskError::SchemaMismatch(format!(
                    "column '{}' expects a {} value, got '{}'",
                    spec.column,
                    if categorical { "categorical" } else { "numeric" },
                    value
                )));
            }
        }

        Ok(FeatureRecord { values })
    }

    /// Wrap values whose kinds are fixed by construction
    pub(crate) fn from_schema_values(values: Vec<FeatureValue>) -> Self {
        debug_assert_eq!(values.len(), FEATURE_COUNT);
        FeatureRecord { values }
    }

    /// Value for a column name
    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        crate::schema::column_index(column).map(|i| &self.values[i])
    }

    /// Derived body-mass index
    pub fn bmi(&self) -> f64 {
        self.values[0].as_numeric().unwrap_or(f64::NAN)
    }

    /// Values in schema order
    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    /// Iterate `(column, kind, value)` in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, FieldKind, &FeatureValue)> {
        FEATURE_SCHEMA
            .iter()
            .zip(self.values.iter())
            .map(|(spec, value)| (spec.column, spec.kind, value))
    }
}
