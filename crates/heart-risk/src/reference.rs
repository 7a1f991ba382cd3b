//! Reference dataset and the validation profile derived from it
//!
//! The survey CSV is read once at startup. Its observed ranges and category
//! sets become the [`ReferenceProfile`] every submission is validated against.

use crate::input::{FeatureRecord, FeatureValue, RawInput};
use crate::schema::{self, FieldKind, FEATURE_SCHEMA, NO, OUTCOME_COLUMN, YES};
use crate::RiskError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

/// BMI used for probe records; the profile does not bound BMI
const PROBE_BMI: f64 = 25.0;

/// One rejected form answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputIssue {
    /// `RawInput` field name
    pub field: String,
    /// Human-readable reason, suitable for re-prompting
    pub reason: String,
}

impl InputIssue {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        InputIssue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<InputIssue> for RiskError {
    fn from(issue: InputIssue) -> Self {
        RiskError::InvalidInput {
            field: issue.field,
            reason: issue.reason,
        }
    }
}

/// One row of the survey dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    #[serde(rename = "HeartDisease")]
    pub heart_disease: String,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "Smoking")]
    pub smoking: String,
    #[serde(rename = "AlcoholDrinking")]
    pub alcohol_drinking: String,
    #[serde(rename = "Stroke")]
    pub stroke: String,
    #[serde(rename = "PhysicalHealth")]
    pub physical_health: f64,
    #[serde(rename = "MentalHealth")]
    pub mental_health: f64,
    #[serde(rename = "DiffWalking")]
    pub diff_walking: String,
    #[serde(rename = "Sex")]
    pub sex: String,
    #[serde(rename = "AgeCategory")]
    pub age_category: String,
    #[serde(rename = "Race")]
    pub race: String,
    #[serde(rename = "Diabetic")]
    pub diabetic: String,
    #[serde(rename = "PhysicalActivity")]
    pub physical_activity: String,
    #[serde(rename = "GenHealth")]
    pub gen_health: String,
    #[serde(rename = "SleepTime")]
    pub sleep_time: f64,
    #[serde(rename = "Asthma")]
    pub asthma: String,
    #[serde(rename = "KidneyDisease")]
    pub kidney_disease: String,
    #[serde(rename = "SkinCancer")]
    pub skin_cancer: String,
}

impl SurveyRecord {
    /// Whether the respondent reported heart disease
    pub fn outcome(&self) -> Result<bool, RiskError> {
        match self.heart_disease.as_str() {
            YES => Ok(true),
            NO => Ok(false),
            other => Err(RiskError::ReferenceData(format!(
                "{} must be Yes or No, got '{}'",
                OUTCOME_COLUMN, other
            ))),
        }
    }

    /// Feature record for this row, BMI taken from the dataset column
    pub fn to_feature_record(&self) -> FeatureRecord {
        let cat = |s: &String| FeatureValue::Category(s.clone());
        let values = vec![
            FeatureValue::Numeric(self.bmi),
            cat(&self.smoking),
            cat(&self.alcohol_drinking),
            cat(&self.stroke),
            FeatureValue::Numeric(self.physical_health),
            FeatureValue::Numeric(self.mental_health),
            cat(&self.diff_walking),
            cat(&self.sex),
            cat(&self.age_category),
            cat(&self.race),
            cat(&self.diabetic),
            cat(&self.physical_activity),
            cat(&self.gen_health),
            FeatureValue::Numeric(self.sleep_time),
            cat(&self.asthma),
            cat(&self.kidney_disease),
            cat(&self.skin_cancer),
        ];
        FeatureRecord::from_schema_values(values)
    }
}

/// The survey dataset held in memory
#[derive(Debug, Clone, Default)]
pub struct ReferenceDataset {
    rows: Vec<SurveyRecord>,
}

impl ReferenceDataset {
    /// Parse a CSV with a header row containing the outcome and all schema columns
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RiskError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| RiskError::ReferenceData(format!("Failed to read CSV header: {}", e)))?
            .clone();

        let required = std::iter::once(OUTCOME_COLUMN).chain(schema::column_names());
        for column in required {
            if !headers.iter().any(|h| h == column) {
                return Err(RiskError::ReferenceData(format!(
                    "Missing column '{}'",
                    column
                )));
            }
        }

        let mut rows = Vec::new();
        for (idx, result) in csv_reader.deserialize::<SurveyRecord>().enumerate() {
            // +2: one for the header, one for 1-based line numbers
            let row = result.map_err(|e| {
                RiskError::ReferenceData(format!("Line {}: {}", idx + 2, e))
            })?;
            rows.push(row);
        }

        Ok(ReferenceDataset { rows })
    }

    /// Load a CSV file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RiskError> {
        let file = std::fs::File::open(path.as_ref()).map_err(|e| {
            RiskError::ReferenceData(format!(
                "Failed to open {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let dataset = Self::from_reader(std::io::BufReader::new(file))?;
        log::info!(
            "Loaded reference dataset {} ({} rows)",
            path.as_ref().display(),
            dataset.len()
        );
        Ok(dataset)
    }

    /// Build from rows already in memory
    pub fn from_rows(rows: Vec<SurveyRecord>) -> Self {
        ReferenceDataset { rows }
    }

    pub fn rows(&self) -> &[SurveyRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericBounds {
    pub min: f64,
    pub max: f64,
}

impl NumericBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Numeric bounds and category vocabularies used to validate submissions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceProfile {
    /// Rows the profile was derived from; 0 for the built-in profile
    pub source_rows: usize,
    bounds: BTreeMap<String, NumericBounds>,
    vocabularies: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceProfile {
    /// Built-in profile of the 2020 survey
    pub fn survey_2020() -> Self {
        let mut bounds = BTreeMap::new();
        let mut vocabularies = BTreeMap::new();

        for spec in FEATURE_SCHEMA.iter() {
            if let Some((min, max)) = schema::survey_bounds(spec.column) {
                bounds.insert(spec.column.to_string(), NumericBounds { min, max });
            }
            if let Some(vocab) = schema::survey_vocabulary(spec.column) {
                vocabularies.insert(
                    spec.column.to_string(),
                    vocab.iter().map(|s| s.to_string()).collect(),
                );
            }
        }

        ReferenceProfile {
            source_rows: 0,
            bounds,
            vocabularies,
        }
    }

    /// Derive observed ranges and category sets from the dataset
    pub fn from_dataset(dataset: &ReferenceDataset) -> Result<Self, RiskError> {
        if dataset.is_empty() {
            return Err(RiskError::ReferenceData(
                "Cannot derive a profile from an empty dataset".to_string(),
            ));
        }

        let mut bounds: BTreeMap<String, NumericBounds> = BTreeMap::new();
        let mut vocabularies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for row in dataset.rows() {
            let record = row.to_feature_record();
            for (column, kind, value) in record.iter() {
                match (kind, value) {
                    (FieldKind::Count, FeatureValue::Numeric(v)) => {
                        if !v.is_finite() {
                            return Err(RiskError::ReferenceData(format!(
                                "Non-finite value in column '{}'",
                                column
                            )));
                        }
                        bounds
                            .entry(column.to_string())
                            .and_modify(|b| {
                                b.min = b.min.min(*v);
                                b.max = b.max.max(*v);
                            })
                            .or_insert(NumericBounds { min: *v, max: *v });
                    }
                    (FieldKind::Binary | FieldKind::Categorical, FeatureValue::Category(c)) => {
                        vocabularies
                            .entry(column.to_string())
                            .or_default()
                            .insert(c.clone());
                    }
                    _ => {}
                }
            }
        }

        Ok(ReferenceProfile {
            source_rows: dataset.len(),
            bounds,
            vocabularies,
        })
    }

    /// Observed range of a count column
    pub fn bounds(&self, column: &str) -> Option<NumericBounds> {
        self.bounds.get(column).copied()
    }

    /// Known categories of a categorical column
    pub fn vocabulary(&self, column: &str) -> Option<&BTreeSet<String>> {
        self.vocabularies.get(column)
    }

    /// All vocabularies keyed by column
    pub fn vocabularies(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.vocabularies
    }

    /// Every problem with a submission, in schema order
    pub fn issues(&self, raw: &RawInput) -> Vec<InputIssue> {
        let mut issues = raw.measurement_issues();
        // BMI is not bounded, so a placeholder is fine for the remaining checks
        let record = FeatureRecord::assemble(raw, f64::NAN);
        issues.extend(self.record_issues(&record));
        issues
    }

    /// Reject the submission on its first problem
    pub fn validate(&self, raw: &RawInput) -> Result<(), RiskError> {
        match self.issues(raw).into_iter().next() {
            Some(issue) => Err(issue.into()),
            None => Ok(()),
        }
    }

    /// Check bounded counts and category membership of an assembled record
    pub fn record_issues(&self, record: &FeatureRecord) -> Vec<InputIssue> {
        let mut issues = Vec::new();

        for (spec, value) in FEATURE_SCHEMA.iter().zip(record.values()) {
            match (spec.kind, value) {
                (FieldKind::Count, FeatureValue::Numeric(v)) => match self.bounds(spec.column) {
                    Some(b) if !b.contains(*v) => issues.push(InputIssue::new(
                        spec.input,
                        format!("{} is outside the observed range {}..={}", v, b.min, b.max),
                    )),
                    Some(_) => {}
                    None => issues.push(InputIssue::new(
                        spec.input,
                        format!("no reference range for column '{}'", spec.column),
                    )),
                },
                (FieldKind::Binary | FieldKind::Categorical, FeatureValue::Category(c)) => {
                    match self.vocabulary(spec.column) {
                        Some(vocab) if vocab.contains(c) => {}
                        Some(vocab) => issues.push(InputIssue::new(
                            spec.input,
                            format!(
                                "unknown category '{}' (expected one of: {})",
                                c,
                                vocab.iter().cloned().collect::<Vec<_>>().join(", ")
                            ),
                        )),
                        None => issues.push(InputIssue::new(
                            spec.input,
                            format!("no reference categories for column '{}'", spec.column),
                        )),
                    }
                }
                _ => {}
            }
        }

        issues
    }

    /// Records covering every known category, for the startup check
    ///
    /// The first record takes the first category and lower bound of every
    /// column; each following record varies exactly one categorical column.
    pub fn probe_records(&self) -> Result<Vec<FeatureRecord>, RiskError> {
        let mut base = Vec::with_capacity(FEATURE_SCHEMA.len());
        for spec in FEATURE_SCHEMA.iter() {
            let value = match spec.kind {
                FieldKind::Continuous => FeatureValue::Numeric(PROBE_BMI),
                FieldKind::Count => {
                    let b = self.bounds(spec.column).ok_or_else(|| {
                        RiskError::SchemaMismatch(format!(
                            "reference profile has no range for '{}'",
                            spec.column
                        ))
                    })?;
                    FeatureValue::Numeric(b.min)
                }
                FieldKind::Binary | FieldKind::Categorical => {
                    let first = self
                        .vocabulary(spec.column)
                        .and_then(|v| v.iter().next())
                        .ok_or_else(|| {
                            RiskError::SchemaMismatch(format!(
                                "reference profile has no categories for '{}'",
                                spec.column
                            ))
                        })?;
                    FeatureValue::Category(first.clone())
                }
            };
            base.push(value);
        }

        let mut probes = vec![FeatureRecord::from_values(base.clone())?];
        for (idx, spec) in FEATURE_SCHEMA.iter().enumerate() {
            let Some(vocab) = self.vocabulary(spec.column) else {
                continue;
            };
            for category in vocab.iter().skip(1) {
                let mut values = base.clone();
                values[idx] = FeatureValue::Category(category.clone());
                probes.push(FeatureRecord::from_values(values)?);
            }
        }

        Ok(probes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::tests::sample_input;

    const SAMPLE_CSV: &str = "\
HeartDisease,BMI,Smoking,AlcoholDrinking,Stroke,PhysicalHealth,MentalHealth,DiffWalking,Sex,AgeCategory,Race,Diabetic,PhysicalActivity,GenHealth,SleepTime,Asthma,KidneyDisease,SkinCancer
No,16.6,Yes,No,No,3.0,30.0,No,Female,55-59,White,Yes,Yes,Very good,5.0,Yes,No,Yes
No,20.34,No,No,Yes,0.0,0.0,No,Female,80 or older,White,No,Yes,Very good,7.0,No,No,No
Yes,26.58,Yes,No,No,20.0,30.0,No,Male,65-69,White,Yes,Yes,Fair,8.0,Yes,No,No
No,24.21,No,No,No,0.0,0.0,No,Female,75-79,White,\"No, borderline diabetes\",No,Good,6.0,No,No,Yes
";

    #[test]
    fn test_parse_csv() {
        let dataset = ReferenceDataset::from_reader(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.rows()[3].diabetic, "No, borderline diabetes");
        assert!(dataset.rows()[2].outcome().unwrap());
        assert!(!dataset.rows()[0].outcome().unwrap());
    }

    #[test]
    fn test_missing_column_rejected() {
        let csv = "HeartDisease,BMI\nNo,20.0\n";
        let err = ReferenceDataset::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, RiskError::ReferenceData(ref m) if m.contains("Smoking")));
    }

    #[test]
    fn test_profile_from_dataset() {
        let dataset = ReferenceDataset::from_reader(SAMPLE_CSV.as_bytes()).unwrap();
        let profile = ReferenceProfile::from_dataset(&dataset).unwrap();

        assert_eq!(profile.source_rows, 4);
        assert_eq!(
            profile.bounds("PhysicalHealth"),
            Some(NumericBounds { min: 0.0, max: 20.0 })
        );
        assert_eq!(
            profile.bounds("SleepTime"),
            Some(NumericBounds { min: 5.0, max: 8.0 })
        );
        let diabetic = profile.vocabulary("Diabetic").unwrap();
        assert_eq!(diabetic.len(), 3);
        assert!(diabetic.contains("No, borderline diabetes"));
        assert!(profile.vocabulary("BMI").is_none());
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let err = ReferenceProfile::from_dataset(&ReferenceDataset::default()).unwrap_err();
        assert!(matches!(err, RiskError::ReferenceData(_)));
    }

    #[test]
    fn test_builtin_profile_accepts_sample() {
        let profile = ReferenceProfile::survey_2020();
        assert!(profile.issues(&sample_input()).is_empty());
        assert!(profile.validate(&sample_input()).is_ok());
    }

    #[test]
    fn test_unknown_age_category() {
        let profile = ReferenceProfile::survey_2020();
        let mut raw = sample_input();
        raw.age_category = "999+".to_string();

        let err = profile.validate(&raw).unwrap_err();
        assert_eq!(err.field(), Some("age_category"));
        assert!(err.to_string().contains("999+"));
    }

    #[test]
    fn test_out_of_range_counts() {
        let profile = ReferenceProfile::survey_2020();
        let mut raw = sample_input();
        raw.mental_health_days = 31;
        raw.sleep_hours = 0;

        let issues = profile.issues(&raw);
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["mental_health_days", "sleep_hours"]);
    }

    #[test]
    fn test_issues_collects_everything() {
        let profile = ReferenceProfile::survey_2020();
        let mut raw = sample_input();
        raw.height_in = 0.0;
        raw.race = "Martian".to_string();
        raw.gen_health = "Superb".to_string();

        let issues = profile.issues(&raw);
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["height_in", "race", "gen_health"]);
    }

    #[test]
    fn test_dataset_profile_is_stricter_than_builtin() {
        let dataset = ReferenceDataset::from_reader(SAMPLE_CSV.as_bytes()).unwrap();
        let profile = ReferenceProfile::from_dataset(&dataset).unwrap();

        // "40-44" never appears in the sample rows
        let err = profile.validate(&sample_input()).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_probe_records_cover_vocabularies() {
        let profile = ReferenceProfile::survey_2020();
        let probes = profile.probe_records().unwrap();

        let extra: usize = profile.vocabularies().values().map(|v| v.len() - 1).sum();
        assert_eq!(probes.len(), 1 + extra);
        for probe in &probes {
            assert!(profile.record_issues(probe).is_empty());
        }
    }
}
