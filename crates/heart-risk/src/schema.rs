//! Feature schema for the 2020 CDC heart disease survey
//!
//! The order of [`FEATURE_SCHEMA`] is the column order the fitted encoding
//! transform was trained on. Artifacts carry the [`SCHEMA_VERSION`] they were
//! fitted against and are rejected at startup when it differs.

use serde::Serialize;

/// Version tag shared by the schema, the transform artifact and the reference profile
pub const SCHEMA_VERSION: &str = "heart-2020/v1";

/// Number of fields in a feature record
pub const FEATURE_COUNT: usize = 17;

/// Outcome column of the reference dataset
pub const OUTCOME_COLUMN: &str = "HeartDisease";

/// Label used by the dataset for a positive binary answer
pub const YES: &str = "Yes";

/// Label used by the dataset for a negative binary answer
pub const NO: &str = "No";

/// How a schema field is represented and validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Derived continuous value (BMI), not bounded by the reference data
    Continuous,
    /// Integer count bounded by the observed dataset range
    Count,
    /// Yes/No answer
    Binary,
    /// One label out of a known vocabulary
    Categorical,
}

impl FieldKind {
    /// Whether values of this kind are category labels
    pub fn is_categorical(&self) -> bool {
        matches!(self, FieldKind::Binary | FieldKind::Categorical)
    }
}

/// One column of the feature schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Column name in the dataset and the transform artifact
    pub column: &'static str,
    /// Name of the originating `RawInput` field, used in validation messages
    pub input: &'static str,
    /// Field representation
    pub kind: FieldKind,
}

const fn field(column: &'static str, input: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { column, input, kind }
}

/// Fixed column order expected by the encoding transform
pub const FEATURE_SCHEMA: [FieldSpec; FEATURE_COUNT] = [
    field("BMI", "bmi", FieldKind::Continuous),
    field("Smoking", "smoking", FieldKind::Binary),
    field("AlcoholDrinking", "alcohol_drinking", FieldKind::Binary),
    field("Stroke", "stroke", FieldKind::Binary),
    field("PhysicalHealth", "physical_health_days", FieldKind::Count),
    field("MentalHealth", "mental_health_days", FieldKind::Count),
    field("DiffWalking", "diff_walking", FieldKind::Binary),
    field("Sex", "sex", FieldKind::Categorical),
    field("AgeCategory", "age_category", FieldKind::Categorical),
    field("Race", "race", FieldKind::Categorical),
    field("Diabetic", "diabetic", FieldKind::Categorical),
    field("PhysicalActivity", "physical_activity", FieldKind::Binary),
    field("GenHealth", "gen_health", FieldKind::Categorical),
    field("SleepTime", "sleep_hours", FieldKind::Count),
    field("Asthma", "asthma", FieldKind::Binary),
    field("KidneyDisease", "kidney_disease", FieldKind::Binary),
    field("SkinCancer", "skin_cancer", FieldKind::Binary),
];

/// Look up a field by its column name
pub fn field_spec(column: &str) -> Option<&'static FieldSpec> {
    FEATURE_SCHEMA.iter().find(|f| f.column == column)
}

/// Position of a column in the schema
pub fn column_index(column: &str) -> Option<usize> {
    FEATURE_SCHEMA.iter().position(|f| f.column == column)
}

/// Column names in schema order
pub fn column_names() -> impl Iterator<Item = &'static str> {
    FEATURE_SCHEMA.iter().map(|f| f.column)
}

// =============================================================================
// Survey 2020 vocabularies
// =============================================================================

/// Age brackets, youngest first
pub const AGE_CATEGORIES: [&str; 13] = [
    "18-24",
    "25-29",
    "30-34",
    "35-39",
    "40-44",
    "45-49",
    "50-54",
    "55-59",
    "60-64",
    "65-69",
    "70-74",
    "75-79",
    "80 or older",
];

/// Race labels as recorded in the survey
pub const RACES: [&str; 6] = [
    "American Indian/Alaskan Native",
    "Asian",
    "Black",
    "Hispanic",
    "Other",
    "White",
];

/// Diabetic status labels; the survey records two qualified answers besides Yes/No
pub const DIABETIC_STATUSES: [&str; 4] = [
    "No",
    "No, borderline diabetes",
    "Yes",
    "Yes (during pregnancy)",
];

/// General health rating, worst first
pub const GEN_HEALTH_RATINGS: [&str; 5] = ["Poor", "Fair", "Good", "Very good", "Excellent"];

/// Sex labels
pub const SEXES: [&str; 2] = ["Female", "Male"];

/// Binary answer labels
pub const BINARY_ANSWERS: [&str; 2] = [NO, YES];

/// Observed range of physical/mental health days in the survey
pub const HEALTH_DAYS_RANGE: (f64, f64) = (0.0, 30.0);

/// Observed range of reported sleep hours in the survey
pub const SLEEP_HOURS_RANGE: (f64, f64) = (1.0, 24.0);

/// Built-in vocabulary for a categorical column
pub fn survey_vocabulary(column: &str) -> Option<&'static [&'static str]> {
    match column {
        "Sex" => Some(&SEXES),
        "AgeCategory" => Some(&AGE_CATEGORIES),
        "Race" => Some(&RACES),
        "Diabetic" => Some(&DIABETIC_STATUSES),
        "GenHealth" => Some(&GEN_HEALTH_RATINGS),
        other => match field_spec(other) {
            Some(spec) if spec.kind == FieldKind::Binary => Some(&BINARY_ANSWERS),
            _ => None,
        },
    }
}

/// Built-in bounds for a count column
pub fn survey_bounds(column: &str) -> Option<(f64, f64)> {
    match column {
        "PhysicalHealth" | "MentalHealth" => Some(HEALTH_DAYS_RANGE),
        "SleepTime" => Some(SLEEP_HOURS_RANGE),
        _ => None,
    }
}
