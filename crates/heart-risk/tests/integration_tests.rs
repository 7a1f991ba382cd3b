//! Integration tests for Heart Risk
//!
//! Loads the on-disk fixtures (survey sample, transform, logistic classifier)
//! and exercises the engine end to end: configuration, self-check,
//! assessment, batch scoring, evaluation and the dataset summary.

use heart_risk::batch::{BatchAssessor, BatchConfig};
use heart_risk::config::{ENV_DATASET, ENV_THRESHOLD};
use heart_risk::metrics::evaluate;
use heart_risk::schema::{AGE_CATEGORIES, DIABETIC_STATUSES, GEN_HEALTH_RATINGS, RACES};
use heart_risk::summary::DatasetSummary;
use heart_risk::*;
use std::io::Write;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture_config() -> EngineConfig {
    EngineConfig {
        transform_path: fixture("transform.json"),
        classifier_path: fixture("classifier.json"),
        dataset_path: Some(fixture("heart_sample.csv")),
        threshold: DEFAULT_RISK_THRESHOLD,
    }
}

fn fixture_engine() -> RiskEngine {
    RiskEngine::from_config(&fixture_config()).unwrap()
}

/// 150 lb, 65 in, Female, 40-44, White, no conditions, active, "Very good"
fn healthy_input() -> RawInput {
    RawInput {
        weight_lb: 150.0,
        height_in: 65.0,
        smoking: false,
        alcohol_drinking: false,
        stroke: false,
        physical_health_days: 0,
        mental_health_days: 0,
        diff_walking: false,
        sex: Sex::Female,
        age_category: "40-44".to_string(),
        race: "White".to_string(),
        diabetic: "No".to_string(),
        physical_activity: true,
        gen_health: "Very good".to_string(),
        sleep_hours: 8,
        asthma: false,
        kidney_disease: false,
        skin_cancer: false,
    }
}

fn high_risk_input() -> RawInput {
    RawInput {
        weight_lb: 230.0,
        height_in: 68.0,
        smoking: true,
        stroke: true,
        physical_health_days: 10,
        diff_walking: true,
        sex: Sex::Male,
        age_category: "80 or older".to_string(),
        diabetic: "Yes".to_string(),
        physical_activity: false,
        gen_health: "Poor".to_string(),
        sleep_hours: 6,
        kidney_disease: true,
        ..healthy_input()
    }
}

// =============================================================================
// Engine startup
// =============================================================================

mod startup {
    use super::*;

    #[test]
    fn test_engine_loads_fixtures() {
        let engine = fixture_engine();
        let info = engine.info();

        assert_eq!(info.schema_version, SCHEMA_VERSION);
        assert_eq!(info.columns.len(), 17);
        assert_eq!(info.encoded_width, 34);
        assert_eq!(info.classifier, "logistic");
        assert_eq!(info.reference_rows, 24);
        assert_eq!(info.fingerprints.len(), 2);
        assert!(info.fingerprints.iter().all(|f| f.sha256.len() == 64));
        assert!(engine.check().is_ok());
    }

    #[test]
    fn test_dataset_profile_matches_builtin() {
        let engine = fixture_engine();
        let builtin = ReferenceProfile::survey_2020();

        assert_eq!(engine.profile().vocabularies(), builtin.vocabularies());
        for column in ["PhysicalHealth", "MentalHealth", "SleepTime"] {
            assert_eq!(engine.profile().bounds(column), builtin.bounds(column));
        }
    }

    #[test]
    fn test_builtin_profile_fallback() {
        let config = fixture_config().with_dataset(None);
        let engine = RiskEngine::from_config(&config).unwrap();
        assert_eq!(engine.info().reference_rows, 0);
        assert!(engine.assess(&healthy_input()).is_ok());
    }

    #[test]
    fn test_missing_artifact_is_fatal() {
        let mut config = fixture_config();
        config.classifier_path = fixture("no_such_model.json");

        let err = RiskEngine::from_config(&config).unwrap_err();
        assert!(matches!(err, RiskError::ArtifactLoad { ref artifact, .. } if artifact == "classifier"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_missing_dataset_is_fatal() {
        let config = fixture_config().with_dataset(Some(fixture("missing.csv")));
        let err = RiskEngine::from_config(&config).unwrap_err();
        assert!(matches!(err, RiskError::ReferenceData(_)));
    }

    #[test]
    fn test_width_mismatch_rejected_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrow.json");
        let weights = vec![0.1; 30];
        std::fs::write(
            &path,
            serde_json::json!({ "model": "logistic", "weights": weights, "intercept": 0.0 })
                .to_string(),
        )
        .unwrap();

        let mut config = fixture_config();
        config.classifier_path = path;

        let err = RiskEngine::from_config(&config).unwrap_err();
        assert!(matches!(err, RiskError::SchemaMismatch(_)));
    }

    #[test]
    fn test_vocabulary_gap_rejected_at_startup() {
        let text = std::fs::read_to_string(fixture("transform.json")).unwrap();
        let text = text.replace("\"Yes (during pregnancy)\"", "\"Gestational\"");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let mut config = fixture_config();
        config.transform_path = file.path().to_path_buf();

        let err = RiskEngine::from_config(&config).unwrap_err();
        assert!(
            matches!(err, RiskError::SchemaMismatch(ref m) if m.contains("Yes (during pregnancy)")),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_config_file_and_env_layering() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[artifacts]\ntransform = {:?}\nclassifier = {:?}\n\n[risk]\nthreshold = 0.6",
            fixture("transform.json").display().to_string(),
            fixture("classifier.json").display().to_string()
        )
        .unwrap();

        let mut config = EngineConfig::default();
        config.apply_file(file.path()).unwrap();
        assert_eq!(config.threshold, 0.6);

        config
            .apply_env_from(|key| match key {
                k if k == ENV_THRESHOLD => Some("0.25".to_string()),
                k if k == ENV_DATASET => Some("none".to_string()),
                _ => None,
            })
            .unwrap();

        let engine = RiskEngine::from_config(&config).unwrap();
        assert_eq!(engine.threshold().value(), 0.25);
        assert_eq!(engine.info().reference_rows, 0);
    }
}

// =============================================================================
// Assessment
// =============================================================================

mod assessment {
    use super::*;

    #[test]
    fn test_healthy_scenario() {
        let engine = fixture_engine();
        let assessment = engine.assess(&healthy_input()).unwrap();

        assert!((assessment.bmi - 24.96).abs() < 0.005);
        assert!((0.0..=1.0).contains(&assessment.probability));
        assert_eq!(assessment.label, RiskLabel::NotAtRisk);
        assert_eq!(assessment.threshold.value(), 0.4);
    }

    #[test]
    fn test_high_risk_scenario() {
        let engine = fixture_engine();
        let assessment = engine.assess(&high_risk_input()).unwrap();

        assert!(assessment.probability >= 0.4);
        assert_eq!(assessment.label, RiskLabel::AtRisk);
        assert!(assessment.probability > engine.assess(&healthy_input()).unwrap().probability);
    }

    #[test]
    fn test_free_function_matches_engine() {
        let engine = fixture_engine();
        let transform = FittedTransform::load(fixture("transform.json")).unwrap();
        let classifier = ClassifierArtifact::load(fixture("classifier.json")).unwrap();

        let direct = assess(
            &healthy_input(),
            engine.profile(),
            &transform,
            &classifier,
            RiskThreshold::default(),
        )
        .unwrap();
        assert_eq!(direct, engine.assess(&healthy_input()).unwrap());
    }

    #[test]
    fn test_assessment_json_shape() {
        let engine = fixture_engine();
        let value = serde_json::to_value(engine.assess(&high_risk_input()).unwrap()).unwrap();

        assert_eq!(value["label"], "At Risk");
        assert_eq!(value["threshold"], 0.4);
        assert!(value["probability"].is_f64());
        assert!(value["bmi"].is_f64());
    }

    #[test]
    fn test_every_issue_reported() {
        let engine = fixture_engine();
        let mut raw = healthy_input();
        raw.height_in = -1.0;
        raw.age_category = "999+".to_string();
        raw.sleep_hours = 25;

        let issues = engine.issues(&raw);
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["height_in", "age_category", "sleep_hours"]);

        // assess reports the first one
        let err = engine.assess(&raw).unwrap_err();
        assert_eq!(err.field(), Some("height_in"));
    }

    #[test]
    fn test_overflowing_bmi_rejected_as_input() {
        let engine = fixture_engine();
        for (weight, height, field) in [(1e308, 1.0, "weight_lb"), (150.0, 1e-160, "height_in")] {
            let mut raw = healthy_input();
            raw.weight_lb = weight;
            raw.height_in = height;

            let issues = engine.issues(&raw);
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].field, field);

            let err = engine.assess(&raw).unwrap_err();
            assert!(err.is_recoverable());
            assert_eq!(err.field(), Some(field));
        }
    }

    #[test]
    fn test_all_diabetic_statuses_accepted() {
        let engine = fixture_engine();
        for status in DIABETIC_STATUSES {
            let mut raw = healthy_input();
            raw.diabetic = status.to_string();
            assert!(engine.assess(&raw).is_ok(), "rejected {}", status);
        }
    }

    #[test]
    fn test_raw_input_from_json_file() {
        let engine = fixture_engine();
        let json = serde_json::to_string(&high_risk_input()).unwrap();
        let raw: RawInput = serde_json::from_str(&json).unwrap();
        assert_eq!(engine.assess(&raw).unwrap().label, RiskLabel::AtRisk);
    }
}

// =============================================================================
// Batch, evaluation, summary
// =============================================================================

mod dataset {
    use super::*;

    #[test]
    fn test_batch_over_submissions() {
        let engine = fixture_engine();
        let mut invalid = healthy_input();
        invalid.race = "Martian".to_string();
        let inputs = vec![healthy_input(), invalid, high_risk_input()];

        let assessor = BatchAssessor::new(&engine, BatchConfig::default().with_skip_invalid(true));
        let result = assessor.assess_inputs(&inputs).unwrap();

        assert_eq!(result.failed_indices, vec![1]);
        let labels: Vec<_> = result.values().map(|a| a.label).collect();
        assert_eq!(labels, vec![RiskLabel::NotAtRisk, RiskLabel::AtRisk]);
    }

    #[test]
    fn test_evaluate_fixture() {
        let engine = fixture_engine();
        let dataset = ReferenceDataset::load(fixture("heart_sample.csv")).unwrap();

        let report = evaluate(&engine, &dataset, engine.threshold(), BatchConfig::default()).unwrap();

        assert_eq!(report.rows, 24);
        assert_eq!(report.skipped, 0);
        let c = report.confusion;
        assert_eq!(c.tp + c.fn_, 7);
        assert_eq!(c.tn + c.fp, 17);
        assert_eq!(report.yes.support, 7);
        assert_eq!(report.no.support, 17);
        assert!((report.accuracy - (c.tp + c.tn) as f64 / 24.0).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&report.roc_auc));
        // Positives are older respondents in poorer health; the model ranks them higher
        assert!(report.roc_auc > 0.5);

        assert_eq!(report.top_features.len(), 10);
        assert_eq!(report.top_features[3].feature, "KidneyDisease: Yes");
    }

    #[test]
    fn test_feature_importance_fixture() {
        let engine = fixture_engine();
        let report = engine.feature_importance().unwrap();

        assert_eq!(report.model, "logistic");
        assert_eq!(report.method, "abs_weight");
        assert_eq!(report.features.len(), 34);

        // Ties keep encoding order
        let top: Vec<&str> = report.top(4).iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(top, vec!["Stroke: No", "Stroke: Yes", "GenHealth", "KidneyDisease: Yes"]);

        let columns = report.by_column();
        assert_eq!(columns.features.len(), 17);
        assert_eq!(columns.features[0].column, "Stroke");
        assert!((columns.features[0].importance - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_threshold_extremes() {
        let engine = fixture_engine();
        let dataset = ReferenceDataset::load(fixture("heart_sample.csv")).unwrap();

        let all_yes = evaluate(&engine, &dataset, RiskThreshold::new(0.0).unwrap(), BatchConfig::default()).unwrap();
        assert_eq!(all_yes.confusion.tp, 7);
        assert_eq!(all_yes.confusion.fp, 17);
        assert_eq!(all_yes.no.recall, 0.0);
        assert_eq!(all_yes.no.precision, 0.0);

        // ROC-AUC ignores the threshold
        let default = evaluate(&engine, &dataset, engine.threshold(), BatchConfig::default()).unwrap();
        assert_eq!(all_yes.roc_auc, default.roc_auc);
    }

    #[test]
    fn test_evaluate_parallel_matches_sequential() {
        let engine = fixture_engine();
        let dataset = ReferenceDataset::load(fixture("heart_sample.csv")).unwrap();

        let seq = evaluate(&engine, &dataset, engine.threshold(), BatchConfig::default()).unwrap();
        let par = evaluate(
            &engine,
            &dataset,
            engine.threshold(),
            BatchConfig::default().with_parallel(true).with_chunk_size(5),
        )
        .unwrap();

        assert_eq!(seq.confusion, par.confusion);
        assert_eq!(seq.roc_auc, par.roc_auc);
    }

    #[test]
    fn test_summary_fixture() {
        let dataset = ReferenceDataset::load(fixture("heart_sample.csv")).unwrap();
        let summary = DatasetSummary::from_dataset(&dataset).unwrap();

        assert_eq!(summary.rows, 24);
        assert_eq!(summary.positive, 7);
        assert_eq!(summary.categories["AgeCategory"].len(), AGE_CATEGORIES.len());
        assert_eq!(summary.categories["Race"].len(), RACES.len());
        assert_eq!(summary.categories["GenHealth"].len(), GEN_HEALTH_RATINGS.len());

        let total: usize = summary.categories["Sex"].values().map(|c| c.total()).sum();
        assert_eq!(total, 24);
        assert_eq!(summary.numeric["SleepTime"].min, 1.0);
        assert_eq!(summary.numeric["SleepTime"].max, 24.0);
    }
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;
    use proptest::sample::select;
    use std::sync::OnceLock;

    fn engine() -> &'static RiskEngine {
        static ENGINE: OnceLock<RiskEngine> = OnceLock::new();
        ENGINE.get_or_init(fixture_engine)
    }

    prop_compose! {
        fn valid_input()(
            measurements in (0.0f64..600.0, 20.0f64..96.0),
            flags in prop::collection::vec(any::<bool>(), 9),
            days in (0u32..=30, 0u32..=30, 1u32..=24),
            male in any::<bool>(),
            categories in (
                select(AGE_CATEGORIES.to_vec()),
                select(RACES.to_vec()),
                select(DIABETIC_STATUSES.to_vec()),
                select(GEN_HEALTH_RATINGS.to_vec()),
            )
        ) -> RawInput {
            RawInput {
                weight_lb: measurements.0,
                height_in: measurements.1,
                smoking: flags[0],
                alcohol_drinking: flags[1],
                stroke: flags[2],
                physical_health_days: days.0,
                mental_health_days: days.1,
                diff_walking: flags[3],
                sex: if male { Sex::Male } else { Sex::Female },
                age_category: categories.0.to_string(),
                race: categories.1.to_string(),
                diabetic: categories.2.to_string(),
                physical_activity: flags[4],
                gen_health: categories.3.to_string(),
                sleep_hours: days.2,
                asthma: flags[5],
                kidney_disease: flags[6],
                skin_cancer: flags[7],
            }
        }
    }

    proptest! {
        #[test]
        fn prop_probability_in_unit_interval(raw in valid_input()) {
            let assessment = engine().assess(&raw).unwrap();
            prop_assert!((0.0..=1.0).contains(&assessment.probability));
            prop_assert_eq!(assessment.label.is_at_risk(), assessment.probability >= 0.4);
        }

        #[test]
        fn prop_threshold_changes_only_label(raw in valid_input(), t in 0.0f64..=1.0) {
            let threshold = RiskThreshold::new(t).unwrap();
            let base = engine().assess(&raw).unwrap();
            let moved = engine().assess_with_threshold(&raw, threshold).unwrap();

            prop_assert_eq!(base.probability, moved.probability);
            prop_assert_eq!(base.bmi, moved.bmi);
            prop_assert_eq!(moved.label.is_at_risk(), moved.probability >= t);
        }

        #[test]
        fn prop_assessment_is_idempotent(raw in valid_input()) {
            prop_assert_eq!(engine().assess(&raw).unwrap(), engine().assess(&raw).unwrap());
        }

        #[test]
        fn prop_non_positive_height_is_invalid_input(raw in valid_input(), h in -100.0f64..=0.0) {
            let mut raw = raw;
            raw.height_in = h;
            let err = engine().assess(&raw).unwrap_err();
            prop_assert!(err.is_recoverable());
            prop_assert_eq!(err.field(), Some("height_in"));
        }

        #[test]
        fn prop_extreme_measurements_never_fail_encoding(
            raw in valid_input(),
            w in prop_oneof![0.0f64..1e6, 1e300f64..f64::MAX],
            h in prop_oneof![1e-200f64..1e-150, 1e-3f64..1e3],
        ) {
            let mut raw = raw;
            raw.weight_lb = w;
            raw.height_in = h;
            match engine().assess(&raw) {
                Ok(assessment) => {
                    prop_assert!(assessment.bmi.is_finite());
                    prop_assert!((0.0..=1.0).contains(&assessment.probability));
                }
                Err(err) => {
                    prop_assert!(err.is_recoverable(), "fatal error for valid-looking form: {}", err);
                    let field = err.field().unwrap_or_default();
                    prop_assert!(field == "weight_lb" || field == "height_in");
                    prop_assert!(!engine().issues(&raw).is_empty());
                }
            }
        }

        #[test]
        fn prop_bmi_is_exact(w in 1.0f64..600.0, h in 20.0f64..96.0) {
            let expected = 703.0 * w / (h * h);
            prop_assert!((body_mass_index(w, h) - expected).abs() <= 1e-9 * expected);
        }
    }
}
