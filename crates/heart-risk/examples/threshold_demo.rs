//! Demo: how the decision threshold moves the label, not the probability
//!
//! Run with:
//!   cargo run --example threshold_demo

use heart_risk::*;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn main() -> Result<(), RiskError> {
    println!("{}", "=".repeat(60));
    println!("HEART RISK THRESHOLD DEMO");
    println!("{}", "=".repeat(60));
    println!();

    let config = EngineConfig {
        transform_path: fixture("transform.json"),
        classifier_path: fixture("classifier.json"),
        dataset_path: Some(fixture("heart_sample.csv")),
        threshold: DEFAULT_RISK_THRESHOLD,
    };
    let engine = RiskEngine::from_config(&config)?;

    for fp in engine.fingerprints() {
        println!("  {:<10} {}  {}", fp.artifact, fp.short(), fp.source);
    }
    println!();

    let mut raw = RawInput {
        weight_lb: 195.0,
        height_in: 69.0,
        smoking: true,
        alcohol_drinking: false,
        stroke: false,
        physical_health_days: 4,
        mental_health_days: 2,
        diff_walking: false,
        sex: Sex::Male,
        age_category: "65-69".to_string(),
        race: "White".to_string(),
        diabetic: "No, borderline diabetes".to_string(),
        physical_activity: false,
        gen_health: "Fair".to_string(),
        sleep_hours: 6,
        asthma: false,
        kidney_disease: false,
        skin_cancer: false,
    };

    println!("{:<12} {:>12} {:>14}", "threshold", "probability", "label");
    println!("{}", "-".repeat(40));
    for t in [0.2, 0.3, 0.4, 0.5, 0.6] {
        let assessment = engine.assess_with_threshold(&raw, RiskThreshold::new(t)?)?;
        println!(
            "{:<12.2} {:>12.4} {:>14}",
            t, assessment.probability, assessment.label
        );
    }
    println!();

    // A form with mistakes reports every field at once
    raw.height_in = 0.0;
    raw.age_category = "66".to_string();
    println!("Rejected submission:");
    for issue in engine.issues(&raw) {
        println!("  {}: {}", issue.field, issue.reason);
    }

    Ok(())
}
