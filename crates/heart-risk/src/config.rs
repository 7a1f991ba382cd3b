//! Engine configuration
//!
//! Layered as built-in defaults, then an optional TOML file, then
//! environment variables. The CLI applies its flags on top.
//!
//! ```toml
//! [artifacts]
//! transform = "models/transform.json"
//! classifier = "models/classifier.json"
//!
//! [dataset]
//! path = "data/heart_2020_cleaned.csv"
//!
//! [risk]
//! threshold = 0.4
//! ```

use crate::{RiskError, DEFAULT_RISK_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_TRANSFORM: &str = "HEART_RISK_TRANSFORM";
pub const ENV_CLASSIFIER: &str = "HEART_RISK_CLASSIFIER";
pub const ENV_DATASET: &str = "HEART_RISK_DATASET";
pub const ENV_THRESHOLD: &str = "HEART_RISK_THRESHOLD";

/// Resolved engine settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Encoding transform artifact
    pub transform_path: PathBuf,
    /// Classifier artifact
    pub classifier_path: PathBuf,
    /// Reference dataset; `None` uses the built-in survey profile
    pub dataset_path: Option<PathBuf>,
    /// Decision threshold on the positive-class probability
    pub threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            transform_path: PathBuf::from("models/transform.json"),
            classifier_path: PathBuf::from("models/classifier.json"),
            dataset_path: Some(PathBuf::from("data/heart_2020_cleaned.csv")),
            threshold: DEFAULT_RISK_THRESHOLD,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    artifacts: Option<FileArtifacts>,
    dataset: Option<FileDataset>,
    risk: Option<FileRisk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileArtifacts {
    transform: Option<PathBuf>,
    classifier: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileDataset {
    path: Option<PathBuf>,
    /// `false` skips the dataset and uses the built-in profile
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRisk {
    threshold: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl EngineConfig {
    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, RiskError> {
        let mut cfg = Self::default();
        if let Some(path) = path {
            cfg.apply_file(path)?;
        }
        cfg.apply_env_from(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay a TOML file
    pub fn apply_file(&mut self, path: &Path) -> Result<(), RiskError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RiskError::Config(format!("failed reading config file {}: {}", path.display(), e))
        })?;
        self.apply_toml(&raw).map_err(|e| match e {
            RiskError::Config(msg) => {
                RiskError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(())
    }

    /// Overlay TOML text
    pub fn apply_toml(&mut self, raw: &str) -> Result<(), RiskError> {
        let file_cfg: FileConfig = toml::from_str(raw)
            .map_err(|e| RiskError::Config(format!("failed parsing TOML config: {}", e)))?;

        if let Some(artifacts) = file_cfg.artifacts {
            if let Some(v) = artifacts.transform {
                self.transform_path = v;
            }
            if let Some(v) = artifacts.classifier {
                self.classifier_path = v;
            }
        }
        if let Some(dataset) = file_cfg.dataset {
            if let Some(v) = dataset.path {
                self.dataset_path = Some(v);
            }
            if dataset.enabled == Some(false) {
                self.dataset_path = None;
            }
        }
        if let Some(risk) = file_cfg.risk {
            if let Some(v) = risk.threshold {
                self.threshold = v;
            }
        }
        Ok(())
    }

    /// Overlay environment overrides read through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), RiskError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = non_empty(lookup(ENV_TRANSFORM)) {
            self.transform_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(lookup(ENV_CLASSIFIER)) {
            self.classifier_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(lookup(ENV_DATASET)) {
            self.dataset_path = match v.as_str() {
                "none" | "builtin" => None,
                _ => Some(PathBuf::from(v)),
            };
        }
        if let Some(v) = non_empty(lookup(ENV_THRESHOLD)) {
            self.threshold = v.parse::<f64>().map_err(|_| {
                RiskError::Config(format!("{} must be a number, got '{}'", ENV_THRESHOLD, v))
            })?;
        }
        Ok(())
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_dataset(mut self, path: Option<PathBuf>) -> Self {
        self.dataset_path = path;
        self
    }

    /// Reject settings no engine could start with
    pub fn validate(&self) -> Result<(), RiskError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(RiskError::Config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}
