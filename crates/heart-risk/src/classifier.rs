//! Pre-trained binary classifiers
//!
//! Models are trained offline and exported to JSON for inference here. The
//! `model` field selects the architecture:
//!
//! - `logistic`: `sigmoid(w · x + intercept)`
//! - `mlp`: two-layer network, ReLU hidden layer, softmax output
//! - `boosted_trees`: sum of regression trees on a logit margin
//!
//! # Example
//!
//! ```ignore
//! let classifier = ClassifierArtifact::load("models/classifier.json")?;
//! let p = classifier.predict_proba(&encoded)?;
//! println!("P(heart disease) = {:.3}", p);
//! ```

use crate::artifact::{self, Fingerprint};
use crate::RiskError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A fitted binary classifier over encoded feature vectors
pub trait Classifier: Send + Sync {
    /// Expected width of the encoded vector
    fn input_dim(&self) -> usize;

    /// Short model family name for logs
    fn kind(&self) -> &str;

    /// Probability of the positive class, in `[0, 1]`
    fn predict_proba(&self, features: &[f64]) -> Result<f64, RiskError>;

    /// How [`Classifier::feature_importances`] is measured
    fn importance_method(&self) -> &str;

    /// One non-negative importance per input slot
    fn feature_importances(&self) -> Vec<f64>;
}

fn default_positive_class() -> usize {
    1
}

/// One node of a regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Go `left` when `x[feature] <= threshold`, else `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: f64 },
}

/// Regression tree stored as a node array rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Serializable classifier artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelSpec {
    Logistic {
        weights: Vec<f64>,
        intercept: f64,
    },
    Mlp {
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        /// (input_dim, hidden_dim)
        #[serde(rename = "W1")]
        w1: Vec<Vec<f64>>,
        b1: Vec<f64>,
        /// (hidden_dim, output_dim)
        #[serde(rename = "W2")]
        w2: Vec<Vec<f64>>,
        b2: Vec<f64>,
        /// Output index of the heart disease class
        #[serde(default = "default_positive_class")]
        positive_class: usize,
    },
    BoostedTrees {
        input_dim: usize,
        #[serde(default)]
        base_score: f64,
        trees: Vec<Tree>,
    },
}

impl ModelSpec {
    fn kind(&self) -> &'static str {
        match self {
            ModelSpec::Logistic { .. } => "logistic",
            ModelSpec::Mlp { .. } => "mlp",
            ModelSpec::BoostedTrees { .. } => "boosted_trees",
        }
    }

    fn input_dim(&self) -> usize {
        match self {
            ModelSpec::Logistic { weights, .. } => weights.len(),
            ModelSpec::Mlp { input_dim, .. } | ModelSpec::BoostedTrees { input_dim, .. } => {
                *input_dim
            }
        }
    }

    /// Shape and finiteness checks, so inference never indexes out of bounds
    fn check(&self) -> Result<(), String> {
        match self {
            ModelSpec::Logistic { weights, intercept } => {
                if weights.is_empty() {
                    return Err("logistic model has no weights".to_string());
                }
                if !intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
                    return Err("logistic model has non-finite coefficients".to_string());
                }
            }
            ModelSpec::Mlp {
                input_dim,
                hidden_dim,
                output_dim,
                w1,
                b1,
                w2,
                b2,
                positive_class,
            } => {
                if *output_dim < 2 {
                    return Err(format!("mlp needs at least 2 outputs, has {}", output_dim));
                }
                if *positive_class >= *output_dim {
                    return Err(format!(
                        "positive_class {} is out of range for {} outputs",
                        positive_class, output_dim
                    ));
                }
                check_layer("W1", w1, b1, *input_dim, *hidden_dim)?;
                check_layer("W2", w2, b2, *hidden_dim, *output_dim)?;
            }
            ModelSpec::BoostedTrees {
                input_dim,
                base_score,
                trees,
            } => {
                if !base_score.is_finite() {
                    return Err("base_score must be finite".to_string());
                }
                if trees.is_empty() {
                    return Err("boosted model has no trees".to_string());
                }
                for (t, tree) in trees.iter().enumerate() {
                    if tree.nodes.is_empty() {
                        return Err(format!("tree {} has no nodes", t));
                    }
                    for (n, node) in tree.nodes.iter().enumerate() {
                        match node {
                            TreeNode::Leaf { value } if !value.is_finite() => {
                                return Err(format!("tree {} node {} has a non-finite leaf", t, n));
                            }
                            TreeNode::Leaf { .. } => {}
                            TreeNode::Split {
                                feature,
                                threshold,
                                left,
                                right,
                            } => {
                                if *feature >= *input_dim {
                                    return Err(format!(
                                        "tree {} node {} splits on feature {} of {}",
                                        t, n, feature, input_dim
                                    ));
                                }
                                if threshold.is_nan() {
                                    return Err(format!("tree {} node {} has a NaN threshold", t, n));
                                }
                                // Children after parents rules out cycles
                                for child in [left, right] {
                                    if *child <= n || *child >= tree.nodes.len() {
                                        return Err(format!(
                                            "tree {} node {} has invalid child {}",
                                            t, n, child
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_layer(
    name: &str,
    weights: &[Vec<f64>],
    bias: &[f64],
    rows: usize,
    cols: usize,
) -> Result<(), String> {
    if weights.len() != rows || weights.iter().any(|row| row.len() != cols) {
        return Err(format!("{} must be {}x{}", name, rows, cols));
    }
    if bias.len() != cols {
        return Err(format!("bias for {} must have {} entries, has {}", name, cols, bias.len()));
    }
    let finite = weights.iter().flatten().chain(bias.iter()).all(|v| v.is_finite());
    if !finite {
        return Err(format!("{} has non-finite values", name));
    }
    Ok(())
}

/// Numerically stable logistic function
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Forward pass through a single dense layer
fn forward_layer(input: &[f64], weights: &[Vec<f64>], bias: &[f64], apply_relu: bool) -> Vec<f64> {
    let mut output = bias.to_vec();

    // output = input @ weights + bias
    for (inp, row) in input.iter().zip(weights) {
        for (out_val, w) in output.iter_mut().zip(row) {
            *out_val += inp * w;
        }
    }

    if apply_relu {
        for v in output.iter_mut() {
            *v = v.max(0.0);
        }
    }
    output
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max_logit = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp_logits: Vec<f64> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f64 = exp_logits.iter().sum();
    exp_logits.iter().map(|&x| x / sum).collect()
}

/// Classifier loaded from a JSON artifact
#[derive(Debug, Clone)]
pub struct ClassifierArtifact {
    model: ModelSpec,
    fingerprint: Fingerprint,
}

impl ClassifierArtifact {
    /// Build from an in-memory model
    pub fn new(model: ModelSpec) -> Result<Self, RiskError> {
        let bytes = serde_json::to_vec(&model).map_err(|e| RiskError::ArtifactLoad {
            artifact: "classifier".to_string(),
            message: e.to_string(),
        })?;
        let fingerprint = Fingerprint::of_bytes("classifier", "<memory>", &bytes);
        Self::from_parts(model, fingerprint)
    }

    /// Load a classifier artifact file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RiskError> {
        let (model, fingerprint) = artifact::load_json::<ModelSpec, _>("classifier", path)?;
        Self::from_parts(model, fingerprint)
    }

    /// Parse a classifier artifact from JSON bytes
    pub fn from_json(bytes: &[u8]) -> Result<Self, RiskError> {
        let (model, fingerprint) = artifact::parse_json::<ModelSpec>("classifier", "<memory>", bytes)?;
        Self::from_parts(model, fingerprint)
    }

    fn from_parts(model: ModelSpec, fingerprint: Fingerprint) -> Result<Self, RiskError> {
        model.check().map_err(|message| RiskError::ArtifactLoad {
            artifact: "classifier".to_string(),
            message,
        })?;
        Ok(ClassifierArtifact { model, fingerprint })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }
}

impl Classifier for ClassifierArtifact {
    fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    fn kind(&self) -> &str {
        self.model.kind()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, RiskError> {
        if features.len() != self.input_dim() {
            return Err(RiskError::SchemaMismatch(format!(
                "{} classifier expects {} features, got {}",
                self.kind(),
                self.input_dim(),
                features.len()
            )));
        }

        let p = match &self.model {
            ModelSpec::Logistic { weights, intercept } => {
                let z: f64 = intercept + weights.iter().zip(features).map(|(w, x)| w * x).sum::<f64>();
                sigmoid(z)
            }
            ModelSpec::Mlp {
                w1,
                b1,
                w2,
                b2,
                positive_class,
                ..
            } => {
                let hidden = forward_layer(features, w1, b1, true);
                let logits = forward_layer(&hidden, w2, b2, false);
                softmax(&logits)[*positive_class]
            }
            ModelSpec::BoostedTrees {
                base_score, trees, ..
            } => {
                let margin: f64 = base_score + trees.iter().map(|t| t.evaluate(features)).sum::<f64>();
                sigmoid(margin)
            }
        };

        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(RiskError::Prediction(format!(
                "{} classifier produced {} for a finite input",
                self.kind(),
                p
            )));
        }
        Ok(p)
    }

    fn importance_method(&self) -> &str {
        match &self.model {
            ModelSpec::Logistic { .. } => "abs_weight",
            ModelSpec::Mlp { .. } => "connection_weight",
            ModelSpec::BoostedTrees { .. } => "split_count",
        }
    }

    fn feature_importances(&self) -> Vec<f64> {
        match &self.model {
            ModelSpec::Logistic { weights, .. } => weights.iter().map(|w| w.abs()).collect(),
            ModelSpec::Mlp {
                w1,
                w2,
                positive_class,
                ..
            } => {
                // input -> hidden -> positive output, summed over hidden units
                w1.iter()
                    .map(|row| {
                        row.iter()
                            .zip(w2)
                            .map(|(w_in, w_out)| (w_in * w_out[*positive_class]).abs())
                            .sum()
                    })
                    .collect()
            }
            ModelSpec::BoostedTrees {
                input_dim, trees, ..
            } => {
                let mut counts = vec![0.0; *input_dim];
                for node in trees.iter().flat_map(|t| &t.nodes) {
                    if let TreeNode::Split { feature, .. } = node {
                        counts[*feature] += 1.0;
                    }
                }
                counts
            }
        }
    }
}
