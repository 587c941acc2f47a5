//! Stage classifier definitions
//!
//! Trained models are shipped as JSON artifacts tagged by `kind`. Each kind
//! implements [`StageModel`]; only some of them can report class
//! probabilities.

use serde::{Deserialize, Serialize};

use super::{FeatureVector, InferenceError, FEATURE_COUNT};

/// Trait for stage predictors held by the registry
#[cfg_attr(test, mockall::automock)]
pub trait StageModel: Send + Sync {
    /// Predict a (not yet clamped) stage label
    fn predict_stage(&self, features: &FeatureVector) -> Result<i64, InferenceError>;

    /// Class probabilities, in the model's class order
    fn predict_proba(&self, _features: &FeatureVector) -> Result<Vec<f64>, InferenceError> {
        Err(InferenceError::ProbabilitiesUnsupported)
    }

    fn supports_probabilities(&self) -> bool {
        false
    }

    /// Short type tag for status reporting
    fn type_name(&self) -> &'static str;
}

/// Any model that can be decoded from a JSON artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    TreeEnsemble(TreeEnsemble),
    Softmax(SoftmaxClassifier),
    Linear(LinearStageRegressor),
}

impl TrainedModel {
    /// Structural checks run once at load time
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TrainedModel::TreeEnsemble(m) => m.validate(),
            TrainedModel::Softmax(m) => m.validate(),
            TrainedModel::Linear(m) => m.validate(),
        }
    }

    fn inner(&self) -> &dyn StageModel {
        match self {
            TrainedModel::TreeEnsemble(m) => m,
            TrainedModel::Softmax(m) => m,
            TrainedModel::Linear(m) => m,
        }
    }
}

impl StageModel for TrainedModel {
    fn predict_stage(&self, features: &FeatureVector) -> Result<i64, InferenceError> {
        self.inner().predict_stage(features)
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, InferenceError> {
        self.inner().predict_proba(features)
    }

    fn supports_probabilities(&self) -> bool {
        self.inner().supports_probabilities()
    }

    fn type_name(&self) -> &'static str {
        self.inner().type_name()
    }
}

// ============================================================================
// Tree ensemble
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left when `features[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class weights at this leaf (normalized on use)
    Leaf { distribution: Vec<f64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn leaf_for(&self, features: &FeatureVector) -> Result<&[f64], InferenceError> {
        let mut idx = 0;
        // a well-formed tree never visits more nodes than it has
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { distribution }) => return Ok(distribution),
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    let value = features.features.get(*feature).ok_or_else(|| {
                        InferenceError::InvalidOutput(format!("split on missing feature {feature}"))
                    })?;
                    idx = if *value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(InferenceError::InvalidOutput(format!(
                        "node index {idx} out of range"
                    )))
                }
            }
        }
        Err(InferenceError::InvalidOutput("tree traversal did not reach a leaf".to_string()))
    }
}

/// Averaged-vote tree ensemble (boosted or bagged trees exported to JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    /// Stage label for each probability column
    pub classes: Vec<i64>,
    pub trees: Vec<DecisionTree>,
}

impl TreeEnsemble {
    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("no classes".to_string());
        }
        if self.trees.is_empty() {
            return Err("no trees".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("tree {t} has no nodes"));
            }
            for node in &tree.nodes {
                match node {
                    TreeNode::Split { feature, left, right, .. } => {
                        if *feature >= FEATURE_COUNT {
                            return Err(format!("tree {t} splits on feature {feature}"));
                        }
                        if *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                            return Err(format!("tree {t} has a dangling child"));
                        }
                    }
                    TreeNode::Leaf { distribution } => {
                        if distribution.len() != self.classes.len() {
                            return Err(format!(
                                "tree {t} leaf has {} weights for {} classes",
                                distribution.len(),
                                self.classes.len()
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl StageModel for TreeEnsemble {
    fn predict_stage(&self, features: &FeatureVector) -> Result<i64, InferenceError> {
        let proba = self.predict_proba(features)?;
        class_at(&self.classes, argmax(&proba))
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, InferenceError> {
        if self.trees.is_empty() {
            return Err(InferenceError::InvalidOutput("ensemble has no trees".to_string()));
        }

        let mut sums = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let leaf = tree.leaf_for(features)?;
            let total: f64 = leaf.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                return Err(InferenceError::InvalidOutput("leaf with no weight".to_string()));
            }
            for (s, w) in sums.iter_mut().zip(leaf) {
                *s += w / total;
            }
        }

        let n = self.trees.len() as f64;
        Ok(sums.into_iter().map(|s| s / n).collect())
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    fn type_name(&self) -> &'static str {
        "TreeEnsemble"
    }
}

// ============================================================================
// Softmax classifier
// ============================================================================

/// Multinomial logistic regression over the feature vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    pub classes: Vec<i64>,
    /// One coefficient row per class
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl SoftmaxClassifier {
    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("no classes".to_string());
        }
        if self.weights.len() != self.classes.len() || self.intercepts.len() != self.classes.len() {
            return Err("weights/intercepts do not match class count".to_string());
        }
        if let Some(row) = self.weights.iter().find(|r| r.len() != FEATURE_COUNT) {
            return Err(format!("weight row has {} columns, expected {FEATURE_COUNT}", row.len()));
        }
        Ok(())
    }
}

impl StageModel for SoftmaxClassifier {
    fn predict_stage(&self, features: &FeatureVector) -> Result<i64, InferenceError> {
        let proba = self.predict_proba(features)?;
        class_at(&self.classes, argmax(&proba))
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, InferenceError> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| dot(row, features.as_slice()).map(|z| z + b))
            .collect::<Result<_, _>>()?;

        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(InferenceError::InvalidOutput("softmax did not normalize".to_string()));
        }
        Ok(exps.into_iter().map(|e| e / total).collect())
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    fn type_name(&self) -> &'static str {
        "SoftmaxClassifier"
    }
}

// ============================================================================
// Linear regressor
// ============================================================================

/// Linear regression on the stage, rounded to the nearest label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearStageRegressor {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearStageRegressor {
    fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(format!(
                "{} coefficients, expected {FEATURE_COUNT}",
                self.coefficients.len()
            ));
        }
        Ok(())
    }
}

impl StageModel for LinearStageRegressor {
    fn predict_stage(&self, features: &FeatureVector) -> Result<i64, InferenceError> {
        let value = dot(&self.coefficients, features.as_slice())? + self.intercept;
        if !value.is_finite() {
            return Err(InferenceError::InvalidOutput(format!("non-finite stage {value}")));
        }
        Ok(value.round() as i64)
    }

    fn type_name(&self) -> &'static str {
        "LinearStageRegressor"
    }
}

fn dot(weights: &[f64], features: &[f64]) -> Result<f64, InferenceError> {
    if weights.len() != features.len() {
        return Err(InferenceError::DimensionMismatch {
            expected: weights.len(),
            actual: features.len(),
        });
    }
    Ok(weights.iter().zip(features).map(|(w, f)| w * f).sum())
}

fn class_at(classes: &[i64], idx: usize) -> Result<i64, InferenceError> {
    classes.get(idx).copied().ok_or_else(|| {
        InferenceError::InvalidOutput(format!("class index {idx} outside {} classes", classes.len()))
    })
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
