//! Learned intent classifier: softmax over a linear model of hashed text and
//! context features. Trained offline with [`train`], loaded from JSON at startup.

use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use scrivener_core::types::{Intent, RouterContext};
use scrivener_core::{Error, Result};

use crate::features::{extract, feature_dim};

const MODEL_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub format: u32,
    pub features: usize,
    /// Row `c` of `weights` and `bias[c]` score `labels[c]`.
    pub labels: Vec<Intent>,
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl LinearModel {
    fn zeros(labels: Vec<Intent>) -> Self {
        let n = labels.len();
        Self { format: MODEL_FORMAT, features: feature_dim(), weights: vec![vec![0.0; feature_dim()]; n], bias: vec![0.0; n], labels }
    }

    fn validate(&self) -> Result<()> {
        if self.format != MODEL_FORMAT { return Err(Error::Configuration(format!("unsupported classifier format {}", self.format))); }
        if self.features != feature_dim() {
            return Err(Error::Configuration(format!("classifier expects {} features, this build extracts {}", self.features, feature_dim())));
        }
        if self.labels.is_empty() || self.weights.len() != self.labels.len() || self.bias.len() != self.labels.len() {
            return Err(Error::Configuration("classifier label/weight shapes disagree".into()));
        }
        if self.weights.iter().any(|row| row.len() != self.features) {
            return Err(Error::Configuration("classifier weight row has the wrong width".into()));
        }
        Ok(())
    }

    fn probabilities(&self, x: &[(usize, f32)]) -> Vec<f32> {
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + x.iter().map(|(i, v)| row.get(*i).copied().unwrap_or(0.0) * v).sum::<f32>())
            .collect();
        softmax(&logits)
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassifierOutcome {
    pub intent: Intent,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct IntentClassifier {
    model: Option<LinearModel>,
}

impl IntentClassifier {
    pub fn untrained() -> Self { Self { model: None } }

    pub fn from_model(model: LinearModel) -> Result<Self> {
        model.validate()?;
        Ok(Self { model: Some(model) })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::NotFound(format!("classifier model {}: {}", path.display(), e)))?;
        let model: LinearModel = serde_json::from_str(&raw).map_err(|e| Error::Configuration(format!("classifier model {}: {}", path.display(), e)))?;
        Self::from_model(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let model = self.model.as_ref().ok_or_else(|| Error::operation("cannot save an untrained classifier"))?;
        let json = serde_json::to_string(model).map_err(|e| Error::operation(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| Error::operation(format!("write {}: {}", path.display(), e)))
    }

    pub fn is_trained(&self) -> bool { self.model.is_some() }

    pub fn model(&self) -> Option<&LinearModel> { self.model.as_ref() }

    /// Untrained: zero confidence so the other signals decide.
    pub fn classify(&self, query: &str, context: &RouterContext) -> ClassifierOutcome {
        let Some(model) = &self.model else { return ClassifierOutcome { intent: Intent::Other, confidence: 0.0 } };
        let probs = model.probabilities(&extract(query, context));
        let (best, p) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, p)| (i, *p))
            .unwrap_or((0, 0.0));
        ClassifierOutcome { intent: model.labels.get(best).copied().unwrap_or(Intent::Other), confidence: p }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub text: String,
    pub intent: Intent,
    #[serde(default)]
    pub context: RouterContext,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f32,
    pub l2: f32,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self { Self { epochs: 40, learning_rate: 0.5, l2: 1e-4, seed: 17 } }
}

/// Offline SGD on cross-entropy with L2 applied to the touched weights.
pub fn train(samples: &[TrainingSample], options: TrainOptions) -> Result<LinearModel> {
    if samples.is_empty() { return Err(Error::validation("no training samples")); }
    let mut model = LinearModel::zeros(Intent::ALL.to_vec());
    let encoded: Vec<(Vec<(usize, f32)>, usize)> = samples.iter().map(|s| (extract(&s.text, &s.context), s.intent.index())).collect();

    let mut order: Vec<usize> = (0..encoded.len()).collect();
    for epoch in 0..options.epochs {
        order.sort_by_key(|i| shuffle_key(options.seed, epoch, *i));
        let mut loss = 0.0f32;
        for &i in &order {
            let (x, y) = &encoded[i];
            let probs = model.probabilities(x);
            loss -= probs[*y].max(1e-9).ln();
            for (c, p) in probs.iter().enumerate() {
                let g = p - if c == *y { 1.0 } else { 0.0 };
                let row = &mut model.weights[c];
                for (j, v) in x {
                    row[*j] -= options.learning_rate * (g * v + options.l2 * row[*j]);
                }
                model.bias[c] -= options.learning_rate * g;
            }
        }
        tracing::debug!(epoch, loss = loss / encoded.len() as f32, "classifier epoch");
    }
    Ok(model)
}

fn shuffle_key(seed: u64, epoch: usize, i: usize) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    (epoch, i).hash(&mut hasher);
    hasher.finish()
}
