// classify_worker/src/classify/mod.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod engine;
pub mod hosted;

/// Labels applied when a request supplies none.
pub const DEFAULT_LABELS: [&str; 6] = [
    "programming",
    "politics",
    "sports",
    "science",
    "technology",
    "video games",
];

pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

/// A probability distribution over candidate labels for one message.
///
/// `labels` keeps the order of the request (or the default order) and
/// `scores` is positionally aligned with it. Scores are the producer's
/// normalized distribution; this crate never renormalizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub sequence: String,
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("classifier backend error: {0}")]
    Backend(String),

    #[error("classification worker failed: {0}")]
    Worker(String),
}

/// Capability interface over the pretrained zero-shot model.
///
/// `classify` is blocking (model inference is CPU/IO-bound) and must return
/// one score per input label, aligned to the input order. Callers are
/// responsible for dispatching it off the async runtime; the engine runs it
/// on a worker thread behind the classification gate.
pub trait TextClassifier: Send + Sync {
    fn classify(&self, text: &str, labels: &[String]) -> Result<Vec<f64>, ClassifyError>;
}
