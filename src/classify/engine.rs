// classify_worker/src/classify/engine.rs
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{fingerprint, ResultCache};
use crate::classify::{Classification, ClassifyError, TextClassifier};

/// Outcome of a classification, noting whether it was served from cache.
#[derive(Debug)]
pub struct ClassifyOutcome {
    pub result: Classification,
    pub cache_hit: bool,
}

/// Orchestrates cache lookups and gated, offloaded model calls.
///
/// The gate is a single process-wide mutex: at most one classifier
/// invocation is in flight at any instant, because the hosted model is a
/// single-instance resource. Cache hits never touch the gate; only the
/// miss path serializes.
pub struct ClassifyEngine {
    classifier: Arc<dyn TextClassifier>,
    cache: Arc<dyn ResultCache>,
    gate: Arc<Mutex<()>>,
}

impl ClassifyEngine {
    pub fn new(classifier: Arc<dyn TextClassifier>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            classifier,
            cache,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Classify `text` over `labels`, serving repeated requests from the
    /// cache and holding the gate for the duration of any model call.
    pub async fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<ClassifyOutcome, ClassifyError> {
        if text.is_empty() {
            return Err(ClassifyError::InvalidInput("message must not be empty".into()));
        }
        if labels.is_empty() {
            return Err(ClassifyError::InvalidInput("label set must not be empty".into()));
        }

        let key = fingerprint(text, labels);

        if let Some(result) = self.cache.get(&key) {
            debug!(key = key.as_hex(), "cache hit");
            return Ok(ClassifyOutcome {
                result,
                cache_hit: true,
            });
        }

        let guard = Arc::clone(&self.gate).lock_owned().await;

        // A request that waited here behind an identical computation serves
        // the freshly stored result instead of recomputing.
        if let Some(result) = self.cache.get(&key) {
            debug!(key = key.as_hex(), "cache filled while waiting on gate");
            return Ok(ClassifyOutcome {
                result,
                cache_hit: true,
            });
        }

        let classifier = Arc::clone(&self.classifier);
        let cache = Arc::clone(&self.cache);
        let text = text.to_string();
        let labels = labels.to_vec();

        // The guard moves into the blocking closure: exclusivity covers
        // exactly the model call plus the store, and releases on every exit
        // path even if the awaiting request goes away.
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;

            let scores = classifier.classify(&text, &labels)?;
            if scores.len() != labels.len() {
                return Err(ClassifyError::Backend(format!(
                    "classifier returned {} scores for {} labels",
                    scores.len(),
                    labels.len()
                )));
            }

            let result = Classification {
                sequence: text,
                labels,
                scores,
            };
            cache.put(&key, &result);
            Ok(result)
        })
        .await
        .map_err(|e| ClassifyError::Worker(e.to_string()))??;

        Ok(ClassifyOutcome {
            result,
            cache_hit: false,
        })
    }
}
