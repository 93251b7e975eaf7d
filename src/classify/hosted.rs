// classify_worker/src/classify/hosted.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::classify::{ClassifyError, TextClassifier};

#[derive(Serialize)]
struct HostedRequest<'a> {
    inputs: &'a str,
    parameters: HostedParameters<'a>,
}

#[derive(Serialize)]
struct HostedParameters<'a> {
    candidate_labels: &'a [String],
}

#[derive(Deserialize)]
struct HostedResponse {
    labels: Vec<String>,
    scores: Vec<f64>,
}

/// Client for a hosted zero-shot classification endpoint.
///
/// Speaks `POST {base}/models/{model_id}` with
/// `{"inputs": ..., "parameters": {"candidate_labels": [...]}}`. The hosted
/// service returns labels sorted by descending score, so scores are
/// re-aligned to the caller's label order before returning.
pub struct HostedClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HostedClassifier {
    pub fn new(base_url: &str, model_id: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        let endpoint = format!("{}/models/{}", base_url.trim_end_matches('/'), model_id);
        Ok(Self { client, endpoint })
    }
}

impl TextClassifier for HostedClassifier {
    fn classify(&self, text: &str, labels: &[String]) -> Result<Vec<f64>, ClassifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&HostedRequest {
                inputs: text,
                parameters: HostedParameters {
                    candidate_labels: labels,
                },
            })
            .send()
            .map_err(|e| ClassifyError::Backend(format!("request to hosted model failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassifyError::Backend(format!(
                "hosted model returned {}: {}",
                status, body
            )));
        }

        let parsed: HostedResponse = response
            .json()
            .map_err(|e| ClassifyError::Backend(format!("hosted model response unreadable: {}", e)))?;

        align_scores(labels, &parsed)
    }
}

// Map the response back onto the requested label order.
fn align_scores(requested: &[String], response: &HostedResponse) -> Result<Vec<f64>, ClassifyError> {
    if response.labels.len() != response.scores.len() {
        return Err(ClassifyError::Backend(format!(
            "hosted model returned {} labels but {} scores",
            response.labels.len(),
            response.scores.len()
        )));
    }

    let by_label: HashMap<&str, f64> = response
        .labels
        .iter()
        .map(String::as_str)
        .zip(response.scores.iter().copied())
        .collect();

    requested
        .iter()
        .map(|label| {
            by_label.get(label.as_str()).copied().ok_or_else(|| {
                ClassifyError::Backend(format!("hosted model response is missing label {:?}", label))
            })
        })
        .collect()
}
