// classify_worker/src/auth/mod.rs
use axum::{
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::routes::{ApiError, AppState};

/// Verifies presented bearer tokens against a reference SHA-256 digest.
///
/// The reference digest is loaded once at startup and immutable afterwards.
/// Comparison runs over all 32 bytes regardless of where the first mismatch
/// occurs.
pub struct CredentialVerifier {
    reference: [u8; 32],
}

impl CredentialVerifier {
    /// Parse a 64-character hex SHA-256 digest into a verifier.
    pub fn from_hex(digest: &str) -> anyhow::Result<Self> {
        let digest = digest.trim();
        anyhow::ensure!(
            digest.len() == 64 && digest.is_ascii(),
            "credential digest must be 64 hex characters, got {}",
            digest.len()
        );

        let mut reference = [0u8; 32];
        for (i, byte) in reference.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digest[i * 2..i * 2 + 2], 16)
                .map_err(|_| anyhow::anyhow!("credential digest is not valid hex"))?;
        }
        Ok(Self { reference })
    }

    /// Returns true iff the SHA-256 digest of `token` equals the reference.
    pub fn verify(&self, token: &str) -> bool {
        let presented = Sha256::digest(token.as_bytes());
        constant_time_eq(&presented, &self.reference)
    }
}

// Fixed-length compare with no early exit and no data-dependent branches.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct BearerAuth;

impl BearerAuth {
    pub async fn check_token<B>(
        State(state): State<Arc<AppState>>,
        req: Request<B>,
        next: Next<B>,
    ) -> Result<Response, ApiError> {
        // Health checks stay reachable without credentials
        if req.uri().path() == "/v1/health" {
            return Ok(next.run(req).await);
        }

        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match token {
            Some(token) if state.verifier.verify(token) => Ok(next.run(req).await),
            _ => {
                tracing::warn!(path = req.uri().path(), "rejected request: missing or invalid bearer token");
                Err(ApiError::Unauthorized("invalid or missing bearer token".into()))
            }
        }
    }
}
