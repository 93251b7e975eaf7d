// classify_worker/src/config.rs
use anyhow::{Context, Result};
use std::env;
use std::fs;

const DEFAULT_API_KEY_HASH_FILE: &str = "/run/secrets/api_key_hash";

/// Application configuration
pub struct AppConfig {
    // Server configuration
    pub listen_addr: String,
    pub listen_port: u16,
    pub request_timeout_secs: u64,

    // Auth: hex SHA-256 digest of the accepted bearer token
    pub api_key_hash: String,

    // Result cache
    pub cache_dir: String,

    // Hosted model
    pub classifier_url: String,
    pub model_id: String,
}

impl AppConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// The credential digest is the one required value: it comes from
    /// `API_KEY_HASH`, falling back to the secret file at `API_KEY_HASH_FILE`.
    /// Startup fails if neither source yields a value.
    pub fn from_env() -> Result<Self> {
        Ok(AppConfig {
            // Server configuration
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            listen_port: env::var("LISTEN_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            api_key_hash: load_api_key_hash()?,

            cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| "./cache".to_string()),

            classifier_url: env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            model_id: env::var("MODEL_ID")
                .unwrap_or_else(|_| "facebook/bart-large-mnli".to_string()),
        })
    }
}

fn load_api_key_hash() -> Result<String> {
    if let Ok(hash) = env::var("API_KEY_HASH") {
        let hash = hash.trim().to_string();
        if !hash.is_empty() {
            return Ok(hash);
        }
    }

    let path =
        env::var("API_KEY_HASH_FILE").unwrap_or_else(|_| DEFAULT_API_KEY_HASH_FILE.to_string());
    let hash = fs::read_to_string(&path)
        .with_context(|| {
            format!(
                "API_KEY_HASH is not set and the secret file {} is unreadable; \
                 refusing to start without a credential digest",
                path
            )
        })?
        .trim()
        .to_string();

    anyhow::ensure!(!hash.is_empty(), "credential digest in {} is empty", path);
    Ok(hash)
}
