// classify_worker/src/lib.rs
//! HTTP worker exposing hosted zero-shot text classification.
//!
//! The model itself lives behind the [`classify::TextClassifier`] capability
//! trait; this crate provides the service core around it: bearer-token
//! authentication, a persistent result cache, and a gate that keeps at most
//! one classification in flight at a time.

pub mod api;
pub mod auth;
pub mod cache;
pub mod classify;
pub mod config;

pub use auth::CredentialVerifier;
pub use cache::{DiskCache, MemoryCache, ResultCache};
pub use classify::engine::ClassifyEngine;
pub use classify::{Classification, ClassifyError, TextClassifier, DEFAULT_LABELS};
pub use config::AppConfig;
