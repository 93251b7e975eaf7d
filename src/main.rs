// classify_worker/src/main.rs
use axum::Server;
use classify_worker::api::routes::{create_api_router, AppState, ServiceStats};
use classify_worker::auth::CredentialVerifier;
use classify_worker::cache::{DiskCache, MemoryCache, ResultCache};
use classify_worker::classify::engine::ClassifyEngine;
use classify_worker::classify::hosted::HostedClassifier;
use classify_worker::config::AppConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

fn build_cache(config: &AppConfig) -> Arc<dyn ResultCache> {
    match DiskCache::new(&config.cache_dir) {
        Ok(cache) => {
            tracing::info!("Result cache at {}", config.cache_dir);
            Arc::new(cache)
        }
        Err(e) => {
            // Degrade to compute-without-persistence rather than refuse to serve
            tracing::warn!(
                "Cache directory {} unavailable ({}), falling back to in-memory cache",
                config.cache_dir,
                e
            );
            Arc::new(MemoryCache::new())
        }
    }
}

// Periodic status logging so operators can see throughput without scraping
fn start_status_reporting(app_state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let stats = app_state.stats.lock().await;
            tracing::info!(
                "Worker status: {} requests, cache hit rate {:.0}%, avg classify time {:.0}ms, {} errors, {} timeouts",
                stats.total_requests,
                stats.cache_hit_rate() * 100.0,
                stats.avg_classify_time(),
                stats.errors,
                stats.request_timeouts
            );
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize metrics
    let metrics_builder = PrometheusBuilder::new();
    let metrics_handle = metrics_builder
        .install_recorder()
        .expect("Failed to install metrics recorder");

    // Initialize configuration; refuses to start without a credential digest
    let config = AppConfig::from_env()?;
    let verifier = CredentialVerifier::from_hex(&config.api_key_hash)?;

    // Create worker ID (hostname + uuid)
    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let worker_id = format!("{}-{}", hostname, Uuid::new_v4());

    let cache = build_cache(&config);

    let classifier = HostedClassifier::new(
        &config.classifier_url,
        &config.model_id,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    tracing::info!(
        "Classifying with hosted model {} at {}",
        config.model_id,
        config.classifier_url
    );

    let engine = ClassifyEngine::new(Arc::new(classifier), cache);

    // Create application state
    let app_state = Arc::new(AppState {
        engine,
        verifier,
        config,
        worker_id,
        start_time: SystemTime::now(),
        stats: Arc::new(Mutex::new(ServiceStats::new())),
    });

    start_status_reporting(app_state.clone());

    // Create API router
    let app = create_api_router(app_state.clone());

    // Start metrics server on a different port
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.listen_port + 1));
    tokio::spawn(async move {
        let metrics_app = axum::Router::new().route(
            "/metrics",
            axum::routing::get(move || async move { metrics_handle.render() }),
        );

        tracing::info!("Starting metrics server on {}", metrics_addr);
        if let Err(e) = Server::bind(&metrics_addr)
            .serve(metrics_app.into_make_service())
            .await
        {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // Start main server
    let addr: SocketAddr = format!(
        "{}:{}",
        app_state.config.listen_addr, app_state.config.listen_port
    )
    .parse()?;
    tracing::info!("Starting classification worker on {}", addr);

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
