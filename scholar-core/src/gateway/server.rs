//! HTTP gateway server built on axum.

use super::api;
use crate::brain::LlmProvider;
use crate::config::{GatewayConfig, ScholarConfig};
use crate::insight::InsightSynthesizer;
use crate::keywords::KeywordGenerator;
use crate::search::SearchBackend;
use crate::summarizer::Summarizer;
use crate::translation::{TranslationCache, Translator};
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub(crate) keywords: Arc<KeywordGenerator>,
    pub(crate) search: Arc<dyn SearchBackend>,
    pub(crate) summarizer: Arc<Summarizer>,
    pub(crate) insight: Arc<InsightSynthesizer>,
    pub(crate) translator: Arc<Translator>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Build every stage from configuration around one provider and backend.
    pub fn new(
        config: &ScholarConfig,
        provider: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchBackend>,
    ) -> Self {
        let models = &config.llm.models;
        let cache = Arc::new(TranslationCache::new(config.translation.ttl()));
        Self {
            keywords: Arc::new(
                KeywordGenerator::new(provider.clone())
                    .with_model(models.keywords.clone())
                    .with_limit(config.pipeline.max_keywords),
            ),
            search,
            summarizer: Arc::new(
                Summarizer::new(provider.clone())
                    .with_model(models.summary.clone())
                    .with_batch_limit(config.pipeline.summary_batch_limit),
            ),
            insight: Arc::new(
                InsightSynthesizer::new(provider.clone())
                    .with_model(models.insight.clone())
                    .with_sampling(config.llm.temperature, config.llm.max_tokens),
            ),
            translator: Arc::new(
                Translator::new(provider, cache).with_model(models.translation.clone()),
            ),
            started_at: Utc::now(),
        }
    }

    /// Uptime in seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_seconds().max(0) as u64
    }
}

/// Build the router with every API route plus `/health`.
pub fn router(state: AppState, config: &GatewayConfig) -> Router {
    let router = Router::new()
        .route("/api/generate-keywords", post(api::generate_keywords))
        .route("/api/semanticsearch", get(api::semantic_search))
        .route("/api/summary", post(api::summarize))
        .route("/api/generate-insight", post(api::generate_insight))
        .route("/api/translate", post(api::translate))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Health check endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.uptime_secs(),
    }))
}

/// Start the gateway on the configured address; runs until cancelled or
/// until ctrl-c is received.
pub async fn run(config: &GatewayConfig, state: AppState) -> Result<(), std::io::Error> {
    let app = router(state, config);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
