use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    routing::get,
};
use reqwest::Client;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::ai::{Enhancer, GeminiEnhancer, enhance_with_budget};
use crate::config::Config;
use crate::error::ExplainError;
use crate::hedera_client::MirrorNodeClient;
use crate::models::{Blockchain, ExplainQuery, ExplainRequest, ExplainResponse};
use crate::names::NameCache;
use crate::source::{HederaSource, SuiSource, run};
use crate::sui_client::{BlockberryClient, FullNodeClient};

// Shared by every request; built once at start-up
pub struct AppState {
    pub hedera: HederaSource,
    pub sui: SuiSource,
    pub enhancer: Option<Arc<dyn Enhancer>>,
    pub ai_timeout: Duration,
}

impl AppState {
    pub fn from_config(config: &Config, http: Client) -> Self {
        let hedera = HederaSource::new(MirrorNodeClient::new(
            http.clone(),
            &config.hedera_mirror_url,
            config.hedera_api_key.clone(),
        ));
        let sui = SuiSource::new(
            BlockberryClient::new(
                http.clone(),
                &config.blockberry_url,
                config.blockberry_api_key.clone(),
            ),
            FullNodeClient::new(&config.sui_rpc_url),
            NameCache::new(config.name_cache_capacity, config.name_cache_ttl),
        );
        let enhancer = config.gemini_api_key.as_ref().map(|key| {
            Arc::new(GeminiEnhancer::new(http, &config.gemini_api_url, key)) as Arc<dyn Enhancer>
        });

        AppState {
            hedera,
            sui,
            enhancer,
            ai_timeout: config.ai_timeout,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/explain", get(explain_query).post(explain_transaction))
        .route("/api/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// POST /api/explain
pub async fn explain_transaction(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Json<ExplainResponse>, ExplainError> {
    // Bad bodies get the same {error} envelope as every other failure
    let Json(payload) =
        payload.map_err(|rejection| ExplainError::Validation(rejection.body_text()))?;
    explain(&state, payload, "Transaction digest is required").await
}

// GET /api/explain?digest=..&useAI=..&blockchain=..
pub async fn explain_query(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<ExplainResponse>, ExplainError> {
    explain(
        &state,
        query.into(),
        "Transaction digest is required as query parameter",
    )
    .await
}

async fn explain(
    state: &AppState,
    request: ExplainRequest,
    missing_digest: &str,
) -> Result<Json<ExplainResponse>, ExplainError> {
    let digest = request
        .digest
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ExplainError::Validation(missing_digest.to_string()))?
        .to_string();
    let chain = match request.blockchain.as_deref() {
        Some(name) if !name.trim().is_empty() => name.parse::<Blockchain>()?,
        _ => Blockchain::default(),
    };

    info!(%digest, %chain, use_ai = request.use_ai, "Explaining transaction");
    let explained = match chain {
        Blockchain::Hedera => run(&state.hedera, &digest).await?,
        Blockchain::Sui => run(&state.sui, &digest).await?,
    };

    let explanation = enhance_with_budget(
        state.enhancer.as_deref(),
        request.use_ai,
        explained.explanation,
        state.ai_timeout,
    )
    .await;

    info!(%digest, ai_status = ?explanation.ai_status, "Successfully explained transaction");
    Ok(Json(ExplainResponse {
        success: true,
        digest,
        explanation,
        raw_transaction: explained.raw_transaction,
    }))
}

/// Health check endpoint - just returns OK
pub async fn health_check() -> &'static str {
    "OK"
}
