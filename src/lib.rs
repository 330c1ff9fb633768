//! Core library for the writing-assist service. Wires the rate limiter,
//! input screening, prompt builders and model client into one request
//! pipeline shared by every `/api/*` endpoint.

mod config;
pub mod endpoints;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod patterns;
pub mod postprocess;
pub mod prompt;
pub mod rate_limit;
pub mod sanitize;
pub mod util;

pub use config::{AppConfig, AssistFileConfig};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    ConnectInfo, DefaultBodyLimit, State,
};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::endpoints::{
    Assist, CheckIdea, ClassifyBookmark, DraftConclusion, PolishText, Screen, SummarizeBookmarks,
    ENDPOINT_NAMES,
};
use crate::error::AssistError;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiter;
use crate::util::client_ip;

/// Shared state handed to every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub limiter: RateLimiter,
    pub window: Duration,
    /// Overrides of each endpoint's default request budget.
    pub endpoint_limits: Arc<HashMap<String, u32>>,
    pub injection_phrases: Arc<Vec<String>>,
    pub metrics: Arc<Metrics>,
    pub max_request_bytes: usize,
}

impl AppState {
    /// State with an explicitly supplied model client (or none).
    pub fn new(config: &AppConfig, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            llm,
            limiter: RateLimiter::new(config.rate_limit_max_entries),
            window: Duration::from_millis(config.rate_limit_window_ms),
            endpoint_limits: Arc::new(config.endpoint_limits.clone()),
            injection_phrases: Arc::new(config.injection_phrases.clone()),
            metrics: Arc::new(Metrics::new(ENDPOINT_NAMES)),
            max_request_bytes: config.max_request_bytes,
        }
    }

    fn limit_for<E: Assist>(&self) -> u32 {
        self.endpoint_limits
            .get(E::NAME)
            .copied()
            .unwrap_or(E::DEFAULT_LIMIT)
    }
}

/// Build state from a loaded configuration, constructing the HTTP model
/// client when credentials are present.
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let llm: Option<Arc<dyn LlmClient>> = match config.llm.clone() {
        Some(settings) => {
            let client = HttpLlmClient::new(settings)?;
            tracing::info!(provider = client.name(), "model client configured");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("LLM_API_URL / LLM_API_TOKEN not set; assist endpoints will answer 503");
            None
        }
    };
    Ok(AppState::new(config, llm))
}

/// Read [`AppConfig`] from the environment and build state from it.
pub fn build_state_from_env() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    build_state(&config)
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/check-idea",
            post(assist_handler::<CheckIdea>).options(preflight_handler),
        )
        .route(
            "/api/classify-bookmark",
            post(assist_handler::<ClassifyBookmark>).options(preflight_handler),
        )
        .route(
            "/api/draft-conclusion",
            post(assist_handler::<DraftConclusion>).options(preflight_handler),
        )
        .route(
            "/api/polish-text",
            post(assist_handler::<PolishText>).options(preflight_handler),
        )
        .route(
            "/api/summarize-bookmarks",
            post(assist_handler::<SummarizeBookmarks>).options(preflight_handler),
        )
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(cors)
        .with_state(state)
}

async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Rendered outcome of a successful pipeline run.
struct Answered<R> {
    body: R,
    refused: bool,
    flagged: usize,
}

/// One handler for every endpoint; `E` supplies validation, prompt and
/// completion handling.
async fn assist_handler<E: Assist>(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<E::Request>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let metrics = state.metrics.endpoint(E::NAME);
    if let Some(m) = metrics {
        m.requests_total.fetch_add(1, Ordering::Relaxed);
    }
    let peer = peer.map(|ConnectInfo(addr)| addr);

    match run_pipeline::<E>(&state, &headers, peer, payload).await {
        Ok(answered) => {
            if let Some(m) = metrics {
                m.success_total.fetch_add(1, Ordering::Relaxed);
                m.injection_flags_total
                    .fetch_add(answered.flagged as u64, Ordering::Relaxed);
                if answered.refused {
                    m.refusals_total.fetch_add(1, Ordering::Relaxed);
                }
            }
            tracing::info!(
                endpoint = E::NAME,
                status = 200,
                refused = answered.refused,
                injection_flags = answered.flagged,
                latency_ms = start.elapsed().as_millis() as u64,
                "assist request answered"
            );
            (StatusCode::OK, Json(answered.body)).into_response()
        }
        Err(err) => {
            if let Some(m) = metrics {
                m.record_error(err.kind());
            }
            let status = err.status();
            let latency_ms = start.elapsed().as_millis() as u64;
            match &err {
                AssistError::RateLimited { .. } | AssistError::Upstream(_) => {
                    tracing::warn!(endpoint = E::NAME, status = status.as_u16(), kind = err.kind(), error = ?err, latency_ms, "assist request failed");
                }
                _ => {
                    tracing::info!(endpoint = E::NAME, status = status.as_u16(), kind = err.kind(), latency_ms, "assist request rejected");
                }
            }
            error_response::<E>(err)
        }
    }
}

async fn run_pipeline<E: Assist>(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    payload: Result<Json<E::Request>, JsonRejection>,
) -> Result<Answered<E::Response>, AssistError> {
    let identifier = format!("{}:{}", E::NAME, client_ip(headers, peer));
    let decision = state
        .limiter
        .check(&identifier, state.window, state.limit_for::<E>());
    if !decision.allowed {
        let wait = decision.reset_at.saturating_duration_since(Instant::now());
        return Err(AssistError::RateLimited {
            retry_after_secs: wait.as_secs().max(1),
        });
    }

    let Json(request) = payload.map_err(|rejection| json_rejection_error(state, rejection))?;
    E::validate(&request).map_err(AssistError::Validation)?;

    let llm = state.llm.clone().ok_or(AssistError::NotConfigured)?;

    // Screen holds a Cell and must not live across the model call.
    let (prompt, flagged) = {
        let screen = Screen::new(&state.injection_phrases);
        let prompt = E::build_prompt(&request, &screen);
        (prompt, screen.flagged())
    };
    if flagged > 0 {
        tracing::info!(endpoint = E::NAME, fields = flagged, "input flagged as prompt injection");
    }

    let llm_start = Instant::now();
    let result = llm.complete(&prompt, E::MAX_TOKENS).await;
    let llm_ms = llm_start.elapsed().as_millis() as u64;
    if let Some(m) = state.metrics.endpoint(E::NAME) {
        m.observe_llm_latency(llm_ms);
    }
    let completion = result?;
    tracing::debug!(
        endpoint = E::NAME,
        prompt_chars = prompt.chars().count(),
        completion_chars = completion.chars().count(),
        llm_ms,
        "model call complete"
    );

    let interpreted = E::interpret(&request, &completion);
    Ok(Answered {
        body: interpreted.body,
        refused: interpreted.refused,
        flagged,
    })
}

fn json_rejection_error(state: &AppState, rejection: JsonRejection) -> AssistError {
    match rejection {
        JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        )) => {
            tracing::warn!(limit = state.max_request_bytes, "request body exceeded configured limit");
            AssistError::PayloadTooLarge(format!(
                "Request too large (body exceeded limit {} bytes)",
                state.max_request_bytes
            ))
        }
        other => {
            tracing::debug!(rejection = %other, "request body is not valid JSON");
            AssistError::Validation("Invalid JSON body".into())
        }
    }
}

fn error_response<E: Assist>(err: AssistError) -> Response {
    let status = err.status();
    let retry_after = match &err {
        AssistError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
        _ => None,
    };
    let mut response = (status, Json(E::failure(err.to_string()))).into_response();
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Readiness / liveness probe.
async fn healthz_handler(State(state): State<AppState>) -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "llmConfigured": state.llm.is_some(),
        "llmProvider": state.llm.as_ref().map(|c| c.name().to_string()),
        "patternTableVersion": patterns::PATTERN_TABLE_VERSION,
        "rateLimitEntries": state.limiter.len(),
        "startedAt": state.metrics.started_at().to_rfc3339(),
        "uptimeSecs": state.metrics.uptime_secs(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.metrics.render(state.limiter.len());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
