//! HTTP relay for browser clients.
//!
//! Runs on port 2003 by default. CORS-permissive so a static front end on
//! any origin can call it.
//!
//! ```text
//! POST /api/tts              {text, voice, rate?, pitch?, format?} → audio bytes
//! GET  /api/voices?l=&f=     voice catalog (json, label map, or plugin text)
//! GET  /api/check-password   {requirePassword}
//! POST /api/verify-password  {password} → {valid[, error]}
//! GET  /health               {ok}
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use voxrelay_core::types::{AudioFormat, ProviderConfig, RelayConfig, VoiceSettings, WireFormat};
use voxrelay_core::voices::{filter_by_locale, render, CatalogBody, CatalogFormat};

use crate::catalog::VoiceCatalog;
use crate::error::Error;
use crate::gate::PasswordGate;
use crate::provider::{HttpProvider, SpeechProvider};

/// Preflight cache lifetime.
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Shared, read-only handler state.
pub struct ServerState {
    pub upstream: HttpProvider,
    pub catalog: VoiceCatalog,
    pub gate: PasswordGate,
}

impl ServerState {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            upstream: HttpProvider::new(ProviderConfig {
                name: "edge-upstream".into(),
                format: WireFormat::EdgeQuery,
                endpoint: config.edge_url.clone(),
                api_key: None,
                model: None,
                voices: Vec::new(),
                voices_endpoint: None,
                max_segment: None,
                custom: false,
            }),
            catalog: VoiceCatalog::from_url(config.voices_url.clone()),
            gate: PasswordGate::new(config.password.clone()),
        }
    }
}

/// Build the axum router for `config`.
pub fn router(config: &RelayConfig) -> Router {
    router_with(ServerState::from_config(config))
}

pub fn router_with(state: ServerState) -> Router {
    Router::new()
        .route("/api/tts", post(tts))
        .route("/api/voices", get(voices))
        .route("/api/check-password", get(check_password))
        .route("/api/verify-password", post(verify_password))
        .route("/health", get(health))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Any origin; preflight answered by the layer itself.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(PREFLIGHT_MAX_AGE)
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

// ─── TTS ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TtsRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    voice: String,
    #[serde(default)]
    rate: i32,
    #[serde(default)]
    pitch: i32,
    #[serde(default)]
    format: Option<String>,
}

async fn tts(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(req) = body.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    if req.text.is_empty() || req.voice.is_empty() {
        return Err(Error::InvalidRequest("missing text or voice".into()));
    }

    let format = req.format.filter(|f| !f.trim().is_empty());
    let settings = VoiceSettings {
        voice: req.voice,
        rate: req.rate,
        pitch: req.pitch,
        format: format.as_deref().map(AudioFormat::parse).unwrap_or_default(),
        output_format: format,
        instructions: None,
    };

    let audio = state
        .upstream
        .synthesize(&req.text, &settings)
        .await
        .inspect_err(|e| warn!("tts: upstream failed: {e}"))?;
    info!("tts: {} bytes for {}", audio.len(), settings.voice);

    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(settings.format.mime_type()),
        )],
        audio,
    )
        .into_response())
}

// ─── Voices ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct VoicesQuery {
    l: Option<String>,
    f: Option<String>,
}

async fn voices(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<VoicesQuery>,
) -> Response {
    let all = state.catalog.list_or_builtin().await;
    let voices = filter_by_locale(all, query.l.as_deref().unwrap_or_default());
    match render(&voices, CatalogFormat::parse(query.f.as_deref())) {
        CatalogBody::Json(value) => Json(value).into_response(),
        CatalogBody::Text(text) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
    }
}

// ─── Password gate ─────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckPasswordResponse {
    require_password: bool,
}

async fn check_password(State(state): State<Arc<ServerState>>) -> Json<CheckPasswordResponse> {
    Json(CheckPasswordResponse {
        require_password: state.gate.is_required(),
    })
}

#[derive(Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    password: Option<String>,
}

async fn verify_password(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let invalid = |status: StatusCode, error: &str| {
        (status, Json(json!({ "valid": false, "error": error }))).into_response()
    };

    let password = match body {
        Ok(Json(VerifyRequest {
            password: Some(password),
        })) if !password.is_empty() => password,
        Ok(_) => return invalid(StatusCode::BAD_REQUEST, "password is required"),
        Err(_) => return invalid(StatusCode::BAD_REQUEST, "invalid request body"),
    };

    if state.gate.verify(&password) {
        Json(json!({ "valid": true })).into_response()
    } else {
        invalid(StatusCode::UNAUTHORIZED, "wrong password")
    }
}
