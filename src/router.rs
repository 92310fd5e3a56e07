//! Request classification and dispatch
//!
//! One router serves four kinds of traffic, classified purely by path and
//! method:
//!
//! ```text
//! OPTIONS *                  -> 204 + CORS (preflight short-circuit)
//! /api/*                     -> registry handlers (JSON + CORS)
//! <configured webhook path>  -> billing reconciler (server-to-server, no CORS)
//! everything else            -> static origin proxy
//! ```
//!
//! API responses pick up CORS headers from a subtree middleware; the webhook
//! route sits outside that subtree so its responses stay bare. Unmatched
//! `/api/*` paths get a structured JSON 404 instead of falling through to
//! the proxy.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{OriginalUri, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use http::{header, HeaderMap, Method, StatusCode};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::billing::signature::SIGNATURE_HEADER;
use crate::billing::{BillingEvent, BillingReconciler, EventOutcome, WebhookVerifier};
use crate::config::WorkerConfig;
use crate::cors::{apply_cors_headers, preflight_response};
use crate::error::{BillingError, Error, RegistrationError};
use crate::proxy::StaticProxy;
use crate::registry::{RegisterRequest, TenantRegistry};
use crate::stats::StatsView;
use crate::store::{Namespace, SharedStore};
use crate::tenant::Tenant;

/// Largest request body the proxy will buffer before forwarding
const MAX_PROXY_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Everything a request handler can reach
pub struct AppState {
    config: WorkerConfig,
    registry: TenantRegistry,
    reconciler: BillingReconciler,
    stats: StatsView,
    proxy: StaticProxy,
    verifier: Option<WebhookVerifier>,
    started_at: Instant,
}

impl AppState {
    /// Wire the components together over one store
    pub fn new(config: WorkerConfig, store: SharedStore) -> Result<Self, Error> {
        let ns = Namespace::new(store, &config.deployment);
        let stats = StatsView::new(ns.clone(), config.pricing);
        let registry = TenantRegistry::new(ns.clone(), stats.clone());
        let reconciler = BillingReconciler::new(ns, stats.clone());
        let proxy = StaticProxy::new(config.origin.clone())?;
        let verifier = config.webhook_secret.clone().map(WebhookVerifier::new);

        Ok(Self {
            config,
            registry,
            reconciler,
            stats,
            proxy,
            verifier,
            started_at: Instant::now(),
        })
    }

    /// The configuration this worker was started with
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

/// Assemble the full router over the shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/tenants", get(list_tenants))
        .route("/tenants/register", post(register_tenant))
        .route("/stats", get(get_stats))
        .route("/health", get(health))
        .fallback(api_not_found)
        .layer(middleware::from_fn(attach_cors));

    Router::new()
        .nest("/api", api)
        .route(&state.config.webhook_path, post(receive_webhook))
        .fallback(proxy_request)
        .layer(middleware::from_fn(preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==================== Middleware ====================

/// Short-circuit every preflight before routing happens
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return preflight_response(req.headers().get(header::ORIGIN));
    }
    next.run(req).await
}

/// Attach CORS headers to every `/api` response
async fn attach_cors(req: Request, next: Next) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut(), origin.as_ref());
    response
}

// ==================== Response Envelopes ====================

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct TenantList {
    tenants: Vec<Tenant>,
}

#[derive(Serialize)]
struct RegisterResponse {
    success: bool,
    tenant: Tenant,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<bool>,
}

#[derive(Serialize)]
struct WebhookAck {
    received: bool,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error(err: Error) -> Response {
    error!(error = %err, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

// ==================== API Handlers ====================

async fn list_tenants(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.list().await {
        Ok(tenants) => Json(TenantList { tenants }).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.stats.read().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error(e.into()),
    }
}

async fn register_tenant(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"))
        }
    };

    match state.registry.register(req).await {
        Ok(outcome) => {
            let created = outcome.was_created();
            Json(RegisterResponse {
                success: true,
                tenant: outcome.tenant().clone(),
                created: created.then_some(true),
                updated: (!created).then_some(true),
            })
            .into_response()
        }
        Err(Error::Registration(e)) => {
            let status = match &e {
                RegistrationError::SubdomainTaken(_) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            error_response(status, e.to_string())
        }
        Err(e) => internal_error(e),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        version: crate::VERSION,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Unmatched `/api/*` paths answer with structured JSON, never the proxy
async fn api_not_found(OriginalUri(uri): OriginalUri) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("no API route for {}", uri.path()),
    )
}

// ==================== Webhook Handler ====================

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(verifier) = &state.verifier {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            warn!("webhook rejected, signature header missing");
            return error_response(
                StatusCode::BAD_REQUEST,
                BillingError::MissingSignature.to_string(),
            );
        };
        if let Err(e) = verifier.verify(signature, &body) {
            warn!(error = %e, "webhook rejected, signature verification failed");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    }

    // an unreadable envelope is a fault on our side of the contract; a 500
    // tells the provider to redeliver
    let event = match BillingEvent::from_bytes(&body) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "webhook envelope unreadable");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match state.reconciler.apply(&event).await {
        Ok(outcome) => {
            if let EventOutcome::Ignored { event_type } = &outcome {
                info!(event_type = %event_type, "webhook acknowledged without effect");
            }
            Json(WebhookAck { received: true }).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ==================== Proxy Fallback ====================

async fn proxy_request(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, MAX_PROXY_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("request body unreadable: {e}"),
            )
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    match state
        .proxy
        .forward(parts.method, path_and_query, &parts.headers, body)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "proxy forward failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
