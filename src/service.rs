//! HTTP service wiring for the edge guard.
//!
//! The abuse-control components are composed as an explicit middleware
//! chain: request validation runs first, then rate limiting, then the
//! routed handlers. Each middleware either passes the request along or
//! short-circuits with a client-error response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::Settings;
use crate::core::{
    Cache, ClientIpResolver, MemoryTransactionStore, RateLimiter, RequestValidator, TransactionStore,
    Verification, WebhookVerifier,
};
use crate::utils::{
    log_blocked_request, log_webhook_event, record_blocked_request, record_rate_limited,
    record_webhook_verification, GuardResult,
};

/// Application state injected into middleware and handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub api_limiter: Arc<RateLimiter>,
    pub webhook_limiter: Arc<RateLimiter>,
    pub ip_resolver: Arc<ClientIpResolver>,
    pub validator: Arc<RequestValidator>,
    pub deploy_verifier: Arc<WebhookVerifier>,
    pub payment_verifier: Arc<WebhookVerifier>,
    pub transactions: Arc<dyn TransactionStore>,
}

/// Build the application state from validated settings and a cache backend
pub fn build_state(settings: Arc<Settings>, cache: Arc<dyn Cache>) -> GuardResult<AppState> {
    let api_limiter = RateLimiter::new(
        "api",
        settings.limits.api.rate.parse()?,
        settings.limits.api.block_seconds,
        cache.clone(),
    );
    let webhook_limiter = RateLimiter::new(
        "webhook",
        settings.limits.webhook.rate.parse()?,
        settings.limits.webhook.block_seconds,
        cache,
    );

    let ip_resolver = ClientIpResolver::new(
        settings.proxy.trusted_proxy_list(),
        settings.proxy.num_trusted_proxies,
    );
    let validator = RequestValidator::new(settings.validation.max_url_length);

    let production = settings.runtime.production;
    let deploy_verifier = WebhookVerifier::new(
        "deploy",
        settings.webhooks.deploy_secret.clone(),
        production,
    );
    let payment_verifier = WebhookVerifier::new(
        "payment",
        settings.webhooks.payment_secret.clone(),
        production,
    );

    Ok(AppState {
        settings,
        api_limiter: Arc::new(api_limiter),
        webhook_limiter: Arc::new(webhook_limiter),
        ip_resolver: Arc::new(ip_resolver),
        validator: Arc::new(validator),
        deploy_verifier: Arc::new(deploy_verifier),
        payment_verifier: Arc::new(payment_verifier),
        transactions: Arc::new(MemoryTransactionStore::new()),
    })
}

/// Build the axum router with the middleware chain applied
pub fn build_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/deploy", post(deploy_webhook_handler))
        .route("/webhooks/payment", post(payment_webhook_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_rate_limit_middleware,
        ));

    let request_timeout = Duration::from_secs(state.settings.server.request_timeout_seconds);

    Router::new()
        .route("/health", get(health_handler))
        .route("/limits/:identity", get(limit_status_handler))
        .merge(webhook_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            validation_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Ensure every request carries an x-request-id, and echo it on the response
async fn request_id_middleware(mut request: Request<Body>, next: Next<Body>) -> Response {
    let request_id = match request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
    {
        Some(id) => id.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                request.headers_mut().insert("x-request-id", value);
            }
            id
        }
    };

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Reject requests matching known attack signatures before any handler runs
async fn validation_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let host = request
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if let Err(violation) = state.validator.validate(&path, &query, &host) {
        let identity = client_identity(&state, &addr, &request);
        // Full detail is logged server-side only; the response stays generic
        log_blocked_request(violation.label(), &identity, truncate(&path, 100));
        record_blocked_request(violation.label());
        return (StatusCode::FORBIDDEN, violation.public_message()).into_response();
    }

    next.run(request).await
}

/// Apply the general per-identity rate limit and attach X-RateLimit headers
async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    apply_rate_limit(state.api_limiter.clone(), state, addr, request, next).await
}

/// Stricter limit for webhook endpoints, layered on top of the api limit
async fn webhook_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    apply_rate_limit(state.webhook_limiter.clone(), state, addr, request, next).await
}

async fn apply_rate_limit(
    limiter: Arc<RateLimiter>,
    state: AppState,
    addr: SocketAddr,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let identity = client_identity(&state, &addr, &request);
    let decision = limiter.check(&identity).await;

    if !decision.allowed {
        record_rate_limited(limiter.name());
        let minutes = (decision.reset_seconds / 60).max(1);
        let mut response = (
            StatusCode::FORBIDDEN,
            format!("Too many requests. Please wait {} minutes.", minutes),
        )
            .into_response();
        set_rate_limit_headers(&mut response, limiter.limit(), 0, decision.reset_seconds);
        return response;
    }

    let mut response = next.run(request).await;
    set_rate_limit_headers(
        &mut response,
        limiter.limit(),
        decision.remaining,
        decision.reset_seconds,
    );
    response
}

fn set_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32, reset: u64) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
}

/// Resolve the client identity used for rate limiting and audit logs
fn client_identity(state: &AppState, addr: &SocketAddr, request: &Request<Body>) -> String {
    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    state
        .ip_resolver
        .resolve(&addr.ip().to_string(), forwarded_for)
}

fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Read-only rate limit state for an identity
async fn limit_status_handler(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Response {
    match state.api_limiter.status(&identity).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read rate limit status");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

/// Deploy webhook: verify the body signature, then run the deploy script
async fn deploy_webhook_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());

    match state.deploy_verifier.verify_body(&body, signature) {
        Verification::Verified | Verification::Skipped => {}
        Verification::MissingSecret => {
            record_webhook_verification("deploy", false);
            return (StatusCode::FORBIDDEN, "Webhook not configured").into_response();
        }
        Verification::MissingSignature => {
            tracing::warn!(ip = %addr.ip(), "Missing x-hub-signature-256 header");
            record_webhook_verification("deploy", false);
            return (StatusCode::UNAUTHORIZED, "Missing signature").into_response();
        }
        Verification::Invalid => {
            tracing::warn!(ip = %addr.ip(), "Invalid deploy webhook signature");
            record_webhook_verification("deploy", false);
            return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
        }
    }

    record_webhook_verification("deploy", true);
    log_webhook_event("deploy", true, None);

    run_deploy_script(
        &state.settings.webhooks.deploy_script,
        Duration::from_secs(state.settings.webhooks.deploy_timeout_seconds),
    )
    .await
}

async fn run_deploy_script(script: &str, timeout: Duration) -> Response {
    match tokio::time::timeout(timeout, tokio::process::Command::new(script).output()).await {
        Err(_) => {
            tracing::error!(script = %script, timeout = ?timeout, "Deploy script timed out");
            (StatusCode::INTERNAL_SERVER_ERROR, "Deploy timed out").into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(script = %script, error = %e, "Deploy script failed to start");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
        Ok(Ok(output)) if !output.status.success() => {
            tracing::error!(
                script = %script,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Deploy script error"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Deploy error").into_response()
        }
        Ok(Ok(output)) => {
            tracing::info!(
                script = %script,
                stdout = %String::from_utf8_lossy(&output.stdout),
                "Deploy completed"
            );
            (StatusCode::OK, "OK").into_response()
        }
    }
}

/// Payment webhook: verify the manifest signature, then process the
/// notification idempotently
async fn payment_webhook_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(ip = %addr.ip(), "Invalid JSON in webhook request body");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid JSON" })))
                .into_response();
        }
    };

    let data_id = match payload.get("data").and_then(|data| data.get("id")) {
        Some(serde_json::Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());

    let outcome = state
        .payment_verifier
        .verify_manifest(&data_id, request_id, signature);
    if !outcome.is_trusted() {
        tracing::warn!(
            ip = %addr.ip(),
            request_id = %request_id,
            data_id = %data_id,
            "Webhook signature verification failed"
        );
        record_webhook_verification("payment", false);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid signature" })),
        )
            .into_response();
    }
    record_webhook_verification("payment", true);

    let action = payload.get("action").and_then(|v| v.as_str());
    if action == Some("payment.created") && !data_id.is_empty() {
        // Delivery is at-least-once: a duplicate notification must not
        // double-apply side effects
        match state.transactions.is_recorded(&data_id).await {
            Ok(true) => {
                tracing::info!(
                    transaction_id = %data_id,
                    "Duplicate webhook ignored (already processed)"
                );
                return Json(json!({ "status": "already processed" })).into_response();
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to check transaction record");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal error" })),
                )
                    .into_response();
            }
        }

        if let Err(e) = state.transactions.record(&data_id).await {
            tracing::error!(error = %e, "Failed to record transaction");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal error" })),
            )
                .into_response();
        }

        log_webhook_event("payment", true, Some(&data_id));
        tracing::info!(payment_id = %data_id, "Processing payment notification");
    }

    Json(json!({ "status": "ok" })).into_response()
}
