use std::env;
use tracing_subscriber::EnvFilter;

/// Initialize the logging system with the specified log level
pub fn init_logging() {
    // Get the log level from environment variable or default to INFO
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // try_init so tests can call this repeatedly without panicking
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

/// Log a rate limit check
pub fn log_rate_limit(limit: &str, identity: &str, allowed: bool) {
    if allowed {
        tracing::debug!(
            limit = %limit,
            identity = %identity,
            event = "rate_limit_check"
        );
    } else {
        tracing::warn!(
            limit = %limit,
            identity = %identity,
            event = "rate_limit_exceeded",
            timestamp = %chrono::Utc::now()
        );
    }
}

/// Log a rejected request, with full detail kept server-side only
pub fn log_blocked_request(reason: &str, identity: &str, detail: &str) {
    tracing::warn!(
        identity = %identity,
        reason = %reason,
        detail = %detail,
        event = "request_blocked"
    );
}

/// Log a webhook verification outcome
pub fn log_webhook_event(webhook: &str, verified: bool, detail: Option<&str>) {
    if verified {
        tracing::info!(
            webhook = %webhook,
            verified = true,
            detail = ?detail,
            event = "webhook_verification"
        );
    } else {
        tracing::warn!(
            webhook = %webhook,
            verified = false,
            detail = ?detail,
            event = "webhook_verification",
            timestamp = %chrono::Utc::now()
        );
    }
}
