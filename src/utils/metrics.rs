use metrics_exporter_prometheus::PrometheusBuilder;

use crate::utils::{GuardError, GuardResult};

/// Install the Prometheus metrics recorder and exporter
pub fn init_metrics() -> GuardResult<()> {
    PrometheusBuilder::new()
        .install()
        .map_err(|e| GuardError::Internal(format!("Failed to install metrics recorder: {}", e)))
}

/// Count a request rejected by the request validator
pub fn record_blocked_request(reason: &'static str) {
    ::metrics::increment_counter!("guard_requests_blocked_total", "reason" => reason);
}

/// Count a request rejected by a rate limiter
pub fn record_rate_limited(limit: &str) {
    ::metrics::increment_counter!("guard_rate_limited_total", "limit" => limit.to_string());
}

/// Count a webhook verification by outcome
pub fn record_webhook_verification(webhook: &'static str, verified: bool) {
    let outcome = if verified { "verified" } else { "rejected" };
    ::metrics::increment_counter!("guard_webhook_verifications_total", "webhook" => webhook, "outcome" => outcome);
}
