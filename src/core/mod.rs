//! Core functionality for the edge guard service.
//! This module contains the abuse-control components: rate limiting,
//! client IP resolution, request validation, webhook verification and
//! HTML sanitization.

mod cache;
mod client_ip;
mod rate_limiter;
mod request_validator;
mod sanitizer;
mod webhook;

pub use cache::{Cache, MemoryCache, RedisCache};
pub use client_ip::ClientIpResolver;
pub use rate_limiter::{RateLimitDecision, RateLimitStatus, RateLimiter, RateSpec};
pub use request_validator::{RequestValidator, Violation};
pub use sanitizer::sanitize_html;
pub use webhook::{
    parse_signature_header, MemoryTransactionStore, SignatureParts, TransactionStore,
    Verification, WebhookVerifier,
};
