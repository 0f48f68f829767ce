//! Edge guard: request rate limiting, validation and webhook authentication
//! for web applications.
//!
//! The components are independent, stateless filters applied at the edge of
//! the request pipeline: a cache-backed rate limiter with block-on-exceed, a
//! trusted-proxy-aware client IP resolver, an attack-signature request
//! validator, HMAC webhook verifiers and an HTML sanitizer. `service` wires
//! them into an axum middleware chain.

pub mod config;
pub mod core;
pub mod service;
pub mod utils;
