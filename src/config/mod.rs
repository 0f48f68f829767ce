//! Configuration management for the edge guard service.
//! This module handles loading and validating configuration settings
//! from environment variables.

mod settings;

pub use settings::{
    CacheBackend, CacheConfig, LimitsConfig, MetricsConfig, ProxyConfig, RateLimitSettings,
    RuntimeConfig, ServerConfig, Settings, ValidationConfig, WebhookConfig,
};
