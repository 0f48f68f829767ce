use serde::Deserialize;

use crate::core::RateSpec;
use crate::utils::{GuardError, GuardResult};

/// Configuration settings for the edge guard service
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration
    pub server: ServerConfig,
    /// Runtime mode configuration
    pub runtime: RuntimeConfig,
    /// Cache backend configuration
    pub cache: CacheConfig,
    /// Trusted proxy configuration for client IP resolution
    pub proxy: ProxyConfig,
    /// Named rate limit configuration
    pub limits: LimitsConfig,
    /// Request validation configuration
    pub validation: ValidationConfig,
    /// Webhook verification configuration
    pub webhooks: WebhookConfig,
    /// Metrics exporter configuration
    pub metrics: MetricsConfig,
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind the server to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// Runtime mode settings
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Production mode: webhook verification fails closed when a secret
    /// is missing instead of skipping with a loud warning
    pub production: bool,
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

/// Cache configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Which cache backend to use
    pub backend: CacheBackend,
    /// Redis connection URL, required for the redis backend
    #[serde(default)]
    pub url: Option<String>,
}

/// Trusted proxy settings for X-Forwarded-For resolution
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Comma-separated list of trusted proxy addresses. Forwarding headers
    /// are only honored when the direct peer is in this list.
    pub trusted_proxies: String,
    /// Number of trusted proxies in the chain
    /// (client -> CDN -> nginx -> app means 2)
    pub num_trusted_proxies: usize,
}

impl ProxyConfig {
    /// Parse the comma-separated proxy list into individual addresses
    pub fn trusted_proxy_list(&self) -> Vec<String> {
        self.trusted_proxies
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A single named rate limit: rate string plus block duration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Rate in "count/unit" format (unit: s, m, h, d or the full word)
    pub rate: String,
    /// How long to block an identity after the limit is exceeded, in seconds
    pub block_seconds: u64,
}

/// Named rate limits applied by the middleware chain
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// General limit applied to every request
    pub api: RateLimitSettings,
    /// Stricter limit applied to webhook endpoints on top of the api limit
    pub webhook: RateLimitSettings,
}

/// Request validation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Maximum URL length (path plus query string)
    pub max_url_length: usize,
}

/// Webhook verification settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret for the deploy webhook
    #[serde(default)]
    pub deploy_secret: Option<String>,
    /// Path of the deploy script executed on a verified deploy webhook
    pub deploy_script: String,
    /// Deploy script execution timeout in seconds
    pub deploy_timeout_seconds: u64,
    /// Shared secret for the payment webhook
    #[serde(default)]
    pub payment_secret: Option<String>,
}

/// Metrics exporter settings
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus metrics exporter
    pub enabled: bool,
}

impl Settings {
    /// Load configuration from environment variables
    ///
    /// Reads a .env file if present, then parses APP_-prefixed environment
    /// variables with "__" separating nested sections
    /// (e.g. APP_SERVER__PORT=8080, APP_LIMITS__API__RATE=60/m).
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080_i64)?
            .set_default("server.request_timeout_seconds", 30_i64)?
            .set_default("runtime.production", false)?
            .set_default("cache.backend", "memory")?
            .set_default("proxy.trusted_proxies", "")?
            .set_default("proxy.num_trusted_proxies", 1_i64)?
            .set_default("limits.api.rate", "60/m")?
            .set_default("limits.api.block_seconds", 60_i64)?
            .set_default("limits.webhook.rate", "30/m")?
            .set_default("limits.webhook.block_seconds", 300_i64)?
            .set_default("validation.max_url_length", 2048_i64)?
            .set_default("webhooks.deploy_script", "./deploy.sh")?
            .set_default("webhooks.deploy_timeout_seconds", 120_i64)?
            .set_default("metrics.enabled", false)?
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate the loaded configuration eagerly, before anything is served.
    ///
    /// Malformed values are hard errors. Missing webhook secrets in
    /// production are logged at error level but do not abort startup: the
    /// affected endpoints fail closed per request instead.
    pub fn validate(&self) -> GuardResult<()> {
        self.limits.api.rate.parse::<RateSpec>()?;
        self.limits.webhook.rate.parse::<RateSpec>()?;

        if self.limits.api.block_seconds == 0 || self.limits.webhook.block_seconds == 0 {
            return Err(GuardError::InvalidConfig(
                "block_seconds must be positive".to_string(),
            ));
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.url.is_none() {
            return Err(GuardError::InvalidConfig(
                "cache.url is required when using the redis backend".to_string(),
            ));
        }

        if !self.proxy.trusted_proxy_list().is_empty() && self.proxy.num_trusted_proxies == 0 {
            return Err(GuardError::InvalidConfig(
                "num_trusted_proxies must be positive when trusted_proxies is set".to_string(),
            ));
        }

        if self.validation.max_url_length == 0 {
            return Err(GuardError::InvalidConfig(
                "max_url_length must be positive".to_string(),
            ));
        }

        if self.webhooks.deploy_timeout_seconds == 0 {
            return Err(GuardError::InvalidConfig(
                "deploy_timeout_seconds must be positive".to_string(),
            ));
        }

        if self.runtime.production {
            if self.webhooks.deploy_secret.is_none() {
                tracing::error!(
                    "APP_WEBHOOKS__DEPLOY_SECRET not configured in production, \
                     deploy webhook will reject all requests"
                );
            }
            if self.webhooks.payment_secret.is_none() {
                tracing::error!(
                    "APP_WEBHOOKS__PAYMENT_SECRET not configured in production, \
                     payment webhook will reject all requests"
                );
            }
        }

        Ok(())
    }
}
