//! Utility modules for the edge guard service.
//! This module contains common utilities used across the application.

mod error;
mod logging;
mod metrics;

pub use error::{GuardError, GuardResult};

pub use logging::{init_logging, log_blocked_request, log_rate_limit, log_webhook_event};

pub use metrics::{
    init_metrics, record_blocked_request, record_rate_limited, record_webhook_verification,
};
