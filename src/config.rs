use clap::Parser;
use std::time::Duration;

use crate::error::ConfigError;
use crate::rate_limit::{FailurePolicy, RateLimitConfig};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "helper-gateway")]
#[command(about = "Rate limiting and access control front for the helper service")]
pub struct Args {
    /// Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Rate limit max requests per window
    #[arg(long, default_value_t = 100)]
    pub rate_limit: u64,

    /// Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    /// Turn the rate limiter off entirely
    #[arg(long)]
    pub rate_limit_disabled: bool,

    /// Reject requests (503) instead of letting them through when the counter store fails
    #[arg(long)]
    pub rate_limit_fail_closed: bool,

    /// Path prefixes that bypass the rate limiter (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "/api/v1/health,/ping")]
    pub whitelist_paths: Vec<String>,

    /// Client addresses that bypass the rate limiter (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1,::1")]
    pub whitelist_ips: Vec<String>,

    /// Default cache TTL in seconds
    #[arg(short, long, default_value_t = 300)]
    pub cache_ttl: u64,

    /// Password reset token lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    pub reset_token_ttl: u64,

    /// How often expired store entries are swept, in seconds
    #[arg(long, default_value_t = 30)]
    pub sweep_interval: u64,

    /// Take the caller from X-User-Id / X-User-Role (only behind an authenticating proxy)
    #[arg(long)]
    pub trust_identity_headers: bool,

    /// HS256 secret for bearer access tokens; leave unset to disable token auth
    #[arg(long)]
    pub jwt_secret: Option<String>,
}

impl Args {
    pub fn rate_limit_config(&self) -> Result<RateLimitConfig, ConfigError> {
        let policy = if self.rate_limit_fail_closed {
            FailurePolicy::Closed
        } else {
            FailurePolicy::Open
        };

        Ok(RateLimitConfig::new(self.rate_limit, Duration::from_secs(self.rate_window))?
            .enabled(!self.rate_limit_disabled)
            .with_whitelist_paths(cleaned(&self.whitelist_paths))
            .with_whitelist_ips(cleaned(&self.whitelist_ips))
            .with_failure_policy(policy))
    }
}

// trim spaces, drop empty entries ("a, ,b" -> ["a", "b"])
fn cleaned(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
