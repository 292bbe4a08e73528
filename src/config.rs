use std::env;

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Bearer key producers must present on enqueue/cancel/reply endpoints.
    pub api_key: String,
    /// Public base URL tracking links and pixels point at, e.g. "https://track.example.com".
    pub tracking_base_url: String,

    pub dispatch_interval_secs: u64,
    pub dispatch_batch_size: i64,
    /// SENDING rows older than this are assumed orphaned by a dead worker and requeued.
    pub claim_ttl_secs: i64,
    pub reply_poll_interval_secs: u64,
    /// Default per-tenant daily send cap when no row exists yet.
    pub tenant_daily_limit: i64,

    pub smtp_relay: String,
    pub smtp_username: String,
    pub smtp_password: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://outreach_mailer.db".into()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            api_key: env::var("API_KEY").expect("API_KEY must be set"),
            tracking_base_url: env::var("TRACKING_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            dispatch_interval_secs: env_u64("DISPATCH_INTERVAL_SECS", 60),
            dispatch_batch_size: env_u64("DISPATCH_BATCH_SIZE", 100) as i64,
            claim_ttl_secs: env_u64("CLAIM_TTL_SECS", 600) as i64,
            reply_poll_interval_secs: env_u64("REPLY_POLL_INTERVAL_SECS", 900),
            tenant_daily_limit: env_u64("TENANT_DAILY_LIMIT", 500) as i64,
            smtp_relay: env::var("SMTP_RELAY").unwrap_or_else(|_| "smtp.gmail.com".into()),
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
