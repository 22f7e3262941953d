//! Server configuration
//!
//! All settings come from environment variables (a `.env` file is loaded in
//! `main`). Gateway secrets get placeholder values in development but must
//! be set everywhere else.

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file path
    pub database_path: String,
    /// HTTP API port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Bound of the in-process event fan-out channel
    pub event_channel_capacity: usize,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Razorpay API key id
    pub razorpay_key_id: String,
    /// Razorpay API key secret
    pub razorpay_key_secret: String,
    /// Razorpay webhook signing secret
    pub razorpay_webhook_secret: String,
}

impl Config {
    /// Require a secret env var: must be set and non-empty outside development.
    fn require_secret(name: &str, environment: &str) -> Result<String> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    anyhow::bail!("{name} must be set in {environment} environment");
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            anyhow::bail!("{name} must not be empty in {environment} environment");
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "tavola.db".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            event_channel_capacity: std::env::var("EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(256),
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            razorpay_key_id: Self::require_secret("RAZORPAY_KEY_ID", &environment)?,
            razorpay_key_secret: Self::require_secret("RAZORPAY_KEY_SECRET", &environment)?,
            razorpay_webhook_secret: Self::require_secret("RAZORPAY_WEBHOOK_SECRET", &environment)?,
            environment,
        })
    }

    /// Configuration for tests: in-memory friendly defaults, no env reads
    pub fn for_tests() -> Self {
        Self {
            database_path: ":memory:".into(),
            http_port: 0,
            environment: "development".into(),
            event_channel_capacity: 64,
            stripe_secret_key: "sk_test".into(),
            stripe_webhook_secret: "whsec_test".into(),
            razorpay_key_id: "rzp_key_test".into(),
            razorpay_key_secret: "rzp_secret_test".into(),
            razorpay_webhook_secret: "rzp_whsec_test".into(),
        }
    }
}
