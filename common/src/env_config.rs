use std::{env, sync::Arc};

use crate::error::{AppError, Res};

/// Configuration struct for the server.
///
/// Holds every parameter the service needs at startup: database connection,
/// server binding, CORS, logging, Stripe credentials, per-plan price
/// references and quotas, and the admin access token. Built once in `main`
/// and passed to each component; there is no other configuration surface.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// Secret used to validate bearer tokens issued by the auth frontend.
    pub jwt_secret: String,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    pub stripe_secret_key: String,
    /// Publishable key, exposed to the frontend for Stripe.js.
    pub stripe_publishable_key: String,
    /// Stripe webhook signing secret.
    pub stripe_webhook_secret: String,
    /// Where Stripe sends the browser after a completed checkout.
    pub checkout_success_url: String,
    /// Where Stripe sends the browser after an abandoned checkout.
    pub checkout_cancel_url: String,
    /// Stripe price references for the paid plans.
    pub plan_pricing: PlanPricing,
    /// Monthly explanation quotas per plan.
    pub plan_quotas: PlanQuotas,
    /// Token guarding the admin endpoints. Admin routes are not mounted
    /// when this is absent.
    pub admin_token: Option<String>,
    /// How long processed webhook event ids are retained for deduplication.
    pub webhook_event_retention_days: i64,
}

#[derive(Clone, Debug)]
pub struct PlanPricing {
    pub basic_price_id: String,
    pub plus_price_id: String,
    pub pro_price_id: String,
}

#[derive(Clone, Debug)]
pub struct PlanQuotas {
    pub free: i64,
    pub basic: i64,
    pub plus: i64,
    pub pro: i64,
}

fn required(name: &str) -> Res<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Configuration(format!(
            "missing required environment variable {}",
            name
        ))),
    }
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Res<T> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| {
            AppError::Configuration(format!("failed to parse environment variable {}", name))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// Fails fast with a `Configuration` error naming the offending variable
    /// when a required secret is missing or a value cannot be parsed, rather
    /// than starting with a silently degraded setup.
    pub fn from_env() -> Res<Arc<Self>> {
        dotenvy::dotenv().ok();

        Ok(Arc::new(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parsed("PORT", 8080)?,
            num_workers: parsed("WORKERS", 4)?,
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_publishable_key: env::var("STRIPE_PUBLISHABLE_KEY").unwrap_or_default(),
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            checkout_success_url: env::var("CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
                "http://localhost:3000/subscription/success?session_id={CHECKOUT_SESSION_ID}"
                    .to_string()
            }),
            checkout_cancel_url: env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:3000/subscription/canceled".to_string()),
            plan_pricing: PlanPricing {
                basic_price_id: required("BASIC_PRICE_ID")?,
                plus_price_id: required("PLUS_PRICE_ID")?,
                pro_price_id: required("PRO_PRICE_ID")?,
            },
            plan_quotas: PlanQuotas {
                free: parsed("FREE_TIER_QUOTA", 3)?,
                basic: parsed("BASIC_MONTHLY_QUOTA", 50)?,
                plus: parsed("PLUS_MONTHLY_QUOTA", 200)?,
                pro: parsed("PRO_MONTHLY_QUOTA", 1000)?,
            },
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            webhook_event_retention_days: parsed("WEBHOOK_EVENT_RETENTION_DAYS", 30)?,
        }))
    }
}
