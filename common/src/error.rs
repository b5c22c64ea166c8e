use actix_web::HttpResponse;
use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Payment provider error: {0}")]
    PaymentProvider(#[from] stripe::StripeError),

    // === APPLICATION ERRORS ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Subscription inactive: {0}")]
    SubscriptionInactive(String),

    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn to_http_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        let to_internal_json = |err_msg: &str| {
            if is_dev {
                serde_json::json!({ "error": err_msg })
            } else {
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Jwt(error) => {
                log::error!("JWT error: {}", error);
                HttpResponse::Unauthorized()
                    .json(serde_json::json!({ "error": "Invalid authorization token" }))
            }
            AppError::PaymentProvider(error) => {
                // the caller may retry; nothing was mutated locally
                log::error!("Payment provider error: {}", error);
                HttpResponse::BadGateway().json(to_internal_json(&error.to_string()))
            }
            AppError::Configuration(error) => {
                log::error!("Configuration error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(error))
            }

            // === APPLICATION ERRORS ===
            AppError::InvalidPlan(_) | AppError::InvalidSignature(_) | AppError::BadRequest(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({ "error": self.to_string() }))
            }
            // routine denials, drive upsell prompts rather than error logs
            AppError::QuotaExceeded(_) => HttpResponse::TooManyRequests()
                .json(serde_json::json!({ "error": self.to_string(), "upgrade_required": true })),
            AppError::SubscriptionInactive(_) => HttpResponse::PaymentRequired()
                .json(serde_json::json!({ "error": self.to_string(), "upgrade_required": true })),

            AppError::Unauthorized(_) => {
                HttpResponse::Unauthorized().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::NotFound(_) => {
                HttpResponse::NotFound().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(error))
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}
