use std::sync::Arc;

use actix_web::{
    FromRequest, HttpRequest,
    dev::{Payload, ServiceRequest},
    http::header::HeaderMap,
    web,
};
use chrono::{Duration, Utc};
use futures::future::{Ready, ready};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    env_config::Config,
    error::{AppError, Res},
};

/// Identity claims carried by the bearer token the auth frontend issues.
/// Token issuance lives outside this service; only validation happens here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User email, the subscription key.
    pub sub: String,
    pub exp: usize,
}

/// Generates a JWT for the given user. Used by tooling and tests; the
/// production tokens come from the auth frontend with the same secret.
pub fn generate_jwt(user_email: &str, secret: &str, expiration_hours: i64) -> Res<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(expiration_hours))
        .ok_or_else(|| AppError::Internal("expiration timestamp out of range".to_string()))?
        .timestamp();

    let claims = Claims {
        sub: user_email.to_string(),
        exp: expiration as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(AppError::from)
}

/// Extracts claims object from a JWT token. Requires the shared JWT secret.
pub fn validate_jwt(token: &str, secret: &str) -> Res<Claims> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

fn bearer_token(headers: &HeaderMap) -> Res<&str> {
    headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("No authorization token provided".to_string()))
}

fn claims_from_headers(headers: &HeaderMap, config: Option<&web::Data<Arc<Config>>>) -> Res<Claims> {
    let config = config
        .ok_or_else(|| AppError::Internal("Config not available in app data".to_string()))?;
    validate_jwt(bearer_token(headers)?, &config.jwt_secret)
}

/// Claims lookup for middleware running before the route handlers.
pub fn get_claims_or_error(req: &ServiceRequest) -> Res<Claims> {
    claims_from_headers(req.headers(), req.app_data::<web::Data<Arc<Config>>>())
}

impl FromRequest for Claims {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(claims_from_headers(
            req.headers(),
            req.app_data::<web::Data<Arc<Config>>>(),
        ))
    }
}
