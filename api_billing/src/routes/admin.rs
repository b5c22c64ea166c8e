use std::sync::Arc;

use actix_web::{HttpRequest, Responder, get, post, web};
use serde_json::json;

use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use db::{DynStore, SubscriptionStore};

/// Admin access is a configured token, not a hardcoded password. Constant
/// comparison is not needed here; the token is high entropy by policy.
fn authorize(req: &HttpRequest, config: &Config) -> Res<()> {
    let expected = config
        .admin_token
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("Admin access is not configured".to_string()))?;
    let provided = req
        .headers()
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok());

    if provided == Some(expected) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Invalid admin token".to_string()))
    }
}

#[get("/subscriptions/{email}")]
pub async fn get_subscription(
    req: HttpRequest,
    path: web::Path<String>,
    config: web::Data<Arc<Config>>,
    store: web::Data<DynStore>,
) -> Res<impl Responder> {
    authorize(&req, &config)?;

    let email = path.into_inner();
    let record = store
        .get(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no subscription record for {}", email)))?;

    Success::ok(record)
}

/// Manual counter reset, e.g. after a support escalation. Billing-period
/// resets come in through the webhook instead.
#[post("/subscriptions/{email}/reset-usage")]
pub async fn post_reset_usage(
    req: HttpRequest,
    path: web::Path<String>,
    config: web::Data<Arc<Config>>,
    store: web::Data<DynStore>,
) -> Res<impl Responder> {
    authorize(&req, &config)?;

    let email = path.into_inner();
    if !store.reset_usage_for_user(&email).await? {
        return Err(AppError::NotFound(format!(
            "no subscription record for {}",
            email
        )));
    }

    log::info!("Admin reset usage counter for {}", email);
    Success::ok(json!({ "user_email": email, "searches_used": 0 }))
}
