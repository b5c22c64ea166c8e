use std::str::FromStr;
use std::sync::Arc;

use actix_web::{Responder, post, web};

use common::{env_config::Config, error::Res, http::Success, jwt::Claims, stripe};
use plans::{PlanCatalog, PlanId};

use crate::{
    dtos::billing::{CheckoutRequest, CheckoutResponse},
    services,
};

/// Creates a checkout session for the authenticated user and the chosen
/// plan, answering with the provider redirect URL. The subscription record
/// is only written once the webhook confirms payment.
#[post("/checkout")]
pub async fn post_checkout(
    claims: Claims,
    req: web::Json<CheckoutRequest>,
    config: web::Data<Arc<Config>>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    let plan_id = PlanId::from_str(&req.plan)?;
    let client = stripe::create_client(&config.stripe_secret_key);

    let url = services::checkout::create_checkout_session(
        &client,
        &catalog,
        &config,
        &claims.sub,
        plan_id,
    )
    .await?;

    Success::created(CheckoutResponse { url })
}
