use std::collections::HashMap;

use stripe::{CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession};

use common::{
    env_config::Config,
    error::{AppError, Res},
};
use plans::{PlanCatalog, PlanId};

/// Mints a Stripe checkout session for the given user and plan and returns
/// the redirect URL.
///
/// No local state is mutated here; the subscription only becomes active once
/// the corresponding `checkout.session.completed` webhook arrives. Provider
/// failures surface as `PaymentProvider` and are not retried; the caller
/// decides whether to re-attempt.
pub async fn create_checkout_session(
    client: &Client,
    catalog: &PlanCatalog,
    config: &Config,
    user_email: &str,
    plan_id: PlanId,
) -> Res<String> {
    let plan = catalog.purchasable(plan_id)?;
    let price_id = plan
        .price_id
        .clone()
        .ok_or_else(|| AppError::InvalidPlan(format!("plan {} has no price", plan_id)))?;

    // the webhook correlates the session back to a subscription record
    // through this metadata
    let mut metadata = HashMap::new();
    metadata.insert("plan".to_string(), plan_id.to_string());
    metadata.insert("user_email".to_string(), user_email.to_string());

    let params = CreateCheckoutSession {
        payment_method_types: Some(vec![stripe::CreateCheckoutSessionPaymentMethodTypes::Card]),
        line_items: Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]),
        mode: Some(CheckoutSessionMode::Subscription),
        success_url: Some(config.checkout_success_url.as_str()),
        cancel_url: Some(config.checkout_cancel_url.as_str()),
        customer_email: Some(user_email),
        metadata: Some(metadata),
        allow_promotion_codes: Some(true),
        ..Default::default()
    };

    let session = CheckoutSession::create(client, params)
        .await
        .map_err(AppError::from)?;

    session
        .url
        .ok_or_else(|| AppError::Internal("checkout session carries no redirect URL".to_string()))
}
