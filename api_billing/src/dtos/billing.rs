use serde::{Deserialize, Serialize};

use db::models::subscription::SubscriptionStatus;
use plans::{Plan, PlanId};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Provider-issued redirect URL; the frontend sends the browser there.
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<Plan>,
    pub stripe_publishable_key: String,
}

#[derive(Debug, Serialize)]
pub struct CurrentSubscriptionResponse {
    pub plan: PlanId,
    pub status: SubscriptionStatus,
    pub searches_used: i64,
    pub monthly_quota: i64,
    pub remaining: i64,
}
