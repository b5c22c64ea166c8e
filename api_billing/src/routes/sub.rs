use std::sync::Arc;

use actix_web::{Responder, get, web};

use common::{env_config::Config, error::Res, http::Success, jwt::Claims};
use db::models::subscription::{SubscriptionRecord, SubscriptionStatus};
use db::{DynStore, SubscriptionStore};
use plans::{PlanCatalog, PlanId};

use crate::dtos::billing::{CurrentSubscriptionResponse, PlansResponse};

/// Lists the plan table so the frontend can render the pricing cards.
#[get("/plans")]
pub async fn get_plans(
    config: web::Data<Arc<Config>>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    Success::ok(PlansResponse {
        plans: catalog.plans().to_vec(),
        stripe_publishable_key: config.stripe_publishable_key.clone(),
    })
}

/// Subscription snapshot for the authenticated user. Users without a record
/// are reported as the free tier with nothing consumed yet.
#[get("/current")]
pub async fn get_current(
    claims: Claims,
    store: web::Data<DynStore>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    let record = store.get(&claims.sub).await?;
    Success::ok(snapshot(record, &catalog))
}

/// An inactive subscription has zero effective quota, whatever the stored
/// counter says; the snapshot mirrors what the gate will allow.
fn snapshot(
    record: Option<SubscriptionRecord>,
    catalog: &PlanCatalog,
) -> CurrentSubscriptionResponse {
    let (plan, status, searches_used) = match record {
        Some(record) => (record.plan, record.status, record.searches_used),
        None => (PlanId::Free, SubscriptionStatus::Active, 0),
    };
    let monthly_quota = if status == SubscriptionStatus::Active {
        catalog.quota(plan)
    } else {
        0
    };

    CurrentSubscriptionResponse {
        plan,
        status,
        searches_used,
        monthly_quota,
        remaining: (monthly_quota - searches_used).max(0),
    }
}
