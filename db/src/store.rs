use std::sync::Arc;

use async_trait::async_trait;

use common::error::Res;
use plans::PlanId;

use crate::models::subscription::{SubscriptionRecord, SubscriptionStatus};

/// Payload of a completed checkout, extracted from the webhook event.
#[derive(Debug, Clone)]
pub struct ActivateSubscription {
    pub user_email: String,
    pub plan: PlanId,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_session_id: Option<String>,
}

/// Result of the atomic increment-with-ceiling. `NotConsumed` means the row
/// was missing, inactive, or already at the quota; the caller re-reads to
/// decide which denial applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed { used: i64 },
    NotConsumed,
}

/// Persistence seam over the subscription collection.
///
/// Backed by Postgres in production (`PgStore`) and by an in-memory map in
/// tests (`MemoryStore`). Object safe so it can ride along as
/// `web::Data<DynStore>`.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, user_email: &str) -> Res<Option<SubscriptionRecord>>;

    /// Upsert on `checkout.session.completed`: plan from the event, status
    /// active, usage counter reset to 0, provider references stored.
    async fn activate(&self, activation: ActivateSubscription) -> Res<()>;

    /// Sync plan/status from `customer.subscription.updated`. The usage
    /// counter is left untouched; only billing-period rollover resets it.
    /// Returns false when no record matches the customer id.
    async fn apply_update(
        &self,
        customer_id: &str,
        plan: Option<PlanId>,
        status: SubscriptionStatus,
    ) -> Res<bool>;

    /// Cancellation keeps the counter for historical reference.
    async fn mark_canceled(&self, customer_id: &str) -> Res<bool>;

    /// Billing-period rollover (`invoice.payment_succeeded`).
    async fn reset_usage(&self, customer_id: &str) -> Res<bool>;

    /// Admin-side counter reset, keyed by user instead of customer id.
    async fn reset_usage_for_user(&self, user_email: &str) -> Res<bool>;

    /// First gated action of a user with no record: seed the free-tier row.
    /// Insert-if-absent, so concurrent first requests are safe.
    async fn ensure_free_record(&self, user_email: &str) -> Res<()>;

    /// Atomic `searches_used + 1` guarded by `status = active` and
    /// `searches_used < quota`, so concurrent requests can never push the
    /// counter past the quota, even across service instances.
    async fn try_consume(&self, user_email: &str, quota: i64) -> Res<ConsumeOutcome>;

    async fn is_event_processed(&self, event_id: &str) -> Res<bool>;

    /// Records a processed event id; implementations prune entries older
    /// than the retention window here.
    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> Res<()>;
}

pub type DynStore = Arc<dyn SubscriptionStore>;
