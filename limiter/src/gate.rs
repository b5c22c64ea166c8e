use common::error::Res;
use db::models::subscription::SubscriptionStatus;
use db::store::{ConsumeOutcome, SubscriptionStore};
use plans::PlanCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    QuotaExceeded,
    SubscriptionInactive,
}

/// Outcome of a gate check. Denials are routine, expected outcomes that
/// drive upsell prompts, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { used: i64, quota: i64 },
    Denied(DenyReason),
}

/// Checks the user's quota and consumes one unit when allowed.
///
/// Users without a record are seeded onto the free tier. The increment
/// itself is a conditional update in the store, so concurrent requests for
/// the same user can never push the counter past the quota, regardless of
/// how many service instances run.
pub async fn check_and_increment(
    store: &dyn SubscriptionStore,
    catalog: &PlanCatalog,
    user_email: &str,
) -> Res<Decision> {
    let record = match store.get(user_email).await? {
        Some(record) => record,
        None => {
            store.ensure_free_record(user_email).await?;
            match store.get(user_email).await? {
                Some(record) => record,
                // raced with a concurrent delete; nothing to consume
                None => return Ok(Decision::Denied(DenyReason::SubscriptionInactive)),
            }
        }
    };

    // canceled or past_due means zero effective quota, whatever the counter
    // says; free-tier records are always active
    if record.status != SubscriptionStatus::Active {
        return Ok(Decision::Denied(DenyReason::SubscriptionInactive));
    }

    let quota = catalog.quota(record.plan);
    match store.try_consume(user_email, quota).await? {
        ConsumeOutcome::Consumed { used } => Ok(Decision::Allowed { used, quota }),
        ConsumeOutcome::NotConsumed => {
            // either at the ceiling, or the subscription lapsed between the
            // read and the conditional update; re-read to name the reason
            let reason = match store.get(user_email).await? {
                Some(record) if record.status != SubscriptionStatus::Active => {
                    DenyReason::SubscriptionInactive
                }
                _ => DenyReason::QuotaExceeded,
            };
            Ok(Decision::Denied(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::env_config::{PlanPricing, PlanQuotas};
    use db::MemoryStore;
    use db::store::ActivateSubscription;
    use futures::future::join_all;
    use plans::PlanId;
    use std::sync::Arc;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new(
            &PlanPricing {
                basic_price_id: "price_basic".to_string(),
                plus_price_id: "price_plus".to_string(),
                pro_price_id: "price_pro".to_string(),
            },
            &PlanQuotas {
                free: 3,
                basic: 50,
                plus: 200,
                pro: 1000,
            },
        )
        .unwrap()
    }

    async fn subscribed_store(plan: PlanId) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .activate(ActivateSubscription {
                user_email: "student@example.com".to_string(),
                plan,
                stripe_customer_id: Some("cus_1".to_string()),
                stripe_subscription_id: Some("sub_1".to_string()),
                stripe_session_id: Some("cs_1".to_string()),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn free_tier_allows_three_then_denies() {
        let store = MemoryStore::new();
        let catalog = catalog();

        for used in 1..=3 {
            assert_eq!(
                check_and_increment(&store, &catalog, "new@example.com")
                    .await
                    .unwrap(),
                Decision::Allowed { used, quota: 3 }
            );
        }
        assert_eq!(
            check_and_increment(&store, &catalog, "new@example.com")
                .await
                .unwrap(),
            Decision::Denied(DenyReason::QuotaExceeded)
        );
    }

    #[tokio::test]
    async fn basic_plan_allows_the_fiftieth_call_and_denies_the_next() {
        let store = subscribed_store(PlanId::Basic).await;
        let catalog = catalog();

        for _ in 0..49 {
            store.try_consume("student@example.com", 50).await.unwrap();
        }

        assert_eq!(
            check_and_increment(&store, &catalog, "student@example.com")
                .await
                .unwrap(),
            Decision::Allowed {
                used: 50,
                quota: 50
            }
        );
        assert_eq!(
            check_and_increment(&store, &catalog, "student@example.com")
                .await
                .unwrap(),
            Decision::Denied(DenyReason::QuotaExceeded)
        );
    }

    #[tokio::test]
    async fn canceled_subscription_is_denied_regardless_of_counter() {
        let store = subscribed_store(PlanId::Pro).await;
        let catalog = catalog();
        store.mark_canceled("cus_1").await.unwrap();

        assert_eq!(
            check_and_increment(&store, &catalog, "student@example.com")
                .await
                .unwrap(),
            Decision::Denied(DenyReason::SubscriptionInactive)
        );
    }

    #[tokio::test]
    async fn past_due_subscription_is_denied() {
        let store = subscribed_store(PlanId::Plus).await;
        let catalog = catalog();
        store
            .apply_update("cus_1", None, SubscriptionStatus::PastDue)
            .await
            .unwrap();

        assert_eq!(
            check_and_increment(&store, &catalog, "student@example.com")
                .await
                .unwrap(),
            Decision::Denied(DenyReason::SubscriptionInactive)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_checks_never_allow_past_the_quota() {
        let store = Arc::new(subscribed_store(PlanId::Basic).await);
        let catalog = Arc::new(catalog());

        let tasks: Vec<_> = (0..120)
            .map(|_| {
                let store = Arc::clone(&store);
                let catalog = Arc::clone(&catalog);
                tokio::spawn(async move {
                    check_and_increment(store.as_ref(), &catalog, "student@example.com")
                        .await
                        .unwrap()
                })
            })
            .collect();

        let allowed = join_all(tasks)
            .await
            .into_iter()
            .filter(|decision| matches!(decision.as_ref().unwrap(), Decision::Allowed { .. }))
            .count();

        assert_eq!(allowed, 50);
        let record = store.get("student@example.com").await.unwrap().unwrap();
        assert_eq!(record.searches_used, 50);
    }
}
