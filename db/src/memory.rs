use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use common::error::{AppError, Res};
use plans::PlanId;

use crate::models::subscription::{SubscriptionRecord, SubscriptionStatus};
use crate::store::{ActivateSubscription, ConsumeOutcome, SubscriptionStore};

#[derive(Default)]
struct Inner {
    records: HashMap<String, SubscriptionRecord>,
    events: HashMap<String, String>,
}

/// In-memory [`SubscriptionStore`] with the same semantics as `PgStore`.
/// Used by the test suites and for wiring the service without Postgres.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Res<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| AppError::Internal("subscription store lock poisoned".to_string()))?;
        Ok(f(&mut inner))
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, user_email: &str) -> Res<Option<SubscriptionRecord>> {
        self.locked(|inner| inner.records.get(user_email).cloned())
    }

    async fn activate(&self, activation: ActivateSubscription) -> Res<()> {
        self.locked(|inner| {
            inner.records.insert(
                activation.user_email.clone(),
                SubscriptionRecord {
                    user_email: activation.user_email,
                    plan: activation.plan,
                    status: SubscriptionStatus::Active,
                    searches_used: 0,
                    stripe_customer_id: activation.stripe_customer_id,
                    stripe_subscription_id: activation.stripe_subscription_id,
                    stripe_session_id: activation.stripe_session_id,
                    last_reset_at: Some(Utc::now()),
                    updated_at: Utc::now(),
                },
            );
        })
    }

    async fn apply_update(
        &self,
        customer_id: &str,
        plan: Option<PlanId>,
        status: SubscriptionStatus,
    ) -> Res<bool> {
        self.locked(|inner| {
            match by_customer(&mut inner.records, customer_id) {
                Some(record) => {
                    if let Some(plan) = plan {
                        record.plan = plan;
                    }
                    record.status = status;
                    record.updated_at = Utc::now();
                    true
                }
                None => false,
            }
        })
    }

    async fn mark_canceled(&self, customer_id: &str) -> Res<bool> {
        self.locked(|inner| match by_customer(&mut inner.records, customer_id) {
            Some(record) => {
                record.status = SubscriptionStatus::Canceled;
                record.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn reset_usage(&self, customer_id: &str) -> Res<bool> {
        self.locked(|inner| match by_customer(&mut inner.records, customer_id) {
            Some(record) => {
                record.searches_used = 0;
                record.last_reset_at = Some(Utc::now());
                record.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn reset_usage_for_user(&self, user_email: &str) -> Res<bool> {
        self.locked(|inner| match inner.records.get_mut(user_email) {
            Some(record) => {
                record.searches_used = 0;
                record.last_reset_at = Some(Utc::now());
                record.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn ensure_free_record(&self, user_email: &str) -> Res<()> {
        self.locked(|inner| {
            inner
                .records
                .entry(user_email.to_string())
                .or_insert_with(|| SubscriptionRecord {
                    user_email: user_email.to_string(),
                    plan: PlanId::Free,
                    status: SubscriptionStatus::Active,
                    searches_used: 0,
                    stripe_customer_id: None,
                    stripe_subscription_id: None,
                    stripe_session_id: None,
                    last_reset_at: None,
                    updated_at: Utc::now(),
                });
        })
    }

    async fn try_consume(&self, user_email: &str, quota: i64) -> Res<ConsumeOutcome> {
        self.locked(|inner| match inner.records.get_mut(user_email) {
            Some(record)
                if record.status == SubscriptionStatus::Active
                    && record.searches_used < quota =>
            {
                record.searches_used += 1;
                record.updated_at = Utc::now();
                ConsumeOutcome::Consumed {
                    used: record.searches_used,
                }
            }
            _ => ConsumeOutcome::NotConsumed,
        })
    }

    async fn is_event_processed(&self, event_id: &str) -> Res<bool> {
        self.locked(|inner| inner.events.contains_key(event_id))
    }

    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> Res<()> {
        self.locked(|inner| {
            inner
                .events
                .insert(event_id.to_string(), event_type.to_string());
        })
    }
}

fn by_customer<'a>(
    records: &'a mut HashMap<String, SubscriptionRecord>,
    customer_id: &str,
) -> Option<&'a mut SubscriptionRecord> {
    records
        .values_mut()
        .find(|record| record.stripe_customer_id.as_deref() == Some(customer_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Arc;

    fn activation(email: &str, plan: PlanId) -> ActivateSubscription {
        ActivateSubscription {
            user_email: email.to_string(),
            plan,
            stripe_customer_id: Some("cus_1".to_string()),
            stripe_subscription_id: Some("sub_1".to_string()),
            stripe_session_id: Some("cs_1".to_string()),
        }
    }

    #[tokio::test]
    async fn activate_resets_counter_and_stores_references() {
        let store = MemoryStore::new();
        store
            .activate(activation("a@b.com", PlanId::Basic))
            .await
            .unwrap();
        store.try_consume("a@b.com", 50).await.unwrap();

        // re-activation (e.g. plan purchase) zeroes the counter again
        store
            .activate(activation("a@b.com", PlanId::Plus))
            .await
            .unwrap();
        let record = store.get("a@b.com").await.unwrap().unwrap();
        assert_eq!(record.plan, PlanId::Plus);
        assert_eq!(record.searches_used, 0);
        assert_eq!(record.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn try_consume_stops_exactly_at_quota() {
        let store = MemoryStore::new();
        store
            .activate(activation("a@b.com", PlanId::Basic))
            .await
            .unwrap();

        for i in 1..=3 {
            assert_eq!(
                store.try_consume("a@b.com", 3).await.unwrap(),
                ConsumeOutcome::Consumed { used: i }
            );
        }
        assert_eq!(
            store.try_consume("a@b.com", 3).await.unwrap(),
            ConsumeOutcome::NotConsumed
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_consumes_never_overshoot() {
        let store = Arc::new(MemoryStore::new());
        store
            .activate(activation("a@b.com", PlanId::Basic))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.try_consume("a@b.com", 50).await.unwrap() })
            })
            .collect();

        let consumed = join_all(tasks)
            .await
            .into_iter()
            .filter(|outcome| {
                matches!(
                    outcome.as_ref().unwrap(),
                    ConsumeOutcome::Consumed { .. }
                )
            })
            .count();

        assert_eq!(consumed, 50);
        let record = store.get("a@b.com").await.unwrap().unwrap();
        assert_eq!(record.searches_used, 50);
    }

    #[tokio::test]
    async fn canceled_record_consumes_nothing() {
        let store = MemoryStore::new();
        store
            .activate(activation("a@b.com", PlanId::Pro))
            .await
            .unwrap();
        assert!(store.mark_canceled("cus_1").await.unwrap());
        assert_eq!(
            store.try_consume("a@b.com", 1000).await.unwrap(),
            ConsumeOutcome::NotConsumed
        );
    }

    #[tokio::test]
    async fn event_ledger_deduplicates() {
        let store = MemoryStore::new();
        assert!(!store.is_event_processed("evt_1").await.unwrap());
        store
            .mark_event_processed("evt_1", "checkout.session.completed")
            .await
            .unwrap();
        assert!(store.is_event_processed("evt_1").await.unwrap());
    }
}
