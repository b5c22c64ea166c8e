use stripe::{Event, EventObject, EventType, Webhook};

use common::error::{AppError, Res};
use db::models::subscription::SubscriptionStatus;
use db::store::{ActivateSubscription, SubscriptionStore};
use plans::{PlanCatalog, PlanId};

/// Verifies the payload against the webhook signing secret and parses it.
/// Any failure means the event is discarded with `InvalidSignature`; the
/// provider's own retry mechanism governs redelivery.
pub fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<Event> {
    Webhook::construct_event(payload, signature, webhook_secret)
        .map_err(|e| AppError::InvalidSignature(e.to_string()))
}

/// The closed set of provider events this service acts on, extracted from the
/// raw Stripe event. Adding a new handled kind means adding a variant here,
/// which makes the decision visible at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// `checkout.session.completed`: the user finished paying; upsert the
    /// record with the plan from the session metadata.
    CheckoutCompleted {
        event_id: String,
        user_email: String,
        plan: PlanId,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        session_id: String,
    },
    /// `customer.subscription.updated`: plan/status sync. Never resets usage.
    SubscriptionUpdated {
        event_id: String,
        customer_id: String,
        price_id: Option<String>,
        status: SubscriptionStatus,
    },
    /// `customer.subscription.deleted`: cancellation. Usage kept for history.
    SubscriptionDeleted {
        event_id: String,
        customer_id: String,
    },
    /// `invoice.payment_succeeded`: billing-period rollover, usage resets.
    InvoicePaid {
        event_id: String,
        customer_id: String,
    },
    /// Anything else: acknowledged, no state change.
    Ignored { kind: String },
}

impl BillingEvent {
    pub fn from_stripe(event: Event) -> Res<Self> {
        let event_id = event.id.to_string();

        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                let EventObject::CheckoutSession(session) = event.data.object else {
                    return Err(malformed("checkout.session.completed"));
                };
                let metadata = session.metadata.unwrap_or_default();
                let user_email = metadata
                    .get("user_email")
                    .cloned()
                    .or(session.customer_email)
                    .ok_or_else(|| {
                        AppError::BadRequest(
                            "checkout session carries no user email".to_string(),
                        )
                    })?;
                let plan: PlanId = metadata
                    .get("plan")
                    .ok_or_else(|| {
                        AppError::BadRequest("checkout session carries no plan".to_string())
                    })?
                    .parse()?;

                Ok(BillingEvent::CheckoutCompleted {
                    event_id,
                    user_email,
                    plan,
                    customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
                    subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
                    session_id: session.id.to_string(),
                })
            }
            EventType::CustomerSubscriptionUpdated => {
                let EventObject::Subscription(subscription) = event.data.object else {
                    return Err(malformed("customer.subscription.updated"));
                };
                Ok(BillingEvent::SubscriptionUpdated {
                    event_id,
                    customer_id: subscription.customer.id().to_string(),
                    price_id: subscription
                        .items
                        .data
                        .first()
                        .and_then(|item| item.price.as_ref())
                        .map(|price| price.id.to_string()),
                    status: map_status(subscription.status),
                })
            }
            EventType::CustomerSubscriptionDeleted => {
                let EventObject::Subscription(subscription) = event.data.object else {
                    return Err(malformed("customer.subscription.deleted"));
                };
                Ok(BillingEvent::SubscriptionDeleted {
                    event_id,
                    customer_id: subscription.customer.id().to_string(),
                })
            }
            EventType::InvoicePaymentSucceeded => {
                let EventObject::Invoice(invoice) = event.data.object else {
                    return Err(malformed("invoice.payment_succeeded"));
                };
                match invoice.customer.as_ref().map(|c| c.id().to_string()) {
                    Some(customer_id) => Ok(BillingEvent::InvoicePaid {
                        event_id,
                        customer_id,
                    }),
                    // nothing to correlate with; acknowledge
                    None => Ok(BillingEvent::Ignored {
                        kind: "invoice.payment_succeeded".to_string(),
                    }),
                }
            }
            other => Ok(BillingEvent::Ignored {
                kind: other.to_string(),
            }),
        }
    }

    fn event_id(&self) -> Option<&str> {
        match self {
            BillingEvent::CheckoutCompleted { event_id, .. }
            | BillingEvent::SubscriptionUpdated { event_id, .. }
            | BillingEvent::SubscriptionDeleted { event_id, .. }
            | BillingEvent::InvoicePaid { event_id, .. } => Some(event_id),
            BillingEvent::Ignored { .. } => None,
        }
    }

    fn kind(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted { .. } => "checkout.session.completed",
            BillingEvent::SubscriptionUpdated { .. } => "customer.subscription.updated",
            BillingEvent::SubscriptionDeleted { .. } => "customer.subscription.deleted",
            BillingEvent::InvoicePaid { .. } => "invoice.payment_succeeded",
            BillingEvent::Ignored { kind } => kind,
        }
    }
}

fn malformed(kind: &str) -> AppError {
    AppError::BadRequest(format!("{} payload carries an unexpected object", kind))
}

/// Collapses the provider's subscription lifecycle onto the three states the
/// store tracks.
fn map_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    use stripe::SubscriptionStatus as S;
    match status {
        S::Active | S::Trialing => SubscriptionStatus::Active,
        S::PastDue | S::Unpaid | S::Incomplete | S::Paused => SubscriptionStatus::PastDue,
        S::Canceled | S::IncompleteExpired => SubscriptionStatus::Canceled,
    }
}

/// Applies a billing event to the store, deduplicating by provider event id.
/// Redelivered events are acknowledged without touching state; the dedupe
/// mark is only written after the mutation succeeds, so a failed attempt is
/// retried by the provider and the upserts stay idempotent on replay.
pub async fn process_event(
    store: &dyn SubscriptionStore,
    catalog: &PlanCatalog,
    event: BillingEvent,
) -> Res<()> {
    if let Some(event_id) = event.event_id() {
        if store.is_event_processed(event_id).await? {
            log::info!("Skipping already processed event {}", event_id);
            return Ok(());
        }
    }

    apply_event(store, catalog, &event).await?;

    if let Some(event_id) = event.event_id() {
        store.mark_event_processed(event_id, event.kind()).await?;
    }
    Ok(())
}

async fn apply_event(
    store: &dyn SubscriptionStore,
    catalog: &PlanCatalog,
    event: &BillingEvent,
) -> Res<()> {
    match event {
        BillingEvent::CheckoutCompleted {
            user_email,
            plan,
            customer_id,
            subscription_id,
            session_id,
            ..
        } => {
            log::info!(
                "Checkout completed for {}: plan {} (session {})",
                user_email,
                plan,
                session_id
            );
            store
                .activate(ActivateSubscription {
                    user_email: user_email.clone(),
                    plan: *plan,
                    stripe_customer_id: customer_id.clone(),
                    stripe_subscription_id: subscription_id.clone(),
                    stripe_session_id: Some(session_id.clone()),
                })
                .await
        }
        BillingEvent::SubscriptionUpdated {
            customer_id,
            price_id,
            status,
            ..
        } => {
            let plan = price_id
                .as_deref()
                .and_then(|price| catalog.plan_for_price(price));
            if price_id.is_some() && plan.is_none() {
                log::warn!(
                    "Subscription update for {} carries unknown price {:?}; keeping stored plan",
                    customer_id,
                    price_id
                );
            }
            if !store.apply_update(customer_id, plan, *status).await? {
                log::warn!("Subscription update for unknown customer {}", customer_id);
            }
            Ok(())
        }
        BillingEvent::SubscriptionDeleted { customer_id, .. } => {
            if !store.mark_canceled(customer_id).await? {
                log::warn!("Subscription delete for unknown customer {}", customer_id);
            }
            Ok(())
        }
        BillingEvent::InvoicePaid { customer_id, .. } => {
            if !store.reset_usage(customer_id).await? {
                log::warn!("Invoice payment for unknown customer {}", customer_id);
            }
            Ok(())
        }
        BillingEvent::Ignored { kind } => {
            log::info!("Unhandled event type: {}", kind);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::env_config::{PlanPricing, PlanQuotas};
    use db::MemoryStore;
    use db::store::ConsumeOutcome;

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

    fn checkout_completed(event_id: &str) -> BillingEvent {
        BillingEvent::CheckoutCompleted {
            event_id: event_id.to_string(),
            user_email: "student@example.com".to_string(),
            plan: PlanId::Basic,
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            session_id: "cs_1".to_string(),
        }
    }

    #[tokio::test]
    async fn forged_signature_is_rejected_before_any_state_change() {
        let store = MemoryStore::new();
        let payload =
            r#"{"id": "evt_1", "object": "event", "type": "checkout.session.completed"}"#;

        let result = construct_event(payload, "t=123,v1=deadbeef", "whsec_test");
        assert!(matches!(result, Err(AppError::InvalidSignature(_))));
        assert!(store.get("student@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkout_completed_activates_subscription() {
        let store = MemoryStore::new();
        process_event(&store, &catalog(), checkout_completed("evt_1"))
            .await
            .unwrap();

        let record = store.get("student@example.com").await.unwrap().unwrap();
        assert_eq!(record.plan, PlanId::Basic);
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.searches_used, 0);
        assert_eq!(record.stripe_session_id.as_deref(), Some("cs_1"));
    }

    #[tokio::test]
    async fn replayed_checkout_event_does_not_reset_usage() {
        let store = MemoryStore::new();
        let catalog = catalog();
        process_event(&store, &catalog, checkout_completed("evt_1"))
            .await
            .unwrap();

        for _ in 0..5 {
            store.try_consume("student@example.com", 50).await.unwrap();
        }

        // provider redelivery of the identical event
        process_event(&store, &catalog, checkout_completed("evt_1"))
            .await
            .unwrap();

        let record = store.get("student@example.com").await.unwrap().unwrap();
        assert_eq!(record.searches_used, 5);
        assert_eq!(record.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn subscription_update_changes_plan_without_resetting_usage() {
        let store = MemoryStore::new();
        let catalog = catalog();
        process_event(&store, &catalog, checkout_completed("evt_1"))
            .await
            .unwrap();
        for _ in 0..7 {
            store.try_consume("student@example.com", 50).await.unwrap();
        }

        process_event(
            &store,
            &catalog,
            BillingEvent::SubscriptionUpdated {
                event_id: "evt_2".to_string(),
                customer_id: "cus_1".to_string(),
                price_id: Some("price_plus".to_string()),
                status: SubscriptionStatus::Active,
            },
        )
        .await
        .unwrap();

        let record = store.get("student@example.com").await.unwrap().unwrap();
        assert_eq!(record.plan, PlanId::Plus);
        assert_eq!(record.searches_used, 7);
    }

    #[tokio::test]
    async fn subscription_delete_cancels_but_keeps_counter() {
        let store = MemoryStore::new();
        let catalog = catalog();
        process_event(&store, &catalog, checkout_completed("evt_1"))
            .await
            .unwrap();
        for _ in 0..4 {
            store.try_consume("student@example.com", 50).await.unwrap();
        }

        process_event(
            &store,
            &catalog,
            BillingEvent::SubscriptionDeleted {
                event_id: "evt_2".to_string(),
                customer_id: "cus_1".to_string(),
            },
        )
        .await
        .unwrap();

        let record = store.get("student@example.com").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Canceled);
        assert_eq!(record.searches_used, 4);
        // canceled means zero effective quota no matter the counter
        assert_eq!(
            store.try_consume("student@example.com", 50).await.unwrap(),
            ConsumeOutcome::NotConsumed
        );
    }

    #[tokio::test]
    async fn invoice_payment_resets_usage() {
        let store = MemoryStore::new();
        let catalog = catalog();
        process_event(&store, &catalog, checkout_completed("evt_1"))
            .await
            .unwrap();
        for _ in 0..9 {
            store.try_consume("student@example.com", 50).await.unwrap();
        }

        process_event(
            &store,
            &catalog,
            BillingEvent::InvoicePaid {
                event_id: "evt_2".to_string(),
                customer_id: "cus_1".to_string(),
            },
        )
        .await
        .unwrap();

        let record = store.get("student@example.com").await.unwrap().unwrap();
        assert_eq!(record.searches_used, 0);
        assert!(record.last_reset_at.is_some());
    }

    #[tokio::test]
    async fn unknown_event_kinds_are_acknowledged_without_state_change() {
        let store = MemoryStore::new();
        process_event(
            &store,
            &catalog(),
            BillingEvent::Ignored {
                kind: "charge.refunded".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(store.get("student@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn events_for_unknown_customers_are_acknowledged() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let result = process_event(
            &store,
            &catalog,
            BillingEvent::SubscriptionDeleted {
                event_id: "evt_9".to_string(),
                customer_id: "cus_missing".to_string(),
            },
        )
        .await;
        assert!(result.is_ok());
    }

    #[test]
    fn provider_statuses_collapse_onto_store_states() {
        use stripe::SubscriptionStatus as S;
        assert_eq!(map_status(S::Active), SubscriptionStatus::Active);
        assert_eq!(map_status(S::Trialing), SubscriptionStatus::Active);
        assert_eq!(map_status(S::PastDue), SubscriptionStatus::PastDue);
        assert_eq!(map_status(S::Unpaid), SubscriptionStatus::PastDue);
        assert_eq!(map_status(S::Canceled), SubscriptionStatus::Canceled);
        assert_eq!(
            map_status(S::IncompleteExpired),
            SubscriptionStatus::Canceled
        );
    }
}
