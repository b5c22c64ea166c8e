use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use common::error::{AppError, Res};
use plans::PlanId;

use crate::models::subscription::{SubscriptionRecord, SubscriptionStatus};
use crate::store::{ActivateSubscription, ConsumeOutcome, SubscriptionStore};

const RECORD_COLUMNS: &str = "user_email, plan, status, searches_used, stripe_customer_id, \
     stripe_subscription_id, stripe_session_id, last_reset_at, updated_at";

/// Postgres-backed subscription store.
pub struct PgStore {
    pool: PgPool,
    event_retention_days: i64,
}

impl PgStore {
    pub fn new(pool: PgPool, event_retention_days: i64) -> Self {
        Self {
            pool,
            event_retention_days,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    user_email: String,
    plan: String,
    status: String,
    searches_used: i64,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    stripe_session_id: Option<String>,
    last_reset_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = AppError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionRecord {
            plan: PlanId::from_str(&row.plan)
                .map_err(|_| AppError::Internal(format!("unknown plan in store: {}", row.plan)))?,
            status: SubscriptionStatus::from_str(&row.status)?,
            user_email: row.user_email,
            searches_used: row.searches_used,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            stripe_session_id: row.stripe_session_id,
            last_reset_at: row.last_reset_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn get(&self, user_email: &str) -> Res<Option<SubscriptionRecord>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE user_email = $1",
            RECORD_COLUMNS
        ))
        .bind(user_email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn activate(&self, activation: ActivateSubscription) -> Res<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_email, plan, status, searches_used,
                 stripe_customer_id, stripe_subscription_id, stripe_session_id,
                 last_reset_at, updated_at)
            VALUES ($1, $2, 'active', 0, $3, $4, $5, now(), now())
            ON CONFLICT (user_email) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = 'active',
                searches_used = 0,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                stripe_session_id = EXCLUDED.stripe_session_id,
                last_reset_at = now(),
                updated_at = now()
            "#,
        )
        .bind(&activation.user_email)
        .bind(activation.plan.as_str())
        .bind(&activation.stripe_customer_id)
        .bind(&activation.stripe_subscription_id)
        .bind(&activation.stripe_session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_update(
        &self,
        customer_id: &str,
        plan: Option<PlanId>,
        status: SubscriptionStatus,
    ) -> Res<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan = COALESCE($2, plan), status = $3, updated_at = now()
            WHERE stripe_customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(plan.map(|p| p.as_str()))
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_canceled(&self, customer_id: &str) -> Res<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'canceled', updated_at = now() \
             WHERE stripe_customer_id = $1",
        )
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_usage(&self, customer_id: &str) -> Res<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET searches_used = 0, last_reset_at = now(), \
             updated_at = now() WHERE stripe_customer_id = $1",
        )
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_usage_for_user(&self, user_email: &str) -> Res<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET searches_used = 0, last_reset_at = now(), \
             updated_at = now() WHERE user_email = $1",
        )
        .bind(user_email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ensure_free_record(&self, user_email: &str) -> Res<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_email, plan, status, searches_used, updated_at)
            VALUES ($1, 'free', 'active', 0, now())
            ON CONFLICT (user_email) DO NOTHING
            "#,
        )
        .bind(user_email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn try_consume(&self, user_email: &str, quota: i64) -> Res<ConsumeOutcome> {
        // single conditional UPDATE, so concurrent callers race inside the
        // database and the ceiling holds across service instances
        let used = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE subscriptions
            SET searches_used = searches_used + 1, updated_at = now()
            WHERE user_email = $1 AND status = 'active' AND searches_used < $2
            RETURNING searches_used
            "#,
        )
        .bind(user_email)
        .bind(quota)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match used {
            Some(used) => ConsumeOutcome::Consumed { used },
            None => ConsumeOutcome::NotConsumed,
        })
    }

    async fn is_event_processed(&self, event_id: &str) -> Res<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM webhook_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> Res<()> {
        sqlx::query(
            "INSERT INTO webhook_events (event_id, event_type) VALUES ($1, $2) \
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        // bounded retention window for the dedupe ledger
        sqlx::query(
            "DELETE FROM webhook_events \
             WHERE processed_at < now() - make_interval(days => $1)",
        )
        .bind(self.event_retention_days as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
