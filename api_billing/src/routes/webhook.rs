use std::sync::Arc;

use actix_web::{HttpRequest, Responder, post, web};

use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use db::DynStore;
use plans::PlanCatalog;

use crate::services::webhook::{self, BillingEvent};

/// Receives asynchronous Stripe events.
///
/// Called by Stripe's servers, not by the frontend; the endpoint URL and the
/// signing secret are configured in the Stripe dashboard. Signature failures
/// and malformed bodies answer 400 with no state touched; processing
/// failures for known event kinds answer non-200 so Stripe redelivers;
/// unknown event kinds are acknowledged with 200.
#[post("/webhook")]
pub async fn post_webhook(
    payload: String,
    req: HttpRequest,
    config: web::Data<Arc<Config>>,
    store: web::Data<DynStore>,
    catalog: web::Data<PlanCatalog>,
) -> Res<impl Responder> {
    let signature = req
        .headers()
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("Stripe signature missing".to_string()))?;

    let event = webhook::construct_event(&payload, signature, &config.stripe_webhook_secret)?;
    let billing_event = BillingEvent::from_stripe(event)?;
    webhook::process_event(store.get_ref().as_ref(), &catalog, billing_event).await?;

    Success::ok("Webhook processed successfully")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use common::env_config::{PlanPricing, PlanQuotas};
    use db::{MemoryStore, SubscriptionStore};

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            environment: "development".to_string(),
            database_url: "postgresql://localhost/test".to_string(),
            jwt_secret: "secret".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            num_workers: 1,
            cors_allowed_origin: "http://localhost:3000".to_string(),
            console_logging_enabled: false,
            stripe_secret_key: "sk_test".to_string(),
            stripe_publishable_key: "pk_test".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            checkout_success_url: "http://localhost:3000/success".to_string(),
            checkout_cancel_url: "http://localhost:3000/canceled".to_string(),
            plan_pricing: PlanPricing {
                basic_price_id: "price_basic".to_string(),
                plus_price_id: "price_plus".to_string(),
                pro_price_id: "price_pro".to_string(),
            },
            plan_quotas: PlanQuotas {
                free: 3,
                basic: 50,
                plus: 200,
                pro: 1000,
            },
            admin_token: None,
            webhook_event_retention_days: 30,
        })
    }

    #[actix_web::test]
    async fn missing_signature_answers_400_and_leaves_the_store_untouched() {
        let config = test_config();
        let store: DynStore = Arc::new(MemoryStore::new());
        let catalog = PlanCatalog::from_config(&config).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(store.clone()))
                .app_data(web::Data::new(catalog))
                .service(post_webhook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_payload(r#"{"id": "evt_1"}"#)
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(store.get("student@example.com").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn wrong_signature_answers_400_and_leaves_the_store_untouched() {
        let config = test_config();
        let store: DynStore = Arc::new(MemoryStore::new());
        let catalog = PlanCatalog::from_config(&config).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(store.clone()))
                .app_data(web::Data::new(catalog))
                .service(post_webhook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook")
            .insert_header(("stripe-signature", "t=123,v1=deadbeef"))
            .set_payload(r#"{"id": "evt_1"}"#)
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(store.get("student@example.com").await.unwrap().is_none());
    }
}
