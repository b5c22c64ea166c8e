use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    Error, web,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};

use common::{error::AppError, jwt};
use db::DynStore;
use plans::PlanCatalog;

use crate::gate::{self, Decision, DenyReason};

// --- Usage Gate Middleware Definition ---

pub struct UsageGate {}

impl UsageGate {
    pub fn new() -> Self {
        UsageGate {}
    }
}

impl Default for UsageGate {
    fn default() -> Self {
        Self::new()
    }
}

// --- Middleware Transform Implementation ---

impl<S, B> Transform<S, ServiceRequest> for UsageGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = UsageGateMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(UsageGateMiddleware {
            service: Rc::new(service),
        }))
    }
}

// --- Actual Middleware Service ---

pub struct UsageGateMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for UsageGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);

        Box::pin(async move {
            let claims = match jwt::get_claims_or_error(&req) {
                Ok(claims) => claims,
                Err(error) => return Ok(req.error_response(error)),
            };

            let store = match req.app_data::<web::Data<DynStore>>() {
                Some(store) => store.clone(),
                None => {
                    return Ok(req.error_response(AppError::Internal(
                        "Subscription store not available".to_string(),
                    )));
                }
            };
            let catalog = match req.app_data::<web::Data<PlanCatalog>>() {
                Some(catalog) => catalog.clone(),
                None => {
                    return Ok(req.error_response(AppError::Internal(
                        "Plan catalog not available".to_string(),
                    )));
                }
            };

            match gate::check_and_increment(store.get_ref().as_ref(), &catalog, &claims.sub).await
            {
                Ok(Decision::Allowed { used, quota }) => {
                    log::debug!("Usage OK for {}: {}/{}", claims.sub, used, quota);
                    srv.call(req).await.map(|res| res.map_into_boxed_body())
                }
                Ok(Decision::Denied(DenyReason::QuotaExceeded)) => {
                    Ok(req.error_response(AppError::QuotaExceeded(format!(
                        "monthly explanation quota reached for {}",
                        claims.sub
                    ))))
                }
                Ok(Decision::Denied(DenyReason::SubscriptionInactive)) => {
                    Ok(req.error_response(AppError::SubscriptionInactive(format!(
                        "subscription for {} is not active",
                        claims.sub
                    ))))
                }
                Err(error) => Ok(req.error_response(error)),
            }
        })
    }
}
