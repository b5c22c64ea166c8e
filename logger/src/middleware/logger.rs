use std::pin::Pin;
use std::rc::Rc;
use std::time::Instant;

use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use colored::Colorize;
use futures::future::{Ready, ready};
use std::future::Future;
use uuid::Uuid;

pub struct LoggerMiddleware {}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = LoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let method = req.method().to_string();
        let path = req.path().to_string();
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        Box::pin(async move {
            let res = srv.call(req).await?;

            let status = res.status();
            let elapsed_ms = started.elapsed().as_millis();
            let status_str = if status.is_success() {
                status.as_u16().to_string().green()
            } else if status.is_client_error() {
                status.as_u16().to_string().yellow()
            } else {
                status.as_u16().to_string().red()
            };
            log::info!(
                "{} {} -> {} ({}ms) [{}]",
                method,
                path,
                status_str,
                elapsed_ms,
                request_id
            );

            Ok(res)
        })
    }
}
