//! Access log for webhook deliveries and button API calls.
//!
//! Each request yields one line once the response is known. Webhook
//! deliveries carry their event type and delivery id so a line can be matched
//! with the platform's delivery log.

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::StatusCode;
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{GITHUB_EVENT_HEADER, GITLAB_EVENT_HEADER};

const DELIVERY_HEADERS: [&str; 2] = ["X-GitHub-Delivery", "X-Gitlab-Event-UUID"];

/// What is known about a request before it is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Delivery {
    method: String,
    path: String,
    remote_addr: String,
    event: Option<String>,
    id: Option<String>,
}

impl Delivery {
    fn from_request(req: &ServiceRequest) -> Self {
        let header = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| req.headers().get(*name))
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            method: req.method().to_string(),
            path: req.path().to_string(),
            remote_addr: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string(),
            event: header(&[GITHUB_EVENT_HEADER, GITLAB_EVENT_HEADER]),
            id: header(&DELIVERY_HEADERS),
        }
    }

    fn log(&self, status: StatusCode, elapsed: Duration) {
        let event = self.event.as_deref().unwrap_or("-");
        let id = self.id.as_deref().unwrap_or("-");
        let status_code = status.as_u16();
        let duration_ms = elapsed.as_millis();
        if status.is_server_error() {
            error!(
                target: "api",
                method = %self.method, path = %self.path, remote_addr = %self.remote_addr,
                event, delivery = id, status = status_code, %duration_ms,
                "Delivery failed"
            );
        } else if status.is_client_error() {
            warn!(
                target: "api",
                method = %self.method, path = %self.path, remote_addr = %self.remote_addr,
                event, delivery = id, status = status_code, %duration_ms,
                "Delivery refused"
            );
        } else {
            info!(
                target: "api",
                method = %self.method, path = %self.path,
                event, delivery = id, status = status_code, %duration_ms,
                "Delivery handled"
            );
        }
    }
}

/// Middleware logging every request with its delivery metadata.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let delivery = Delivery::from_request(&req);
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            delivery.log(res.status(), start.elapsed());
            Ok(res)
        })
    }
}
