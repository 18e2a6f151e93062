//! Webhook endpoints of both platforms.

use actix_web::{HttpRequest, HttpResponse, post, web};
use tracing::debug;

use crate::auth::{GitlabTokenAuth, WebhookSecrets};
use crate::config::{GITHUB_EVENT_HEADER, GITHUB_SIGNATURE_HEADER, GITLAB_EVENT_HEADER};
use crate::error::{AppError, AppResult};
use crate::models::{ActionResult, InboundEvent, Platform};
use crate::services::EventRouter;

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Marshal a handler result. `ERROR` maps to 500, everything else to 200.
pub fn respond(result: &ActionResult) -> HttpResponse {
    if result.is_error() {
        HttpResponse::InternalServerError().json(result)
    } else {
        HttpResponse::Ok().json(result)
    }
}

async fn dispatch(
    router: &EventRouter,
    platform: Platform,
    kind: &str,
    body: &[u8],
) -> AppResult<HttpResponse> {
    let payload: serde_json::Value = serde_json::from_slice(body)?;
    let event = InboundEvent::parse(platform, kind, payload)?;
    debug!("Parsed {} event '{}'", platform, kind);
    Ok(respond(&router.route(event).await))
}

/// GitHub deliveries, authenticated by their HMAC signature.
#[post("/webhook/github")]
pub async fn github_webhook(
    req: HttpRequest,
    body: web::Bytes,
    secrets: web::Data<WebhookSecrets>,
    router: web::Data<EventRouter>,
) -> AppResult<HttpResponse> {
    if !secrets.verify_github(&body, header(&req, GITHUB_SIGNATURE_HEADER)) {
        return Err(AppError::Unauthorized(format!(
            "Missing or invalid {GITHUB_SIGNATURE_HEADER} header"
        )));
    }
    let kind = header(&req, GITHUB_EVENT_HEADER).ok_or_else(|| {
        AppError::InvalidInput(format!("Missing {GITHUB_EVENT_HEADER} header"))
    })?;
    dispatch(&router, Platform::Source, kind, &body).await
}

/// GitLab deliveries, authenticated by their shared token.
#[post("/webhook/gitlab")]
pub async fn gitlab_webhook(
    _auth: GitlabTokenAuth,
    req: HttpRequest,
    body: web::Bytes,
    router: web::Data<EventRouter>,
) -> AppResult<HttpResponse> {
    let kind = header(&req, GITLAB_EVENT_HEADER).ok_or_else(|| {
        AppError::InvalidInput(format!("Missing {GITLAB_EVENT_HEADER} header"))
    })?;
    dispatch(&router, Platform::Target, kind, &body).await
}

/// Configure webhook routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(github_webhook).service(gitlab_webhook);
}
