//! Actix-web extractor for the GitLab shared token.

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};

use super::WebhookSecrets;
use crate::config::GITLAB_TOKEN_HEADER;
use crate::error::ErrorResponse;

/// Authentication error for extractors.
#[derive(Debug)]
pub struct AuthError {
    message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::UNAUTHORIZED).json(ErrorResponse {
            error: "UNAUTHORIZED".to_string(),
            message: self.message.clone(),
        })
    }
}

/// Extractor that requires a valid `X-Gitlab-Token` header.
///
/// ```ignore
/// async fn handler(_auth: GitlabTokenAuth) -> impl Responder { ... }
/// ```
pub struct GitlabTokenAuth;

impl FromRequest for GitlabTokenAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(secrets) = req.app_data::<web::Data<WebhookSecrets>>() else {
            return ready(Err(AuthError::new("Internal configuration error")));
        };

        let provided = req
            .headers()
            .get(GITLAB_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());

        if secrets.verify_gitlab(provided) {
            ready(Ok(GitlabTokenAuth))
        } else {
            ready(Err(AuthError::new(format!(
                "Missing or invalid {GITLAB_TOKEN_HEADER} header"
            ))))
        }
    }
}
