//! Pipeline delete button API used from the GitLab UI.

use actix_web::{HttpResponse, delete, get, web};
use serde::Deserialize;

use super::webhooks::respond;
use crate::auth::GitlabTokenAuth;
use crate::services::EventRouter;

#[derive(Debug, Deserialize)]
pub struct EnabledQuery {
    pub repo_path: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub repo_path: String,
    pub pipeline_id: u64,
}

/// Whether the button is enabled for a GitLab repository.
#[get("/gitlab_button")]
pub async fn button_enabled(
    _auth: GitlabTokenAuth,
    query: web::Query<EnabledQuery>,
    router: web::Data<EventRouter>,
) -> HttpResponse {
    respond(&router.pipeline_button_enabled(&query.repo_path))
}

/// Delete a pipeline.
#[delete("/gitlab_button")]
pub async fn delete_pipeline(
    _auth: GitlabTokenAuth,
    query: web::Query<DeleteQuery>,
    router: web::Data<EventRouter>,
) -> HttpResponse {
    respond(&router.delete_pipeline(&query.repo_path, query.pipeline_id).await)
}

/// Configure pipeline button routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(button_enabled).service(delete_pipeline);
}
