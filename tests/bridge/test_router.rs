//! Event routing and the pipeline button backend.

use serde_json::json;

use forge_bridge::models::{ActionResult, ActionStatus, PipelineStatus};

use super::test_helpers::*;

fn all_features() -> Vec<serde_json::Value> {
    vec![repo(json!({
        "gh_auto_merge_pr": { "delay": 0 },
        "gh_show_gitlab_ci_fail": true,
        "gl_auto_cancel_pipelines": true,
        "gl_delete_pipeline_btn": true
    }))]
}

#[actix_rt::test]
async fn test_unhandled_event_kind() {
    let harness = Harness::new(all_features());

    let result = harness
        .router
        .route(source_event("issues", json!({ "action": "opened" })))
        .await;

    assert_eq!(result, ActionResult::ignore_because("GH event 'issues' not handled"));
}

#[actix_rt::test]
async fn test_unconfigured_repository() {
    let harness = Harness::new(all_features());
    let mut payload = status_payload("S1", "success", None);
    payload["repository"]["full_name"] = json!("someone/else");

    let result = harness.router.route(source_event("status", payload)).await;

    assert_eq!(
        result,
        ActionResult::ignore_because("repository someone/else not configured")
    );
}

/// Repository paths are matched without regard to case.
#[actix_rt::test]
async fn test_repository_lookup_ignores_case() {
    let harness = Harness::new(all_features());
    let mut payload = status_payload("S1", "pending", None);
    payload["repository"]["full_name"] = json!("ACME/Widgets");

    let result = harness.router.route(source_event("status", payload)).await;

    assert_eq!(result, ActionResult::ignore_because("pipeline running"));
}

#[actix_rt::test]
async fn test_ping_is_acknowledged() {
    let harness = Harness::new(all_features());

    let result = harness
        .router
        .route(source_event(
            "ping",
            json!({
                "hook_id": 12,
                "zen": "Keep it logically awesome.",
                "repository": { "full_name": GH_REPO }
            }),
        ))
        .await;

    assert_eq!(result, ActionResult::ok());
}

#[actix_rt::test]
async fn test_unexpected_status_state() {
    let harness = Harness::new(all_features());

    let result = harness
        .router
        .route(source_event("status", status_payload("S1", "queued", None)))
        .await;

    assert_eq!(result.status(), ActionStatus::Ignore);
    assert_eq!(result.note(), Some("status 'queued' not handled"));
}

/// Platform failures surface as ERROR results, never as panics or `Err`.
#[actix_rt::test]
async fn test_platform_failure_becomes_error_result() {
    let harness = Harness::new(all_features());
    harness.bot.with(|s| s.outage = true);

    let result = harness
        .router
        .route(source_event("status", status_payload("S1", "success", None)))
        .await;

    assert_eq!(result.status(), ActionStatus::Error);
    assert!(result.note().unwrap().contains("status 502"));
}

#[actix_rt::test]
async fn test_pipeline_event_from_wrong_platform_header() {
    let harness = Harness::new(all_features());

    let result = harness
        .router
        .route(source_event("Pipeline Hook", json!({})))
        .await;

    assert_eq!(result.status(), ActionStatus::Ignore);
}

#[actix_rt::test]
async fn test_pipeline_button_enabled() {
    let harness = Harness::new(vec![
        repo(json!({ "gl_delete_pipeline_btn": true })),
        json!({
            "gh_repo_path": "acme/other",
            "gl_repo_path": "acme-ci/other",
            "gl_auto_cancel_pipelines": true
        }),
    ]);

    assert_eq!(
        harness.router.pipeline_button_enabled(GL_REPO),
        ActionResult::ok_with(true)
    );
    assert_eq!(
        harness.router.pipeline_button_enabled("acme-ci/other"),
        ActionResult::ok_with(false)
    );
    assert_eq!(
        harness.router.pipeline_button_enabled("unknown/repo"),
        ActionResult::ok_with(false)
    );
}

#[actix_rt::test]
async fn test_pipeline_button_deletes_pipeline() {
    let harness = Harness::new(all_features());
    harness
        .gitlab
        .with(|s| s.pipelines.push(pipeline(31, "feature", PipelineStatus::Failed)));

    let first = harness.router.delete_pipeline(GL_REPO, 31).await;
    let second = harness.router.delete_pipeline(GL_REPO, 31).await;

    assert_eq!(first, ActionResult::ok());
    assert_eq!(harness.gitlab.with(|s| s.deleted_pipelines.clone()), vec![31]);
    assert_eq!(second, ActionResult::ignore_because("pipeline 31 not found"));
}

#[actix_rt::test]
async fn test_pipeline_button_disabled() {
    let harness = Harness::new(vec![repo(json!({ "gl_auto_cancel_pipelines": true }))]);
    harness
        .gitlab
        .with(|s| s.pipelines.push(pipeline(31, "feature", PipelineStatus::Failed)));

    let result = harness.router.delete_pipeline(GL_REPO, 31).await;

    assert_eq!(result.status(), ActionStatus::Ignore);
    assert!(harness.gitlab.with(|s| s.deleted_pipelines.is_empty()));
}
