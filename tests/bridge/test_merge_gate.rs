//! Automatic merges on CI success.

use std::time::Duration;

use serde_json::json;

use forge_bridge::models::{ActionStatus, InboundEvent};

use super::test_helpers::*;

fn auto_merge(options: serde_json::Value) -> serde_json::Value {
    repo(json!({ "gh_auto_merge_pr": options }))
}

fn success(sha: &str) -> InboundEvent {
    source_event(
        "status",
        status_payload(sha, "success", Some("https://gitlab.com/acme-ci/widgets/-/pipelines/5")),
    )
}

#[actix_rt::test]
async fn test_immediate_merge() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 0 }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

    let result = harness.router.route(success("S1")).await;

    assert_eq!(result.status(), ActionStatus::Ok);
    assert_eq!(harness.bot.with(|s| s.merged.clone()), vec![42]);
    assert!(harness.scheduler.pending().is_empty());
}

#[actix_rt::test]
async fn test_missing_label_skips_merge() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 0 }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["bug"])));

    let result = harness.router.route(success("S1")).await;

    assert_eq!(result.status(), ActionStatus::Ignore);
    assert_eq!(result.note(), Some("PR#42 has no 'auto-merge' label"));
    assert!(harness.bot.with(|s| s.merged.is_empty()));
}

#[actix_rt::test]
async fn test_author_not_allowed_skips_merge() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 0 }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", "mallory", GH_REPO, &["auto-merge"])));

    let result = harness.router.route(success("S1")).await;

    assert_eq!(result.status(), ActionStatus::Ignore);
    assert!(result.note().unwrap().contains("mallory"));
    assert!(harness.bot.with(|s| s.merged.is_empty()));
}

#[actix_rt::test]
async fn test_allow_listed_author_is_merged() {
    let harness = Harness::new(vec![auto_merge(
        json!({ "delay": 0, "authors_white_list": ["alice"] }),
    )]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(8, "S1", "alice", GH_REPO, &["auto-merge"])));

    let result = harness.router.route(success("S1")).await;

    assert_eq!(result.status(), ActionStatus::Ok);
    assert_eq!(harness.bot.with(|s| s.merged.clone()), vec![8]);
}

#[actix_rt::test]
async fn test_unknown_commit_skips_merge() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 0 }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

    let result = harness.router.route(success("OTHER")).await;

    assert_eq!(result.status(), ActionStatus::Ignore);
    assert_eq!(result.note(), Some("no open pull request with head OTHER"));
}

/// Default delay → merge deferred by 60s, then performed when the timer fires.
#[actix_rt::test]
async fn test_deferred_merge() {
    let harness = Harness::new(vec![auto_merge(json!(true))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

    let result = harness.router.route(success("S1")).await;

    assert_eq!(result.status(), ActionStatus::Ok);
    assert_eq!(result.value(), Some(&json!({ "scheduled_in_secs": 60 })));
    assert_eq!(harness.scheduler.pending(), vec![Duration::from_secs(60)]);
    assert!(harness.bot.with(|s| s.merged.is_empty()));

    harness.scheduler.fire_all().await;

    assert_eq!(harness.bot.with(|s| s.merged.clone()), vec![42]);
}

/// Guards are re-run when the timer fires.
#[actix_rt::test]
async fn test_deferred_merge_revalidates_label() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 30 }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

    harness.router.route(success("S1")).await;
    harness.bot.with(|s| s.pulls[0].labels.clear());
    harness.scheduler.fire_all().await;

    assert!(harness.bot.with(|s| s.merged.is_empty()));
}

#[actix_rt::test]
async fn test_deferred_merge_skips_moved_head() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 30 }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

    harness.router.route(success("S1")).await;
    harness.bot.with(|s| s.pulls[0].head_sha = "S2".to_string());
    harness.scheduler.fire_all().await;

    assert!(harness.bot.with(|s| s.merged.is_empty()));
}

/// The pull request was closed before the timer fired.
#[actix_rt::test]
async fn test_deferred_merge_skips_closed_pull() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 30 }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

    harness.router.route(success("S1")).await;
    harness.bot.with(|s| s.pulls[0].open = false);
    harness.scheduler.fire_all().await;

    assert!(harness.bot.with(|s| s.merged.is_empty()));
}

#[actix_rt::test]
async fn test_deferred_merge_skips_pull_that_became_unmergeable() {
    for mergeable in [Some(false), None] {
        let harness = Harness::new(vec![auto_merge(json!({ "delay": 30 }))]);
        harness
            .bot
            .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

        let result = harness.router.route(success("S1")).await;
        assert_eq!(result.status(), ActionStatus::Ok);
        harness.bot.with(|s| s.pulls[0].mergeable = mergeable);
        harness.scheduler.fire_all().await;

        assert!(
            harness.bot.with(|s| s.merged.is_empty()),
            "merged with mergeable = {mergeable:?}"
        );
    }
}

#[actix_rt::test]
async fn test_rejected_merge_is_an_error() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 0 }))]);
    harness.bot.with(|s| {
        s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"]));
        s.merge_rejection = Some("Required status check \"lint\" is failing".to_string());
    });

    let result = harness.router.route(success("S1")).await;

    assert_eq!(result.status(), ActionStatus::Error);
    let note = result.note().unwrap();
    assert!(note.contains("PR#42 failed to merge"), "{note}");
    assert!(note.contains("is failing"), "{note}");
}

#[actix_rt::test]
async fn test_pending_status_is_ignored() {
    let harness = Harness::new(vec![auto_merge(json!({ "delay": 0 }))]);

    let result = harness
        .router
        .route(source_event("status", status_payload("S1", "pending", None)))
        .await;

    assert_eq!(result.status(), ActionStatus::Ignore);
    assert_eq!(result.note(), Some("pipeline running"));
}

#[actix_rt::test]
async fn test_auto_merge_disabled() {
    let harness = Harness::new(vec![repo(json!({ "gl_auto_cancel_pipelines": true }))]);
    harness
        .bot
        .with(|s| s.pulls.push(pull(42, "S1", OWNER, GH_REPO, &["auto-merge"])));

    let result = harness.router.route(success("S1")).await;

    assert_eq!(result.status(), ActionStatus::Ignore);
    assert_eq!(result.note(), Some("auto-merge disabled"));
    assert!(harness.bot.with(|s| s.merged.is_empty()));
}

/// External PR mirrored, its pipeline passes, the PR is merged after the delay.
#[actix_rt::test]
async fn test_external_pull_request_end_to_end() {
    let harness = Harness::new(vec![repo(json!({
        "gh_gitlab_ci_for_external_pr": true,
        "gh_auto_merge_pr": { "authors_white_list": ["alice"] }
    }))]);
    let pr = pull(42, "S1", "alice", "alice/widgets", &["auto-merge"]);
    harness.bot.with(|s| s.pulls.push(pr.clone()));

    let mirrored = harness
        .router
        .route(source_event("pull_request", pull_request_payload("opened", &pr)))
        .await;
    assert_eq!(mirrored.status(), ActionStatus::Ok);
    assert!(harness.gitlab.has_branch("pr-42"));

    let scheduled = harness.router.route(success("S1")).await;
    assert_eq!(scheduled.status(), ActionStatus::Ok);

    harness.scheduler.fire_all().await;
    assert_eq!(harness.bot.with(|s| s.merged.clone()), vec![42]);
}
