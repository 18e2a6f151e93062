//! Shared test helpers for the bridge test suite.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{Value, json};

use forge_bridge::models::policy::RepoOptions;
use forge_bridge::models::{
    BranchRef, InboundEvent, Platform, PipelineRef, PipelineStatus, PolicySet, PullRequestRef,
    RepoPolicy,
};
use forge_bridge::services::{
    CommentTemplate, EventRouter, MirrorRemotes, ReconcileSettings, RemoteResourceReconciler,
    RouterContext,
};

use super::fakes::{FakeGitHub, FakeGitLab, FakeTransport, ManualScheduler};

pub const OWNER: &str = "acme-owner";
pub const BOT: &str = "bridge-bot";
pub const GH_REPO: &str = "acme/widgets";
pub const GL_REPO: &str = "acme-ci/widgets";
pub const BASE_URL: &str = "https://bridge.example.com";

/// Repository options with both paths filled in and `extra` merged on top.
pub fn repo(extra: Value) -> Value {
    let mut options = json!({ "gh_repo_path": GH_REPO, "gl_repo_path": GL_REPO });
    if let (Some(base), Some(extra)) = (options.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    options
}

pub fn policy(options: Value) -> RepoPolicy {
    let options: RepoOptions = serde_json::from_value(options).expect("valid repo options");
    RepoPolicy::new(options, OWNER, BOT).expect("valid policy")
}

pub fn pull(number: u64, sha: &str, author: &str, origin: &str, labels: &[&str]) -> PullRequestRef {
    PullRequestRef {
        number,
        head_sha: sha.to_string(),
        author: author.to_string(),
        open: true,
        mergeable: Some(true),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        origin_repo: Some(origin.to_string()),
    }
}

pub fn pipeline(id: u64, git_ref: &str, status: PipelineStatus) -> PipelineRef {
    PipelineRef {
        id,
        git_ref: git_ref.to_string(),
        status,
        source: Some("push".to_string()),
    }
}

pub fn branch(name: &str, protected: bool) -> BranchRef {
    BranchRef {
        name: name.to_string(),
        protected,
    }
}

pub fn source_event(kind: &str, payload: Value) -> InboundEvent {
    InboundEvent::parse(Platform::Source, kind, payload).expect("valid source payload")
}

pub fn target_event(kind: &str, payload: Value) -> InboundEvent {
    InboundEvent::parse(Platform::Target, kind, payload).expect("valid target payload")
}

pub fn status_payload(sha: &str, state: &str, target_url: Option<&str>) -> Value {
    json!({
        "commit": { "sha": sha },
        "state": state,
        "description": null,
        "target_url": target_url,
        "repository": { "full_name": GH_REPO }
    })
}

pub fn pull_request_payload(action: &str, pr: &PullRequestRef) -> Value {
    json!({
        "action": action,
        "number": pr.number,
        "pull_request": {
            "number": pr.number,
            "state": if pr.open { "open" } else { "closed" },
            "mergeable": pr.mergeable,
            "user": { "login": pr.author },
            "head": {
                "sha": pr.head_sha,
                "repo": pr.origin_repo.as_ref().map(|name| json!({ "full_name": name }))
            },
            "labels": pr.labels.iter().map(|name| json!({ "name": name })).collect::<Vec<_>>()
        },
        "repository": { "full_name": GH_REPO }
    })
}

pub fn pipeline_payload(id: u64, git_ref: &str, tag: bool, status: &str, source: &str) -> Value {
    json!({
        "object_kind": "pipeline",
        "object_attributes": {
            "id": id,
            "ref": git_ref,
            "tag": tag,
            "status": status,
            "source": source
        },
        "project": { "path_with_namespace": GL_REPO }
    })
}

/// Router wired to fakes.
pub struct Harness {
    pub bot: FakeGitHub,
    pub gitlab: FakeGitLab,
    pub transport: Arc<FakeTransport>,
    pub scheduler: Arc<ManualScheduler>,
    pub router: EventRouter,
}

impl Harness {
    pub fn new(options: Vec<Value>) -> Self {
        Self::with_template(options, CommentTemplate::default())
    }

    pub fn with_template(options: Vec<Value>, template: CommentTemplate) -> Self {
        let policies = PolicySet::new(options.into_iter().map(policy).collect())
            .expect("unique repositories");
        let bot = FakeGitHub::new(BOT);
        let gitlab = FakeGitLab::default();
        let transport = Arc::new(FakeTransport::new(gitlab.clone()));
        let scheduler = Arc::new(ManualScheduler::default());

        let router = EventRouter::new(RouterContext {
            policies: Arc::new(policies),
            source: Arc::new(bot.clone()),
            target: Arc::new(gitlab.clone()),
            transport: transport.clone(),
            scheduler: scheduler.clone(),
            template: Arc::new(template),
            remotes: MirrorRemotes {
                source_base: "https://github.com".to_string(),
                source_token: SecretString::from("gh-token"),
                target_base: "https://gitlab.com".to_string(),
                target_token: SecretString::from("gl-token"),
            },
        });

        Self {
            bot,
            gitlab,
            transport,
            scheduler,
            router,
        }
    }
}

/// Reconciler wired to fakes. `owner` and `bot` share one GitHub state.
pub fn reconciler(owner: &FakeGitHub, gitlab: &FakeGitLab) -> RemoteResourceReconciler {
    RemoteResourceReconciler::new(
        Arc::new(owner.clone()),
        Arc::new(owner.as_user(BOT)),
        Arc::new(gitlab.clone()),
        ReconcileSettings {
            base_url: BASE_URL.to_string(),
            source_secret: SecretString::from("gh-secret"),
            target_secret: SecretString::from("gl-secret"),
            owner_login: OWNER.to_string(),
            bot_login: BOT.to_string(),
        },
    )
}
