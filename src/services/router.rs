//! Dispatch of authenticated webhook events to their handlers.
//!
//! The router is the error boundary of the event path: whatever a handler
//! does, including panicking, the caller gets an [`ActionResult`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{info, warn};

use crate::error::HandlerResult;
use crate::models::{ActionResult, InboundEvent, Platform, PolicySet, RepoPolicy};
use crate::platform::{SourcePlatform, TargetPlatform};
use crate::services::ci_failure::CIFailureReporter;
use crate::services::merge_gate::MergeGate;
use crate::services::mirror::{CrossRepoMirror, GitTransport, MirrorRemotes};
use crate::services::pipeline_button::PipelineButton;
use crate::services::pipeline_supervisor::PipelineSupervisor;
use crate::services::scheduler::Scheduler;
use crate::services::template::CommentTemplate;

/// Everything the handlers are built from.
pub struct RouterContext {
    pub policies: Arc<PolicySet>,
    /// Client acting as the bot; merges and comments are made by it.
    pub source: Arc<dyn SourcePlatform>,
    pub target: Arc<dyn TargetPlatform>,
    pub transport: Arc<dyn GitTransport>,
    pub scheduler: Arc<dyn Scheduler>,
    pub template: Arc<CommentTemplate>,
    pub remotes: MirrorRemotes,
}

/// Routes each event to exactly one handler.
pub struct EventRouter {
    policies: Arc<PolicySet>,
    mirror: CrossRepoMirror,
    merge_gate: MergeGate,
    supervisor: PipelineSupervisor,
    ci_failure: CIFailureReporter,
    button: PipelineButton,
}

impl EventRouter {
    pub fn new(ctx: RouterContext) -> Self {
        Self {
            mirror: CrossRepoMirror::new(ctx.transport, ctx.target.clone(), ctx.remotes),
            merge_gate: MergeGate::new(ctx.source.clone(), ctx.scheduler),
            supervisor: PipelineSupervisor::new(ctx.target.clone()),
            ci_failure: CIFailureReporter::new(ctx.source, ctx.target.clone(), ctx.template),
            button: PipelineButton::new(ctx.policies.clone(), ctx.target),
            policies: ctx.policies,
        }
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Handle one event. Never fails.
    pub async fn route(&self, event: InboundEvent) -> ActionResult {
        let platform = event.platform();
        let kind = event.kind().to_string();
        let repo = event.repo_path().unwrap_or("-").to_string();

        let result = guarded(self.dispatch(event)).await;
        info!(
            platform = %platform,
            event = %kind,
            repo = %repo,
            status = ?result.status(),
            note = result.note().unwrap_or(""),
            "Handled event"
        );
        result
    }

    /// Whether the pipeline delete button is enabled for a target repository.
    pub fn pipeline_button_enabled(&self, repo_path: &str) -> ActionResult {
        self.button.is_enabled(repo_path)
    }

    pub async fn delete_pipeline(&self, repo_path: &str, pipeline_id: u64) -> ActionResult {
        guarded(self.button.delete(repo_path, pipeline_id)).await
    }

    fn policy_for(&self, platform: Platform, path: &str) -> Option<Arc<RepoPolicy>> {
        match platform {
            Platform::Source => self.policies.by_source(path),
            Platform::Target => self.policies.by_target(path),
        }
    }

    async fn dispatch(&self, event: InboundEvent) -> HandlerResult<ActionResult> {
        let policy = match event.repo_path() {
            Some(path) => match self.policy_for(event.platform(), path) {
                Some(policy) => Some(policy),
                None => {
                    return Ok(ActionResult::ignore_because(format!(
                        "repository {path} not configured"
                    )));
                }
            },
            None => None,
        };

        match (event, policy) {
            (InboundEvent::Ping(ping), Some(_)) => {
                info!(repo = %ping.repository.full_name, "Webhook {:?} is live", ping.hook_id);
                Ok(ActionResult::ok())
            }
            (InboundEvent::Status(status), Some(policy)) => match status.state.as_str() {
                "success" => {
                    self.merge_gate
                        .on_ci_success(policy, &status.commit.sha)
                        .await
                }
                "failure" | "error" => self.ci_failure.on_ci_failure(&policy, &status).await,
                "pending" => Ok(ActionResult::ignore_because("pipeline running")),
                other => Ok(ActionResult::ignore_because(format!(
                    "status '{other}' not handled"
                ))),
            },
            (InboundEvent::PullRequest(pr), Some(policy)) => {
                self.mirror.on_pull_request(&policy, &pr).await
            }
            (InboundEvent::Delete(deleted), Some(policy)) => {
                self.mirror.on_branch_deleted(&policy, &deleted).await
            }
            (InboundEvent::Pipeline(pipeline), Some(policy)) => {
                self.supervisor.on_pipeline(&policy, &pipeline).await
            }
            (event, _) => Ok(ActionResult::ignore_because(format!(
                "{} event '{}' not handled",
                event.platform(),
                event.kind()
            ))),
        }
    }
}

/// Await a handler, turning errors and panics into [`ActionResult::Error`].
async fn guarded<F>(handler: F) -> ActionResult
where
    F: Future<Output = HandlerResult<ActionResult>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            warn!("Handler failed: {}", err);
            ActionResult::error(err.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!("Handler panicked: {}", message);
            ActionResult::error(format!("handler panicked: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
