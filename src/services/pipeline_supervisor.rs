//! Cancellation of superseded pipelines.
//!
//! Every push to a branch starts a new pipeline. When one starts running,
//! older pipelines on the same branch that are still running or pending are
//! cancelled so that at most one active pipeline remains per branch.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::error::HandlerResult;
use crate::models::events::PipelineEvent;
use crate::models::{ActionResult, PipelineRef, PipelineStatus, RepoPolicy};
use crate::platform::TargetPlatform;

/// Ids to cancel among the pipelines of one ref: every active one but the newest.
pub fn superseded(mut pipelines: Vec<PipelineRef>) -> Vec<u64> {
    pipelines.retain(|p| p.status.is_active());
    pipelines.sort_by(|a, b| b.id.cmp(&a.id));
    pipelines.dedup_by_key(|p| p.id);
    pipelines.into_iter().skip(1).map(|p| p.id).collect()
}

/// Cancels redundant pipelines on the target platform.
pub struct PipelineSupervisor {
    target: Arc<dyn TargetPlatform>,
}

impl PipelineSupervisor {
    pub fn new(target: Arc<dyn TargetPlatform>) -> Self {
        Self { target }
    }

    pub async fn on_pipeline(
        &self,
        policy: &RepoPolicy,
        event: &PipelineEvent,
    ) -> HandlerResult<ActionResult> {
        let attrs = &event.object_attributes;
        if !policy.auto_cancel_pipelines {
            return Ok(ActionResult::ignore_because("auto-cancel disabled"));
        }
        if attrs.status != PipelineStatus::Running {
            return Ok(ActionResult::ignore_because(format!(
                "pipeline {} is {}",
                attrs.id,
                attrs.status.as_query()
            )));
        }
        if attrs.tag {
            return Ok(ActionResult::ignore_because(format!(
                "pipeline {} runs for tag {}",
                attrs.id, attrs.git_ref
            )));
        }
        if attrs.is_manual() {
            return Ok(ActionResult::ignore_because(format!(
                "pipeline {} was started manually",
                attrs.id
            )));
        }

        let project = &policy.target_path;
        let Some(branch) = self.target.get_branch(project, &attrs.git_ref).await? else {
            return Ok(ActionResult::ignore_because(format!(
                "branch {} not found",
                attrs.git_ref
            )));
        };
        if branch.protected {
            return Ok(ActionResult::ignore_because(format!(
                "branch {} is protected",
                branch.name
            )));
        }

        let mut active = self
            .target
            .list_pipelines(project, &attrs.git_ref, PipelineStatus::Running)
            .await?;
        active.extend(
            self.target
                .list_pipelines(project, &attrs.git_ref, PipelineStatus::Pending)
                .await?,
        );

        let cancelled = superseded(active);
        if cancelled.is_empty() {
            return Ok(ActionResult::ignore_because("no superseded pipelines"));
        }
        for id in &cancelled {
            self.target.cancel_pipeline(project, *id).await?;
            info!(repo = %project, pipeline = id, "Cancelled superseded pipeline on {}", attrs.git_ref);
        }
        Ok(ActionResult::ok_with(json!({ "cancelled": cancelled })))
    }
}
