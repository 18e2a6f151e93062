//! Failed CI jobs reported back to the pull request as a comment.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use url::Url;

use crate::error::HandlerResult;
use crate::models::events::StatusEvent;
use crate::models::{ActionResult, RepoPolicy};
use crate::platform::{SourcePlatform, TargetPlatform};
use crate::services::ci_log::summarize_log;
use crate::services::template::{CommentTemplate, FailureDetails};

/// Status description the target platform sets when a pipeline is cancelled.
pub const CANCELLED_DESCRIPTION: &str = "Pipeline canceled on GitLab";

/// Whether a failure status only reflects a cancelled pipeline.
pub fn is_cancellation(event: &StatusEvent) -> bool {
    event.state == "error" && event.description.as_deref() == Some(CANCELLED_DESCRIPTION)
}

/// Pipeline id from a status link such as `https://gitlab.com/g/p/-/pipelines/123`.
pub fn pipeline_id_from_url(target_url: &str) -> Option<u64> {
    let url = Url::parse(target_url).ok()?;
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())?
        .parse()
        .ok()
}

/// Posts the log tail of the first failed job as a pull request comment.
pub struct CIFailureReporter {
    source: Arc<dyn SourcePlatform>,
    target: Arc<dyn TargetPlatform>,
    template: Arc<CommentTemplate>,
}

impl CIFailureReporter {
    pub fn new(
        source: Arc<dyn SourcePlatform>,
        target: Arc<dyn TargetPlatform>,
        template: Arc<CommentTemplate>,
    ) -> Self {
        Self {
            source,
            target,
            template,
        }
    }

    pub async fn on_ci_failure(
        &self,
        policy: &RepoPolicy,
        event: &StatusEvent,
    ) -> HandlerResult<ActionResult> {
        let Some(reporting) = policy.ci_failure else {
            return Ok(ActionResult::ignore_because("CI failure reports disabled"));
        };
        if is_cancellation(event) {
            return Ok(ActionResult::ignore_because("pipeline was canceled"));
        }

        let sha = &event.commit.sha;
        let Some(pr) = self.source.find_pull_by_head(&policy.source_path, sha).await? else {
            return Ok(ActionResult::ignore_because(format!(
                "commit {sha} is not the head of an open pull request"
            )));
        };

        let Some(pipeline_id) = event.target_url.as_deref().and_then(pipeline_id_from_url) else {
            return Ok(ActionResult::ignore_because("status does not link to a pipeline"));
        };

        let project = &policy.target_path;
        let failed = self.target.list_failed_jobs(project, pipeline_id).await?;
        let Some(job) = failed.into_iter().next() else {
            return Ok(ActionResult::ignore_because(format!(
                "pipeline {pipeline_id} has no failed job"
            )));
        };

        let trace = self.target.job_trace(project, job.id).await?;
        let log = summarize_log(&trace, reporting.max_lines);
        let body = self.template.render(&FailureDetails {
            stage: &job.stage,
            log: &log,
            job_url: &job.web_url,
        });

        self.source
            .create_comment(&policy.source_path, pr.number, &body)
            .await?;
        info!(
            repo = %policy.source_path,
            pr = pr.number,
            pipeline = pipeline_id,
            "Reported failed job {} ({})",
            job.name,
            job.stage
        );
        Ok(ActionResult::ok_with(json!({ "pr": pr.number, "job": job.id })))
    }
}
