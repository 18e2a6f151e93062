//! Automatic merge of pull requests once CI succeeds.
//!
//! A success status for a commit moves the pull request whose head is that
//! commit through a fixed list of guards. The first guard that fails ends the
//! attempt with `IGNORE`. When all pass, the merge happens immediately or
//! after the configured delay. A deferred merge runs the guards again against
//! fresh remote state before merging, because nothing holds the pull request
//! still in between.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info};

use crate::error::{HandlerError, HandlerResult};
use crate::models::{ActionResult, AutoMergePolicy, MergeOutcome, PullRequestRef, RepoPolicy};
use crate::platform::SourcePlatform;
use crate::services::scheduler::Scheduler;

/// Result of running the guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ready(PullRequestRef),
    Skip(String),
}

/// Guards 3 to 5 against an already-resolved pull request.
pub fn check_pull(merge: &AutoMergePolicy, pr: &PullRequestRef) -> Result<(), String> {
    if !pr.open {
        return Err(format!("PR#{} is closed", pr.number));
    }
    if !pr.is_mergeable() {
        return Err(format!("PR#{} is not mergeable", pr.number));
    }
    if !merge.allows_author(&pr.author) {
        return Err(format!(
            "PR#{} author '{}' is not allowed to auto-merge",
            pr.number, pr.author
        ));
    }
    if !pr.has_label(&merge.label.name) {
        return Err(format!(
            "PR#{} has no '{}' label",
            pr.number, merge.label.name
        ));
    }
    Ok(())
}

/// Merges pull requests whose CI passed.
#[derive(Clone)]
pub struct MergeGate {
    source: Arc<dyn SourcePlatform>,
    scheduler: Arc<dyn Scheduler>,
}

impl MergeGate {
    pub fn new(source: Arc<dyn SourcePlatform>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { source, scheduler }
    }

    /// Handle a CI success for `sha`.
    pub async fn on_ci_success(
        &self,
        policy: Arc<RepoPolicy>,
        sha: &str,
    ) -> HandlerResult<ActionResult> {
        let Some(merge) = &policy.auto_merge else {
            return Ok(ActionResult::ignore_because("auto-merge disabled"));
        };

        let pr = match self.evaluate(&policy.source_path, merge, sha).await? {
            Verdict::Ready(pr) => pr,
            Verdict::Skip(note) => return Ok(ActionResult::ignore_because(note)),
        };

        if merge.delay.is_zero() {
            return self.merge(&policy.source_path, &pr).await;
        }

        let delay = merge.delay;
        let gate = self.clone();
        let deferred_policy = policy.clone();
        let sha = sha.to_string();
        self.scheduler.schedule(
            delay,
            Box::pin(async move { gate.fire(deferred_policy, sha).await }),
        );
        info!(
            repo = %policy.source_path,
            pr = pr.number,
            "Merge scheduled in {}s",
            delay.as_secs()
        );
        Ok(ActionResult::ok_with(json!({ "scheduled_in_secs": delay.as_secs() })))
    }

    /// Resolve the pull request for `sha` and run every guard against it.
    pub async fn evaluate(
        &self,
        repo: &str,
        merge: &AutoMergePolicy,
        sha: &str,
    ) -> HandlerResult<Verdict> {
        let Some(pr) = self.source.find_pull_by_head(repo, sha).await? else {
            return Ok(Verdict::Skip(format!("no open pull request with head {sha}")));
        };
        if pr.head_sha != sha {
            return Ok(Verdict::Skip(format!(
                "PR#{} head moved past {sha}",
                pr.number
            )));
        }
        Ok(match check_pull(merge, &pr) {
            Ok(()) => Verdict::Ready(pr),
            Err(note) => Verdict::Skip(note),
        })
    }

    async fn merge(&self, repo: &str, pr: &PullRequestRef) -> HandlerResult<ActionResult> {
        match self.source.merge_pull(repo, pr.number, &pr.head_sha).await? {
            MergeOutcome::Merged => {
                info!(repo = %repo, pr = pr.number, "Merged pull request");
                Ok(ActionResult::ok())
            }
            MergeOutcome::Rejected(message) => Err(HandlerError::MergeRejected {
                repo: repo.to_string(),
                number: pr.number,
                message,
            }),
        }
    }

    /// Body of a deferred merge. Outcomes can only be logged from here.
    async fn fire(&self, policy: Arc<RepoPolicy>, sha: String) {
        let Some(merge) = &policy.auto_merge else {
            return;
        };
        let result = match self.evaluate(&policy.source_path, merge, &sha).await {
            Ok(Verdict::Ready(pr)) => self.merge(&policy.source_path, &pr).await,
            Ok(Verdict::Skip(note)) => Ok(ActionResult::ignore_because(note)),
            Err(err) => Err(err),
        };
        match result {
            Ok(ActionResult::Ignore(note)) => info!(
                repo = %policy.source_path,
                "Deferred merge of {} skipped: {}",
                sha,
                note.unwrap_or_default()
            ),
            Ok(_) => {}
            Err(err) => error!(
                repo = %policy.source_path,
                "Deferred merge of {} failed: {}",
                sha,
                err
            ),
        }
    }
}
