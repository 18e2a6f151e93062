//! Transient views of remote platform objects.
//!
//! Nothing here is cached: every handler fetches these fresh from the platform
//! that owns them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Pull request on the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub number: u64,
    pub head_sha: String,
    pub author: String,
    pub open: bool,
    /// `None` while the platform is still computing mergeability.
    pub mergeable: Option<bool>,
    pub labels: Vec<String>,
    /// Repository the head branch lives in. `None` when the fork was deleted.
    pub origin_repo: Option<String>,
}

impl PullRequestRef {
    /// Whether the head branch lives outside `canonical_repo`.
    pub fn is_external(&self, canonical_repo: &str) -> bool {
        match &self.origin_repo {
            Some(origin) => !origin.eq_ignore_ascii_case(canonical_repo),
            None => true,
        }
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }

    pub fn is_mergeable(&self) -> bool {
        self.mergeable == Some(true)
    }
}

/// Lifecycle status of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    #[serde(other)]
    Other,
}

impl PipelineStatus {
    /// Still consuming CI capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Pending)
    }

    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::WaitingForResource => "waiting_for_resource",
            Self::Preparing => "preparing",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Other => "other",
        }
    }
}

/// Pipeline on the target platform. Ids grow monotonically, so a larger id is a
/// more recent pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRef {
    pub id: u64,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub status: PipelineStatus,
    /// What triggered the pipeline (`push`, `web`, `schedule`, ...).
    #[serde(default)]
    pub source: Option<String>,
}

/// Branch on the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BranchRef {
    pub name: String,
    #[serde(default)]
    pub protected: bool,
}

/// CI job on the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRef {
    pub id: u64,
    pub name: String,
    pub stage: String,
    pub web_url: String,
}

/// Desired configuration of the source-platform webhook. The shared secret is
/// write-only on the platform and therefore not part of the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHookSpec {
    pub url: String,
    pub events: BTreeSet<String>,
    pub active: bool,
}

/// Webhook registered on the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHook {
    pub id: u64,
    pub spec: SourceHookSpec,
}

/// Event switches of a target-platform webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHookEvents {
    #[serde(default)]
    pub push_events: bool,
    #[serde(default)]
    pub issues_events: bool,
    #[serde(default)]
    pub confidential_issues_events: bool,
    #[serde(default)]
    pub merge_requests_events: bool,
    #[serde(default)]
    pub tag_push_events: bool,
    #[serde(default)]
    pub note_events: bool,
    #[serde(default)]
    pub job_events: bool,
    #[serde(default)]
    pub pipeline_events: bool,
    #[serde(default)]
    pub wiki_page_events: bool,
}

impl TargetHookEvents {
    /// Only pipeline events.
    pub fn pipelines_only() -> Self {
        Self {
            pipeline_events: true,
            ..Self::default()
        }
    }
}

/// Desired configuration of the target-platform webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHookSpec {
    pub url: String,
    pub events: TargetHookEvents,
}

/// Webhook registered on the target platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHook {
    pub id: u64,
    pub spec: TargetHookSpec,
}

/// Pending repository invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub id: u64,
    pub repo: String,
    pub invitee: String,
}

/// Result of a merge request to the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// The platform refused, with its explanation.
    Rejected(String),
}

/// Result of a delete call. A missing target is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    NotFound,
}
