//! Inbound webhook events, already authenticated.
//!
//! Only the payload fields the handlers consume are modeled; everything else in
//! the platform JSON is ignored.

use serde::Deserialize;
use serde_json::Value;

use super::remote::{PipelineStatus, PullRequestRef};

/// Platform an event was delivered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Hosts the pull requests (GitHub).
    Source,
    /// Runs the CI pipelines (GitLab).
    Target,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "GH"),
            Self::Target => write!(f, "GL"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRepository {
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingEvent {
    pub hook_id: Option<u64>,
    pub repository: SourceRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// Commit status change (`status` event).
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEvent {
    pub commit: CommitRef,
    pub state: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    pub repository: SourceRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadRef {
    pub sha: String,
    #[serde(default)]
    pub repo: Option<SourceRepository>,
}

/// Pull request object as delivered by the source platform (webhooks and REST).
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
    pub state: String,
    #[serde(default)]
    pub mergeable: Option<bool>,
    pub user: UserRef,
    pub head: HeadRef,
    #[serde(default)]
    pub labels: Vec<LabelRef>,
}

impl PullRequestPayload {
    pub fn to_ref(&self) -> PullRequestRef {
        PullRequestRef {
            number: self.number,
            head_sha: self.head.sha.clone(),
            author: self.user.login.clone(),
            open: self.state == "open",
            mergeable: self.mergeable,
            labels: self.labels.iter().map(|l| l.name.clone()).collect(),
            origin_repo: self.head.repo.as_ref().map(|r| r.full_name.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequestPayload,
    pub repository: SourceRepository,
}

/// Branch or tag deleted on the source platform.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub ref_type: String,
    pub repository: SourceRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetProject {
    pub path_with_namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineAttributes {
    pub id: u64,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub tag: bool,
    pub status: PipelineStatus,
    #[serde(default)]
    pub source: Option<String>,
}

impl PipelineAttributes {
    /// Launched by hand from the platform UI.
    pub fn is_manual(&self) -> bool {
        self.source.as_deref() == Some("web")
    }
}

/// Pipeline status change on the target platform (`Pipeline Hook`).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineEvent {
    pub object_attributes: PipelineAttributes,
    pub project: TargetProject,
}

/// Every event the bridge understands, keyed by platform and event type.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Ping(PingEvent),
    Status(StatusEvent),
    PullRequest(PullRequestEvent),
    Delete(DeleteEvent),
    Pipeline(PipelineEvent),
    Unhandled { platform: Platform, kind: String },
}

impl InboundEvent {
    /// Decode `payload` according to the platform and its event-type header.
    pub fn parse(platform: Platform, kind: &str, payload: Value) -> Result<Self, serde_json::Error> {
        let event = match (platform, kind) {
            (Platform::Source, "ping") => Self::Ping(serde_json::from_value(payload)?),
            (Platform::Source, "status") => Self::Status(serde_json::from_value(payload)?),
            (Platform::Source, "pull_request") => {
                Self::PullRequest(serde_json::from_value(payload)?)
            }
            (Platform::Source, "delete") => Self::Delete(serde_json::from_value(payload)?),
            (Platform::Target, "Pipeline Hook") => Self::Pipeline(serde_json::from_value(payload)?),
            _ => Self::Unhandled {
                platform,
                kind: kind.to_string(),
            },
        };
        Ok(event)
    }

    pub fn platform(&self) -> Platform {
        match self {
            Self::Ping(_) | Self::Status(_) | Self::PullRequest(_) | Self::Delete(_) => {
                Platform::Source
            }
            Self::Pipeline(_) => Platform::Target,
            Self::Unhandled { platform, .. } => *platform,
        }
    }

    /// Event type as named by the delivering platform.
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping(_) => "ping",
            Self::Status(_) => "status",
            Self::PullRequest(_) => "pull_request",
            Self::Delete(_) => "delete",
            Self::Pipeline(_) => "Pipeline Hook",
            Self::Unhandled { kind, .. } => kind,
        }
    }

    /// Repository path on the delivering platform.
    pub fn repo_path(&self) -> Option<&str> {
        match self {
            Self::Ping(e) => Some(&e.repository.full_name),
            Self::Status(e) => Some(&e.repository.full_name),
            Self::PullRequest(e) => Some(&e.repository.full_name),
            Self::Delete(e) => Some(&e.repository.full_name),
            Self::Pipeline(e) => Some(&e.project.path_with_namespace),
            Self::Unhandled { .. } => None,
        }
    }
}
