//! Remote platform seams.
//!
//! The handlers only talk to the platforms through these traits, so they can be
//! driven by the REST clients in production and by in-memory fakes in tests.
//! Lookups return `Option` and deletes return [`Deletion`]; a missing remote
//! object is never reported as an error.

pub mod github;
pub mod gitlab;
mod http;

use async_trait::async_trait;

use crate::models::{
    BranchRef, Deletion, Invitation, JobRef, LabelSpec, MergeOutcome, PipelineRef, PipelineStatus,
    PullRequestRef, SourceHook, SourceHookSpec, TargetHook, TargetHookSpec,
};

pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Errors talking to a remote platform.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The request never produced a response.
    #[error("{platform} api {operation} request failed: {source}")]
    Transport {
        platform: &'static str,
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered with a non-success status.
    #[error("{platform} api {operation} failed with status {status}: {body}")]
    Status {
        platform: &'static str,
        operation: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("failed to decode {platform} {operation}: {source}")]
    Decode {
        platform: &'static str,
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// The client could not be constructed.
    #[error("invalid {platform} client configuration: {message}")]
    Client {
        platform: &'static str,
        message: String,
    },
}

/// Convenience type alias for platform results.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform hosting the pull requests.
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    /// Login of the account behind the client's token.
    async fn current_login(&self) -> PlatformResult<String>;

    /// Open pull requests. Mergeability is not computed in listings.
    async fn list_open_pulls(&self, repo: &str) -> PlatformResult<Vec<PullRequestRef>>;

    /// Single pull request with fresh mergeability.
    async fn get_pull(&self, repo: &str, number: u64) -> PlatformResult<Option<PullRequestRef>>;

    /// Merge `number` provided its head is still `head_sha`.
    async fn merge_pull(
        &self,
        repo: &str,
        number: u64,
        head_sha: &str,
    ) -> PlatformResult<MergeOutcome>;

    async fn create_comment(&self, repo: &str, number: u64, body: &str) -> PlatformResult<()>;

    async fn list_hooks(&self, repo: &str) -> PlatformResult<Vec<SourceHook>>;

    async fn create_hook(
        &self,
        repo: &str,
        spec: &SourceHookSpec,
        secret: &str,
    ) -> PlatformResult<SourceHook>;

    async fn update_hook(
        &self,
        repo: &str,
        hook_id: u64,
        spec: &SourceHookSpec,
        secret: &str,
    ) -> PlatformResult<()>;

    async fn delete_hook(&self, repo: &str, hook_id: u64) -> PlatformResult<Deletion>;

    async fn get_label(&self, repo: &str, name: &str) -> PlatformResult<Option<LabelSpec>>;

    async fn create_label(&self, repo: &str, label: &LabelSpec) -> PlatformResult<()>;

    async fn update_label(&self, repo: &str, label: &LabelSpec) -> PlatformResult<()>;

    async fn is_collaborator(&self, repo: &str, login: &str) -> PlatformResult<bool>;

    /// Grant access. The platform may answer with a pending invitation.
    async fn add_collaborator(&self, repo: &str, login: &str) -> PlatformResult<()>;

    async fn remove_collaborator(&self, repo: &str, login: &str) -> PlatformResult<Deletion>;

    /// Invitations addressed to the account behind the client's token.
    async fn list_received_invitations(&self) -> PlatformResult<Vec<Invitation>>;

    async fn accept_invitation(&self, invitation_id: u64) -> PlatformResult<()>;

    /// Open pull request whose head is `sha`, with fresh mergeability.
    async fn find_pull_by_head(
        &self,
        repo: &str,
        sha: &str,
    ) -> PlatformResult<Option<PullRequestRef>> {
        let listed = self.list_open_pulls(repo).await?;
        match listed.into_iter().find(|pr| pr.head_sha == sha) {
            Some(pr) => self.get_pull(repo, pr.number).await,
            None => Ok(None),
        }
    }
}

/// Platform running the CI pipelines.
#[async_trait]
pub trait TargetPlatform: Send + Sync {
    async fn list_hooks(&self, project: &str) -> PlatformResult<Vec<TargetHook>>;

    async fn create_hook(
        &self,
        project: &str,
        spec: &TargetHookSpec,
        token: &str,
    ) -> PlatformResult<TargetHook>;

    async fn update_hook(
        &self,
        project: &str,
        hook_id: u64,
        spec: &TargetHookSpec,
        token: &str,
    ) -> PlatformResult<()>;

    async fn delete_hook(&self, project: &str, hook_id: u64) -> PlatformResult<Deletion>;

    async fn get_branch(&self, project: &str, branch: &str) -> PlatformResult<Option<BranchRef>>;

    async fn delete_branch(&self, project: &str, branch: &str) -> PlatformResult<Deletion>;

    /// Pipelines on `git_ref` with `status`, newest first.
    async fn list_pipelines(
        &self,
        project: &str,
        git_ref: &str,
        status: PipelineStatus,
    ) -> PlatformResult<Vec<PipelineRef>>;

    async fn cancel_pipeline(&self, project: &str, pipeline_id: u64) -> PlatformResult<()>;

    async fn delete_pipeline(&self, project: &str, pipeline_id: u64) -> PlatformResult<Deletion>;

    /// Failed jobs of a pipeline in execution order.
    async fn list_failed_jobs(&self, project: &str, pipeline_id: u64)
    -> PlatformResult<Vec<JobRef>>;

    /// Raw job log.
    async fn job_trace(&self, project: &str, job_id: u64) -> PlatformResult<Vec<u8>>;
}
