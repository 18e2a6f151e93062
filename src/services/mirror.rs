//! Mirroring of external pull request branches onto the target platform.
//!
//! CI on the target platform only sees branches of its own repository, so a
//! pull request opened from a fork is fetched from the source platform and
//! force-pushed to the target as `pr-<number>`. Every mirror runs in its own
//! temporary repository, removed when the handler returns.

use std::path::Path;
use std::process::Output;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use crate::error::{HandlerError, HandlerResult};
use crate::models::events::{DeleteEvent, PullRequestEvent};
use crate::models::{ActionResult, Deletion, RepoPolicy};
use crate::platform::TargetPlatform;

static URL_CREDENTIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"://[^/@\s]+@").expect("credentials pattern is valid"));

/// Errors from the git side of mirroring.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("failed to prepare mirror workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Git { command: &'static str, stderr: String },

    #[error("invalid remote url '{0}'")]
    InvalidRemote(String),
}

/// Result of pushing one ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The remote refused the ref, with its reason.
    Rejected(String),
}

/// Repository transport used by the mirror.
///
/// Remote URLs carry credentials and are passed as secrets.
#[async_trait]
pub trait GitTransport: Send + Sync {
    /// Create an empty repository at `workspace`.
    async fn init(&self, workspace: &Path) -> Result<(), MirrorError>;

    async fn fetch(
        &self,
        workspace: &Path,
        remote: &SecretString,
        refspec: &str,
    ) -> Result<(), MirrorError>;

    async fn push(
        &self,
        workspace: &Path,
        remote: &SecretString,
        refspec: &str,
    ) -> Result<PushOutcome, MirrorError>;
}

/// [`GitTransport`] driving the `git` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    async fn run(command: &'static str, args: &[&str]) -> Result<Output, MirrorError> {
        debug!("Running git {}", command);
        let output = Command::new("git")
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output)
    }

    fn failure(command: &'static str, output: &Output) -> MirrorError {
        MirrorError::Git {
            command,
            stderr: redact_credentials(String::from_utf8_lossy(&output.stderr).trim()),
        }
    }
}

#[async_trait]
impl GitTransport for GitCli {
    async fn init(&self, workspace: &Path) -> Result<(), MirrorError> {
        let dir = workspace.to_string_lossy();
        let output = Self::run("init", &["init", "--quiet", "--bare", &dir]).await?;
        if !output.status.success() {
            return Err(Self::failure("init", &output));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        workspace: &Path,
        remote: &SecretString,
        refspec: &str,
    ) -> Result<(), MirrorError> {
        let dir = workspace.to_string_lossy();
        let output = Self::run(
            "fetch",
            &[
                "-C",
                &dir,
                "fetch",
                "--quiet",
                "--no-tags",
                remote.expose_secret(),
                refspec,
            ],
        )
        .await?;
        if !output.status.success() {
            return Err(Self::failure("fetch", &output));
        }
        Ok(())
    }

    async fn push(
        &self,
        workspace: &Path,
        remote: &SecretString,
        refspec: &str,
    ) -> Result<PushOutcome, MirrorError> {
        let dir = workspace.to_string_lossy();
        let output = Self::run(
            "push",
            &["-C", &dir, "push", "--porcelain", remote.expose_secret(), refspec],
        )
        .await?;

        // A rejected ref also makes git exit non-zero; report it as a rejection
        let outcome = parse_porcelain(&String::from_utf8_lossy(&output.stdout));
        if matches!(outcome, PushOutcome::Rejected(_)) || output.status.success() {
            return Ok(outcome);
        }
        Err(Self::failure("push", &output))
    }
}

/// Read `git push --porcelain` output. Ref lines are
/// `<flag>\t<from>:<to>\t<summary>`; flag `!` marks a rejected ref.
pub fn parse_porcelain(stdout: &str) -> PushOutcome {
    for line in stdout.lines() {
        let mut fields = line.splitn(3, '\t');
        let (Some(flag), Some(_refs), summary) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if flag == "!" {
            return PushOutcome::Rejected(summary.unwrap_or("rejected").trim().to_string());
        }
    }
    PushOutcome::Accepted
}

/// Hide `user:password@` in text that may echo a remote URL.
pub fn redact_credentials(text: &str) -> String {
    URL_CREDENTIALS.replace_all(text, "://***@").into_owned()
}

/// Branch name of a mirrored pull request on the target platform.
pub fn mirror_branch(number: u64) -> String {
    format!("pr-{number}")
}

/// Build `https://<user>:<token>@host/<path>.git` from a platform base URL.
pub fn authenticated_remote(
    base: &str,
    user: &str,
    token: &SecretString,
    repo_path: &str,
) -> Result<SecretString, MirrorError> {
    let invalid = || MirrorError::InvalidRemote(base.to_string());
    let mut url = Url::parse(base).map_err(|_| invalid())?;
    url.set_username(user).map_err(|_| invalid())?;
    url.set_password(Some(token.expose_secret()))
        .map_err(|_| invalid())?;
    url.set_path(&format!("{}.git", repo_path.trim_matches('/')));
    Ok(SecretString::from(url.to_string()))
}

/// Where and as whom the mirror reads and writes.
pub struct MirrorRemotes {
    /// Web root of the source platform, e.g. `https://github.com`.
    pub source_base: String,
    pub source_token: SecretString,
    /// Web root of the target platform, e.g. `https://gitlab.com`.
    pub target_base: String,
    pub target_token: SecretString,
}

/// Mirrors external pull requests to the target platform.
pub struct CrossRepoMirror {
    transport: Arc<dyn GitTransport>,
    target: Arc<dyn TargetPlatform>,
    remotes: MirrorRemotes,
}

impl CrossRepoMirror {
    pub fn new(
        transport: Arc<dyn GitTransport>,
        target: Arc<dyn TargetPlatform>,
        remotes: MirrorRemotes,
    ) -> Self {
        Self {
            transport,
            target,
            remotes,
        }
    }

    /// Dispatch a `pull_request` event by its action.
    pub async fn on_pull_request(
        &self,
        policy: &RepoPolicy,
        event: &PullRequestEvent,
    ) -> HandlerResult<ActionResult> {
        if !policy.external_pr_ci {
            return Ok(ActionResult::ignore_because("CI for external pull requests disabled"));
        }
        let pr = event.pull_request.to_ref();
        if !pr.is_external(&policy.source_path) {
            return Ok(ActionResult::ignore_because(format!(
                "PR#{} is not external",
                pr.number
            )));
        }

        match event.action.as_str() {
            "opened" | "reopened" | "synchronize" => self.mirror(policy, pr.number).await,
            "closed" => self.remove(policy, pr.number).await,
            other => Ok(ActionResult::ignore_because(format!(
                "pull request action '{other}' not handled"
            ))),
        }
    }

    /// Fetch the pull request head and force-push it as `pr-<number>`.
    pub async fn mirror(&self, policy: &RepoPolicy, number: u64) -> HandlerResult<ActionResult> {
        let branch = mirror_branch(number);
        let source = authenticated_remote(
            &self.remotes.source_base,
            "x-access-token",
            &self.remotes.source_token,
            &policy.source_path,
        )?;
        let target = authenticated_remote(
            &self.remotes.target_base,
            "oauth2",
            &self.remotes.target_token,
            &policy.target_path,
        )?;

        let workspace = tempfile::Builder::new()
            .prefix("forge-bridge-mirror-")
            .tempdir()
            .map_err(MirrorError::from)?;

        self.transport.init(workspace.path()).await?;
        self.transport
            .fetch(
                workspace.path(),
                &source,
                &format!("+refs/pull/{number}/head:refs/heads/{branch}"),
            )
            .await?;
        let outcome = self
            .transport
            .push(
                workspace.path(),
                &target,
                &format!("+refs/heads/{branch}:refs/heads/{branch}"),
            )
            .await?;

        match outcome {
            PushOutcome::Accepted => {
                info!(
                    repo = %policy.target_path,
                    pr = number,
                    "Pushed {} to target repository",
                    branch
                );
                Ok(ActionResult::ok_with(serde_json::json!({ "branch": branch })))
            }
            PushOutcome::Rejected(message) => Err(HandlerError::PushRejected {
                repo: policy.target_path.clone(),
                git_ref: branch,
                message,
            }),
        }
    }

    /// Delete a branch on the target when it is deleted on the source.
    pub async fn on_branch_deleted(
        &self,
        policy: &RepoPolicy,
        event: &DeleteEvent,
    ) -> HandlerResult<ActionResult> {
        if !policy.auto_delete_branches {
            return Ok(ActionResult::ignore_because("branch auto-delete disabled"));
        }
        if event.ref_type != "branch" {
            return Ok(ActionResult::ignore_because(format!(
                "{} deletions are not mirrored",
                event.ref_type
            )));
        }
        self.delete_branch(policy, &event.git_ref).await
    }

    /// Delete the mirrored branch of a closed pull request.
    pub async fn remove(&self, policy: &RepoPolicy, number: u64) -> HandlerResult<ActionResult> {
        self.delete_branch(policy, &mirror_branch(number)).await
    }

    async fn delete_branch(&self, policy: &RepoPolicy, branch: &str) -> HandlerResult<ActionResult> {
        match self.target.delete_branch(&policy.target_path, branch).await? {
            Deletion::Deleted => {
                info!(repo = %policy.target_path, "Deleted branch {}", branch);
                Ok(ActionResult::ok())
            }
            Deletion::NotFound => Ok(ActionResult::ignore_because(format!(
                "branch {branch} not found"
            ))),
        }
    }
}
