//! GitHub REST client (source platform).

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::http::{ApiHttp, encode};
use super::{PlatformResult, SourcePlatform};
use crate::models::events::PullRequestPayload;
use crate::models::{
    Deletion, Invitation, LabelSpec, MergeOutcome, PullRequestRef, SourceHook, SourceHookSpec,
};

const PLATFORM: &str = "github";
const PAGE_SIZE: usize = 100;

/// GitHub API client bound to one token.
#[derive(Clone)]
pub struct GitHubClient {
    api: ApiHttp,
}

impl GitHubClient {
    pub fn new(api_base: &str, token: &SecretString) -> PlatformResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("forge-bridge"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret().trim()))
            .map_err(|_| super::PlatformError::Client {
                platform: PLATFORM,
                message: "token contains characters not allowed in a header".to_string(),
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        Ok(Self {
            api: ApiHttp::new(PLATFORM, api_base, headers)?,
        })
    }

    /// Fetch every page of a list endpoint. `path` must not carry a query string.
    async fn paginate<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &str,
    ) -> PlatformResult<Vec<T>> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let url = self.api.url(&format!(
                "{path}?{query}{sep}per_page={PAGE_SIZE}&page={page}",
                sep = if query.is_empty() { "" } else { "&" },
            ));
            let chunk: Vec<T> = self.api.json(operation, self.api.http.get(url)).await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }
}

#[derive(Deserialize)]
struct Viewer {
    login: String,
}

#[derive(Deserialize)]
struct HookConfig {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct HookPayload {
    id: u64,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    events: Vec<String>,
    config: HookConfig,
}

impl From<HookPayload> for SourceHook {
    fn from(hook: HookPayload) -> Self {
        SourceHook {
            id: hook.id,
            spec: SourceHookSpec {
                url: hook.config.url.unwrap_or_default(),
                events: hook.events.into_iter().collect::<BTreeSet<_>>(),
                active: hook.active,
            },
        }
    }
}

#[derive(Deserialize)]
struct LabelPayload {
    name: String,
    color: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct InvitationRepo {
    full_name: String,
}

#[derive(Deserialize)]
struct InvitationPayload {
    id: u64,
    repository: InvitationRepo,
    invitee: Option<Viewer>,
}

#[derive(Deserialize)]
struct MergePayload {
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    message: String,
}

fn hook_body(spec: &SourceHookSpec, secret: &str) -> serde_json::Value {
    json!({
        "name": "web",
        "active": spec.active,
        "events": spec.events,
        "config": {
            "url": spec.url,
            "content_type": "json",
            "secret": secret,
            "insecure_ssl": "0",
        },
    })
}

#[async_trait]
impl SourcePlatform for GitHubClient {
    async fn current_login(&self) -> PlatformResult<String> {
        let viewer: Viewer = self
            .api
            .json("resolve login", self.api.http.get(self.api.url("/user")))
            .await?;
        Ok(viewer.login)
    }

    async fn list_open_pulls(&self, repo: &str) -> PlatformResult<Vec<PullRequestRef>> {
        let pulls: Vec<PullRequestPayload> = self
            .paginate("list pulls", &format!("/repos/{repo}/pulls"), "state=open")
            .await?;
        Ok(pulls.iter().map(PullRequestPayload::to_ref).collect())
    }

    async fn get_pull(&self, repo: &str, number: u64) -> PlatformResult<Option<PullRequestRef>> {
        let url = self.api.url(&format!("/repos/{repo}/pulls/{number}"));
        let pull: Option<PullRequestPayload> = self
            .api
            .optional_json("get pull", self.api.http.get(url))
            .await?;
        Ok(pull.as_ref().map(PullRequestPayload::to_ref))
    }

    async fn merge_pull(
        &self,
        repo: &str,
        number: u64,
        head_sha: &str,
    ) -> PlatformResult<MergeOutcome> {
        let operation = "merge pull";
        let url = self.api.url(&format!("/repos/{repo}/pulls/{number}/merge"));
        let request = self.api.http.put(url).json(&json!({ "sha": head_sha }));
        let response = self.api.send_raw(operation, request).await?;
        let status = response.status();

        if status.is_success() {
            let body: MergePayload = self.api.decode(operation, response).await?;
            return Ok(if body.merged {
                MergeOutcome::Merged
            } else {
                MergeOutcome::Rejected(body.message)
            });
        }

        // Not mergeable, head moved, or blocked by branch protection
        if matches!(
            status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            let body: MergePayload = self.api.decode(operation, response).await?;
            return Ok(MergeOutcome::Rejected(body.message));
        }

        Err(self.api.status_error(operation, response).await)
    }

    async fn create_comment(&self, repo: &str, number: u64, body: &str) -> PlatformResult<()> {
        let url = self
            .api
            .url(&format!("/repos/{repo}/issues/{number}/comments"));
        self.api
            .empty(
                "create comment",
                self.api.http.post(url).json(&json!({ "body": body })),
            )
            .await
    }

    async fn list_hooks(&self, repo: &str) -> PlatformResult<Vec<SourceHook>> {
        let hooks: Vec<HookPayload> = self
            .paginate("list hooks", &format!("/repos/{repo}/hooks"), "")
            .await?;
        Ok(hooks.into_iter().map(SourceHook::from).collect())
    }

    async fn create_hook(
        &self,
        repo: &str,
        spec: &SourceHookSpec,
        secret: &str,
    ) -> PlatformResult<SourceHook> {
        let url = self.api.url(&format!("/repos/{repo}/hooks"));
        let hook: HookPayload = self
            .api
            .json(
                "create hook",
                self.api.http.post(url).json(&hook_body(spec, secret)),
            )
            .await?;
        Ok(hook.into())
    }

    async fn update_hook(
        &self,
        repo: &str,
        hook_id: u64,
        spec: &SourceHookSpec,
        secret: &str,
    ) -> PlatformResult<()> {
        let url = self.api.url(&format!("/repos/{repo}/hooks/{hook_id}"));
        self.api
            .empty(
                "update hook",
                self.api.http.patch(url).json(&hook_body(spec, secret)),
            )
            .await
    }

    async fn delete_hook(&self, repo: &str, hook_id: u64) -> PlatformResult<Deletion> {
        let url = self.api.url(&format!("/repos/{repo}/hooks/{hook_id}"));
        self.api.delete("delete hook", self.api.http.delete(url)).await
    }

    async fn get_label(&self, repo: &str, name: &str) -> PlatformResult<Option<LabelSpec>> {
        let url = self
            .api
            .url(&format!("/repos/{repo}/labels/{}", encode(name)));
        let label: Option<LabelPayload> = self
            .api
            .optional_json("get label", self.api.http.get(url))
            .await?;
        Ok(label.map(|l| LabelSpec {
            name: l.name,
            color: l.color.to_ascii_lowercase(),
            description: l.description.unwrap_or_default(),
        }))
    }

    async fn create_label(&self, repo: &str, label: &LabelSpec) -> PlatformResult<()> {
        let url = self.api.url(&format!("/repos/{repo}/labels"));
        let body = json!({
            "name": label.name,
            "color": label.color,
            "description": label.description,
        });
        self.api
            .empty("create label", self.api.http.post(url).json(&body))
            .await
    }

    async fn update_label(&self, repo: &str, label: &LabelSpec) -> PlatformResult<()> {
        let url = self
            .api
            .url(&format!("/repos/{repo}/labels/{}", encode(&label.name)));
        let body = json!({
            "new_name": label.name,
            "color": label.color,
            "description": label.description,
        });
        self.api
            .empty("update label", self.api.http.patch(url).json(&body))
            .await
    }

    async fn is_collaborator(&self, repo: &str, login: &str) -> PlatformResult<bool> {
        let operation = "check collaborator";
        let url = self
            .api
            .url(&format!("/repos/{repo}/collaborators/{}", encode(login)));
        let response = self.api.send_raw(operation, self.api.http.get(url)).await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.api.status_error(operation, response).await),
        }
    }

    async fn add_collaborator(&self, repo: &str, login: &str) -> PlatformResult<()> {
        let url = self
            .api
            .url(&format!("/repos/{repo}/collaborators/{}", encode(login)));
        self.api
            .empty(
                "add collaborator",
                self.api.http.put(url).json(&json!({ "permission": "push" })),
            )
            .await
    }

    async fn remove_collaborator(&self, repo: &str, login: &str) -> PlatformResult<Deletion> {
        let url = self
            .api
            .url(&format!("/repos/{repo}/collaborators/{}", encode(login)));
        self.api
            .delete("remove collaborator", self.api.http.delete(url))
            .await
    }

    async fn list_received_invitations(&self) -> PlatformResult<Vec<Invitation>> {
        let invitations: Vec<InvitationPayload> = self
            .paginate("list invitations", "/user/repository_invitations", "")
            .await?;
        Ok(invitations
            .into_iter()
            .map(|i| Invitation {
                id: i.id,
                repo: i.repository.full_name,
                invitee: i.invitee.map(|v| v.login).unwrap_or_default(),
            })
            .collect())
    }

    async fn accept_invitation(&self, invitation_id: u64) -> PlatformResult<()> {
        let url = self
            .api
            .url(&format!("/user/repository_invitations/{invitation_id}"));
        self.api
            .empty("accept invitation", self.api.http.patch(url))
            .await
    }
}
