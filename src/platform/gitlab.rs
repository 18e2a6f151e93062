//! GitLab v4 REST client (target platform).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::http::{ApiHttp, encode};
use super::{PlatformError, PlatformResult, TargetPlatform};
use crate::models::{
    BranchRef, Deletion, JobRef, PipelineRef, PipelineStatus, TargetHook, TargetHookEvents,
    TargetHookSpec,
};

const PLATFORM: &str = "gitlab";

/// GitLab API client bound to one personal access token.
#[derive(Clone)]
pub struct GitLabClient {
    api: ApiHttp,
}

impl GitLabClient {
    /// `base_url` is the instance root, e.g. `https://gitlab.com`.
    pub fn new(base_url: &str, token: &SecretString) -> PlatformResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("forge-bridge"));
        let mut auth =
            HeaderValue::from_str(token.expose_secret().trim()).map_err(|_| PlatformError::Client {
                platform: PLATFORM,
                message: "token contains characters not allowed in a header".to_string(),
            })?;
        auth.set_sensitive(true);
        headers.insert("PRIVATE-TOKEN", auth);

        let api_base = format!("{}/api/v4", base_url.trim_end_matches('/'));
        Ok(Self {
            api: ApiHttp::new(PLATFORM, &api_base, headers)?,
        })
    }

    fn project_url(&self, project: &str, rest: &str) -> String {
        self.api
            .url(&format!("/projects/{}{}", encode(project), rest))
    }
}

#[derive(Deserialize)]
struct HookPayload {
    id: u64,
    url: String,
    #[serde(flatten)]
    events: TargetHookEvents,
}

impl From<HookPayload> for TargetHook {
    fn from(hook: HookPayload) -> Self {
        TargetHook {
            id: hook.id,
            spec: TargetHookSpec {
                url: hook.url,
                events: hook.events,
            },
        }
    }
}

#[derive(Serialize)]
struct HookBody<'a> {
    url: &'a str,
    token: &'a str,
    enable_ssl_verification: bool,
    #[serde(flatten)]
    events: TargetHookEvents,
}

impl<'a> HookBody<'a> {
    fn new(spec: &'a TargetHookSpec, token: &'a str) -> Self {
        Self {
            url: &spec.url,
            token,
            enable_ssl_verification: true,
            events: spec.events,
        }
    }
}

#[async_trait]
impl TargetPlatform for GitLabClient {
    async fn list_hooks(&self, project: &str) -> PlatformResult<Vec<TargetHook>> {
        let url = self.project_url(project, "/hooks?per_page=100");
        let hooks: Vec<HookPayload> = self.api.json("list hooks", self.api.http.get(url)).await?;
        Ok(hooks.into_iter().map(TargetHook::from).collect())
    }

    async fn create_hook(
        &self,
        project: &str,
        spec: &TargetHookSpec,
        token: &str,
    ) -> PlatformResult<TargetHook> {
        let url = self.project_url(project, "/hooks");
        let hook: HookPayload = self
            .api
            .json(
                "create hook",
                self.api.http.post(url).json(&HookBody::new(spec, token)),
            )
            .await?;
        Ok(hook.into())
    }

    async fn update_hook(
        &self,
        project: &str,
        hook_id: u64,
        spec: &TargetHookSpec,
        token: &str,
    ) -> PlatformResult<()> {
        let url = self.project_url(project, &format!("/hooks/{hook_id}"));
        self.api
            .empty(
                "update hook",
                self.api.http.put(url).json(&HookBody::new(spec, token)),
            )
            .await
    }

    async fn delete_hook(&self, project: &str, hook_id: u64) -> PlatformResult<Deletion> {
        let url = self.project_url(project, &format!("/hooks/{hook_id}"));
        self.api.delete("delete hook", self.api.http.delete(url)).await
    }

    async fn get_branch(&self, project: &str, branch: &str) -> PlatformResult<Option<BranchRef>> {
        let url = self.project_url(project, &format!("/repository/branches/{}", encode(branch)));
        self.api
            .optional_json("get branch", self.api.http.get(url))
            .await
    }

    async fn delete_branch(&self, project: &str, branch: &str) -> PlatformResult<Deletion> {
        let url = self.project_url(project, &format!("/repository/branches/{}", encode(branch)));
        self.api
            .delete("delete branch", self.api.http.delete(url))
            .await
    }

    async fn list_pipelines(
        &self,
        project: &str,
        git_ref: &str,
        status: PipelineStatus,
    ) -> PlatformResult<Vec<PipelineRef>> {
        let url = self.project_url(
            project,
            &format!(
                "/pipelines?ref={}&status={}&order_by=id&sort=desc&per_page=100",
                encode(git_ref),
                status.as_query()
            ),
        );
        self.api.json("list pipelines", self.api.http.get(url)).await
    }

    async fn cancel_pipeline(&self, project: &str, pipeline_id: u64) -> PlatformResult<()> {
        let url = self.project_url(project, &format!("/pipelines/{pipeline_id}/cancel"));
        self.api
            .empty("cancel pipeline", self.api.http.post(url))
            .await
    }

    async fn delete_pipeline(&self, project: &str, pipeline_id: u64) -> PlatformResult<Deletion> {
        let url = self.project_url(project, &format!("/pipelines/{pipeline_id}"));
        self.api
            .delete("delete pipeline", self.api.http.delete(url))
            .await
    }

    async fn list_failed_jobs(
        &self,
        project: &str,
        pipeline_id: u64,
    ) -> PlatformResult<Vec<JobRef>> {
        let url = self.project_url(
            project,
            &format!("/pipelines/{pipeline_id}/jobs?scope[]=failed&per_page=100"),
        );
        let mut jobs: Vec<JobRef> = self.api.json("list failed jobs", self.api.http.get(url)).await?;
        // The API lists newest first; execution order is ascending id
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn job_trace(&self, project: &str, job_id: u64) -> PlatformResult<Vec<u8>> {
        let url = self.project_url(project, &format!("/jobs/{job_id}/trace"));
        self.api.bytes("get job trace", self.api.http.get(url)).await
    }
}
