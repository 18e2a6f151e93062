//! Backend of the "delete pipeline" button shown on the target platform.

use std::sync::Arc;

use tracing::info;

use crate::error::HandlerResult;
use crate::models::{ActionResult, Deletion, PolicySet};
use crate::platform::TargetPlatform;

pub struct PipelineButton {
    policies: Arc<PolicySet>,
    target: Arc<dyn TargetPlatform>,
}

impl PipelineButton {
    pub fn new(policies: Arc<PolicySet>, target: Arc<dyn TargetPlatform>) -> Self {
        Self { policies, target }
    }

    /// `OK` with whether the button is enabled for a target repository.
    pub fn is_enabled(&self, repo_path: &str) -> ActionResult {
        let enabled = self
            .policies
            .by_target(repo_path)
            .is_some_and(|policy| policy.delete_pipeline_button);
        ActionResult::ok_with(enabled)
    }

    pub async fn delete(&self, repo_path: &str, pipeline_id: u64) -> HandlerResult<ActionResult> {
        let Some(policy) = self.policies.by_target(repo_path) else {
            return Ok(ActionResult::ignore_because(format!(
                "repository {repo_path} not configured"
            )));
        };
        if !policy.delete_pipeline_button {
            return Ok(ActionResult::ignore_because("pipeline delete button disabled"));
        }

        match self
            .target
            .delete_pipeline(&policy.target_path, pipeline_id)
            .await?
        {
            Deletion::Deleted => {
                info!(repo = %policy.target_path, pipeline = pipeline_id, "Deleted pipeline");
                Ok(ActionResult::ok())
            }
            Deletion::NotFound => Ok(ActionResult::ignore_because(format!(
                "pipeline {pipeline_id} not found"
            ))),
        }
    }
}
