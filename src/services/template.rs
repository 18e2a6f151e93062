//! Comment template for CI failure reports.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

const BUILTIN_TEMPLATE: &str = include_str!("../../assets/ci_failure.md");

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)\}").expect("placeholder pattern is valid"));

/// Values substituted into the template.
#[derive(Debug, Clone)]
pub struct FailureDetails<'a> {
    pub stage: &'a str,
    pub log: &'a str,
    pub job_url: &'a str,
}

/// Markdown template with `${failed_stage}`, `${failed_job_log}` and
/// `${failed_job_url}` placeholders.
#[derive(Debug, Clone)]
pub struct CommentTemplate {
    text: String,
}

impl Default for CommentTemplate {
    fn default() -> Self {
        Self::new(BUILTIN_TEMPLATE)
    }
}

impl CommentTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        tokio::fs::read_to_string(path).await.map(Self::new)
    }

    /// Substitute all placeholders in one pass, so text coming from the log is
    /// never expanded itself. Unknown placeholders are left untouched.
    pub fn render(&self, details: &FailureDetails<'_>) -> String {
        PLACEHOLDER
            .replace_all(&self.text, |caps: &Captures<'_>| match &caps[1] {
                "failed_stage" => details.stage.to_string(),
                "failed_job_log" => details.log.to_string(),
                "failed_job_url" => details.job_url.to_string(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}
