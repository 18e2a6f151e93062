//! Per repository-pair automation policy.
//!
//! Policies are read once at startup from the settings file and are immutable
//! afterwards. [`RepoPolicy::new`] is the only way to build one, so every policy
//! in a [`PolicySet`] has already been validated and had its defaults filled in.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

/// Default delay before an automatic merge fires.
pub const DEFAULT_MERGE_DELAY_SECS: u64 = 60;
/// Default name of the label required for automatic merges.
pub const DEFAULT_LABEL_NAME: &str = "auto-merge";
/// Default label color (hex, without `#`).
pub const DEFAULT_LABEL_COLOR: &str = "852576";
/// Default label description.
pub const DEFAULT_LABEL_DESCRIPTION: &str = "Pull requests carrying this label are merged once CI passes";
/// Default number of log lines posted with a CI failure report.
pub const DEFAULT_MAX_LOG_LINES: usize = 25;

/// A feature that is either a plain switch or an options object.
///
/// `false` disables the feature, `true` enables it with defaults, an object enables
/// it with the given overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Toggle<T> {
    Switch(bool),
    Options(T),
}

impl<T: Default> Toggle<T> {
    fn into_options(self) -> Option<T> {
        match self {
            Toggle::Switch(false) => None,
            Toggle::Switch(true) => Some(T::default()),
            Toggle::Options(options) => Some(options),
        }
    }
}

/// Raw `gh_auto_merge_pr` options as written in the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoMergeOptions {
    pub authors_white_list: Option<Vec<String>>,
    pub delay: Option<u64>,
    pub required_label_name: Option<String>,
    pub required_label_color: Option<String>,
    pub required_label_description: Option<String>,
}

/// Raw `gh_show_gitlab_ci_fail` options as written in the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CiFailureOptions {
    pub max_lines: Option<usize>,
}

/// One entry of the settings file `repos` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoOptions {
    pub gh_repo_path: String,
    pub gl_repo_path: String,
    #[serde(default)]
    pub gh_auto_merge_pr: Option<Toggle<AutoMergeOptions>>,
    #[serde(default)]
    pub gh_show_gitlab_ci_fail: Option<Toggle<CiFailureOptions>>,
    #[serde(default)]
    pub gh_gitlab_ci_for_external_pr: bool,
    #[serde(default)]
    pub gl_auto_cancel_pipelines: bool,
    #[serde(default)]
    pub gl_auto_delete_branches: bool,
    #[serde(default)]
    pub gl_delete_pipeline_btn: bool,
}

/// Label that must be present on a pull request before it is merged automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    /// Six hex digits, lowercase, without `#`.
    pub color: String,
    pub description: String,
}

/// Validated auto-merge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoMergePolicy {
    /// Logins allowed to have their pull requests merged. Always contains the
    /// owner and the bot.
    pub allowed_authors: Vec<String>,
    pub delay: Duration,
    pub label: LabelSpec,
}

impl AutoMergePolicy {
    pub fn allows_author(&self, login: &str) -> bool {
        self.allowed_authors
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(login))
    }
}

/// Validated CI failure reporting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CiFailurePolicy {
    pub max_lines: usize,
}

/// Immutable automation policy for one source/target repository pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPolicy {
    /// `namespace/name` on the source platform.
    pub source_path: String,
    /// `namespace/name` on the target platform.
    pub target_path: String,
    pub auto_merge: Option<AutoMergePolicy>,
    pub ci_failure: Option<CiFailurePolicy>,
    pub external_pr_ci: bool,
    pub auto_cancel_pipelines: bool,
    pub auto_delete_branches: bool,
    pub delete_pipeline_button: bool,
}

/// Reasons a repository policy is rejected at load time.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{0}: repository path must look like 'namespace/name'")]
    InvalidPath(String),

    #[error(
        "{0}: at least one option must be enabled: gh_auto_merge_pr, gh_show_gitlab_ci_fail, \
         gh_gitlab_ci_for_external_pr, gl_auto_cancel_pipelines, gl_auto_delete_branches, \
         gl_delete_pipeline_btn"
    )]
    NothingEnabled(String),

    #[error("{repo}: required_label_color '{color}' is not a 6-digit hex color")]
    InvalidLabelColor { repo: String, color: String },

    #[error("{0}: required_label_name must not be empty")]
    EmptyLabelName(String),

    #[error("{0}: max_lines must be at least 1")]
    InvalidMaxLines(String),

    #[error("repository path '{0}' is configured more than once")]
    DuplicateRepo(String),
}

impl RepoPolicy {
    /// Validate raw options and fill in defaults.
    ///
    /// `owner_login` and `bot_login` are always appended to the auto-merge author
    /// allow-list.
    pub fn new(
        options: RepoOptions,
        owner_login: &str,
        bot_login: &str,
    ) -> Result<Self, PolicyError> {
        for path in [&options.gh_repo_path, &options.gl_repo_path] {
            if !is_repo_path(path) {
                return Err(PolicyError::InvalidPath(path.clone()));
            }
        }
        let repo = options.gh_repo_path.clone();

        let auto_merge = options
            .gh_auto_merge_pr
            .and_then(Toggle::into_options)
            .map(|raw| build_auto_merge(&repo, raw, owner_login, bot_login))
            .transpose()?;

        let ci_failure = options
            .gh_show_gitlab_ci_fail
            .and_then(Toggle::into_options)
            .map(|raw| {
                let max_lines = raw.max_lines.unwrap_or(DEFAULT_MAX_LOG_LINES);
                if max_lines == 0 {
                    return Err(PolicyError::InvalidMaxLines(repo.clone()));
                }
                Ok(CiFailurePolicy { max_lines })
            })
            .transpose()?;

        let policy = RepoPolicy {
            source_path: options.gh_repo_path,
            target_path: options.gl_repo_path,
            auto_merge,
            ci_failure,
            external_pr_ci: options.gh_gitlab_ci_for_external_pr,
            auto_cancel_pipelines: options.gl_auto_cancel_pipelines,
            auto_delete_branches: options.gl_auto_delete_branches,
            delete_pipeline_button: options.gl_delete_pipeline_btn,
        };

        if !policy.any_enabled() {
            return Err(PolicyError::NothingEnabled(repo));
        }

        Ok(policy)
    }

    fn any_enabled(&self) -> bool {
        self.auto_merge.is_some()
            || self.ci_failure.is_some()
            || self.external_pr_ci
            || self.auto_cancel_pipelines
            || self.auto_delete_branches
            || self.delete_pipeline_button
    }

    /// Event names the source-platform webhook must subscribe to.
    pub fn source_hook_events(&self) -> Vec<&'static str> {
        let mut events = Vec::new();
        if self.auto_merge.is_some() || self.ci_failure.is_some() {
            events.push("status");
        }
        if self.auto_delete_branches {
            events.push("delete");
        }
        if self.external_pr_ci {
            events.push("pull_request");
        }
        events
    }
}

fn build_auto_merge(
    repo: &str,
    raw: AutoMergeOptions,
    owner_login: &str,
    bot_login: &str,
) -> Result<AutoMergePolicy, PolicyError> {
    let mut allowed_authors = raw.authors_white_list.unwrap_or_default();
    for login in [owner_login, bot_login] {
        if !allowed_authors.iter().any(|a| a.eq_ignore_ascii_case(login)) {
            allowed_authors.push(login.to_string());
        }
    }

    let name = non_empty(raw.required_label_name).unwrap_or_else(|| DEFAULT_LABEL_NAME.to_string());
    if name.trim().is_empty() {
        return Err(PolicyError::EmptyLabelName(repo.to_string()));
    }

    let color = match non_empty(raw.required_label_color) {
        Some(color) => normalize_color(&color).ok_or_else(|| PolicyError::InvalidLabelColor {
            repo: repo.to_string(),
            color,
        })?,
        None => DEFAULT_LABEL_COLOR.to_string(),
    };

    let description = non_empty(raw.required_label_description)
        .unwrap_or_else(|| DEFAULT_LABEL_DESCRIPTION.to_string());

    Ok(AutoMergePolicy {
        allowed_authors,
        delay: Duration::from_secs(raw.delay.unwrap_or(DEFAULT_MERGE_DELAY_SECS)),
        label: LabelSpec {
            name,
            color,
            description,
        },
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn normalize_color(color: &str) -> Option<String> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hex.to_ascii_lowercase())
    } else {
        None
    }
}

fn is_repo_path(path: &str) -> bool {
    let mut parts = path.split('/');
    let namespace = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();
    !namespace.is_empty() && !rest.is_empty() && rest.iter().all(|p| !p.is_empty())
}

/// All configured repository pairs, looked up by either platform's path.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<Arc<RepoPolicy>>,
}

impl PolicySet {
    /// Build the set, rejecting any path configured twice on the same platform.
    pub fn new(policies: Vec<RepoPolicy>) -> Result<Self, PolicyError> {
        let mut seen_source: Vec<String> = Vec::new();
        let mut seen_target: Vec<String> = Vec::new();
        for policy in &policies {
            let source = policy.source_path.to_lowercase();
            let target = policy.target_path.to_lowercase();
            if seen_source.contains(&source) {
                return Err(PolicyError::DuplicateRepo(policy.source_path.clone()));
            }
            if seen_target.contains(&target) {
                return Err(PolicyError::DuplicateRepo(policy.target_path.clone()));
            }
            seen_source.push(source);
            seen_target.push(target);
        }

        Ok(Self {
            policies: policies.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn by_source(&self, path: &str) -> Option<Arc<RepoPolicy>> {
        self.policies
            .iter()
            .find(|p| p.source_path.eq_ignore_ascii_case(path))
            .cloned()
    }

    pub fn by_target(&self, path: &str) -> Option<Arc<RepoPolicy>> {
        self.policies
            .iter()
            .find(|p| p.target_path.eq_ignore_ascii_case(path))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RepoPolicy>> {
        self.policies.iter()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
