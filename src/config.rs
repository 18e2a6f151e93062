//! Application configuration loaded from environment variables and the
//! settings file.

use std::env;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::models::policy::RepoOptions;
use crate::models::{PolicyError, PolicySet, RepoPolicy};

/// Event type header sent by GitHub.
pub const GITHUB_EVENT_HEADER: &str = "X-GitHub-Event";

/// HMAC-SHA256 signature header sent by GitHub.
pub const GITHUB_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Event type header sent by GitLab.
pub const GITLAB_EVENT_HEADER: &str = "X-Gitlab-Event";

/// Shared secret header sent by GitLab.
pub const GITLAB_TOKEN_HEADER: &str = "X-Gitlab-Token";

/// Default values.
pub mod defaults {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8080;
    pub const SETTINGS_PATH: &str = "bridge.json";
    pub const GITHUB_API_URL: &str = "https://api.github.com";
    pub const GITHUB_URL: &str = "https://github.com";
    pub const GITLAB_URL: &str = "https://gitlab.com";
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Path of the JSON settings file
    pub settings_path: PathBuf,
    /// Comment template replacing the built-in one
    pub ci_failure_template: Option<PathBuf>,
    /// Token of the repository owner
    pub github_token: SecretString,
    /// Token of the bot account
    pub github_bot_token: SecretString,
    /// Secret GitHub signs webhook deliveries with
    pub github_secret: SecretString,
    /// GitLab personal access token
    pub gitlab_token: SecretString,
    /// Token GitLab sends with webhook deliveries
    pub gitlab_secret: SecretString,
    /// GitHub REST API root
    pub github_api_url: String,
    /// GitHub web root, used for git transport
    pub github_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BRIDGE_HOST`: Server host (default: 0.0.0.0)
    /// - `BRIDGE_PORT`: Server port (default: 8080)
    /// - `BRIDGE_SETTINGS_PATH`: Settings file (default: bridge.json)
    /// - `BRIDGE_CI_FAILURE_TEMPLATE`: Comment template path (optional)
    /// - `GITHUB_TOKEN`, `GITHUB_BOT_TOKEN`, `GITHUB_SECRET`: required
    /// - `GITLAB_TOKEN`, `GITLAB_SECRET`: required
    /// - `GITHUB_API_URL`: GitHub API root (default: https://api.github.com)
    /// - `GITHUB_URL`: GitHub web root (default: https://github.com)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret = |name: &'static str| {
            var(name)
                .filter(|value| !value.trim().is_empty())
                .map(SecretString::from)
                .ok_or(ConfigError::MissingEnvVar(name))
        };

        let host = var("BRIDGE_HOST").unwrap_or_else(|| defaults::HOST.to_string());

        let port = match var("BRIDGE_PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue("BRIDGE_PORT must be a valid port number"))?,
            None => defaults::PORT,
        };

        let settings_path = var("BRIDGE_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(defaults::SETTINGS_PATH));

        let ci_failure_template = var("BRIDGE_CI_FAILURE_TEMPLATE").map(PathBuf::from);

        let github_api_url =
            var("GITHUB_API_URL").unwrap_or_else(|| defaults::GITHUB_API_URL.to_string());
        if !is_http_url(&github_api_url) {
            return Err(ConfigError::InvalidValue("GITHUB_API_URL must be an http(s) URL"));
        }

        let github_url = var("GITHUB_URL").unwrap_or_else(|| defaults::GITHUB_URL.to_string());
        if !is_http_url(&github_url) {
            return Err(ConfigError::InvalidValue("GITHUB_URL must be an http(s) URL"));
        }

        Ok(Config {
            host,
            port,
            settings_path,
            ci_failure_template,
            github_token: secret("GITHUB_TOKEN")?,
            github_bot_token: secret("GITHUB_BOT_TOKEN")?,
            github_secret: secret("GITHUB_SECRET")?,
            gitlab_token: secret("GITLAB_TOKEN")?,
            gitlab_secret: secret("GITLAB_SECRET")?,
            github_api_url,
            github_url,
        })
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn default_gitlab_url() -> String {
    defaults::GITLAB_URL.to_string()
}

/// Contents of the settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Public URL of this service; webhooks are registered under it.
    pub base_url: String,
    /// GitLab instance root
    #[serde(default = "default_gitlab_url")]
    pub gl_base_url: String,
    pub repos: Vec<RepoOptions>,
}

impl Settings {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(text)?;
        if !is_http_url(&settings.base_url) {
            return Err(ConfigError::InvalidValue("base_url must be an http(s) URL"));
        }
        if !is_http_url(&settings.gl_base_url) {
            return Err(ConfigError::InvalidValue("gl_base_url must be an http(s) URL"));
        }
        if settings.repos.is_empty() {
            return Err(ConfigError::InvalidValue("repos must list at least one repository"));
        }
        Ok(settings)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::SettingsFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&text)
    }

    /// Validate every repository entry into the immutable policy set.
    pub fn policies(&self, owner_login: &str, bot_login: &str) -> Result<PolicySet, ConfigError> {
        let policies = self
            .repos
            .iter()
            .cloned()
            .map(|options| RepoPolicy::new(options, owner_login, bot_login))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PolicySet::new(policies)?)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Cannot read settings file {}: {source}", path.display())]
    SettingsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file: {0}")]
    SettingsFormat(#[from] serde_json::Error),

    #[error("Invalid repository settings: {0}")]
    Policy(#[from] PolicyError),
}
