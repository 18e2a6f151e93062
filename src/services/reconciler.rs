//! Convergence of remote resources to what a repository policy declares.
//!
//! Four resource kinds are managed per repository pair, each independently:
//! the source-platform webhook, the target-platform webhook, the auto-merge
//! label and the bot's collaborator access. For each kind the desired state is
//! derived from the policy, compared with what the platform reports, and only
//! the difference is applied. A second run against unchanged state issues no
//! mutating call.

use std::collections::BTreeSet;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::HandlerResult;
use crate::models::{
    ActionResult, Deletion, RepoPolicy, SourceHookSpec, TargetHookEvents, TargetHookSpec,
};
use crate::platform::{SourcePlatform, TargetPlatform};

/// Path of the source-platform webhook endpoint, relative to the public base URL.
pub const SOURCE_WEBHOOK_PATH: &str = "webhook/github";
/// Path of the target-platform webhook endpoint, relative to the public base URL.
pub const TARGET_WEBHOOK_PATH: &str = "webhook/gitlab";

/// What the policy asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired<T> {
    Enabled(T),
    Disabled,
}

/// Mutation needed to go from observed to desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan<T, Id> {
    Create(T),
    Update(Id, T),
    Delete(Id),
    Noop,
}

/// Compare desired and observed state field by field.
pub fn plan<T: PartialEq, Id>(desired: Desired<T>, observed: Option<(Id, T)>) -> Plan<T, Id> {
    match (desired, observed) {
        (Desired::Enabled(want), None) => Plan::Create(want),
        (Desired::Enabled(want), Some((id, have))) if want != have => Plan::Update(id, want),
        (Desired::Enabled(_), Some(_)) => Plan::Noop,
        (Desired::Disabled, Some((id, _))) => Plan::Delete(id),
        (Desired::Disabled, None) => Plan::Noop,
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Identity and secrets the reconciled resources are configured with.
pub struct ReconcileSettings {
    /// Public URL of this service.
    pub base_url: String,
    pub source_secret: SecretString,
    pub target_secret: SecretString,
    pub owner_login: String,
    pub bot_login: String,
}

/// Outcome per resource kind.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub source_hook: ActionResult,
    pub target_hook: ActionResult,
    pub label: ActionResult,
    pub collaborator: ActionResult,
}

impl ReconcileReport {
    pub fn entries(&self) -> [(&'static str, &ActionResult); 4] {
        [
            ("source hook", &self.source_hook),
            ("target hook", &self.target_hook),
            ("label", &self.label),
            ("collaborator", &self.collaborator),
        ]
    }

    /// Number of kinds that changed something remotely.
    pub fn changed(&self) -> usize {
        self.entries().iter().filter(|(_, r)| r.is_ok()).count()
    }
}

fn settle(kind: &str, repo: &str, result: HandlerResult<ActionResult>) -> ActionResult {
    result.unwrap_or_else(|err| {
        error!(repo = %repo, "Failed to reconcile {}: {}", kind, err);
        ActionResult::error(err.to_string())
    })
}

fn changed(action: &str) -> ActionResult {
    ActionResult::ok_with(json!({ "action": action }))
}

/// Converges hooks, label and collaborator access for each repository pair.
pub struct RemoteResourceReconciler {
    /// Client acting as the repository owner.
    owner: Arc<dyn SourcePlatform>,
    /// Client acting as the bot, used to accept invitations.
    bot: Arc<dyn SourcePlatform>,
    target: Arc<dyn TargetPlatform>,
    settings: ReconcileSettings,
}

impl RemoteResourceReconciler {
    pub fn new(
        owner: Arc<dyn SourcePlatform>,
        bot: Arc<dyn SourcePlatform>,
        target: Arc<dyn TargetPlatform>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            owner,
            bot,
            target,
            settings,
        }
    }

    /// Reconcile every resource kind of one repository pair. Never fails; errors
    /// are reported per kind.
    pub async fn reconcile(&self, policy: &RepoPolicy) -> ReconcileReport {
        let repo = &policy.source_path;
        let report = ReconcileReport {
            source_hook: settle("source hook", repo, self.source_hook(policy).await),
            target_hook: settle("target hook", repo, self.target_hook(policy).await),
            label: settle("label", repo, self.label(policy).await),
            collaborator: settle("collaborator", repo, self.collaborator(policy).await),
        };
        info!(
            repo = %repo,
            "Reconciled remote resources ({} changed)",
            report.changed()
        );
        report
    }

    pub fn desired_source_hook(&self, policy: &RepoPolicy) -> Desired<SourceHookSpec> {
        let events: BTreeSet<String> = policy
            .source_hook_events()
            .into_iter()
            .map(str::to_string)
            .collect();
        if events.is_empty() {
            return Desired::Disabled;
        }
        Desired::Enabled(SourceHookSpec {
            url: join_url(&self.settings.base_url, SOURCE_WEBHOOK_PATH),
            events,
            active: true,
        })
    }

    pub fn desired_target_hook(&self, policy: &RepoPolicy) -> Desired<TargetHookSpec> {
        if !policy.auto_cancel_pipelines {
            return Desired::Disabled;
        }
        Desired::Enabled(TargetHookSpec {
            url: join_url(&self.settings.base_url, TARGET_WEBHOOK_PATH),
            events: TargetHookEvents::pipelines_only(),
        })
    }

    async fn source_hook(&self, policy: &RepoPolicy) -> HandlerResult<ActionResult> {
        let repo = &policy.source_path;
        let url = join_url(&self.settings.base_url, SOURCE_WEBHOOK_PATH);
        let observed = self
            .owner
            .list_hooks(repo)
            .await?
            .into_iter()
            .find(|hook| hook.spec.url == url)
            .map(|hook| (hook.id, hook.spec));
        let secret = self.settings.source_secret.expose_secret();

        match plan(self.desired_source_hook(policy), observed) {
            Plan::Create(spec) => {
                let hook = self.owner.create_hook(repo, &spec, secret).await?;
                info!(repo = %repo, "Created webhook {}", hook.id);
                Ok(changed("created"))
            }
            Plan::Update(id, spec) => {
                self.owner.update_hook(repo, id, &spec, secret).await?;
                info!(repo = %repo, "Updated webhook {}", id);
                Ok(changed("updated"))
            }
            Plan::Delete(id) => self.deleted(repo, "webhook", self.owner.delete_hook(repo, id).await?),
            Plan::Noop => Ok(ActionResult::ignore_because("webhook up to date")),
        }
    }

    async fn target_hook(&self, policy: &RepoPolicy) -> HandlerResult<ActionResult> {
        let project = &policy.target_path;
        let url = join_url(&self.settings.base_url, TARGET_WEBHOOK_PATH);
        let observed = self
            .target
            .list_hooks(project)
            .await?
            .into_iter()
            .find(|hook| hook.spec.url == url)
            .map(|hook| (hook.id, hook.spec));
        let token = self.settings.target_secret.expose_secret();

        match plan(self.desired_target_hook(policy), observed) {
            Plan::Create(spec) => {
                let hook = self.target.create_hook(project, &spec, token).await?;
                info!(repo = %project, "Created webhook {}", hook.id);
                Ok(changed("created"))
            }
            Plan::Update(id, spec) => {
                self.target.update_hook(project, id, &spec, token).await?;
                info!(repo = %project, "Updated webhook {}", id);
                Ok(changed("updated"))
            }
            Plan::Delete(id) => {
                self.deleted(project, "webhook", self.target.delete_hook(project, id).await?)
            }
            Plan::Noop => Ok(ActionResult::ignore_because("webhook up to date")),
        }
    }

    /// The label only exists while auto-merge is on. A disabled policy carries
    /// no label name, so an existing label is left alone.
    async fn label(&self, policy: &RepoPolicy) -> HandlerResult<ActionResult> {
        let Some(merge) = &policy.auto_merge else {
            return Ok(ActionResult::ignore_because("auto-merge disabled"));
        };
        let repo = &policy.source_path;
        let observed = self
            .owner
            .get_label(repo, &merge.label.name)
            .await?
            .map(|label| ((), label));

        match plan(Desired::Enabled(merge.label.clone()), observed) {
            Plan::Create(label) => {
                self.owner.create_label(repo, &label).await?;
                info!(repo = %repo, "Created label '{}'", label.name);
                Ok(changed("created"))
            }
            Plan::Update((), label) => {
                self.owner.update_label(repo, &label).await?;
                info!(repo = %repo, "Updated label '{}'", label.name);
                Ok(changed("updated"))
            }
            Plan::Delete(()) | Plan::Noop => Ok(ActionResult::ignore_because("label up to date")),
        }
    }

    /// The bot needs write access while it merges or comments. Granting access
    /// produces an invitation the bot must accept; a pending one left by an
    /// earlier run is accepted before anything is granted again.
    async fn collaborator(&self, policy: &RepoPolicy) -> HandlerResult<ActionResult> {
        let repo = &policy.source_path;
        let bot = &self.settings.bot_login;
        if self.settings.owner_login.eq_ignore_ascii_case(bot) {
            return Ok(ActionResult::ignore_because("bot owns the repository"));
        }

        let wanted = policy.auto_merge.is_some() || policy.ci_failure.is_some();
        let granted = self.owner.is_collaborator(repo, bot).await?;

        match (wanted, granted) {
            (true, true) => Ok(ActionResult::ignore_because("bot already has access")),
            (true, false) => {
                if self.accept_pending(repo).await? {
                    return Ok(changed("accepted"));
                }
                self.owner.add_collaborator(repo, bot).await?;
                info!(repo = %repo, "Granted access to {}", bot);
                self.accept_pending(repo).await?;
                Ok(changed("granted"))
            }
            (false, true) => {
                self.deleted(repo, "collaborator", self.owner.remove_collaborator(repo, bot).await?)
            }
            (false, false) => Ok(ActionResult::ignore_because("bot has no access")),
        }
    }

    /// Accept the bot's pending invitations to `repo`. Returns whether any was found.
    async fn accept_pending(&self, repo: &str) -> HandlerResult<bool> {
        let pending: Vec<_> = self
            .bot
            .list_received_invitations()
            .await?
            .into_iter()
            .filter(|invitation| invitation.repo.eq_ignore_ascii_case(repo))
            .collect();
        for invitation in &pending {
            self.bot.accept_invitation(invitation.id).await?;
            info!(repo = %repo, "Accepted invitation {}", invitation.id);
        }
        Ok(!pending.is_empty())
    }

    fn deleted(&self, repo: &str, what: &str, deletion: Deletion) -> HandlerResult<ActionResult> {
        Ok(match deletion {
            Deletion::Deleted => {
                info!(repo = %repo, "Deleted {}", what);
                changed("deleted")
            }
            Deletion::NotFound => ActionResult::ignore_because(format!("{what} already absent")),
        })
    }
}
