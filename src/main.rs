//! forge-bridge - Main entry point.
//!
//! Loads the configuration, resolves the account identities, starts the
//! Actix-web server and reconciles remote resources in the background.

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use forge_bridge::api;
use forge_bridge::auth::WebhookSecrets;
use forge_bridge::config::{Config, Settings};
use forge_bridge::middleware;
use forge_bridge::models::PolicySet;
use forge_bridge::platform::{GitHubClient, GitLabClient, SourcePlatform, TargetPlatform};
use forge_bridge::services::{
    CommentTemplate, EventRouter, GitCli, MirrorRemotes, ReconcileSettings,
    RemoteResourceReconciler, RouterContext, TokioScheduler,
};

fn exit_with(message: impl std::fmt::Display) -> ! {
    error!("{}", message);
    std::process::exit(1);
}

async fn reconcile_all(reconciler: RemoteResourceReconciler, policies: Arc<PolicySet>) {
    info!("Reconciling {} repository pair(s)", policies.len());
    for policy in policies.iter() {
        let report = reconciler.reconcile(policy).await;
        for (kind, result) in report.entries() {
            if result.is_error() {
                warn!(
                    repo = %policy.source_path,
                    "{}: {}",
                    kind,
                    result.note().unwrap_or_default()
                );
            } else {
                info!(
                    repo = %policy.source_path,
                    status = ?result.status(),
                    "{}: {}",
                    kind,
                    result.note().unwrap_or("changed")
                );
            }
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - GITHUB_TOKEN, GITHUB_BOT_TOKEN and GITHUB_SECRET must be set");
            error!("  - GITLAB_TOKEN and GITLAB_SECRET must be set");
            std::process::exit(1);
        }
    };

    let settings = Settings::load(&config.settings_path)
        .await
        .unwrap_or_else(|e| exit_with(e));

    let template = match &config.ci_failure_template {
        Some(path) => CommentTemplate::from_file(path).await.unwrap_or_else(|e| {
            exit_with(format!("Cannot read comment template {}: {}", path.display(), e))
        }),
        None => CommentTemplate::default(),
    };

    let owner = GitHubClient::new(&config.github_api_url, &config.github_token)
        .unwrap_or_else(|e| exit_with(e));
    let bot = GitHubClient::new(&config.github_api_url, &config.github_bot_token)
        .unwrap_or_else(|e| exit_with(e));
    let gitlab = GitLabClient::new(&settings.gl_base_url, &config.gitlab_token)
        .unwrap_or_else(|e| exit_with(e));

    let owner_login = owner
        .current_login()
        .await
        .unwrap_or_else(|e| exit_with(format!("Cannot resolve owner account: {e}")));
    let bot_login = bot
        .current_login()
        .await
        .unwrap_or_else(|e| exit_with(format!("Cannot resolve bot account: {e}")));

    let policies = Arc::new(
        settings
            .policies(&owner_login, &bot_login)
            .unwrap_or_else(|e| exit_with(e)),
    );

    info!("========================================");
    info!("  forge-bridge");
    info!("  Owner: {}  Bot: {}", owner_login, bot_login);
    info!("  Repository pairs: {}", policies.len());
    info!("========================================");

    let owner: Arc<dyn SourcePlatform> = Arc::new(owner);
    let bot: Arc<dyn SourcePlatform> = Arc::new(bot);
    let gitlab: Arc<dyn TargetPlatform> = Arc::new(gitlab);

    let router = web::Data::new(EventRouter::new(RouterContext {
        policies: policies.clone(),
        source: bot.clone(),
        target: gitlab.clone(),
        transport: Arc::new(GitCli),
        scheduler: Arc::new(TokioScheduler),
        template: Arc::new(template),
        remotes: MirrorRemotes {
            source_base: config.github_url.clone(),
            source_token: config.github_token.clone(),
            target_base: settings.gl_base_url.clone(),
            target_token: config.gitlab_token.clone(),
        },
    }));
    let secrets = web::Data::new(WebhookSecrets::new(
        config.github_secret.clone(),
        config.gitlab_secret.clone(),
    ));

    let reconciler = RemoteResourceReconciler::new(
        owner,
        bot,
        gitlab,
        ReconcileSettings {
            base_url: settings.base_url.clone(),
            source_secret: config.github_secret.clone(),
            target_secret: config.gitlab_secret.clone(),
            owner_login,
            bot_login,
        },
    );

    let bind_address = config.bind_address();
    let cpus = num_cpus::get();
    info!("Starting server at http://{} ({} workers)", bind_address, cpus);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::RequestLogger)
            .app_data(router.clone())
            .app_data(secrets.clone())
            .configure(api::configure_health_routes)
            .configure(api::configure_webhook_routes)
            .service(web::scope("/api").configure(api::configure_button_routes))
    })
    .workers(cpus)
    .bind(&bind_address)?
    .run();

    // Bound; hooks registered from here on can be delivered
    actix_web::rt::spawn(reconcile_all(reconciler, policies));

    server.await
}
