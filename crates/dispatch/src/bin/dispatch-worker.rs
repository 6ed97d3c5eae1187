//! dispatch-worker: runs the background loops of the dispatch system.
//!
//! - Loads law rule tables (optionally hot-reloading them)
//! - `run`: retry worker for due notifications plus the dispatch expiry sweeper
//! - `evaluate`: one-shot rule evaluation, printed as JSON
//! - `dispatch`: one-shot dispatch creation from a JSON params file
//!
//! Repositories are in-memory; responders are seeded from a JSON file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

use welfare_core::config::load_dotenv;
use welfare_core::{Config, Jurisdiction};
use welfare_dispatch::{
    DispatchOrchestrator, DispatchParams, ExpirySweeper, InMemoryDispatchRepository,
    OrchestratorConfig, Responder, TracingPoliceLog,
};
use welfare_notify::{
    DeliveryManager, InMemoryNotificationStore, MessageCarrier, NotificationRouter, RetryWorker,
    RouteTable, TemplateRenderer, TracingCarrier, WebhookCarrier,
};
use welfare_rules::loader::{LoadStatus, RuleTableLoader};
use welfare_rules::schema::TriggerCategory;
use welfare_rules::RuleEngine;

// ── CLI ─────────────────────────────────────────────────────────────

/// Animal welfare dispatch worker.
#[derive(Parser, Debug)]
#[command(name = "dispatch-worker", version, about)]
struct Cli {
    /// Config profile (overrides WELFARE_PROFILE).
    #[arg(long, env = "WELFARE_PROFILE")]
    profile: Option<String>,

    /// Rule table directory (overrides LAW_RULES_DIR).
    #[arg(long)]
    rules_dir: Option<PathBuf>,

    /// JSON file with the responder roster.
    #[arg(long, env = "DISPATCH_RESPONDERS_FILE")]
    responders: Option<PathBuf>,

    /// YAML file with notification route overrides.
    #[arg(long, env = "NOTIFY_ROUTES_FILE")]
    routes: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the retry worker and expiry sweeper until Ctrl-C.
    Run,
    /// Evaluate a trigger set and print the verdict.
    Evaluate {
        #[arg(long)]
        jurisdiction: String,
        /// Comma-separated trigger categories, e.g. `neglect,hot_vehicle`.
        #[arg(long, value_delimiter = ',')]
        triggers: Vec<String>,
    },
    /// Create a dispatch from a JSON params file and print the outcome.
    Dispatch {
        #[arg(long)]
        params: PathBuf,
    },
}

// ── wiring ──────────────────────────────────────────────────────────

fn load_rules(config: &Config) -> anyhow::Result<RuleTableLoader> {
    let mut loader = RuleTableLoader::new(config.rules.rules_dir.clone());
    let results = loader
        .load_all()
        .with_context(|| format!("loading rule tables from {}", config.rules.rules_dir.display()))?;
    for result in &results {
        match &result.status {
            LoadStatus::Failed { error } => {
                warn!(path = %result.path.display(), error = %error, "rule table failed to load")
            }
            LoadStatus::Skipped { reason } => {
                info!(path = %result.path.display(), reason = %reason, "rule table skipped")
            }
            LoadStatus::Loaded { .. } => {}
        }
    }
    info!(tables = loader.len(), "rule tables loaded");

    if config.rules.watch {
        loader.watch().context("starting rule table watcher")?;
    }
    Ok(loader)
}

fn load_responders(path: Option<&Path>) -> anyhow::Result<Vec<Responder>> {
    let Some(path) = path else {
        warn!("no responder roster configured, dispatches will alert nobody");
        return Ok(Vec::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading responders from {}", path.display()))?;
    let responders: Vec<Responder> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing responders from {}", path.display()))?;
    info!(count = responders.len(), "responders loaded");
    Ok(responders)
}

fn load_routes(path: Option<&Path>, config: &Config) -> anyhow::Result<RouteTable> {
    let table = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading routes from {}", path.display()))?;
            RouteTable::from_yaml_str(&raw)?
        }
        None => RouteTable::default(),
    };
    Ok(table.with_escalation_role(config.notify.escalation_role.clone()))
}

fn build_carrier(config: &Config) -> anyhow::Result<Arc<dyn MessageCarrier>> {
    match &config.notify.gateway_url {
        Some(url) => {
            let carrier = WebhookCarrier::from_config(
                url.clone(),
                None,
                None,
                None,
                Arc::new(TemplateRenderer::new()),
            )?;
            info!("delivering through webhook gateway");
            Ok(Arc::new(carrier))
        }
        None => {
            warn!("NOTIFY_GATEWAY_URL not set, messages will only be logged");
            Ok(Arc::new(TracingCarrier))
        }
    }
}

fn parse_triggers(raw: &[String]) -> anyhow::Result<BTreeSet<TriggerCategory>> {
    raw.iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<TriggerCategory>().map_err(anyhow::Error::msg))
        .collect()
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(dir) = &cli.rules_dir {
        config.rules.rules_dir = dir.clone();
    }
    if !matches!(cli.command, Command::Run) {
        config.rules.watch = false;
    }
    config.log_summary();

    let loader = load_rules(&config)?;
    let engine = Arc::new(RuleEngine::new(Arc::new(loader)));

    let notification_store = Arc::new(InMemoryNotificationStore::new());
    let router = NotificationRouter::new(load_routes(cli.routes.as_deref(), &config)?);
    let delivery = Arc::new(DeliveryManager::new(
        notification_store,
        build_carrier(&config)?,
        router,
    ));

    let repo = Arc::new(InMemoryDispatchRepository::with_responders(load_responders(
        cli.responders.as_deref(),
    )?));

    match cli.command {
        Command::Evaluate { jurisdiction, triggers } => {
            let triggers = parse_triggers(&triggers)?;
            let result = engine.evaluate(&Jurisdiction::new(jurisdiction), &triggers).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Dispatch { params } => {
            let raw = std::fs::read_to_string(&params)
                .with_context(|| format!("reading dispatch params from {}", params.display()))?;
            let params: DispatchParams = serde_json::from_str(&raw).context("parsing dispatch params")?;
            let orchestrator = DispatchOrchestrator::new(
                engine,
                repo,
                delivery,
                Arc::new(TracingPoliceLog),
                OrchestratorConfig::from(&config),
            );
            let outcome = orchestrator.create_dispatch(params).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Run => {
            let shutdown = Arc::new(Notify::new());

            let (escalation_tx, mut escalation_rx) = mpsc::unbounded_channel();
            let retry_worker = Arc::new(
                RetryWorker::new(
                    delivery.clone(),
                    Duration::from_secs(config.notify.retry_poll_secs),
                    config.notify.retry_batch_size as usize,
                )
                .with_escalation_channel(escalation_tx),
            );
            let sweeper = Arc::new(ExpirySweeper::new(
                repo.clone(),
                Duration::from_secs(config.dispatch.expiry_sweep_secs),
            ));

            let escalations = tokio::spawn(async move {
                while let Some(signal) = escalation_rx.recv().await {
                    warn!(
                        notification_id = %signal.notification_id,
                        dispatch_id = ?signal.dispatch_id,
                        recipient_id = %signal.recipient_id,
                        role = %signal.role,
                        attempts = signal.attempts,
                        reason = %signal.reason,
                        "notification escalation required"
                    );
                }
            });
            let retry_handle = {
                let worker = retry_worker.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            };
            let sweep_handle = {
                let sweeper = sweeper.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { sweeper.run(shutdown).await })
            };

            info!("dispatch-worker running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("shutdown requested");
            shutdown.notify_waiters();

            retry_handle.await?;
            sweep_handle.await?;
            // Last sender goes with the worker; the escalation loop drains and exits.
            drop(retry_worker);
            escalations.await?;
            info!("dispatch-worker exited cleanly");
        }
    }

    Ok(())
}
