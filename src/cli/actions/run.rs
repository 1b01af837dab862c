use super::Action;
use crate::{
    config::{MigrateConfig, PlanSource},
    dns::Cloudflare,
    gateway::{Gateway, ProcessRunner},
    orchestrator::{CancelFlag, Orchestrator},
    plan::MigrationPlan,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Migrate { config, json } => migrate(config, json).await,
    }
}

/// Build the plan described by `config`, with the global delay applied
///
/// # Errors
///
/// Returns an error if the plan document or glob cannot produce a plan
pub fn build_plan(config: &MigrateConfig) -> Result<MigrationPlan> {
    let plan = match &config.source {
        PlanSource::Document(path) => {
            MigrationPlan::from_document(path, config.default_target.as_deref())
                .with_context(|| format!("Failed to load plan {}", path.display()))?
        }
        PlanSource::Glob { pattern, target } => {
            MigrationPlan::from_glob(pattern, target, &config.base_path)
                .with_context(|| format!("Failed to expand {pattern}"))?
        }
    };
    Ok(plan.with_default_delay(config.delay_until.as_deref()))
}

async fn migrate(config: MigrateConfig, json: bool) -> Result<()> {
    let plan = build_plan(&config)?;

    let gateway = Gateway::new(Arc::new(ProcessRunner), config.ssh.clone(), config.dry_run);
    let cancel = CancelFlag::new();
    let watcher = cancel.watch_ctrl_c();

    let mut orchestrator = Orchestrator::new(config.clone(), gateway).with_cancel(cancel);
    if config.dns.enabled {
        match config.dns.credentials.clone() {
            Some(credentials) => {
                let provider = Cloudflare::new(credentials, config.dns.timeout)
                    .context("Failed to create DNS client")?;
                orchestrator = orchestrator.with_dns(Arc::new(provider));
            }
            None if !config.dry_run => {
                warn!("no Cloudflare credentials, DNS records will not be updated");
            }
            None => {}
        }
    }

    let summary = orchestrator.run(&plan).await;
    watcher.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }

    Ok(())
}
