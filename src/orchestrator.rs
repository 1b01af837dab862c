//! Drives every plan entry through the migration steps, one domain at a time
//!
//! ```text
//! Pending ─ gate ─▶ Preflight ─▶ Dump ─▶ Stage/Ship ─▶ DNS ─▶ Archive? ─▶ Delete? ─▶ Done
//!    │                  │                    │                    │           │
//!    └─▶ Skipped        └────────────────────┴──────▶ Failed ◀────┴───────────┘
//! ```
//!
//! Dump and DNS failures are warnings. Everything else that goes wrong ends
//! the domain as `Failed` and the loop moves on to the next one.

use crate::{
    config::MigrateConfig,
    dns::{self, DnsProvider},
    error::{Error, Stage, StageError, StageExt},
    gateway::{CommandSpec, Gateway, Session, quote},
    plan::{MigrationPlan, PlanEntry},
    schedule,
    site::ResolvedSite,
    steps::{self, Confirm, DeleteOutcome, StdinConfirm},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::{
    fmt,
    net::Ipv4Addr,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Set once an interrupt arrives; checked between domains
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancel on the first Ctrl-C; the domain in flight still finishes
    #[must_use]
    pub fn watch_ctrl_c(&self) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, no further domains will be started");
                flag.cancel();
            }
        })
    }
}

/// What was done for a domain that completed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Migrated {
    pub dumped: bool,
    pub staged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DeleteOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Done(Migrated),
    Skipped { reason: String },
    Failed { stage: Stage, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainResult {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<ResolvedSite>,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Local staging directory used for a remote source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging: Option<PathBuf>,
}

impl DomainResult {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            site: None,
            outcome: Outcome::Skipped {
                reason: "not started".to_string(),
            },
            warnings: Vec::new(),
            staging: None,
        }
    }

    fn skipped(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        info!("skipped: {reason}");
        self.outcome = Outcome::Skipped { reason };
        self
    }

    fn failed(mut self, err: &StageError) -> Self {
        error!(stage = %err.stage, "{}", err.source);
        self.outcome = Outcome::Failed {
            stage: err.stage,
            message: err.source.to_string(),
        };
        self
    }

    fn warn(&mut self, stage: Stage, message: impl fmt::Display) {
        warn!(stage = %stage, "{message}");
        self.warnings.push(format!("{stage}: {message}"));
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.outcome, Outcome::Done(_))
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }
}

/// Result of one run over a plan
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub domains: Vec<DomainResult>,
}

impl RunSummary {
    fn new(dry_run: bool, domains: Vec<DomainResult>) -> Self {
        Self {
            dry_run,
            done: domains.iter().filter(|d| d.is_done()).count(),
            skipped: domains.iter().filter(|d| d.is_skipped()).count(),
            failed: domains.iter().filter(|d| d.is_failed()).count(),
            domains,
        }
    }

    #[must_use]
    pub fn get(&self, domain: &str) -> Option<&DomainResult> {
        self.domains.iter().find(|d| d.domain == domain)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.domains {
            match &result.outcome {
                Outcome::Done(_) => writeln!(f, "{}: done", result.domain)?,
                Outcome::Skipped { reason } => writeln!(f, "{}: skipped ({reason})", result.domain)?,
                Outcome::Failed { stage, message } => {
                    writeln!(f, "{}: failed at {stage}: {message}", result.domain)?;
                }
            }
            for warning in &result.warnings {
                writeln!(f, "  warning: {warning}")?;
            }
        }
        write!(
            f,
            "{}{} done, {} skipped, {} failed",
            if self.dry_run { "[dry-run] " } else { "" },
            self.done,
            self.skipped,
            self.failed
        )?;

        let follow_ups = self.domains.iter().filter(|d| d.is_done()).filter_map(|d| d.site.as_ref());
        for site in follow_ups {
            let start = format!(
                "cd {} && docker compose up -d",
                quote(&site.target_site_path().display().to_string())
            );
            if site.target_is_local() {
                write!(f, "\nnext: run `{start}`")?;
            } else {
                write!(f, "\nnext: on {} run `{start}`", site.target_host)?;
            }
        }
        Ok(())
    }
}

pub struct Orchestrator {
    config: MigrateConfig,
    gateway: Gateway,
    dns: Option<Arc<dyn DnsProvider>>,
    confirm: Arc<dyn Confirm>,
    cancel: CancelFlag,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: MigrateConfig, gateway: Gateway) -> Self {
        Self {
            config,
            gateway,
            dns: None,
            confirm: Arc::new(StdinConfirm),
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn with_dns(mut self, provider: Arc<dyn DnsProvider>) -> Self {
        self.dns = Some(provider);
        self
    }

    #[must_use]
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Migrate every domain in `plan`, in domain order
    ///
    /// Never fails as a whole: each domain's outcome is in the summary.
    pub async fn run(&self, plan: &MigrationPlan) -> RunSummary {
        info!(
            "migrating {} domain(s){}",
            plan.len(),
            if self.gateway.dry_run() { " [dry-run]" } else { "" }
        );

        let mut results = Vec::with_capacity(plan.len());
        for (domain, entry) in plan {
            if self.cancel.is_cancelled() {
                results.push(DomainResult::new(domain).skipped("cancelled"));
                continue;
            }
            let span = info_span!("migrate", domain = %domain);
            results.push(self.migrate(domain, entry).instrument(span).await);
        }

        RunSummary::new(self.gateway.dry_run(), results)
    }

    async fn migrate(&self, domain: &str, entry: &PlanEntry) -> DomainResult {
        let mut result = DomainResult::new(domain);
        let now = Utc::now();

        if let Some(delay) = entry.delay_until.as_deref() {
            match schedule::resolve(delay, now) {
                Ok(gate) if !schedule::is_due(gate, now) => {
                    return result.skipped(format!(
                        "scheduled for {}",
                        gate.to_rfc3339_opts(SecondsFormat::Secs, true)
                    ));
                }
                Ok(gate) => debug!("gate {} reached", gate.to_rfc3339()),
                Err(e) => return result.failed(&StageError::new(Stage::Schedule, e)),
            }
        }

        let site = ResolvedSite::resolve(domain, entry, &self.config);
        info!(
            "{}:{} -> {}:{}",
            site.source_host,
            site.source_path.display(),
            site.target_host,
            site.target_site_path().display()
        );
        result.site = Some(site.clone());

        let source = match self.gateway.open(&site.source_host).await.at(Stage::Connect) {
            Ok(session) => session,
            Err(e) => return result.failed(&e),
        };
        let target = match self.gateway.open(&site.target_host).await.at(Stage::Connect) {
            Ok(session) => session,
            Err(e) => {
                self.gateway.close(source).await;
                return result.failed(&e);
            }
        };

        let steps = self.steps(&site, &source, &target, &mut result).await;

        self.gateway.close(source).await;
        self.gateway.close(target).await;

        match steps {
            Ok(migrated) => {
                info!("done");
                result.outcome = Outcome::Done(migrated);
                result
            }
            Err(e) => result.failed(&e),
        }
    }

    async fn steps(
        &self,
        site: &ResolvedSite,
        source: &Session,
        target: &Session,
        result: &mut DomainResult,
    ) -> Result<Migrated, StageError> {
        let mut migrated = Migrated::default();

        self.preflight(site, source, target, result).await?;

        if self.config.dump {
            match steps::dump_database(&self.gateway, source, &site.source_path).await {
                Ok(path) => {
                    debug!("database exported to {}", path.display());
                    migrated.dumped = true;
                }
                Err(e) => result.warn(Stage::Dump, e),
            }
        }

        if site.source_is_local() {
            steps::ship(&self.gateway, &site.source_path, site, target)
                .await
                .at(Stage::Ship)?;
        } else {
            let area = steps::stage(&self.gateway, site, source).await.at(Stage::Stage)?;
            result.staging = area.path().parent().map(PathBuf::from);
            migrated.staged = true;
            let shipped = steps::ship(&self.gateway, area.path(), site, target).await;
            area.cleanup();
            shipped.at(Stage::Ship)?;
        }

        migrated.dns = self.cutover(site, result).await;

        if self.config.archive.dir.is_some() {
            let archived = steps::archive(
                &self.gateway,
                source,
                &site.source_path,
                &self.config.archive,
                Utc::now(),
            )
            .await
            .at(Stage::Archive)?;
            migrated.archived = Some(archived);
        }

        if self.config.delete.enabled {
            if migrated.archived.is_some() {
                info!("source archived, nothing left to delete");
            } else {
                let outcome = steps::delete(
                    &self.gateway,
                    source,
                    &site.source_path,
                    self.config.delete.force,
                    self.confirm.as_ref(),
                )
                .await
                .at(Stage::Delete)?;
                if outcome == DeleteOutcome::Declined {
                    result.warnings.push(format!("{}: declined by user", Stage::Delete));
                }
                migrated.deleted = Some(outcome);
            }
        }

        Ok(migrated)
    }

    async fn preflight(
        &self,
        site: &ResolvedSite,
        source: &Session,
        target: &Session,
        result: &mut DomainResult,
    ) -> Result<(), StageError> {
        if site.targets_source() {
            return Err(StageError::new(
                Stage::Preflight,
                Error::Configuration(format!(
                    "source and target are the same directory {}:{}",
                    source.destination(),
                    site.source_path.display()
                )),
            ));
        }

        let source_dir = site.source_path.display().to_string();
        let exists = self
            .gateway
            .probe(source, &CommandSpec::new("test").arg("-d").arg(source_dir.as_str()))
            .await
            .at(Stage::Preflight)?;
        if !exists {
            return Err(StageError::new(
                Stage::Preflight,
                Error::NotFound(format!("source directory {}:{source_dir}", source.destination())),
            ));
        }

        if target.is_connected() {
            let target_dir = site.target_site_path().display().to_string();
            let occupied = self
                .gateway
                .probe(target, &CommandSpec::new("test").arg("-d").arg(target_dir.as_str()))
                .await
                .at(Stage::Preflight)?;
            if occupied {
                result.warn(
                    Stage::Preflight,
                    format!(
                        "{}:{target_dir} already exists, files will be merged",
                        target.destination()
                    ),
                );
            }
        }
        Ok(())
    }

    async fn cutover(&self, site: &ResolvedSite, result: &mut DomainResult) -> Option<Ipv4Addr> {
        if !self.config.dns.enabled {
            debug!("dns cutover disabled");
            return None;
        }
        let host = site.target_host_only();
        if self.gateway.dry_run() {
            info!(
                "[dry-run] would point the A record of {} at {host} (ttl {}, proxied {})",
                site.domain, self.config.dns.ttl, self.config.dns.proxied
            );
            return None;
        }
        let Some(provider) = self.dns.as_deref() else {
            result.warn(Stage::Dns, "no DNS credentials, record not updated");
            return None;
        };
        match dns::cutover(provider, &self.gateway, &site.domain, host, &self.config.dns).await {
            Ok(ip) => Some(ip),
            Err(e) => {
                result.warn(Stage::Dns, e);
                None
            }
        }
    }
}
