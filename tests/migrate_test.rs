#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{Answer, FakeDns, Scripted};
use sitehop::{
    error::Stage,
    orchestrator::{CancelFlag, Orchestrator, Outcome},
    plan::PlanEntry,
    steps::DeleteOutcome,
};
use std::{net::Ipv4Addr, path::PathBuf, sync::Arc};

const MUTATING: &[&str] = &["rsync", "mv", "mkdir", "rm", "tar", "sh", "docker"];

#[tokio::test]
async fn dry_run_logs_every_step_and_changes_nothing() {
    let root = common::site_root(&["a.example.com"]);
    let archive = tempfile::tempdir().unwrap();
    let runner = Scripted::new();

    let mut config = common::config(root.path(), true);
    config.archive.dir = Some(archive.path().join("old"));
    config.delete.enabled = true;
    config.dns.enabled = true;

    let plan = common::plan(&[("a.example.com", "local", "host2")]);
    let orchestrator = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .with_dns(Arc::new(FakeDns::default()));
    let summary = orchestrator.run(&plan).await;

    assert_eq!((summary.done, summary.failed, summary.skipped), (1, 0, 0));
    assert!(summary.dry_run);

    // only read-only probes reach the runner
    let programs = runner.programs();
    assert!(programs.iter().all(|p| !MUTATING.contains(&p.as_str())), "{programs:?}");
    assert!(programs.iter().all(|p| p != "ssh"), "host2 must not be contacted");

    assert!(root.path().join("a.example.com").is_dir());
    assert!(!archive.path().join("old").exists());
    assert!(summary.to_string().contains("[dry-run] 1 done, 0 skipped, 0 failed"));
}

#[tokio::test]
async fn missing_local_source_fails_preflight() {
    let root = common::site_root(&["b.example.com"]);
    let runner = Scripted::new();
    let config = common::config(root.path(), false);

    let plan = common::plan(&[
        ("a.example.com", "local", "host2"),
        ("b.example.com", "local", "host2"),
    ]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;

    let failed = summary.get("a.example.com").unwrap();
    match &failed.outcome {
        Outcome::Failed { stage, message } => {
            assert_eq!(*stage, Stage::Preflight);
            assert!(message.contains("not found"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(summary.get("b.example.com").unwrap().is_done());
    assert_eq!((summary.done, summary.failed), (1, 1));
}

#[tokio::test]
async fn failed_ship_is_isolated_and_staging_is_removed() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Arc::new(Scripted {
        fail_ship: vec!["a.example.com".to_string()],
        ..Scripted::default()
    });
    let config = common::config(root.path(), false);

    let plan = common::plan(&[
        ("a.example.com", "local", "host2"),
        ("b.example.com", "deploy@host1", "host2"),
    ]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;

    assert_eq!((summary.done, summary.failed), (1, 1));
    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Failed { stage, message } => {
            assert_eq!(*stage, Stage::Ship);
            assert!(message.contains("code 23"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let second = summary.get("b.example.com").unwrap();
    match &second.outcome {
        Outcome::Done(migrated) => assert!(migrated.staged),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let staging = second.staging.clone().unwrap();
    assert!(!staging.exists(), "{} still exists", staging.display());

    let text = summary.to_string();
    assert!(text.contains("a.example.com: failed at ship"));
    assert!(text.contains("next: on host2 run `cd /var/opt/b.example.com && docker compose up -d`"));

    // every control connection that was opened is closed again
    let calls = runner.calls();
    let opened = calls
        .iter()
        .filter(|c| c.get_args().iter().any(|a| a == "ControlMaster=yes"))
        .count();
    let closed = calls
        .iter()
        .filter(|c| c.get_args().iter().any(|a| a == "exit"))
        .count();
    assert_eq!(opened, 3);
    assert_eq!(opened, closed);
}

#[tokio::test]
async fn rerun_after_archive_reports_not_found() {
    let root = common::site_root(&["a.example.com"]);
    let archive = tempfile::tempdir().unwrap();
    let runner = Scripted::new();

    let mut config = common::config(root.path(), false);
    config.archive.dir = Some(archive.path().to_path_buf());
    let plan = common::plan(&[("a.example.com", "local", "host2")]);
    let orchestrator = Orchestrator::new(config.clone(), common::gateway(&runner, &config));

    let first = orchestrator.run(&plan).await;
    match &first.get("a.example.com").unwrap().outcome {
        Outcome::Done(migrated) => {
            assert!(migrated.dumped);
            assert_eq!(
                migrated.archived,
                Some(archive.path().join("a.example.com"))
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!root.path().join("a.example.com").exists());
    assert!(archive.path().join("a.example.com/database.sql").is_file());

    let second = orchestrator.run(&plan).await;
    match &second.get("a.example.com").unwrap().outcome {
        Outcome::Failed { stage, message } => {
            assert_eq!(*stage, Stage::Preflight);
            assert!(message.contains("not found"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn future_delay_is_skipped_and_past_delay_runs() {
    let root = common::site_root(&["a.example.com", "b.example.com"]);
    let runner = Scripted::new();
    let config = common::config(root.path(), false);

    let mut plan = common::plan(&[]);
    plan.insert(
        "a.example.com",
        PlanEntry {
            from: "local".into(),
            to: "host2".into(),
            delay_until: Some("in 2h".into()),
        },
    )
    .unwrap();
    plan.insert(
        "b.example.com",
        PlanEntry {
            from: "local".into(),
            to: "host2".into(),
            delay_until: Some("1 hour ago".into()),
        },
    )
    .unwrap();

    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;

    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Skipped { reason } => assert!(reason.starts_with("scheduled for "), "{reason}"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(summary.get("b.example.com").unwrap().is_done());
}

#[tokio::test]
async fn invalid_delay_fails_only_its_domain() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Scripted::new();
    let config = common::config(root.path(), false);

    let mut plan = common::plan(&[]);
    plan.insert(
        "a.example.com",
        PlanEntry {
            from: "local".into(),
            to: "host2".into(),
            delay_until: Some("sometime soonish".into()),
        },
    )
    .unwrap();

    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;
    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Failed { stage, .. } => assert_eq!(*stage, Stage::Schedule),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn unreachable_target_fails_connect() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Arc::new(Scripted {
        unreachable: vec!["down.example.net".to_string()],
        ..Scripted::default()
    });
    let config = common::config(root.path(), false);

    let plan = common::plan(&[("a.example.com", "local", "down.example.net")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;
    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Failed { stage, message } => {
            assert_eq!(*stage, Stage::Connect);
            assert!(message.contains("Connection refused"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(root.path().join("a.example.com").is_dir());
}

#[tokio::test]
async fn dns_cutover_uses_provider() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Scripted::new();
    let mut config = common::config(root.path(), false);
    config.dns.enabled = true;
    config.dns.proxied = false;

    let dns = Arc::new(FakeDns::default());
    let plan = common::plan(&[("a.example.com", "local", "deploy@192.0.2.10")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .with_dns(dns.clone())
        .run(&plan)
        .await;

    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Done(migrated) => assert_eq!(migrated.dns, Some(Ipv4Addr::new(192, 0, 2, 10))),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let updates = dns.updates.lock().unwrap();
    let update = updates.first().unwrap();
    assert_eq!(update.name, "a.example.com");
    assert_eq!(update.ttl, 120);
    assert!(!update.proxied);
}

#[tokio::test]
async fn missing_dns_credentials_is_a_warning() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Scripted::new();
    let mut config = common::config(root.path(), false);
    config.dns.enabled = true;

    let plan = common::plan(&[("a.example.com", "local", "host2")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;
    let result = summary.get("a.example.com").unwrap();
    assert!(result.is_done());
    assert!(result.warnings.iter().any(|w| w.starts_with("dns: ")), "{:?}", result.warnings);
}

#[tokio::test]
async fn declined_delete_keeps_source() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Scripted::new();
    let mut config = common::config(root.path(), false);
    config.delete.enabled = true;

    let plan = common::plan(&[("a.example.com", "local", "host2")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .with_confirm(Arc::new(Answer(false)))
        .run(&plan)
        .await;

    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Done(migrated) => assert_eq!(migrated.deleted, Some(DeleteOutcome::Declined)),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!runner.programs().contains(&"rm".to_string()));
}

#[tokio::test]
async fn confirmed_delete_removes_source() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Scripted::new();
    let mut config = common::config(root.path(), false);
    config.delete.enabled = true;

    let plan = common::plan(&[("a.example.com", "local", "host2")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .with_confirm(Arc::new(Answer(true)))
        .run(&plan)
        .await;

    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Done(migrated) => assert_eq!(migrated.deleted, Some(DeleteOutcome::Deleted)),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let source = root.path().join("a.example.com").display().to_string();
    assert!(runner
        .calls()
        .iter()
        .any(|c| c.program() == "rm" && c.get_args().last() == Some(&source)));
}

#[tokio::test]
async fn cancelled_run_starts_no_domain() {
    let root = common::site_root(&["a.example.com", "b.example.com"]);
    let runner = Scripted::new();
    let config = common::config(root.path(), false);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let plan = common::plan(&[
        ("a.example.com", "local", "host2"),
        ("b.example.com", "local", "host2"),
    ]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .with_cancel(cancel)
        .run(&plan)
        .await;

    assert_eq!(summary.skipped, 2);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn explicit_target_path_is_used_as_site_directory() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Scripted::new();
    let config = common::config(root.path(), false);

    let plan = common::plan(&[("a.example.com", "local", "host2:/srv/www/a.example.com")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;
    assert!(summary.get("a.example.com").unwrap().is_done());

    let ship = runner
        .calls()
        .into_iter()
        .find(|c| c.program() == "rsync")
        .unwrap();
    assert_eq!(
        ship.get_args().last().map(String::as_str),
        Some("host2:/srv/www/a.example.com/")
    );
    let source: PathBuf = root.path().join("a.example.com");
    assert!(ship.get_args().contains(&format!("{}/", source.display())));
}

#[tokio::test]
async fn same_source_and_target_directory_is_refused() {
    let root = common::site_root(&["a.example.com"]);
    let runner = Scripted::new();
    let mut config = common::config(root.path(), false);
    config.target_path = root.path().to_path_buf();
    config.delete.enabled = true;
    config.delete.force = true;

    let plan = common::plan(&[("a.example.com", "local", "local")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;

    match &summary.get("a.example.com").unwrap().outcome {
        Outcome::Failed { stage, message } => {
            assert_eq!(*stage, Stage::Preflight);
            assert!(message.contains("same directory"), "{message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let programs = runner.programs();
    assert!(!programs.iter().any(|p| p == "rsync" || p == "rm"), "{programs:?}");
    assert!(root.path().join("a.example.com").is_dir());
}

#[tokio::test]
async fn failed_ship_from_remote_source_removes_staging() {
    let root = common::site_root(&[]);
    let runner = Arc::new(Scripted {
        fail_ship: vec!["r.example.com".to_string()],
        ..Scripted::default()
    });
    let config = common::config(root.path(), false);

    let plan = common::plan(&[("r.example.com", "deploy@host1", "host2")]);
    let summary = Orchestrator::new(config.clone(), common::gateway(&runner, &config))
        .run(&plan)
        .await;

    let result = summary.get("r.example.com").unwrap();
    match &result.outcome {
        Outcome::Failed { stage, .. } => assert_eq!(*stage, Stage::Ship),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let staging = result.staging.clone().unwrap();
    assert!(!staging.exists(), "{} still exists", staging.display());
}
