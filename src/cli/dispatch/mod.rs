use crate::{
    cli::actions::Action,
    config::{
        ArchiveOptions, CompressionKind, DeleteOptions, DnsCredentials, DnsOptions, MigrateConfig,
        PlanSource, SshOptions,
    },
    schedule,
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::ArgMatches;
use std::{path::PathBuf, time::Duration};

/// Verbosity requested with `-v`
#[must_use]
pub fn verbosity(matches: &ArgMatches) -> u8 {
    matches.get_count("verbose")
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if no plan source is given, or an option value is
/// invalid or inconsistent
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("migrate", sub)) => migrate(sub),
        Some((name, _)) => bail!("unknown command: {name}"),
        None => bail!("no command given, try --help"),
    }
}

fn migrate(matches: &ArgMatches) -> Result<Action> {
    let string = |id: &str| matches.get_one::<String>(id).cloned();

    let target = string("target");
    let source = match (string("plan"), string("sites")) {
        (Some(plan), None) => PlanSource::Document(PathBuf::from(plan)),
        (None, Some(pattern)) => PlanSource::Glob {
            pattern,
            target: target
                .clone()
                .context("--sites requires --target")?,
        },
        (Some(_), Some(_)) => bail!("use either --plan or --sites, not both"),
        (None, None) => bail!("either --plan or --sites with --target is required"),
    };

    let mut config = MigrateConfig::new(source);
    if config.default_target.is_none() {
        config.default_target = target;
    }

    if let Some(base) = string("base-path") {
        config.base_path = PathBuf::from(base);
    }
    config.target_path = string("target-path").map_or_else(|| config.base_path.clone(), PathBuf::from);
    config.dry_run = matches.get_flag("dry-run");
    config.dump = !matches.get_flag("skip-dump");

    // fail before anything runs, not once per domain
    if let Some(delay) = string("delay-until") {
        schedule::resolve(&delay, Utc::now())
            .with_context(|| format!("Invalid --delay-until: {delay}"))?;
        config.delay_until = Some(delay);
    }

    config.archive = archive_options(matches)?;

    let force = matches.get_flag("force-delete");
    config.delete = DeleteOptions {
        enabled: force || matches.get_flag("delete"),
        force,
    };

    config.dns = DnsOptions {
        enabled: !matches.get_flag("skip-dns"),
        credentials: dns_credentials(string("cf-api-token"), string("cf-email"), string("cf-api-key"))?,
        ttl: matches.get_one::<u32>("dns-ttl").copied().unwrap_or(120),
        proxied: !matches.get_flag("no-proxy"),
        ..DnsOptions::default()
    };

    config.ssh = SshOptions {
        user: string("ssh-user"),
        port: matches.get_one::<u16>("ssh-port").copied().unwrap_or(22),
        key: string("ssh-key").map(PathBuf::from),
        timeout: Duration::from_secs(matches.get_one::<u64>("ssh-timeout").copied().unwrap_or(10)),
    };

    Ok(Action::Migrate {
        config,
        json: matches.get_flag("json"),
    })
}

fn archive_options(matches: &ArgMatches) -> Result<ArchiveOptions> {
    let compression = matches
        .get_one::<String>("compression")
        .map(|kind| kind.parse::<CompressionKind>().map_err(|e| anyhow!(e)))
        .transpose()?
        .unwrap_or_default();

    let options = ArchiveOptions {
        dir: matches.get_one::<String>("archive-dir").map(PathBuf::from),
        timestamp: matches.get_flag("archive-timestamp"),
        compress: matches.get_flag("archive-compress"),
        compression,
    };
    if options.dir.is_none() && (options.compress || options.timestamp) {
        bail!("--archive-compress and --archive-timestamp require --archive-dir");
    }
    Ok(options)
}

/// A token wins over email + key; a lone email or key is an error
fn dns_credentials(
    token: Option<String>,
    email: Option<String>,
    key: Option<String>,
) -> Result<Option<DnsCredentials>> {
    let token = token.filter(|t| !t.is_empty());
    let email = email.filter(|e| !e.is_empty());
    let key = key.filter(|k| !k.is_empty());
    match (token, email, key) {
        (Some(token), _, _) => Ok(Some(DnsCredentials::Token(token))),
        (None, Some(email), Some(key)) => Ok(Some(DnsCredentials::Key { email, key })),
        (None, Some(_), None) => bail!("--cf-email requires --cf-api-key"),
        (None, None, Some(_)) => bail!("--cf-api-key requires --cf-email"),
        (None, None, None) => Ok(None),
    }
}
