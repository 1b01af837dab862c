//! Database export before transfer
//!
//! Sites run under `docker compose`; the service carrying `MYSQL_DATABASE`
//! (or `MARIADB_DATABASE`, or a mysql/mariadb image) is asked for a
//! `mysqldump` written next to the site files. Every failure here is
//! advisory: an older dump already in the tree is better than no migration.

use crate::{
    error::{Error, Result},
    gateway::{CommandSpec, Gateway, Session},
};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Service descriptor names probed in the site directory, in order
pub const DESCRIPTORS: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// File the export is written to, inside the site directory
pub const DUMP_FILE: &str = "database.sql";

const DUMP_SCRIPT: &str = r#"exec mysqldump --single-transaction --routines -uroot -p"${MYSQL_ROOT_PASSWORD:-$MARIADB_ROOT_PASSWORD}" "$1""#;

#[derive(Debug, Default, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, Service>,
}

#[derive(Debug, Default, Deserialize)]
struct Service {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    environment: Option<Environment>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Environment {
    Map(BTreeMap<String, serde_yaml::Value>),
    List(Vec<String>),
}

impl Environment {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Map(map) => map.get(key).and_then(|v| match v {
                serde_yaml::Value::String(s) => Some(s.clone()),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            Self::List(items) => items.iter().find_map(|item| {
                item.split_once('=')
                    .filter(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            }),
        }
    }
}

/// The database service and database name found in a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseService {
    pub service: String,
    pub database: String,
}

/// Find the database-bearing service in a compose document
///
/// # Errors
///
/// Returns [`Error::NotFound`] when no service looks like a database or it
/// does not name its database
pub fn find_database(descriptor: &str) -> Result<DatabaseService> {
    let compose: ComposeFile = serde_yaml::from_str(descriptor)
        .map_err(|e| Error::NotFound(format!("database service (unreadable descriptor: {e})")))?;

    let database_of = |service: &Service| {
        service.environment.as_ref().and_then(|env| {
            env.get("MYSQL_DATABASE")
                .or_else(|| env.get("MARIADB_DATABASE"))
                .filter(|db| !db.is_empty())
        })
    };

    let by_env = compose
        .services
        .iter()
        .find_map(|(name, service)| database_of(service).map(|db| (name, db)));
    if let Some((name, database)) = by_env {
        return Ok(DatabaseService {
            service: name.clone(),
            database,
        });
    }

    let by_image = compose.services.iter().find(|(_, service)| {
        service
            .image
            .as_deref()
            .is_some_and(|image| image.contains("mysql") || image.contains("mariadb"))
    });
    match by_image {
        Some((name, _)) => Err(Error::NotFound(format!(
            "database name for service {name} (no MYSQL_DATABASE)"
        ))),
        None => Err(Error::NotFound("database service".to_string())),
    }
}

/// Export the site's database into `<site>/database.sql`
///
/// The dump goes to a temporary file first so a failed export leaves any
/// previous dump in place.
///
/// # Errors
///
/// Returns an error if the descriptor or service cannot be found or the
/// export fails; callers treat all of these as warnings
pub async fn dump_database(gateway: &Gateway, session: &Session, site_dir: &Path) -> Result<PathBuf> {
    let target = site_dir.join(DUMP_FILE);

    if !session.is_connected() {
        info!(
            "[dry-run] would export database on {} to {}",
            session.destination(),
            target.display()
        );
        return Ok(target);
    }

    let mut descriptor = None;
    for name in DESCRIPTORS {
        let path = site_dir.join(name);
        let exists = gateway
            .probe(session, &CommandSpec::new("test").arg("-f").arg(path.display().to_string()))
            .await?;
        if exists {
            descriptor = Some(path);
            break;
        }
    }
    let descriptor = descriptor.ok_or_else(|| {
        Error::NotFound(format!("service descriptor in {}", site_dir.display()))
    })?;

    let content = gateway
        .run(session, &CommandSpec::new("cat").arg(descriptor.display().to_string()))
        .await?;
    if !content.success() {
        return Err(Error::NotFound(format!(
            "{} ({})",
            descriptor.display(),
            content.reason()
        )));
    }
    let db = find_database(&content.stdout)?;

    let partial = site_dir.join(format!(".{DUMP_FILE}.partial"));
    let export = CommandSpec::new("docker")
        .args(["compose", "-f"])
        .arg(descriptor.display().to_string())
        .args(["exec", "-T"])
        .arg(db.service.as_str())
        .args(["sh", "-c", DUMP_SCRIPT, "sh"])
        .arg(db.database.as_str())
        .stdout_to(partial.display().to_string());

    info!(
        "exporting database {} from service {} to {}",
        db.database,
        db.service,
        target.display()
    );
    if let Err(e) = gateway.act(session, &export).await {
        let cleanup = CommandSpec::new("rm")
            .arg("-f")
            .arg(partial.display().to_string());
        if let Err(cleanup_err) = gateway.act(session, &cleanup).await {
            warn!("failed to remove {}: {cleanup_err}", partial.display());
        }
        return Err(e);
    }

    let commit = CommandSpec::new("mv")
        .arg("-f")
        .arg(partial.display().to_string())
        .arg(target.display().to_string());
    gateway.act(session, &commit).await?;
    Ok(target)
}
