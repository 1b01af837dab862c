use crate::{
    config::ArchiveOptions,
    error::{Error, Result},
    gateway::{CommandSpec, Gateway, Session},
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the archived directory, optionally suffixed with a timestamp
#[must_use]
pub fn archive_name(source: &Path, timestamp: Option<DateTime<Utc>>) -> String {
    let base = source
        .file_name()
        .map_or_else(|| "site".to_string(), |n| n.to_string_lossy().into_owned());
    match timestamp {
        Some(ts) => format!("{base}-{}", ts.format("%Y%m%d-%H%M%S")),
        None => base,
    }
}

/// Move `source` into the archive root on the session's host
///
/// A plain `mv` is tried first; when it fails the tree is copied with rsync
/// and the source removed. With compression enabled the moved directory is
/// replaced by a single tarball. Returns the final archive path.
///
/// # Errors
///
/// Returns an error if no archive root is configured, the destination
/// already exists, or the move/copy/compression fails
pub async fn archive(
    gateway: &Gateway,
    session: &Session,
    source: &Path,
    options: &ArchiveOptions,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let root = options
        .dir
        .as_deref()
        .ok_or_else(|| Error::Configuration("archive directory not set".to_string()))?;
    let name = archive_name(source, options.timestamp.then_some(now));
    let destination = root.join(&name);
    let source_str = source.display().to_string();
    let destination_str = destination.display().to_string();

    let exists = gateway
        .probe(session, &CommandSpec::new("test").arg("-e").arg(destination_str.as_str()))
        .await?;
    if exists && session.is_connected() {
        return Err(Error::Command {
            host: session.destination().to_string(),
            command: format!("archive {source_str}"),
            reason: format!("{destination_str} already exists"),
        });
    }

    gateway
        .act(
            session,
            &CommandSpec::new("mkdir").arg("-p").arg(root.display().to_string()),
        )
        .await?;

    info!("archiving {source_str} to {destination_str}");
    let moved = gateway
        .act(
            session,
            &CommandSpec::new("mv")
                .arg("--")
                .arg(source_str.as_str())
                .arg(destination_str.as_str()),
        )
        .await;
    if let Err(e) = moved {
        warn!("mv failed ({e}), copying instead");
        gateway
            .act(
                session,
                &CommandSpec::new("rsync")
                    .args(["-a", "--numeric-ids"])
                    .arg(format!("{source_str}/"))
                    .arg(format!("{destination_str}/")),
            )
            .await?;
        gateway
            .act(
                session,
                &CommandSpec::new("rm").args(["-rf", "--"]).arg(source_str.as_str()),
            )
            .await?;
    }

    if !options.compress {
        return Ok(destination);
    }

    let tarball = root.join(format!("{name}.{}", options.compression.extension()));
    info!("compressing {destination_str} into {}", tarball.display());
    gateway
        .act(
            session,
            &CommandSpec::new("tar")
                .arg(options.compression.tar_flag())
                .arg("-cf")
                .arg(tarball.display().to_string())
                .arg("-C")
                .arg(root.display().to_string())
                .arg(name.as_str()),
        )
        .await?;
    gateway
        .act(
            session,
            &CommandSpec::new("rm").args(["-rf", "--"]).arg(destination_str.as_str()),
        )
        .await?;
    Ok(tarball)
}
