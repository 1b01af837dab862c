use crate::{
    error::{Error, Result},
    gateway::{CommandSpec, Gateway, Session},
    site::{ResolvedSite, rsync_location},
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const RSYNC: &str = "rsync";

/// Local copy of a remote source, removed on drop or [`cleanup`](Self::cleanup)
#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingArea {
    /// Staged site directory, named after the domain
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staging directory now
    pub fn cleanup(self) {
        let Some(dir) = self.dir else {
            return;
        };
        let root = dir.path().display().to_string();
        match dir.close() {
            Ok(()) => debug!("removed staging area {root}"),
            Err(e) => warn!("failed to remove staging area {root}: {e}"),
        }
    }
}

/// Pull a remote source tree into a fresh local staging directory
///
/// Deletions are mirrored so the staged copy matches the source exactly.
///
/// # Errors
///
/// Returns [`Error::Transfer`] if the staging directory cannot be created or
/// rsync exits non-zero
pub async fn stage(gateway: &Gateway, site: &ResolvedSite, source: &Session) -> Result<StagingArea> {
    let area = if gateway.dry_run() {
        StagingArea {
            dir: None,
            path: std::env::temp_dir().join("sitehop-stage").join(&site.domain),
        }
    } else {
        let dir = tempfile::Builder::new()
            .prefix("sitehop-stage-")
            .tempdir()
            .map_err(|e| Error::Transfer {
                what: "create staging directory".to_string(),
                reason: e.to_string(),
            })?;
        let path = dir.path().join(&site.domain);
        StagingArea {
            dir: Some(dir),
            path,
        }
    };

    info!(
        "staging {}:{} into {}",
        source.destination(),
        site.source_path.display(),
        area.path.display()
    );

    let cmd = CommandSpec::new(RSYNC)
        .args(["-az", "--numeric-ids", "--delete", "-e"])
        .arg(gateway.rsync_shell(Some(source)))
        .arg(rsync_location(
            source.destination(),
            source.is_local(),
            &site.source_path,
            true,
        ))
        .arg(rsync_location("", true, &area.path, true));

    // on failure the area is dropped here, removing the directory
    gateway
        .act_local(&cmd)
        .await
        .map_err(|e| Error::Transfer {
            what: format!("stage {}", site.domain),
            reason: reason(e),
        })?;
    Ok(area)
}

/// Push a local site directory to its target location
///
/// # Errors
///
/// Returns [`Error::Transfer`] if rsync exits non-zero
pub async fn ship(gateway: &Gateway, source_dir: &Path, site: &ResolvedSite, target: &Session) -> Result<()> {
    let destination = site.target_site_path();
    info!(
        "shipping {} to {}:{}",
        source_dir.display(),
        target.destination(),
        destination.display()
    );

    let cmd = CommandSpec::new(RSYNC)
        .args(["-az", "--numeric-ids", "--mkpath", "-e"])
        .arg(gateway.rsync_shell(Some(target)))
        .arg(rsync_location("", true, source_dir, true))
        .arg(rsync_location(
            target.destination(),
            target.is_local(),
            &destination,
            true,
        ));

    gateway
        .act_local(&cmd)
        .await
        .map_err(|e| Error::Transfer {
            what: format!("ship {}", site.domain),
            reason: reason(e),
        })?;
    Ok(())
}

fn reason(error: Error) -> String {
    match error {
        Error::Command { reason, .. } => reason,
        other => other.to_string(),
    }
}
